//! CSV artifact writer: the on-disk deliverable for `camrec run`. One row
//! per unique (Vehicle, Size), columns `Vehicle,Size,HB1..HB4,SKU1..SKU20`.
//! Vehicle/Size are repaired (moved size-core out of whichever field holds
//! it) before being written so a run survives upstream field-swap noise.

use std::collections::HashSet;
use std::io::Write as _;
use std::path::Path;

use crate::normalize::size_repair;
use crate::types::Recommendation;

fn is_blank_cell(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty()
        || trimmed == "-"
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.ends_with(".0")
}

fn clean_cell(cell: &str) -> String {
    if is_blank_cell(cell) {
        String::new()
    } else {
        cell.trim().to_string()
    }
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Writes `results` to `path` as CSV. Rows whose vehicle or size repair to
/// empty, or whose hotboxes/SKUs contain the literal `FormatError` tag, are
/// dropped entirely rather than written with blanks. Duplicate
/// (Vehicle, Size) keys keep only the first occurrence.
pub(crate) fn write_artifact(path: &Path, results: &[Recommendation]) -> std::io::Result<()> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut lines = Vec::with_capacity(results.len() + 1);
    lines.push("Vehicle,Size,HB1,HB2,HB3,HB4,SKU1,SKU2,SKU3,SKU4,SKU5,SKU6,SKU7,SKU8,SKU9,SKU10,SKU11,SKU12,SKU13,SKU14,SKU15,SKU16,SKU17,SKU18,SKU19,SKU20".to_string());

    for rec in results {
        let repaired = size_repair(&rec.vehicle, &rec.size);
        if repaired.vehicle.trim().is_empty() || repaired.size.trim().is_empty() {
            continue;
        }
        let key = (repaired.vehicle.clone(), repaired.size.clone());
        if !seen.insert(key) {
            continue;
        }

        let mut cells = vec![repaired.vehicle.clone(), repaired.size.clone()];
        let hotboxes = [&rec.hb1, &rec.hb2, &rec.hb3, &rec.hb4];
        let mut has_format_error = false;
        for hb in hotboxes {
            if hb.contains("FormatError") {
                has_format_error = true;
            }
            cells.push(clean_cell(hb));
        }
        for sku in rec.skus.iter().take(20) {
            if sku.contains("FormatError") {
                has_format_error = true;
            }
            cells.push(clean_cell(sku));
        }
        while cells.len() < 24 {
            cells.push(String::new());
        }
        if has_format_error {
            continue;
        }

        let escaped: Vec<String> = cells.iter().map(|c| csv_escape(c)).collect();
        lines.push(escaped.join(","));
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        for line in &lines {
            writeln!(file, "{line}")?;
        }
    }
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cam, ErrorCode};

    fn success_rec(vehicle: &str, size: &str) -> Recommendation {
        Recommendation {
            vehicle: vehicle.to_string(),
            size: size.to_string(),
            hb1: "1111111".to_string(),
            hb2: "2222222".to_string(),
            hb3: "3333333".to_string(),
            hb4: "4444444".to_string(),
            skus: (0..20).map(|i| format!("{i:07}")).collect(),
            success: true,
            error_code: None,
            usage: None,
        }
    }

    #[test]
    fn duplicate_keys_keep_first_occurrence() {
        let dir = std::env::temp_dir().join(format!("camrec_artifact_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.csv");
        let mut first = success_rec("Golf", "205/55 R16");
        let mut second = success_rec("Golf", "205/55 R16");
        second.hb1 = "9999999".to_string();
        first.hb1 = "1111111".to_string();
        write_artifact(&path, &[first, second]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let data_lines: Vec<&str> = contents.lines().skip(1).collect();
        assert_eq!(data_lines.len(), 1);
        assert!(data_lines[0].contains("1111111"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rows_with_format_error_are_dropped() {
        let dir = std::env::temp_dir().join(format!("camrec_artifact2_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.csv");
        let cam = Cam { vehicle: "Polo".to_string(), size: "225/40 R18".to_string() };
        let failed = Recommendation::failure(&cam, ErrorCode::FormatError, None);
        let mut failed = failed;
        failed.hb1 = "FormatError".to_string();
        write_artifact(&path, &[failed]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn blank_and_dash_cells_normalize_to_empty() {
        assert_eq!(clean_cell("-"), "");
        assert_eq!(clean_cell("nan"), "");
        assert_eq!(clean_cell("1234567.0"), "");
        assert_eq!(clean_cell(""), "");
        assert_eq!(clean_cell("1234567"), "1234567");
    }
}
