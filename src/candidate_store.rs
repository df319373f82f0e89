//! C2 Candidate Store: per-size (and optionally per-vehicle) fetch of
//! warehouse candidate rows, with an on-disk cache and local CSV mirror
//! fallback. Warehouse errors are logged and coerced to empty results —
//! "no data" is a typed outcome here, never a propagated exception.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::slice::ParallelSliceMut;

use crate::normalize::{norm_size, norm_vehicle};
use crate::types::CandidateRow;

const WAREHOUSE_LIMIT: usize = 100;

fn cache_key(size: &str, vehicle: Option<&str>) -> String {
    let s_key = {
        let n = norm_size(size);
        if n.is_empty() {
            "any_size".to_string()
        } else {
            n
        }
    };
    let v_key = vehicle
        .map(norm_vehicle)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "any_vehicle".to_string());
    format!("{s_key}|{v_key}")
}

fn cache_path(cache_dir: &Path, size: &str, vehicle: Option<&str>) -> PathBuf {
    let digest = md5::compute(cache_key(size, vehicle).as_bytes());
    cache_dir.join(format!("tyre_data_{digest:x}.json"))
}

fn load_from_cache(path: &Path) -> Option<Vec<CandidateRow>> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Vec<CandidateRow>>(&data) {
        Ok(rows) => Some(rows),
        Err(err) => {
            eprintln!("[candidate_store] cache file {} unreadable, treating as miss: {err}", path.display());
            None
        }
    }
}

fn save_to_cache(path: &Path, rows: &[CandidateRow]) {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("[candidate_store] cache dir create failed: {err}");
            return;
        }
    }
    match serde_json::to_string_pretty(rows) {
        Ok(json) => {
            let tmp = path.with_extension("json.tmp");
            if let Err(err) = std::fs::write(&tmp, &json).and_then(|_| std::fs::rename(&tmp, path)) {
                eprintln!("[candidate_store] cache write failed: {err}");
            }
        }
        Err(err) => eprintln!("[candidate_store] cache serialize failed: {err}"),
    }
}

/// Sorts by TyreScore ascending, Units descending. Run in parallel since a
/// warehouse response can carry up to `WAREHOUSE_LIMIT` rows per size and
/// this runs once per cache miss across however many sizes a batch needs.
fn sort_candidates(mut rows: Vec<CandidateRow>) -> Vec<CandidateRow> {
    rows.par_sort_by(|a, b| {
        a.tyre_score
            .partial_cmp(&b.tyre_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.units.partial_cmp(&a.units).unwrap_or(std::cmp::Ordering::Equal))
    });
    rows
}

fn warehouse_query(
    endpoint: &str,
    size: &str,
    vehicle: Option<&str>,
    session_cookie: Option<&str>,
) -> Vec<CandidateRow> {
    let agent = ureq::AgentBuilder::new().build();
    let mut body = serde_json::json!({
        "size_pattern": norm_size(size),
        "order_by": ["TyreScore ASC", "Units DESC"],
        "limit": WAREHOUSE_LIMIT,
    });
    if let Some(v) = vehicle {
        let nv = norm_vehicle(v);
        if !nv.is_empty() {
            body["vehicle_norm"] = serde_json::json!(nv);
        }
    }
    let url = format!("{endpoint}/query");
    let mut req = agent.post(&url);
    if let Some(cookie) = session_cookie {
        req = req.set("Cookie", cookie);
    }
    match req.send_json(body) {
        Ok(resp) => match resp.into_json::<Vec<CandidateRow>>() {
            Ok(rows) => sort_candidates(rows),
            Err(err) => {
                eprintln!("[candidate_store] warehouse response decode failed: {err}");
                Vec::new()
            }
        },
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            eprintln!("[candidate_store] warehouse error {code}: {text}");
            Vec::new()
        }
        Err(ureq::Error::Transport(err)) => {
            eprintln!("[candidate_store] warehouse transport error: {err}");
            Vec::new()
        }
    }
}

fn csv_mirror_query(csv_path: &Path, size: &str, vehicle: Option<&str>) -> Vec<CandidateRow> {
    let contents = match std::fs::read_to_string(csv_path) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("[candidate_store] local CSV mirror unreadable: {err}");
            return Vec::new();
        }
    };
    let mut lines = contents.lines();
    let header = match lines.next() {
        Some(h) => h.split(',').map(str::trim).collect::<Vec<_>>(),
        None => return Vec::new(),
    };
    let size_idx = header.iter().position(|h| h.eq_ignore_ascii_case("SIZE"));
    let vehicle_idx = header.iter().position(|h| h.eq_ignore_ascii_case("Vehicle"));
    let product_idx = header.iter().position(|h| h.eq_ignore_ascii_case("ProductId"));
    let score_idx = header.iter().position(|h| h.eq_ignore_ascii_case("TyreScore"));
    let units_idx = header.iter().position(|h| h.eq_ignore_ascii_case("Units"));

    let norm_s = norm_size(size);
    let norm_v = vehicle.map(norm_vehicle).filter(|v| !v.is_empty());

    let mut rows = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let row_size = size_idx.and_then(|i| cells.get(i)).copied().unwrap_or("");
        if !norm_size(row_size).contains(&norm_s) {
            continue;
        }
        if let Some(ref nv) = norm_v {
            let row_vehicle = vehicle_idx.and_then(|i| cells.get(i)).copied().unwrap_or("");
            if &norm_vehicle(row_vehicle) != nv {
                continue;
            }
        }
        let product_id = product_idx.and_then(|i| cells.get(i)).copied().unwrap_or("").to_string();
        let tyre_score = score_idx
            .and_then(|i| cells.get(i))
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let units = units_idx
            .and_then(|i| cells.get(i))
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let mut fields = std::collections::BTreeMap::new();
        for (i, name) in header.iter().enumerate() {
            if let Some(value) = cells.get(i) {
                fields.insert(name.to_string(), serde_json::json!(value));
            }
        }
        rows.push(CandidateRow { product_id, tyre_score, units, fields });
    }
    sort_candidates(rows)
}

/// Fetch candidate rows for a single (size, vehicle?) pair. Resolution
/// order: on-disk cache, then warehouse (filtered by size+vehicle, falling
/// back to size-only if a vehicle filter returned nothing), then the local
/// CSV mirror with the same fallback shape. Any non-empty result from the
/// warehouse or CSV mirror is written back to the cache, best-effort.
pub(crate) fn fetch(
    cache_dir: &Path,
    warehouse_endpoint: Option<&str>,
    local_csv_path: Option<&Path>,
    size: &str,
    vehicle: Option<&str>,
    session_cookie: Option<&str>,
) -> Vec<CandidateRow> {
    let path = cache_path(cache_dir, size, vehicle);
    if let Some(rows) = load_from_cache(&path) {
        return rows;
    }

    let mut rows = match warehouse_endpoint {
        Some(endpoint) => warehouse_query(endpoint, size, vehicle, session_cookie),
        None => Vec::new(),
    };
    if rows.is_empty() && vehicle.is_some() {
        if let Some(endpoint) = warehouse_endpoint {
            rows = warehouse_query(endpoint, size, None, session_cookie);
        }
    }

    if rows.is_empty() {
        if let Some(csv_path) = local_csv_path {
            rows = csv_mirror_query(csv_path, size, vehicle);
            if rows.is_empty() && vehicle.is_some() {
                rows = csv_mirror_query(csv_path, size, None);
            }
        }
    }

    if !rows.is_empty() {
        save_to_cache(&path, &rows);
    }
    rows
}

/// Outcome of a batch warehouse fetch. `Unauthorized` signals a 401 that the
/// caller should resolve with one `auth::refresh()` and one reissue, per
/// spec.md §4.8 step 7 — every other failure (transport error, 5xx, decode
/// failure) is absorbed into an empty/partial `Ok` map instead, since those
/// are not auth-recoverable.
pub(crate) enum BatchFetch {
    Ok(HashMap<String, Vec<CandidateRow>>),
    Unauthorized,
}

/// Fetch candidates for multiple sizes in one warehouse round-trip, grouped
/// by normalized size. No cache read or write — this path exists purely to
/// batch-prefetch ahead of a run, not to serve a single CAM.
pub(crate) fn fetch_batch(
    warehouse_endpoint: Option<&str>,
    sizes: &[String],
    session_cookie: Option<&str>,
) -> BatchFetch {
    let unique: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        sizes
            .iter()
            .map(|s| norm_size(s))
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .collect()
    };
    if unique.is_empty() {
        return BatchFetch::Ok(HashMap::new());
    }
    let mut result: HashMap<String, Vec<CandidateRow>> =
        unique.iter().map(|s| (s.clone(), Vec::new())).collect();

    let endpoint = match warehouse_endpoint {
        Some(e) => e,
        None => return BatchFetch::Ok(result),
    };

    let agent = ureq::AgentBuilder::new().build();
    let body = serde_json::json!({
        "size_list": unique,
        "order_by": ["TyreScore ASC", "Units DESC"],
    });
    let url = format!("{endpoint}/query_batch");
    let mut req = agent.post(&url);
    if let Some(cookie) = session_cookie {
        req = req.set("Cookie", cookie);
    }
    match req.send_json(body) {
        Ok(resp) => match resp.into_json::<Vec<CandidateRow>>() {
            Ok(rows) => {
                for row in rows {
                    let n = norm_size(&row.field("SIZE"));
                    if let Some(bucket) = result.get_mut(&n) {
                        bucket.push(row);
                    }
                }
                for bucket in result.values_mut() {
                    let taken = std::mem::take(bucket);
                    *bucket = sort_candidates(taken);
                }
            }
            Err(err) => eprintln!("[candidate_store] batch response decode failed: {err}"),
        },
        Err(ureq::Error::Status(401, _)) => {
            eprintln!("[candidate_store] batch warehouse 401, auth refresh needed");
            return BatchFetch::Unauthorized;
        }
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            eprintln!("[candidate_store] batch warehouse error {code}: {text}");
        }
        Err(ureq::Error::Transport(err)) => {
            eprintln!("[candidate_store] batch warehouse transport error: {err}");
        }
    }
    BatchFetch::Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_distinguishes_vehicle_presence() {
        assert_ne!(cache_key("205/55 R16", Some("Golf")), cache_key("205/55 R16", None));
    }

    #[test]
    fn cache_round_trips_through_tempdir() {
        let dir = std::env::temp_dir().join(format!("camrec_test_cache_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = cache_path(&dir, "205/55 R16", Some("Golf"));
        let rows = vec![CandidateRow {
            product_id: "1234567".to_string(),
            tyre_score: 1.0,
            units: 10.0,
            fields: std::collections::BTreeMap::new(),
        }];
        save_to_cache(&path, &rows);
        let loaded = load_from_cache(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].product_id, "1234567");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sort_candidates_orders_by_score_then_units_desc() {
        let rows = vec![
            CandidateRow { product_id: "a".into(), tyre_score: 2.0, units: 5.0, fields: Default::default() },
            CandidateRow { product_id: "b".into(), tyre_score: 1.0, units: 1.0, fields: Default::default() },
            CandidateRow { product_id: "c".into(), tyre_score: 1.0, units: 9.0, fields: Default::default() },
        ];
        let sorted = sort_candidates(rows);
        assert_eq!(sorted[0].product_id, "c");
        assert_eq!(sorted[1].product_id, "b");
        assert_eq!(sorted[2].product_id, "a");
    }

    #[test]
    fn csv_mirror_filters_by_size_and_vehicle() {
        let dir = std::env::temp_dir().join(format!("camrec_test_csv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mirror.csv");
        std::fs::write(
            &path,
            "SIZE,Vehicle,ProductId,TyreScore,Units\n205/55R16,Golf,1234567,1.0,5\n225/40R18,Polo,7654321,2.0,3\n",
        )
        .unwrap();
        let rows = csv_mirror_query(&path, "205/55 R16", Some("Golf"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, "1234567");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
