//! C6 Slot Backfill: turns a `ParsedOutput`'s 24 raw slots into exactly 20
//! unique valid product IDs (4 hotbox + 16 SKU), filling gaps from the
//! CAM's ranked candidate pool.

use crate::normalize::is_valid_product_id;
use crate::types::{CandidateRow, ParsedOutput};

/// The backfilled result: 4 hotboxes plus 20 SKUs, `success` iff all 4
/// hotboxes are valid digit IDs.
#[derive(Debug, Clone)]
pub(crate) struct BackfilledCam {
    pub(crate) hb: [String; 4],
    pub(crate) skus: [String; 20],
    pub(crate) success: bool,
}

fn candidate_pool(candidates: &[CandidateRow]) -> Vec<&str> {
    candidates
        .iter()
        .map(|c| c.product_id.as_str())
        .filter(|id| is_valid_product_id(id))
        .collect()
}

/// Walk the 24 parsed slots, keep valid non-duplicate IDs, then fill the
/// gaps from the candidate pool in priority order. Idempotent: running this
/// again on an already-backfilled slot list (all 24 slots unique valid IDs,
/// pool exhausted or irrelevant) returns the same 24 IDs unchanged.
pub(crate) fn backfill(parsed: &ParsedOutput, candidates: &[CandidateRow]) -> BackfilledCam {
    let mut used = std::collections::HashSet::new();
    let mut clean_slots: [Option<String>; 24] = std::array::from_fn(|_| None);

    for (i, slot) in parsed.slots.iter().enumerate() {
        let trimmed = slot.trim();
        if is_valid_product_id(trimmed) && used.insert(trimmed.to_string()) {
            clean_slots[i] = Some(trimmed.to_string());
        }
    }

    let pool = candidate_pool(candidates);
    let mut pool_idx = 0usize;
    let mut final_ids: [String; 24] = std::array::from_fn(|_| "-".to_string());

    for (i, slot) in clean_slots.into_iter().enumerate() {
        if let Some(id) = slot {
            final_ids[i] = id;
            continue;
        }
        let mut filled = false;
        while pool_idx < pool.len() {
            let candidate = pool[pool_idx];
            pool_idx += 1;
            if used.insert(candidate.to_string()) {
                final_ids[i] = candidate.to_string();
                filled = true;
                break;
            }
        }
        if !filled {
            final_ids[i] = "-".to_string();
        }
    }

    let hb: [String; 4] = std::array::from_fn(|i| final_ids[i].clone());
    let skus: [String; 20] = std::array::from_fn(|i| final_ids[4 + i].clone());
    let success = hb.iter().all(|id| is_valid_product_id(id));

    BackfilledCam { hb, skus, success }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn candidate(id: &str) -> CandidateRow {
        CandidateRow {
            product_id: id.to_string(),
            tyre_score: 0.0,
            units: 0.0,
            fields: BTreeMap::new(),
        }
    }

    fn parsed_from(slots: &[&str]) -> ParsedOutput {
        let mut arr: [String; 24] = std::array::from_fn(|_| "-".to_string());
        for (i, s) in slots.iter().enumerate().take(24) {
            arr[i] = s.to_string();
        }
        ParsedOutput {
            vehicle: "Golf".to_string(),
            size: "205/55 R16".to_string(),
            slots: arr,
        }
    }

    #[test]
    fn full_valid_slots_pass_through_unchanged() {
        let ids: Vec<String> = (11111110..11111134).map(|n| n.to_string()).collect();
        let slot_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let parsed = parsed_from(&slot_refs);
        let result = backfill(&parsed, &[]);
        assert!(result.success);
        assert_eq!(result.hb[0], ids[0]);
        assert_eq!(result.skus[19], ids[23]);
    }

    #[test]
    fn gaps_filled_from_candidate_pool_in_order() {
        let parsed = parsed_from(&["1111111", "bad", "3333333", "4444444"]);
        let candidates: Vec<CandidateRow> =
            vec![candidate("9999991"), candidate("9999992"), candidate("9999993")];
        let result = backfill(&parsed, &candidates);
        assert!(result.success);
        assert_eq!(result.hb[1], "9999991");
    }

    #[test]
    fn pool_exhaustion_fills_dash() {
        let parsed = parsed_from(&["1111111", "bad", "3333333", "4444444"]);
        let result = backfill(&parsed, &[]);
        assert!(!result.success);
        assert_eq!(result.hb[1], "-");
    }

    #[test]
    fn duplicates_are_deduped_and_refilled() {
        let parsed = parsed_from(&["1111111", "1111111", "3333333", "4444444"]);
        let candidates = vec![candidate("9999991")];
        let result = backfill(&parsed, &candidates);
        assert_eq!(result.hb[1], "9999991");
        assert!(result.success);
    }

    #[test]
    fn backfill_is_idempotent_on_an_already_backfilled_output() {
        let parsed = parsed_from(&["1111111", "2222222", "3333333", "4444444"]);
        let first = backfill(&parsed, &[]);
        let mut reslots: [String; 24] = std::array::from_fn(|_| "-".to_string());
        for i in 0..4 {
            reslots[i] = first.hb[i].clone();
        }
        for i in 0..20 {
            reslots[4 + i] = first.skus[i].clone();
        }
        let reparsed = ParsedOutput {
            vehicle: parsed.vehicle.clone(),
            size: parsed.size.clone(),
            slots: reslots,
        };
        let second = backfill(&reparsed, &[]);
        assert_eq!(first.hb, second.hb);
        assert_eq!(first.skus, second.skus);
    }
}
