//! C5 Output Parser: two-stage parse of the model's free-text response into
//! a `ParsedOutput` of 24 raw slots (4 hotbox + 20 SKU), exactly as
//! extracted — deduplication is the backfill stage's job, not this one's.

use crate::normalize::norm_compare;
use crate::types::ParsedOutput;

fn is_digits_or_dash(tok: &str) -> bool {
    tok == "-" || (!tok.is_empty() && tok.chars().all(|c| c.is_ascii_digit()))
}

fn pad_to_24(tokens: &[&str]) -> [String; 24] {
    let mut slots: [String; 24] = std::array::from_fn(|_| "-".to_string());
    for (i, tok) in tokens.iter().take(24).enumerate() {
        slots[i] = tok.to_string();
    }
    slots
}

/// Stage A: strict tokenizer. Tries every `(v_end, s_len)` split in
/// increasing order and accepts the first one where both the vehicle and
/// size candidates normalize-equal the expected CAM and the first 4 product
/// tokens are each digits-only or `-`. Ties broken by smallest `(v_end,
/// s_len)`, which the nested-loop order already guarantees.
fn parse_stage_a(raw_text: &str, expected_vehicle: &str, expected_size: &str) -> Option<ParsedOutput> {
    let line = raw_text.trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let n = tokens.len();
    if n < 6 {
        return None;
    }
    let norm_v = norm_compare(expected_vehicle);
    let norm_s = norm_compare(expected_size);

    for v_end in 1..=n.saturating_sub(4) {
        for s_len in [1usize, 2, 3] {
            let after = v_end + s_len;
            if after > n {
                continue;
            }
            let vehicle_candidate = tokens[..v_end].join(" ");
            let size_candidate = tokens[v_end..after].join(" ");
            let product_ids = &tokens[after..];
            if product_ids.len() < 4 {
                continue;
            }
            if norm_compare(&vehicle_candidate) != norm_v || norm_compare(&size_candidate) != norm_s {
                continue;
            }
            if !product_ids.iter().take(4).all(|t| is_digits_or_dash(t)) {
                continue;
            }
            return Some(ParsedOutput {
                vehicle: vehicle_candidate,
                size: size_candidate,
                slots: pad_to_24(product_ids),
            });
        }
    }
    None
}

/// Stage B: forgiving parser, only invoked when Stage A finds nothing.
/// Requires both the expected vehicle and size to appear (normalized) as a
/// substring of the normalized output, then extracts every 7/8-digit
/// integer token in order, allowing `-` placeholders once at least one
/// valid ID has been seen. Needs >= 4 extracted IDs to succeed.
fn parse_stage_b(raw_text: &str, expected_vehicle: &str, expected_size: &str) -> Option<ParsedOutput> {
    if raw_text.trim().is_empty() {
        return None;
    }
    let norm_v = norm_compare(expected_vehicle);
    let norm_s = norm_compare(expected_size);
    let norm_text = norm_compare(raw_text);
    if !norm_text.contains(&norm_v) || !norm_text.contains(&norm_s) {
        return None;
    }

    let cleaned: String = raw_text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c.is_whitespace() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let mut ids: Vec<&str> = Vec::new();
    for tok in &tokens {
        let is_valid_id = tok.len() >= 7 && tok.len() <= 8 && tok.chars().all(|c| c.is_ascii_digit());
        if is_valid_id {
            ids.push(tok);
        } else if *tok == "-" && !ids.is_empty() {
            ids.push(tok);
        }
    }

    if ids.len() < 4 {
        return None;
    }

    Some(ParsedOutput {
        vehicle: expected_vehicle.to_string(),
        size: expected_size.to_string(),
        slots: pad_to_24(&ids),
    })
}

/// Runs Stage A, falling back to Stage B only if Stage A found nothing.
pub(crate) fn parse_output(
    raw_text: &str,
    expected_vehicle: &str,
    expected_size: &str,
) -> Result<ParsedOutput, &'static str> {
    if let Some(parsed) = parse_stage_a(raw_text, expected_vehicle, expected_size) {
        return Ok(parsed);
    }
    if let Some(parsed) = parse_stage_b(raw_text, expected_vehicle, expected_size) {
        return Ok(parsed);
    }
    Err("FormatError")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_a_matches_exact_tokens() {
        let text = "VolkswagenGolf 20555R16 11111111 22222222 33333333 44444444 55555555";
        let parsed = parse_output(text, "Volkswagen Golf", "205/55 R16").unwrap();
        assert_eq!(parsed.slots[0], "11111111");
        assert_eq!(parsed.slots[4], "55555555");
    }

    #[test]
    fn stage_a_prefers_smallest_split() {
        // "Volkswagen Golf" as vehicle, two tokens; size one token.
        let text = "Volkswagen Golf 20555R16 1234567 2345678 3456789 4567890";
        let parsed = parse_output(text, "Volkswagen Golf", "205/55 R16").unwrap();
        assert_eq!(parsed.vehicle, "Volkswagen Golf");
        assert_eq!(parsed.slots[0], "1234567");
    }

    #[test]
    fn stage_b_extracts_ids_when_stage_a_fails() {
        let text = "Some garbled text about Volkswagen Golf and 205/55 R16 tyres: 1234567 blah 2345678 - 3456789 4567890";
        let parsed = parse_output(text, "Volkswagen Golf", "205/55 R16").unwrap();
        let ids: Vec<&str> = parsed.slots.iter().map(|s| s.as_str()).filter(|s| *s != "-").collect();
        assert!(ids.len() >= 4);
    }

    #[test]
    fn stage_b_fails_without_vehicle_and_size_mention() {
        let text = "1234567 2345678 3456789 4567890";
        assert!(parse_output(text, "Volkswagen Golf", "205/55 R16").is_err());
    }

    #[test]
    fn both_stages_fail_on_short_garbage() {
        let text = "nope";
        assert!(parse_output(text, "Volkswagen Golf", "205/55 R16").is_err());
    }
}
