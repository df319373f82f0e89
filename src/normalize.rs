//! C1 Normalizer: canonicalization of vehicle, size, and product-ID strings.
//! Every other component compares strings only after passing them through
//! one of these functions; none of them allocate more than one `String`.

use std::sync::OnceLock;

use regex::Regex;

/// Lowercase, keep only `a-z`/`0-9`. Used for vehicle/size equality when
/// comparing parsed model output against the expected CAM.
pub(crate) fn norm_compare(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Lowercase, strip spaces. Used as the warehouse and cache key for size.
pub(crate) fn norm_size(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Alphanumeric-only, lowercased. Used as the warehouse and cache key for
/// vehicle.
pub(crate) fn norm_vehicle(s: &str) -> String {
    norm_compare(s)
}

/// A product ID is valid iff it is digits-only and 7 or 8 characters long.
/// The literal `-` is a placeholder and is never valid.
pub(crate) fn is_valid_product_id(s: &str) -> bool {
    (s.len() == 7 || s.len() == 8) && !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn size_core_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            (?P<core>
                \d{2,3} \s* / \s* \d{2,3}(?:\.\d+)? \s* (?:R|ZR|LT) \s* \d{2}   # 205/70R15, 225/40 ZR18
              | \d{2,3} \s* / \s* \d{1,2}\.\d{1,2} \s* R \s* \d{2}             # 31/10.50 R15
              | \d{1,2}\.\d{1,2} \s* R \s* \d{2}                               # 7.50 R16
              | \d{2,3} \s* x \s* \d{1,2}\.\d{1,2} \s* R \s* \d{2}             # 31x10.50 R15
            )
            ",
        )
        .expect("size core pattern is a fixed, valid regex literal")
    })
}

/// Splits a noisy size core into a canonical `NN/NN RNN` rendering: a single
/// space before the letter designator (`R`, `ZR`, `LT`), no other internal
/// whitespace.
fn canonicalize_size_core(raw: &str) -> String {
    let collapsed: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = collapsed.to_uppercase();
    let designator_pos = upper
        .char_indices()
        .find(|(_, c)| matches!(c, 'R' | 'L' | 'Z'))
        .map(|(i, _)| i);
    match designator_pos {
        Some(i) => format!("{} {}", &upper[..i], &upper[i..]),
        None => upper,
    }
}

/// Inserts a single space between a trailing letter run and a following
/// digit run, e.g. `"Civic2019"` -> `"Civic 2019"`. Leaves everything else
/// untouched; idempotent because once the space exists there is no longer
/// a letter immediately followed by a digit at that position.
fn space_before_trailing_digits(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 1);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            if prev.is_ascii_alphabetic() && c.is_ascii_digit() {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}

/// Result of repairing a (Vehicle, Size) pair whose fields may have been
/// swapped or mixed by an upstream data-entry error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepairedCam {
    pub(crate) vehicle: String,
    pub(crate) size: String,
}

/// Applies the size-core pattern to extract a canonical size from whichever
/// of `vehicle`/`size` contains it, moving stray model text into the
/// vehicle field. A fixed point: repairing an already-repaired pair
/// returns the same pair (the size field then contains nothing but the
/// canonical core, and the vehicle field's trailing-letter/digit boundary
/// already has its space).
pub(crate) fn size_repair(vehicle: &str, size: &str) -> RepairedCam {
    let re = size_core_regex();

    if let Some(m) = re.find(size) {
        let core = canonicalize_size_core(m.as_str());
        let prefix = size[..m.start()].trim();
        let suffix = size[m.end()..].trim();
        let mut new_vehicle = vehicle.trim().to_string();
        for extra in [prefix, suffix] {
            if !extra.is_empty() {
                if !new_vehicle.is_empty() {
                    new_vehicle.push(' ');
                }
                new_vehicle.push_str(extra);
            }
        }
        return RepairedCam {
            vehicle: space_before_trailing_digits(&new_vehicle),
            size: core,
        };
    }

    if let Some(m) = re.find(vehicle) {
        let core = canonicalize_size_core(m.as_str());
        let mut new_vehicle = String::new();
        new_vehicle.push_str(vehicle[..m.start()].trim());
        let suffix = vehicle[m.end()..].trim();
        if !suffix.is_empty() {
            if !new_vehicle.is_empty() {
                new_vehicle.push(' ');
            }
            new_vehicle.push_str(suffix);
        }
        return RepairedCam {
            vehicle: space_before_trailing_digits(&new_vehicle),
            size: core,
        };
    }

    RepairedCam {
        vehicle: space_before_trailing_digits(vehicle.trim()),
        size: size.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_compare_strips_punctuation_and_case() {
        assert_eq!(norm_compare("Volkswagen Golf!"), "volkswagengolf");
        assert_eq!(norm_compare("205/55 R16"), "20555r16");
    }

    #[test]
    fn norm_size_strips_only_spaces() {
        assert_eq!(norm_size("205/55 R16"), "205/55r16");
    }

    #[test]
    fn is_valid_product_id_checks_digits_and_length() {
        assert!(is_valid_product_id("1234567"));
        assert!(is_valid_product_id("12345678"));
        assert!(!is_valid_product_id("123456"));
        assert!(!is_valid_product_id("123456789"));
        assert!(!is_valid_product_id("-"));
        assert!(!is_valid_product_id("12a4567"));
    }

    #[test]
    fn size_repair_extracts_core_from_size_field() {
        let r = size_repair("Volkswagen Golf", "205/70R15");
        assert_eq!(r.size, "205/70 R15");
        assert_eq!(r.vehicle, "Volkswagen Golf");
    }

    #[test]
    fn size_repair_moves_stray_prefix_into_vehicle() {
        let r = size_repair("Volkswagen Golf", "Base 225/40 ZR18");
        assert_eq!(r.size, "225/40 ZR18");
        assert_eq!(r.vehicle, "Volkswagen Golf Base");
    }

    #[test]
    fn size_repair_pulls_core_out_of_vehicle_when_size_has_none() {
        let r = size_repair("Jeep Wrangler 31/10.50 R15", "");
        assert_eq!(r.size, "31/10.50 R15");
        assert_eq!(r.vehicle, "Jeep Wrangler");
    }

    #[test]
    fn size_repair_is_a_fixed_point() {
        let once = size_repair("Volkswagen Golf", "Base 225/40 ZR18");
        let twice = size_repair(&once.vehicle, &once.size);
        assert_eq!(norm_compare(&once.size), norm_compare(&twice.size));
        assert_eq!(once, twice);
    }

    #[test]
    fn space_before_trailing_digits_is_idempotent() {
        let once = space_before_trailing_digits("Civic2019");
        let twice = space_before_trailing_digits(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "Civic 2019");
    }
}
