//! Small stdlib-only helpers shared by the config loader, model client, and
//! auth broker: typed env-var parsing, retry jitter, and `Retry-After`
//! header parsing.

use std::env;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn env_required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("Missing {name}")).into());
    }
    Ok(value)
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value.trim().parse::<u64>()?),
        None => Ok(default),
    }
}

pub(crate) fn env_usize(name: &str, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value.trim().parse::<usize>()?),
        None => Ok(default),
    }
}

pub(crate) fn env_f64(name: &str, default: f64) -> Result<f64, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value.trim().parse::<f64>()?),
        None => Ok(default),
    }
}

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match env_optional(name) {
        Some(value) => {
            let v = value.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "yes" | "y" | "on")
        }
        None => default,
    }
}

/// A pseudo-random ratio in `[0, 1)` derived from the current time,
/// used to jitter retry backoff so concurrent workers don't retry in lockstep.
pub(crate) fn jitter_ratio() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

pub(crate) fn parse_retry_after(resp: &ureq::Response) -> Option<f64> {
    resp.header("retry-after")
        .and_then(|v| v.trim().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_recognizes_truthy_values() {
        unsafe {
            env::set_var("CAMREC_TEST_BOOL", "Yes");
        }
        assert!(env_bool("CAMREC_TEST_BOOL", false));
        unsafe {
            env::remove_var("CAMREC_TEST_BOOL");
        }
        assert!(!env_bool("CAMREC_TEST_BOOL", false));
    }

    #[test]
    fn env_u64_falls_back_to_default() {
        unsafe {
            env::remove_var("CAMREC_TEST_U64");
        }
        assert_eq!(env_u64("CAMREC_TEST_U64", 42).unwrap(), 42);
    }

    #[test]
    fn jitter_ratio_is_bounded() {
        let r = jitter_ratio();
        assert!((0.0..1.0).contains(&r));
    }
}
