//! C10 Usage & Status Reporter: cost computation from accumulated token
//! counts, an atomically-written run manifest, and progress heartbeats
//! logged through the same `[orchestrator]` tag the batch loop uses.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::types::{Recommendation, UsageAccumulator};

/// Dollar cost of a batch's token usage, given the configured per-token
/// prices. Zero prices (the default) make this always zero, which is the
/// expected behavior when no pricing has been configured.
pub(crate) fn compute_cost(usage: &UsageAccumulator, config: &Config) -> f64 {
    usage.prompt_token_count as f64 * config.price_in_per_token
        + usage.candidates_token_count as f64 * config.price_out_per_token
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    run_id: &'a str,
    generated_at: String,
    total_cams: usize,
    succeeded: usize,
    failed: usize,
    usage: UsageAccumulator,
    cost_usd: f64,
}

/// Writes the run manifest to `config.manifest_path`, atomically: serialize
/// to a `.json.tmp` sibling, then rename over the target. A write failure is
/// logged and swallowed — a missing manifest should never fail an otherwise
/// successful batch.
pub(crate) fn write_manifest(config: &Config, run_id: &str, results: &[Recommendation], usage: &UsageAccumulator) {
    let succeeded = results.iter().filter(|r| r.success).count();
    let manifest = Manifest {
        run_id,
        generated_at: Utc::now().to_rfc3339(),
        total_cams: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        usage: *usage,
        cost_usd: compute_cost(usage, config),
    };

    let json = match serde_json::to_string_pretty(&manifest) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("[orchestrator] manifest serialize failed: {err}");
            return;
        }
    };

    let path = Path::new(&config.manifest_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                eprintln!("[orchestrator] manifest dir create failed: {err}");
                return;
            }
        }
    }
    let tmp = path.with_extension("json.tmp");
    if let Err(err) = std::fs::write(&tmp, &json).and_then(|_| std::fs::rename(&tmp, path)) {
        eprintln!("[orchestrator] manifest write failed: {err}");
    }
}

/// Logs a progress heartbeat: how many CAMs have been attempted,
/// succeeded, and failed so far out of the batch total.
pub(crate) fn log_heartbeat(run_id: &str, attempted: usize, succeeded: usize, failed: usize, total: usize) {
    eprintln!(
        "[orchestrator] batch {run_id} progress: {attempted}/{total} attempted, {succeeded} succeeded, {failed} failed"
    );
}
