//! C8 Batch Orchestrator: bulk candidate prefetch, bounded-concurrency
//! per-CAM dispatch, batch deadline enforcement, order-preserving result
//! assembly, usage aggregation, a single global retry pass over failures,
//! and one 401-triggered auth refresh-and-reissue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::auth::{self, Credentials};
use crate::candidate_store::{self, BatchFetch};
use crate::config::Config;
use crate::types::{BatchRequest, BatchResponse, Cam, ErrorCode, Recommendation, UsageAccumulator};
use crate::usage::log_heartbeat;
use crate::worker::{process_cam, WorkerContext};

const MAX_BATCH_SIZE: usize = 500;

/// Runs one worker invocation inside `catch_unwind`, turning a panic into an
/// `INTERNAL_ERROR` recommendation instead of poisoning the whole batch.
fn run_cam_isolated(
    config: &Config,
    params: &crate::types::RecommendationParams,
    credentials: &Credentials,
    prefetched: Option<&[crate::types::CandidateRow]>,
    cam: &Cam,
) -> Recommendation {
    let ctx = WorkerContext { config, params, credentials, prefetched };
    let result = panic::catch_unwind(AssertUnwindSafe(|| process_cam(&ctx, cam)));
    match result {
        Ok(rec) => rec,
        Err(_) => {
            eprintln!("[worker] panic while processing {}/{}", cam.vehicle, cam.size);
            Recommendation::failure(cam, ErrorCode::InternalError, None)
        }
    }
}

/// Dispatches `cams` across a pool bounded by `config.workers`, in index
/// order, enforcing `deadline` against the whole dispatch. CAMs still
/// outstanding when the deadline elapses are filled with a `TIMEOUT`
/// recommendation rather than left unset.
fn dispatch_bounded(
    config: &Config,
    params: &crate::types::RecommendationParams,
    credentials: &Credentials,
    prefetch: &std::collections::HashMap<String, Vec<crate::types::CandidateRow>>,
    cams: &[Cam],
    deadline: Duration,
) -> Vec<Recommendation> {
    let start = Instant::now();
    let mut results: Vec<Option<Recommendation>> = vec![None; cams.len()];

    for chunk in (0..cams.len()).collect::<Vec<_>>().chunks(config.workers.max(1)) {
        let (tx, rx) = mpsc::channel();
        for &idx in chunk {
            let cam = cams[idx].clone();
            let config = config.clone();
            let params = params.clone();
            let credentials = credentials.clone();
            let prefetched: Option<Vec<crate::types::CandidateRow>> = {
                let key = crate::normalize::norm_size(&cam.size);
                prefetch.get(&key).cloned()
            };
            let tx = tx.clone();
            thread::spawn(move || {
                let rec = run_cam_isolated(&config, &params, &credentials, prefetched.as_deref(), &cam);
                let _ = tx.send((idx, rec));
            });
        }
        drop(tx);

        let remaining = deadline.saturating_sub(start.elapsed());
        let chunk_deadline = Instant::now() + remaining;
        for _ in 0..chunk.len() {
            let wait = chunk_deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok((idx, rec)) => results[idx] = Some(rec),
                Err(_) => break,
            }
        }
        if start.elapsed() >= deadline {
            break;
        }
    }

    cams.iter()
        .enumerate()
        .map(|(i, cam)| {
            results[i]
                .take()
                .unwrap_or_else(|| Recommendation::failure(cam, ErrorCode::Timeout, None))
        })
        .collect()
}

fn needs_auth_retry(credentials: &Credentials, config: &Config) -> bool {
    config.mode == crate::config::Mode::Cloud && credentials.session_cookie.is_none()
}

/// Runs a full batch: validates size, bulk-prefetches candidates per unique
/// size, dispatches the first pass bounded by `config.workers` against
/// `config.batch_deadline_secs`, retries any still-failing CAMs once in a
/// second bounded pass (overwriting only on success), and aggregates usage
/// unconditionally from both passes. If no session credentials are
/// available in cloud mode at the start, refreshes once before dispatching.
/// A 401 from the warehouse batch-prefetch call triggers one
/// `auth::refresh()` and one reissue of that same call; a second 401 fails
/// every CAM in the batch outright rather than falling through to
/// `NO_RESULTS`.
pub(crate) fn run_batch(config: &Config, request: &BatchRequest) -> Result<BatchResponse, ErrorCode> {
    if request.cams.len() > MAX_BATCH_SIZE {
        eprintln!(
            "[orchestrator] batch {} rejected: {} CAMs exceeds cap of {MAX_BATCH_SIZE}",
            request.run_id,
            request.cams.len()
        );
        return Err(ErrorCode::InvalidInput);
    }

    let mut credentials = if config.mode == crate::config::Mode::Cloud {
        let mut credentials = auth::refresh(config);
        if needs_auth_retry(&credentials, config) {
            eprintln!("[orchestrator] initial auth refresh incomplete, retrying once");
            credentials = auth::refresh(config);
        }
        if needs_auth_retry(&credentials, config) {
            eprintln!("[orchestrator] auth refresh still incomplete after retry, proceeding without a session cookie");
        }
        credentials
    } else {
        Credentials::default()
    };

    eprintln!(
        "[orchestrator] batch {} starting: {} CAMs, {} workers",
        request.run_id,
        request.cams.len(),
        config.workers
    );

    let sizes: Vec<String> = request.cams.iter().map(|c| c.size.clone()).collect();
    let prefetch = match candidate_store::fetch_batch(
        config.warehouse_endpoint.as_deref(),
        &sizes,
        credentials.session_cookie.as_deref(),
    ) {
        BatchFetch::Ok(map) => map,
        BatchFetch::Unauthorized => {
            eprintln!("[orchestrator] batch {} warehouse prefetch 401, refreshing and reissuing once", request.run_id);
            credentials = auth::refresh(config);
            match candidate_store::fetch_batch(
                config.warehouse_endpoint.as_deref(),
                &sizes,
                credentials.session_cookie.as_deref(),
            ) {
                BatchFetch::Ok(map) => map,
                BatchFetch::Unauthorized => {
                    eprintln!(
                        "[orchestrator] batch {} warehouse prefetch 401 again after refresh, failing batch",
                        request.run_id
                    );
                    let results: Vec<Recommendation> = request
                        .cams
                        .iter()
                        .map(|cam| Recommendation::failure(cam, ErrorCode::UpstreamError, None))
                        .collect();
                    return Ok(BatchResponse {
                        run_id: request.run_id.clone(),
                        results,
                        usage: UsageAccumulator::default(),
                    });
                }
            }
        }
    };

    let deadline = Duration::from_secs(config.batch_deadline_secs);
    let mut results = dispatch_bounded(config, &request.params, &credentials, &prefetch, &request.cams, deadline);

    let mut usage = UsageAccumulator::default();
    for rec in &results {
        if let Some(u) = rec.usage {
            usage.add(&u);
        }
    }

    let attempted = results.len();
    let succeeded = results.iter().filter(|r| r.success).count();
    log_heartbeat(&request.run_id, attempted, succeeded, attempted - succeeded, attempted);

    let failed_indices: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.success)
        .map(|(i, _)| i)
        .collect();

    if !failed_indices.is_empty() {
        eprintln!(
            "[orchestrator] batch {} retry pass: {} CAMs",
            request.run_id,
            failed_indices.len()
        );
        let retry_cams: Vec<Cam> = failed_indices
            .iter()
            .map(|&i| Cam { vehicle: request.cams[i].vehicle.clone(), size: request.cams[i].size.clone() })
            .collect();
        let retry_results =
            dispatch_bounded(config, &request.params, &credentials, &prefetch, &retry_cams, deadline);
        for rec in &retry_results {
            if let Some(u) = rec.usage {
                usage.add(&u);
            }
        }
        for (pos, &idx) in failed_indices.iter().enumerate() {
            if retry_results[pos].success {
                results[idx] = retry_results[pos].clone();
            }
        }

        let retry_succeeded = retry_results.iter().filter(|r| r.success).count();
        log_heartbeat(
            &request.run_id,
            retry_results.len(),
            retry_succeeded,
            retry_results.len() - retry_succeeded,
            retry_results.len(),
        );
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    eprintln!(
        "[orchestrator] batch {} finished: {succeeded}/{} succeeded",
        request.run_id,
        results.len()
    );

    Ok(BatchResponse { run_id: request.run_id.clone(), results, usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(workers: usize) -> Config {
        Config {
            mode: crate::config::Mode::Local,
            workers,
            batch_deadline_secs: 5,
            cam_deadline_secs: 2,
            batch_size_cap: 500,
            model_name: "tyre-rec-model".to_string(),
            model_endpoint: None,
            warehouse_endpoint: None,
            cache_dir: "./cache".to_string(),
            local_csv_path: None,
            service_password: None,
            oidc_audience: None,
            price_in_per_token: 0.0,
            price_out_per_token: 0.0,
            bind_addr: "0.0.0.0:0".to_string(),
            manifest_path: "./manifest.json".to_string(),
            benchmark_mode: false,
        }
    }

    #[test]
    fn batch_over_cap_is_rejected() {
        let config = local_config(2);
        let cams = vec![Cam { vehicle: "Golf".to_string(), size: "205/55 R16".to_string() }; MAX_BATCH_SIZE + 1];
        let request = BatchRequest { run_id: "r1".to_string(), cams, params: Default::default() };
        let err = run_batch(&config, &request).unwrap_err();
        assert_eq!(err, ErrorCode::InvalidInput);
    }

    #[test]
    fn empty_batch_returns_empty_results_preserving_order() {
        let config = local_config(3);
        let cams = vec![
            Cam { vehicle: "nan".to_string(), size: "205/55 R16".to_string() },
            Cam { vehicle: "".to_string(), size: "225/40 R18".to_string() },
        ];
        let request = BatchRequest { run_id: "r2".to_string(), cams, params: Default::default() };
        let response = run_batch(&config, &request).unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].error_code, Some(ErrorCode::InvalidInput));
        assert_eq!(response.results[1].error_code, Some(ErrorCode::InvalidInput));
    }
}
