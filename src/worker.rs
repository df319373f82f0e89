//! C7 Per-CAM Worker: orchestrates candidate fetch, prompt construction,
//! model call, parsing, and backfill for one CAM, with one internal retry
//! on format failure. Exception-to-code translation happens here and only
//! here, per `spec.md` §9's design note.

use crate::auth::Credentials;
use crate::backfill::backfill;
use crate::candidate_store;
use crate::config::Config;
use crate::model_client::{benchmark_params, call_model, ModelRequest};
use crate::normalize::norm_vehicle;
use crate::output_parser::parse_output;
use crate::prompt::build_prompt;
use crate::types::{Cam, CandidateRow, ErrorCode, Recommendation, RecommendationParams, Usage};

/// Everything a single worker invocation needs besides the CAM itself:
/// tuning knobs, the batch's credentials (for the model/warehouse calls this
/// worker makes on its own, outside the bulk prefetch), and, optionally, a
/// batch-wide prefetch filtered at the call site (filtered by vehicle,
/// falling back to the unfiltered per-size list — the same fallback shape
/// `spec.md` §4.7 requires).
pub(crate) struct WorkerContext<'a> {
    pub(crate) config: &'a Config,
    pub(crate) params: &'a RecommendationParams,
    pub(crate) credentials: &'a Credentials,
    pub(crate) prefetched: Option<&'a [CandidateRow]>,
}

fn is_invalid_field(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
}

fn resolve_candidates(ctx: &WorkerContext, cam: &Cam) -> Vec<CandidateRow> {
    if let Some(rows) = ctx.prefetched {
        let n_veh = norm_vehicle(&cam.vehicle);
        if !n_veh.is_empty() {
            let filtered: Vec<CandidateRow> = rows
                .iter()
                .filter(|r| norm_vehicle(&r.vehicle()) == n_veh)
                .cloned()
                .collect();
            if !filtered.is_empty() {
                return filtered;
            }
        }
        if !rows.is_empty() {
            return rows.to_vec();
        }
    }
    candidate_store::fetch(
        std::path::Path::new(&ctx.config.cache_dir),
        ctx.config.warehouse_endpoint.as_deref(),
        ctx.config.local_csv_path.as_deref().map(std::path::Path::new),
        &cam.size,
        Some(&cam.vehicle),
        ctx.credentials.session_cookie.as_deref(),
    )
}

/// Runs one full C3->C4->C5->C6 attempt. Returns the backfilled result and
/// the usage spent on this attempt alone (the caller sums across retries).
fn attempt(
    ctx: &WorkerContext,
    cam: &Cam,
    candidates: &[CandidateRow],
) -> (bool, [String; 4], [String; 20], Usage, Option<ErrorCode>) {
    let clamped = ctx.params.clamp();
    let prompt = build_prompt(
        &cam.vehicle,
        &cam.size,
        candidates,
        clamped,
        ctx.params.brand_enhancer.as_deref(),
        ctx.params.model_enhancer.as_deref(),
        ctx.params.season.as_deref(),
    );

    let endpoint = match ctx.config.model_endpoint.as_deref() {
        Some(e) => e,
        None => {
            eprintln!("[worker] no model endpoint configured");
            return (
                false,
                ["Error".to_string(), "Error".to_string(), "Error".to_string(), "Error".to_string()],
                std::array::from_fn(|_| "-".to_string()),
                Usage::default(),
                Some(ErrorCode::InternalError),
            );
        }
    };

    let (temperature, top_p) = benchmark_params(ctx.config.benchmark_mode, 0.5, 0.95);
    let request = ModelRequest {
        prompt: &prompt,
        model_name: &ctx.config.model_name,
        temperature,
        top_p,
    };
    let model_response = call_model(endpoint, &request, ctx.credentials.oidc_token.as_deref());

    if let Some(error_type) = model_response.error_type {
        let code = classify_model_error(error_type);
        return (
            false,
            ["Error".to_string(), "Error".to_string(), "Error".to_string(), "Error".to_string()],
            std::array::from_fn(|_| "-".to_string()),
            model_response.usage,
            Some(code),
        );
    }

    let parsed = match parse_output(&model_response.text, &cam.vehicle, &cam.size) {
        Ok(parsed) => parsed,
        Err(_) => {
            return (
                false,
                ["Error".to_string(), "Error".to_string(), "Error".to_string(), "Error".to_string()],
                std::array::from_fn(|_| "-".to_string()),
                model_response.usage,
                Some(ErrorCode::FormatError),
            );
        }
    };

    let backfilled = backfill(&parsed, candidates);
    let code = if backfilled.success { None } else { Some(ErrorCode::UpstreamError) };
    (backfilled.success, backfilled.hb, backfilled.skus, model_response.usage, code)
}

fn classify_model_error(error_type: &str) -> ErrorCode {
    let upper = error_type.to_ascii_uppercase();
    if upper.contains("TIMEOUT") {
        ErrorCode::Timeout
    } else if upper.contains("API") {
        ErrorCode::UpstreamError
    } else {
        ErrorCode::InternalError
    }
}

/// Runs the full per-CAM pipeline: input validation, candidate resolution,
/// then up to two C3->C4->C5->C6 attempts (the second only if the first
/// did not succeed), summing usage across both. Panics inside this
/// function are caught by the caller (the orchestrator's worker pool) and
/// converted to an `INTERNAL_ERROR` Recommendation rather than lost.
pub(crate) fn process_cam(ctx: &WorkerContext, cam: &Cam) -> Recommendation {
    if is_invalid_field(&cam.vehicle) || is_invalid_field(&cam.size) {
        return Recommendation::failure(cam, ErrorCode::InvalidInput, None);
    }

    let candidates = resolve_candidates(ctx, cam);
    if candidates.is_empty() {
        return Recommendation::failure(cam, ErrorCode::NoResults, None);
    }

    let (mut success, mut hb, mut skus, mut usage, mut error_code) = attempt(ctx, cam, &candidates);

    if !success {
        eprintln!("[worker] attempt 1 failed for {}/{}, retrying", cam.vehicle, cam.size);
        let (success2, hb2, skus2, usage2, error_code2) = attempt(ctx, cam, &candidates);
        usage.add(&usage2);
        success = success2;
        hb = hb2;
        skus = skus2;
        error_code = error_code2;
    }

    Recommendation {
        vehicle: cam.vehicle.clone(),
        size: cam.size.clone(),
        hb1: hb[0].clone(),
        hb2: hb[1].clone(),
        hb3: hb[2].clone(),
        hb4: hb[3].clone(),
        skus: skus.to_vec(),
        success,
        error_code: if success { None } else { error_code.or(Some(ErrorCode::UpstreamError)) },
        usage: Some(usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_rejected_without_touching_candidates() {
        let config = crate::config::Config {
            mode: crate::config::Mode::Local,
            workers: 1,
            batch_deadline_secs: 1,
            cam_deadline_secs: 1,
            batch_size_cap: 1,
            model_name: "m".to_string(),
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
        };
        let params = RecommendationParams::default();
        let credentials = crate::auth::Credentials::default();
        let ctx = WorkerContext { config: &config, params: &params, credentials: &credentials, prefetched: Some(&[]) };
        let cam = Cam { vehicle: "nan".to_string(), size: "205/55 R16".to_string() };
        let rec = process_cam(&ctx, &cam);
        assert!(!rec.success);
        assert_eq!(rec.error_code, Some(ErrorCode::InvalidInput));
    }

    #[test]
    fn empty_candidates_yield_no_results() {
        let config = crate::config::Config {
            mode: crate::config::Mode::Local,
            workers: 1,
            batch_deadline_secs: 1,
            cam_deadline_secs: 1,
            batch_size_cap: 1,
            model_name: "m".to_string(),
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
        };
        let params = RecommendationParams::default();
        let credentials = crate::auth::Credentials::default();
        let ctx = WorkerContext { config: &config, params: &params, credentials: &credentials, prefetched: Some(&[]) };
        let cam = Cam { vehicle: "Golf".to_string(), size: "205/55 R16".to_string() };
        let rec = process_cam(&ctx, &cam);
        assert!(!rec.success);
        assert_eq!(rec.error_code, Some(ErrorCode::NoResults));
        assert_eq!(rec.skus.len(), 20);
    }

    #[test]
    fn classify_model_error_prioritizes_timeout_then_api() {
        assert_eq!(classify_model_error("TIMEOUT waiting"), ErrorCode::Timeout);
        assert_eq!(classify_model_error("APIError"), ErrorCode::UpstreamError);
        assert_eq!(classify_model_error("StreamError"), ErrorCode::InternalError);
    }
}
