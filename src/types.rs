//! Shared data types for the recommendation engine and batch orchestrator.
//!
//! These mirror the wire format used by the batch endpoint so callers can
//! serialize/deserialize a `Recommendation` unchanged between the HTTP layer
//! and the worker/orchestrator internals.

use serde::{Deserialize, Serialize};

/// A single unit of work: a vehicle description paired with a tyre size.
/// Both fields are free-form strings and must be normalized (see `normalize`)
/// before being compared or used as lookup keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct Cam {
    #[serde(rename = "Vehicle")]
    pub(crate) vehicle: String,
    #[serde(rename = "Size")]
    pub(crate) size: String,
}

/// Tuning knobs accepted by a batch request. Everything is optional; missing
/// values fall back to the defaults documented on `RecommendationParams::clamp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RecommendationParams {
    #[serde(default)]
    pub(crate) goldilocks_zone_pct: Option<i64>,
    #[serde(default)]
    pub(crate) price_fluctuation_upper: Option<f64>,
    #[serde(default)]
    pub(crate) price_fluctuation_lower: Option<f64>,
    #[serde(default)]
    pub(crate) brand_enhancer: Option<String>,
    #[serde(default)]
    pub(crate) model_enhancer: Option<String>,
    #[serde(default)]
    pub(crate) season: Option<String>,
    #[serde(default)]
    pub(crate) pod: Option<String>,
    #[serde(default)]
    pub(crate) segment: Option<String>,
    #[serde(default)]
    pub(crate) disable_search: Option<bool>,
}

/// Parameters after clamping, ready to hand to the prompt builder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClampedParams {
    pub(crate) goldilocks_zone_pct: i64,
    pub(crate) price_fluctuation_upper: f64,
    pub(crate) price_fluctuation_lower: f64,
}

const DEFAULT_GOLDILOCKS: i64 = 15;
const DEFAULT_PRICE_UPPER: f64 = 1.1;
const DEFAULT_PRICE_LOWER: f64 = 0.9;

impl RecommendationParams {
    pub(crate) fn clamp(&self) -> ClampedParams {
        let goldilocks_zone_pct = self
            .goldilocks_zone_pct
            .filter(|v| (5..=50).contains(v))
            .unwrap_or(DEFAULT_GOLDILOCKS);
        let price_fluctuation_upper = self
            .price_fluctuation_upper
            .filter(|v| (1.0..=2.0).contains(v))
            .unwrap_or(DEFAULT_PRICE_UPPER);
        let price_fluctuation_lower = self
            .price_fluctuation_lower
            .filter(|v| (0.5..=1.0).contains(v))
            .unwrap_or(DEFAULT_PRICE_LOWER);
        ClampedParams {
            goldilocks_zone_pct,
            price_fluctuation_upper,
            price_fluctuation_lower,
        }
    }
}

/// One candidate product row as returned by the warehouse. Only the fields
/// used for ordering/validity are strongly typed; the remaining descriptive
/// fields are rendered into the prompt by name with safe string defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CandidateRow {
    #[serde(rename = "ProductId")]
    pub(crate) product_id: String,
    #[serde(rename = "TyreScore")]
    pub(crate) tyre_score: f64,
    #[serde(rename = "Units")]
    pub(crate) units: f64,
    #[serde(flatten)]
    pub(crate) fields: std::collections::BTreeMap<String, serde_json::Value>,
}

impl CandidateRow {
    pub(crate) fn field(&self, key: &str) -> String {
        self.fields
            .get(key)
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    }

    pub(crate) fn vehicle(&self) -> String {
        self.field("Vehicle")
    }
}

/// Machine-readable failure classification attached to an unsuccessful
/// `Recommendation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ErrorCode {
    InvalidInput,
    NoResults,
    UpstreamError,
    Timeout,
    InternalError,
    FormatError,
}

impl ErrorCode {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::NoResults => "NO_RESULTS",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FormatError => "FORMAT_ERROR",
        }
    }
}

/// Token usage for a single model call, or the sum across several.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct Usage {
    pub(crate) prompt_tokens: u64,
    pub(crate) completion_tokens: u64,
    pub(crate) total_tokens: u64,
}

impl Usage {
    pub(crate) fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The per-CAM result. Always has 4 hotboxes and 20 SKUs, regardless of
/// success, so downstream consumers never have to special-case arity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Recommendation {
    #[serde(rename = "Vehicle")]
    pub(crate) vehicle: String,
    #[serde(rename = "Size")]
    pub(crate) size: String,
    #[serde(rename = "HB1")]
    pub(crate) hb1: String,
    #[serde(rename = "HB2")]
    pub(crate) hb2: String,
    #[serde(rename = "HB3")]
    pub(crate) hb3: String,
    #[serde(rename = "HB4")]
    pub(crate) hb4: String,
    #[serde(rename = "SKUs")]
    pub(crate) skus: Vec<String>,
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) usage: Option<Usage>,
}

impl Recommendation {
    pub(crate) fn failure(cam: &Cam, code: ErrorCode, usage: Option<Usage>) -> Self {
        Self {
            vehicle: cam.vehicle.clone(),
            size: cam.size.clone(),
            hb1: "Error".to_string(),
            hb2: "Error".to_string(),
            hb3: "Error".to_string(),
            hb4: "Error".to_string(),
            skus: vec!["-".to_string(); 20],
            success: false,
            error_code: Some(code),
            usage,
        }
    }
}

/// A parsed-but-unbackfilled output: exactly 24 raw slots (4 hotbox + 20
/// sku) straight from whichever parser stage matched, no dedup applied yet.
#[derive(Debug, Clone)]
pub(crate) struct ParsedOutput {
    pub(crate) vehicle: String,
    pub(crate) size: String,
    pub(crate) slots: [String; 24],
}

/// Three monotonically non-decreasing counters summed across every model
/// call in a batch, including retries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct UsageAccumulator {
    pub(crate) prompt_token_count: u64,
    pub(crate) candidates_token_count: u64,
    pub(crate) total_token_count: u64,
}

impl UsageAccumulator {
    pub(crate) fn add(&mut self, usage: &Usage) {
        self.prompt_token_count += usage.prompt_tokens;
        self.candidates_token_count += usage.completion_tokens;
        self.total_token_count += usage.total_tokens;
    }
}

/// Request body for `POST /api/recommendations/batch`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchRequest {
    pub(crate) run_id: String,
    pub(crate) cams: Vec<Cam>,
    #[serde(default)]
    pub(crate) params: RecommendationParams,
}

/// Response body for `POST /api/recommendations/batch`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchResponse {
    pub(crate) run_id: String,
    pub(crate) results: Vec<Recommendation>,
    pub(crate) usage: UsageAccumulator,
}
