//! Process configuration loaded once from the environment knobs listed in
//! `SPEC_FULL.md` §B. Mirrors `aim-job/config.py`'s `AimConfig` dataclass,
//! minus the GCS/BigQuery fields that belong to the out-of-scope Runlist
//! Source and Artifact Sink collaborators.

use crate::util::{env_bool, env_f64, env_optional, env_required, env_u64, env_usize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Local,
    Cloud,
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) mode: Mode,
    pub(crate) workers: usize,
    pub(crate) batch_deadline_secs: u64,
    pub(crate) cam_deadline_secs: u64,
    pub(crate) batch_size_cap: usize,
    pub(crate) model_name: String,
    pub(crate) model_endpoint: Option<String>,
    pub(crate) warehouse_endpoint: Option<String>,
    pub(crate) cache_dir: String,
    pub(crate) local_csv_path: Option<String>,
    pub(crate) service_password: Option<String>,
    pub(crate) oidc_audience: Option<String>,
    pub(crate) price_in_per_token: f64,
    pub(crate) price_out_per_token: f64,
    pub(crate) bind_addr: String,
    pub(crate) manifest_path: String,
    pub(crate) benchmark_mode: bool,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mode = match env_optional("CAMREC_MODE").as_deref() {
            Some("cloud") => Mode::Cloud,
            _ => Mode::Local,
        };

        let config = Config {
            mode,
            workers: env_usize("CAMREC_WORKERS", 10)?,
            batch_deadline_secs: env_u64("CAMREC_BATCH_DEADLINE_SECS", 120)?,
            cam_deadline_secs: env_u64("CAMREC_CAM_DEADLINE_SECS", 30)?,
            batch_size_cap: env_usize("CAMREC_BATCH_SIZE", 500)?,
            model_name: env_optional("CAMREC_MODEL_NAME")
                .unwrap_or_else(|| "tyre-rec-model".to_string()),
            model_endpoint: env_optional("CAMREC_MODEL_ENDPOINT"),
            warehouse_endpoint: env_optional("CAMREC_WAREHOUSE_ENDPOINT"),
            cache_dir: env_optional("CAMREC_CACHE_DIR").unwrap_or_else(|| "./cache".to_string()),
            local_csv_path: env_optional("CAMREC_LOCAL_CSV_PATH"),
            service_password: env_optional("CAMREC_SERVICE_PASSWORD"),
            oidc_audience: env_optional("CAMREC_OIDC_AUDIENCE"),
            price_in_per_token: env_f64("CAMREC_PRICE_IN_PER_TOKEN", 0.0)?,
            price_out_per_token: env_f64("CAMREC_PRICE_OUT_PER_TOKEN", 0.0)?,
            bind_addr: env_optional("CAMREC_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            manifest_path: env_optional("CAMREC_MANIFEST_PATH")
                .unwrap_or_else(|| "./manifest.json".to_string()),
            benchmark_mode: env_bool("CAMREC_BENCHMARK_MODE", false),
        };

        if config.mode == Mode::Cloud {
            env_required("CAMREC_MODEL_ENDPOINT")?;
            env_required("CAMREC_WAREHOUSE_ENDPOINT")?;
        }

        Ok(config)
    }
}
