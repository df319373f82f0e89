// Module declarations
mod artifact;
mod auth;
mod backfill;
mod candidate_store;
mod cli;
mod config;
mod model_client;
mod normalize;
mod orchestrator;
mod output_parser;
mod prompt;
mod server;
mod types;
mod usage;
mod util;
mod worker;

// Re-export all module items at crate root so cross-module references work,
// matching the single-namespace layout every module in this crate expects.
#[allow(unused_imports)]
pub(crate) use artifact::*;
#[allow(unused_imports)]
pub(crate) use auth::*;
#[allow(unused_imports)]
pub(crate) use backfill::*;
#[allow(unused_imports)]
pub(crate) use candidate_store::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use model_client::*;
#[allow(unused_imports)]
pub(crate) use normalize::*;
#[allow(unused_imports)]
pub(crate) use orchestrator::*;
#[allow(unused_imports)]
pub(crate) use output_parser::*;
#[allow(unused_imports)]
pub(crate) use prompt::*;
#[allow(unused_imports)]
pub(crate) use server::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use usage::*;
#[allow(unused_imports)]
pub(crate) use util::*;
#[allow(unused_imports)]
pub(crate) use worker::*;

use clap::Parser;

/// Loads the `camrec run` CAMs file: a JSON array of `{"Vehicle", "Size"}`
/// objects. Drops any entry whose Vehicle or Size, after trimming, is empty
/// or case-insensitively `"nan"`/`"none"` — the same row-validity filter
/// the original priority runlist loader applies.
fn load_cams_file(path: &std::path::Path) -> Result<Vec<Cam>, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let raw: Vec<Cam> = serde_json::from_str(&contents)?;
    let total = raw.len();
    let filtered: Vec<Cam> = raw
        .into_iter()
        .filter(|cam| {
            let v = cam.vehicle.trim();
            let s = cam.size.trim();
            !v.is_empty()
                && !s.is_empty()
                && !v.eq_ignore_ascii_case("nan")
                && !v.eq_ignore_ascii_case("none")
                && !s.eq_ignore_ascii_case("nan")
                && !s.eq_ignore_ascii_case("none")
        })
        .collect();
    let dropped = total - filtered.len();
    if dropped > 0 {
        eprintln!("[camrec] dropped {dropped} invalid row(s) from {}", path.display());
    }
    Ok(filtered)
}

fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve => {
            server::run_server(&config)?;
        }
        Command::Run { run_id, cams_file, artifact_path } => {
            let cams = load_cams_file(&cams_file)?;
            eprintln!("[camrec] loaded {} CAM(s) from {}", cams.len(), cams_file.display());
            let request = BatchRequest { run_id, cams, params: RecommendationParams::default() };
            let response = orchestrator::run_batch(&config, &request)
                .map_err(|code| -> Box<dyn std::error::Error> { code.as_str().into() })?;
            usage::write_manifest(&config, &response.run_id, &response.results, &response.usage);
            artifact::write_artifact(&artifact_path, &response.results)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("[camrec] fatal: {err}");
        std::process::exit(1);
    }
}
