use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "camrec")]
#[command(about = "Concurrent tyre recommendation engine", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the batch HTTP server, listening on `CAMREC_BIND_ADDR`.
    Serve,

    /// Run a single batch from a CAMs file and write the CSV artifact.
    Run {
        /// Identifier for this run, used in logs and the manifest.
        #[arg(long)]
        run_id: String,
        /// Path to a JSON file containing a list of `{"Vehicle", "Size"}` objects.
        #[arg(long)]
        cams_file: PathBuf,
        /// Path to write the CSV artifact to.
        #[arg(long)]
        artifact_path: PathBuf,
    },
}
