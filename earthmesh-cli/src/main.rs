//! earthmesh CLI - Command-line interface
//!
//! Parses arguments, sets up logging, and runs one retrieval on a
//! multi-threaded Tokio runtime. Exit status is 0 on success (even when
//! individual tiles failed) and 1 on a fatal error.

mod args;
mod error;

use std::process::ExitCode;

use clap::Parser;
use earthmesh::config::ConfigFile;
use earthmesh::{logging, EarthMesh};

use crate::args::Cli;
use crate::error::CliError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init(&cli.log_config()) {
        Ok(guard) => guard,
        Err(e) => {
            let err = CliError::Logging(e.to_string());
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            e.exit_code()
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let file = ConfigFile::load(cli.config.as_deref())?;
    let config = cli.resolve(&file)?;

    tracing::info!(
        version = earthmesh::VERSION,
        out = %config.output_dir.display(),
        parallel = config.parallel,
        explicit_origin = config.origin.is_some(),
        "Starting earthmesh"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let app = EarthMesh::from_config(&config)?;
    let summary = runtime.block_on(app.run(&config))?;

    tracing::info!(
        files = summary.files.len(),
        fetched = summary.pipeline.fetched,
        reused = summary.pipeline.reused,
        failed = summary.pipeline.failed,
        "Done"
    );
    Ok(())
}
