//! Command-line arguments and their resolution against the config file.

use std::path::PathBuf;

use clap::Parser;
use earthmesh::config::{parse_origin, ConfigFile, RunConfig};
use earthmesh::logging::LogConfig;

use crate::error::CliError;

/// Download the 3D mesh tiles around a point and realign them into a shared
/// local frame.
///
/// Contract lines (ORIGIN_TRANSLATION, ASSET_COPYRIGHT, TILE_TRANSLATION,
/// DOWNLOADED_TILES) are written to stdout; diagnostics go to stderr.
#[derive(Debug, Parser)]
#[command(name = "earthmesh", version, about)]
pub struct Cli {
    /// API key for the tile and elevation services (or [api] key in config.ini)
    #[arg(long)]
    pub key: Option<String>,

    /// Region center latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Region center longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lng: f64,

    /// Region radius in meters
    #[arg(long)]
    pub radius: f64,

    /// Output directory for aligned tiles
    #[arg(long)]
    pub out: PathBuf,

    /// Concurrent tile downloads
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Explicit shared origin as three numbers: x y z
    #[arg(long, num_args = 1.., value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    pub origin: Option<Vec<String>>,

    /// Root tileset URL
    #[arg(long)]
    pub root_url: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Configuration file (default: ~/.earthmesh/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging options from the flags.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            verbose: self.verbose,
            log_file: self.log_file.clone(),
        }
    }

    /// Builds the run configuration. CLI values take precedence over the
    /// config file.
    pub fn resolve(&self, file: &ConfigFile) -> Result<RunConfig, CliError> {
        let api_key = self
            .key
            .clone()
            .or_else(|| file.api_key.clone())
            .ok_or_else(|| {
                CliError::Config(
                    "an API key is required. Use --key or set [api] key in config.ini".to_string(),
                )
            })?;

        let origin = self.origin.as_deref().map(parse_origin).transpose()?;

        let mut config = RunConfig::new(api_key, self.lat, self.lng, self.radius, &self.out)
            .with_file(file)
            .with_origin(origin);

        if let Some(parallel) = self.parallel {
            config = config.with_parallel(parallel);
        }
        if let Some(url) = &self.root_url {
            config = config.with_root_url(url.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout_secs(timeout);
        }

        config.validate()?;
        Ok(config)
    }
}
