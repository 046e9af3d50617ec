//! Run configuration.
//!
//! Settings come from two places, later ones overriding earlier ones:
//!
//! 1. `~/.earthmesh/config.ini` (or the file given with `--config`)
//! 2. command-line flags
//!
//! ```ini
//! [api]
//! key = AIza...
//!
//! [download]
//! parallel = 10
//! timeout = 30
//! traversal_concurrency = 10
//!
//! [tileset]
//! root_url = https://tile.googleapis.com/v1/3dtiles/root.json
//! ```

use std::path::{Path, PathBuf};

use glam::DVec3;
use ini::Ini;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::provider::DEFAULT_TIMEOUT_SECS;

/// Default root tileset document.
pub const DEFAULT_ROOT_URL: &str = "https://tile.googleapis.com/v1/3dtiles/root.json";

/// Default number of concurrent leaf workers.
pub const DEFAULT_PARALLEL: usize = 10;

/// Default number of nested tileset fetches in flight.
pub const DEFAULT_TRAVERSAL_CONCURRENCY: usize = 10;

/// Name of the per-user configuration directory.
const CONFIG_DIR_NAME: &str = ".earthmesh";

/// Name of the configuration file.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Values read from the configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub traversal_concurrency: Option<usize>,
    pub root_url: Option<String>,
}

impl ConfigFile {
    /// Returns `~/.earthmesh/config.ini`, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the file at `path`, or the default file when `path` is `None`.
    ///
    /// A missing default file yields empty settings; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Loads and parses one file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_ini(&ini)
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            api_key: get("api", "key"),
            parallel: parse_field(get("download", "parallel"), "download.parallel")?,
            timeout_secs: parse_field(get("download", "timeout"), "download.timeout")?,
            traversal_concurrency: parse_field(
                get("download", "traversal_concurrency"),
                "download.traversal_concurrency",
            )?,
            root_url: get("tileset", "root_url"),
        })
    }
}

fn parse_field<T: std::str::FromStr>(value: Option<String>, name: &str) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", name, v)))
        })
        .transpose()
}

/// Parses an explicit origin given as three numbers.
///
/// # Errors
///
/// Returns [`Error::Config`] on wrong arity or a non-numeric component.
pub fn parse_origin(values: &[String]) -> Result<DVec3> {
    if values.len() != 3 {
        return Err(Error::Config(format!(
            "origin needs exactly 3 components, got {}",
            values.len()
        )));
    }

    let mut components = [0.0; 3];
    for (slot, raw) in components.iter_mut().zip(values) {
        *slot = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::Config(format!("origin component '{}' is not a number", raw)))?;
    }
    Ok(DVec3::from_array(components))
}

/// Everything a run needs.
///
/// Built from required values and refined with `with_*` methods:
///
/// ```ignore
/// let config = RunConfig::new(key, 40.7128, -74.0060, 200.0, "./tiles")
///     .with_parallel(16)
///     .with_origin(Some(origin));
/// config.validate()?;
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Access credential for the tile and elevation services.
    pub api_key: String,
    /// Region center latitude in degrees.
    pub latitude: f64,
    /// Region center longitude in degrees.
    pub longitude: f64,
    /// Region radius in meters.
    pub radius: f64,
    /// Directory receiving the aligned tiles.
    pub output_dir: PathBuf,
    /// Explicit shared origin; adopted from the first tile when absent.
    pub origin: Option<DVec3>,
    /// Concurrent leaf workers.
    pub parallel: usize,
    /// Concurrent nested tileset fetches.
    pub traversal_concurrency: usize,
    /// Root tileset document.
    pub root_url: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl RunConfig {
    /// Creates a configuration with default tuning.
    pub fn new(
        api_key: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius: f64,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            latitude,
            longitude,
            radius,
            output_dir: output_dir.into(),
            origin: None,
            parallel: DEFAULT_PARALLEL,
            traversal_concurrency: DEFAULT_TRAVERSAL_CONCURRENCY,
            root_url: DEFAULT_ROOT_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Applies the file's tuning values. Values set afterwards win.
    pub fn with_file(mut self, file: &ConfigFile) -> Self {
        if let Some(parallel) = file.parallel {
            self.parallel = parallel;
        }
        if let Some(concurrency) = file.traversal_concurrency {
            self.traversal_concurrency = concurrency;
        }
        if let Some(timeout) = file.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(url) = &file.root_url {
            self.root_url = url.clone();
        }
        self
    }

    pub fn with_origin(mut self, origin: Option<DVec3>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_traversal_concurrency(mut self, concurrency: usize) -> Self {
        self.traversal_concurrency = concurrency;
        self
    }

    pub fn with_root_url(mut self, url: impl Into<String>) -> Self {
        self.root_url = url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Parses the root URL.
    pub fn root_url(&self) -> Result<Url> {
        Url::parse(&self.root_url)
            .map_err(|e| Error::Config(format!("invalid root URL '{}': {}", self.root_url, e)))
    }

    /// Checks every value before any work starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("an API key is required".into()));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::Config(format!(
                "latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::Config(format!(
                "longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(Error::Config(format!(
                "radius must be a non-negative number, got {}",
                self.radius
            )));
        }
        if self.parallel == 0 {
            return Err(Error::Config("parallel must be at least 1".into()));
        }
        if self.traversal_concurrency == 0 {
            return Err(Error::Config(
                "traversal concurrency must be at least 1".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout must be at least 1 second".into()));
        }
        if let Some(origin) = self.origin {
            if !origin.is_finite() {
                return Err(Error::Config("origin must be finite".into()));
            }
        }
        self.root_url()?;
        Ok(())
    }
}
