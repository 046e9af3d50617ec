//! Contract log written to stdout for the orchestrating host.
//!
//! The host parses these lines, so their format is fixed:
//!
//! ```text
//! ORIGIN_TRANSLATION [1334000.5,-4654044.8,4138300]
//! ASSET_COPYRIGHT 3f78...001b.glb Data SIO, NOAA
//! TILE_TRANSLATION 3f78...001b.glb [0,0,0]
//! DOWNLOADED_TILES: ["3f78...001b.glb"]
//! ```
//!
//! Numbers are printed like a JSON emitter prints doubles: integral values
//! have no fractional part, other values use the shortest representation
//! that round-trips.
//!
//! Diagnostics never go to this stream; they are logged through `tracing`
//! to stderr.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use glam::DVec3;
use parking_lot::Mutex;
use tracing::error;

const ORIGIN_TAG: &str = "ORIGIN_TRANSLATION";
const COPYRIGHT_TAG: &str = "ASSET_COPYRIGHT";
const TRANSLATION_TAG: &str = "TILE_TRANSLATION";
const DOWNLOADED_TAG: &str = "DOWNLOADED_TILES:";

/// Formats a double the way `JSON.stringify` does.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "null".to_string();
    }
    if value == 0.0 {
        // Covers -0.0 as well
        return "0".to_string();
    }

    let magnitude = value.abs();
    if magnitude >= 1e21 {
        // Exponent form with explicit sign: 1e+21
        format!("{:e}", value).replacen('e', "e+", 1)
    } else if magnitude < 1e-6 {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

/// Formats a vector as a compact JSON array.
pub fn format_vec3(v: DVec3) -> String {
    format!(
        "[{},{},{}]",
        format_number(v.x),
        format_number(v.y),
        format_number(v.z)
    )
}

/// One line of the contract log.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractLine {
    /// The shared origin was established.
    Origin(DVec3),
    /// Copyright of a processed tile (may be empty).
    Copyright { file: String, copyright: String },
    /// Final translation of a processed tile.
    TileTranslation { file: String, translation: DVec3 },
    /// Every file written or reused by the run.
    Downloaded(Vec<String>),
}

impl ContractLine {
    /// Parses a contract line. Returns `None` for any other output.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(rest) = line.strip_prefix(DOWNLOADED_TAG) {
            let files: Vec<String> = serde_json::from_str(rest.trim()).ok()?;
            return Some(Self::Downloaded(files));
        }
        if let Some(rest) = line.strip_prefix(ORIGIN_TAG) {
            return parse_vec3(rest).map(Self::Origin);
        }
        if let Some(rest) = line.strip_prefix(TRANSLATION_TAG) {
            let (file, coords) = rest.trim_start().split_once(' ')?;
            let translation = parse_vec3(coords)?;
            return Some(Self::TileTranslation {
                file: file.to_string(),
                translation,
            });
        }
        if let Some(rest) = line.strip_prefix(COPYRIGHT_TAG) {
            let rest = rest.strip_prefix(' ')?;
            let (file, copyright) = rest.split_once(' ').unwrap_or((rest, ""));
            if file.is_empty() {
                return None;
            }
            return Some(Self::Copyright {
                file: file.to_string(),
                copyright: copyright.to_string(),
            });
        }
        None
    }
}

fn parse_vec3(s: &str) -> Option<DVec3> {
    let [x, y, z]: [f64; 3] = serde_json::from_str(s.trim()).ok()?;
    Some(DVec3::new(x, y, z))
}

impl fmt::Display for ContractLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Origin(v) => write!(f, "{} {}", ORIGIN_TAG, format_vec3(*v)),
            Self::Copyright { file, copyright } => {
                write!(f, "{} {} {}", COPYRIGHT_TAG, file, copyright)
            }
            Self::TileTranslation { file, translation } => {
                write!(f, "{} {} {}", TRANSLATION_TAG, file, format_vec3(*translation))
            }
            Self::Downloaded(files) => {
                let json = serde_json::to_string(files).map_err(|_| fmt::Error)?;
                write!(f, "{} {}", DOWNLOADED_TAG, json)
            }
        }
    }
}

/// Writer for the contract log.
///
/// Cloneable and safe to share between workers; each line is written and
/// flushed under one lock so lines never interleave.
#[derive(Clone)]
pub struct ReportWriter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ReportWriter {
    /// Creates a writer over an arbitrary sink.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Creates a writer on standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Creates a writer over an in-memory buffer, returning both.
    pub fn buffer() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    /// Writes one contract line.
    pub fn emit(&self, line: &ContractLine) {
        let mut sink = self.sink.lock();
        if let Err(e) = writeln!(sink, "{}", line).and_then(|_| sink.flush()) {
            error!(error = %e, "Failed to write contract line");
        }
    }

    /// Announces the established origin.
    pub fn origin(&self, origin: DVec3) {
        self.emit(&ContractLine::Origin(origin));
    }

    /// Reports a tile's copyright.
    pub fn copyright(&self, file: &str, copyright: &str) {
        self.emit(&ContractLine::Copyright {
            file: file.to_string(),
            copyright: copyright.to_string(),
        });
    }

    /// Reports a tile's final translation.
    pub fn tile_translation(&self, file: &str, translation: DVec3) {
        self.emit(&ContractLine::TileTranslation {
            file: file.to_string(),
            translation,
        });
    }

    /// Writes the final list of files.
    pub fn downloaded(&self, files: &[String]) {
        self.emit(&ContractLine::Downloaded(files.to_vec()));
    }
}

impl fmt::Debug for ReportWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportWriter").finish_non_exhaustive()
    }
}

/// In-memory sink shared between a [`ReportWriter`] and its reader.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Returns everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Contract log as seen by the consuming host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Announced origin, if any.
    pub origin: Option<DVec3>,
    /// Final translation per file.
    pub translations: BTreeMap<String, DVec3>,
    /// Copyright per file.
    pub copyrights: BTreeMap<String, String>,
    /// Final file list, in emitted order.
    pub downloaded: Vec<String>,
}

impl RunReport {
    /// Collects every contract line of `output`, ignoring other lines.
    pub fn parse(output: &str) -> Self {
        let mut report = Self::default();
        for line in output.lines().filter_map(ContractLine::parse) {
            report.push(line);
        }
        report
    }

    /// Applies one contract line.
    pub fn push(&mut self, line: ContractLine) {
        match line {
            ContractLine::Origin(v) => self.origin = Some(v),
            ContractLine::Copyright { file, copyright } => {
                self.copyrights.insert(file, copyright);
            }
            ContractLine::TileTranslation { file, translation } => {
                self.translations.insert(file, translation);
            }
            ContractLine::Downloaded(files) => self.downloaded = files,
        }
    }
}
