//! Error types shared across the tile retrieval pipeline.
//!
//! Each variant corresponds to one failure class. Whether a failure is fatal
//! depends on where it happens, not on its class:
//!
//! | Class       | Root tileset | Nested tileset | Leaf tile |
//! |-------------|--------------|----------------|-----------|
//! | `Transport` | fatal        | skipped        | skipped   |
//! | `Parse`     | fatal        | skipped        | skipped   |
//! | `AssetIo`   | -            | -              | skipped   |
//! | `Config`    | fatal before any work starts               |

use std::path::PathBuf;

use thiserror::Error;

use crate::glb::GlbError;

/// Result type for earthmesh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting, aligning and persisting tiles.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure reaching a tileset or asset URL.
    #[error("failed to fetch {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Malformed tileset document or undecodable mesh asset.
    #[error("failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    /// Local read/write failure or an unreadable cached asset.
    #[error("asset I/O failed for {}: {reason}", path.display())]
    AssetIo { path: PathBuf, reason: String },

    /// Invalid user-supplied configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Creates a transport error for the given URL.
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a parse error for the named document or asset.
    pub fn parse(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an asset I/O error for the given path.
    pub fn asset_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::AssetIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a codec error raised while decoding a fetched asset.
    pub fn decode(url: impl Into<String>, err: GlbError) -> Self {
        Self::parse(url, err)
    }
}
