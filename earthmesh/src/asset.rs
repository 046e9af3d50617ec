//! Tile asset: a decoded mesh document plus its original absolute position.
//!
//! The original position is the tile's translation before any realignment.
//! It is captured once, when the tile is first fetched, stored in the
//! document's root extras, and never changed afterwards: a cached tile that
//! is processed again recovers the same value instead of re-deriving it from
//! an already-aligned node.

use glam::DVec3;
use tracing::warn;

use crate::glb::GlbDocument;

/// Root extras key holding the original position.
pub const ORIGINAL_TRANSLATION_KEY: &str = "originalTranslation";

/// Where a tile asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    /// Downloaded during this run.
    Fetched,
    /// Loaded from the local output directory.
    Cached,
}

/// A tile's mesh document together with its write-once original position.
#[derive(Debug, Clone)]
pub struct TileAsset {
    document: GlbDocument,
    original_position: Option<DVec3>,
    source: AssetSource,
}

impl TileAsset {
    /// Wraps a freshly downloaded document.
    ///
    /// The translation of the first translated node becomes the original
    /// position and is recorded in the document's extras.
    pub fn from_fetched(mut document: GlbDocument) -> Self {
        let original_position = document
            .translated_nodes()
            .first()
            .and_then(|&node| document.node_translation(node));

        if let Some(position) = original_position {
            document.set_extras_vec3(ORIGINAL_TRANSLATION_KEY, position);
        }

        Self {
            document,
            original_position,
            source: AssetSource::Fetched,
        }
    }

    /// Wraps a document loaded from the cache with its recovered position.
    pub fn from_cached(document: GlbDocument, original_position: Option<DVec3>) -> Self {
        Self {
            document,
            original_position,
            source: AssetSource::Cached,
        }
    }

    /// Returns a new asset holding `document` with this asset's original
    /// position and source.
    pub fn derive(&self, document: GlbDocument) -> Self {
        Self {
            document,
            original_position: self.original_position,
            source: self.source,
        }
    }

    /// Returns the decoded document.
    pub fn document(&self) -> &GlbDocument {
        &self.document
    }

    /// Returns the tile's original absolute position, if it has one.
    pub fn original_position(&self) -> Option<DVec3> {
        self.original_position
    }

    /// Returns where this asset came from.
    pub fn source(&self) -> AssetSource {
        self.source
    }

    /// Returns the asset copyright string, empty if undeclared.
    pub fn copyright(&self) -> &str {
        self.document.copyright().unwrap_or("")
    }

    /// Returns the node that represents the whole tile during alignment.
    ///
    /// This is the first node carrying a translation. Tiles with several
    /// translated nodes are not generalized: only the first one is realigned
    /// and the others are left as they are, with a warning.
    pub fn representative_node(&self) -> Option<usize> {
        let nodes = self.document.translated_nodes();
        if nodes.len() > 1 {
            warn!(
                translated_nodes = nodes.len(),
                "Tile has more than one translated node; only the first is realigned"
            );
        }
        nodes.first().copied()
    }
}
