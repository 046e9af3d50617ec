//! Tileset document model.
//!
//! Only the fields the traversal needs are modelled; everything else in the
//! document (geometric error, refinement mode, transforms, asset metadata) is
//! ignored during deserialization.

use serde::Deserialize;

use crate::culling::OrientedBox;
use crate::error::{Error, Result};

/// A fetched tileset document.
#[derive(Debug, Clone, Deserialize)]
pub struct TilesetDocument {
    /// Root node. Optional here so a missing root is reported as a parse
    /// error with context instead of a generic serde message.
    pub root: Option<TileNode>,
}

impl TilesetDocument {
    /// Parses a tileset document and returns its root node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the body is not valid JSON or has no `root`.
    pub fn parse_root(body: &[u8], source_name: &str) -> Result<TileNode> {
        let doc: TilesetDocument =
            serde_json::from_slice(body).map_err(|e| Error::parse(source_name, e))?;
        doc.root
            .ok_or_else(|| Error::parse(source_name, "document has no root node"))
    }
}

/// A node of the tileset hierarchy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileNode {
    #[serde(default)]
    pub bounding_volume: Option<BoundingVolume>,

    #[serde(default)]
    pub children: Vec<TileNode>,

    #[serde(default)]
    pub content: Option<TileContent>,
}

impl TileNode {
    /// Returns the node's oriented box, if it declares one.
    pub fn oriented_box(&self) -> Option<OrientedBox> {
        self.bounding_volume
            .as_ref()
            .and_then(|bv| bv.bbox.as_ref())
            .map(OrientedBox::from_array)
    }

    /// Returns the content URI, if any.
    pub fn content_uri(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.uri.as_deref())
    }

    /// Returns true if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Bounding volume of a node. Only the oriented box form is used for culling;
/// nodes with `sphere` or `region` volumes are treated as unbounded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoundingVolume {
    #[serde(rename = "box", default)]
    pub bbox: Option<[f64; 12]>,
}

/// Content reference of a node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TileContent {
    /// Relative or absolute URI. Pre-1.0 tilesets use `url`.
    #[serde(default, alias = "url")]
    pub uri: Option<String>,
}
