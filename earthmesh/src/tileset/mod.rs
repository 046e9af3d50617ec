//! Tileset documents and their traversal.
//!
//! A tileset is a tree of nodes, each with an optional bounding box, ordered
//! children and an optional content reference. Content may point at a mesh
//! asset (a leaf) or at another tileset document whose root continues the
//! tree. [`TileTreeWalker`] descends the whole structure, culling against
//! the region of interest, and returns the mesh URLs to download.

mod query;
mod types;
mod walker;

pub use query::{
    authorize, is_mesh_url, query_value, redacted, SessionToken, TileIdentity, KEY_PARAM,
    SESSION_PARAM,
};
pub use types::{BoundingVolume, TileContent, TileNode, TilesetDocument};
pub use walker::{TileTreeWalker, Traversal, TraversalStats};
