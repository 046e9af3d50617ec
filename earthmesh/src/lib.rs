//! earthmesh - 3D tile retrieval and local frame alignment
//!
//! Collects the mesh tiles of a remote tileset that intersect a spherical
//! region, rotates each tile out of the geocentric frame into a shared
//! up-aligned local frame, and stores the results under content-derived
//! file names so repeated runs reuse what is already on disk.
//!
//! # Modules
//!
//! - [`geo`], [`culling`]: coordinates and region culling
//! - [`tileset`]: tileset documents, URLs and traversal
//! - [`glb`], [`asset`], [`align`]: mesh documents and their realignment
//! - [`origin`], [`cache`], [`pipeline`]: per-tile processing
//! - [`app`]: a whole run, from configuration to contract log

pub mod align;
pub mod app;
pub mod asset;
pub mod cache;
pub mod config;
pub mod culling;
pub mod elevation;
pub mod error;
pub mod geo;
pub mod glb;
pub mod logging;
pub mod origin;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod tileset;

pub use app::{EarthMesh, RunSummary};
pub use error::{Error, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
