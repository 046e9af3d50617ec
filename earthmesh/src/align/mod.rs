//! Frame alignment from the geocentric frame to a local up-aligned frame.
//!
//! In ECEF, "up" at any point is the direction of the position vector itself.
//! Each tile is rotated so that its own up direction becomes the canonical up
//! axis `(0, 1, 0)`, and its translation is re-expressed relative to the
//! shared origin. The rotation is baked into the vertex positions and the
//! node translation; the node keeps no separate rotation afterwards.

use glam::{DQuat, DVec3};

use crate::asset::TileAsset;
use crate::glb::GlbError;

/// Canonical up axis of the aligned frame.
pub const CANONICAL_UP: DVec3 = DVec3::Y;

/// Rotation and origin-relative translation for one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Rotation taking the tile's up direction onto [`CANONICAL_UP`].
    pub rotation: DQuat,
    /// Tile position relative to the shared origin, before rotation.
    pub relative: DVec3,
}

impl Alignment {
    /// Returns the final node translation: the rotated relative position.
    pub fn translation(&self) -> DVec3 {
        self.rotation * self.relative
    }
}

/// Computes and applies tile alignments.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameAligner;

impl FrameAligner {
    /// Computes the alignment of a tile at `original` against `origin`.
    pub fn align(original: DVec3, origin: DVec3) -> Alignment {
        Alignment {
            rotation: Self::rotation_to_up(original),
            relative: original - origin,
        }
    }

    /// Returns the shortest-arc rotation taking the radial direction of
    /// `position` onto [`CANONICAL_UP`].
    ///
    /// A zero-length (or non-finite) position has no up direction and yields
    /// the identity. Exactly opposite directions rotate half a turn around a
    /// fixed axis perpendicular to both.
    pub fn rotation_to_up(position: DVec3) -> DQuat {
        let length = position.length();
        if !(length > 0.0 && length.is_finite()) {
            return DQuat::IDENTITY;
        }
        DQuat::from_rotation_arc(position / length, CANONICAL_UP)
    }

    /// Applies an alignment to a tile, returning the aligned tile.
    ///
    /// The representative node gets translation `rotation · relative` and an
    /// identity rotation; every `POSITION` vertex of its mesh is rotated (not
    /// translated). The input asset is left untouched. A tile without a
    /// translated node is returned unchanged.
    pub fn apply(asset: &TileAsset, alignment: &Alignment) -> Result<TileAsset, GlbError> {
        let Some(node) = asset.representative_node() else {
            return Ok(asset.clone());
        };

        let mut document = asset.document().clone();

        if let Some(mesh) = document.node_mesh(node) {
            document.transform_mesh_positions(mesh, |p| {
                let v = alignment.rotation * DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64);
                [v.x as f32, v.y as f32, v.z as f32]
            })?;
        }

        document.set_node_translation(node, alignment.translation())?;
        document.set_node_rotation(node, DQuat::IDENTITY)?;

        Ok(asset.derive(document))
    }
}
