//! Shared alignment origin.
//!
//! Every tile of a run is expressed relative to one origin. The origin is
//! either supplied explicitly before any work starts or adopted from the
//! first tile that has a position. Either way it is written exactly once:
//!
//! ```text
//! unset ──set_if_unset(v)──► set(v) ──set_if_unset(w)──► set(v)   (w ignored)
//! ```
//!
//! Readers after the transition always observe the same complete value.

use std::sync::OnceLock;

use glam::DVec3;

/// Outcome of offering a value to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adoption {
    /// The canonical origin after the call.
    pub value: DVec3,
    /// True if this call established the origin.
    pub newly_set: bool,
}

/// Owner of the write-once shared origin.
///
/// Shared between workers by reference (typically inside an `Arc`).
#[derive(Debug, Default)]
pub struct OriginCoordinator {
    cell: OnceLock<DVec3>,
}

impl OriginCoordinator {
    /// Creates a coordinator with no origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a coordinator whose origin is already fixed.
    pub fn with_origin(origin: DVec3) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(origin);
        Self { cell }
    }

    /// Returns true once the origin has been established.
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the origin, or `None` while it is unset.
    pub fn get(&self) -> Option<DVec3> {
        self.cell.get().copied()
    }

    /// Stores `value` if no origin exists yet and returns the canonical origin.
    ///
    /// First writer wins; later values are discarded.
    pub fn set_if_unset(&self, value: DVec3) -> DVec3 {
        self.adopt(value).value
    }

    /// Like [`set_if_unset`](Self::set_if_unset), but also reports whether
    /// this call was the one that established the origin.
    pub fn adopt(&self, value: DVec3) -> Adoption {
        let mut newly_set = false;
        let stored = *self.cell.get_or_init(|| {
            newly_set = true;
            value
        });
        Adoption {
            value: stored,
            newly_set,
        }
    }
}
