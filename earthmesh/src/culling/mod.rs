//! Spatial culling against the region of interest.
//!
//! Tileset nodes carry oriented bounding boxes. Rather than intersecting boxes
//! exactly, each box is widened into an enclosing sphere and tested with a
//! sphere-sphere check. The sphere is deliberately loose: culling may keep a
//! node that does not really touch the region, but it must never drop one
//! that does.

use glam::DVec3;

use crate::geo::ecef_from_degrees;

/// A sphere in ECEF space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center.
    pub center: DVec3,
    /// Sphere radius in meters.
    pub radius: f64,
}

impl BoundingSphere {
    /// Creates a sphere from a center and radius.
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Returns true if the two spheres overlap.
    ///
    /// Spheres that merely touch (distance equal to the sum of radii) do not
    /// intersect.
    #[inline]
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        self.center.distance(other.center) < self.radius + other.radius
    }

    /// Returns true if the point lies inside or on the sphere, within `eps`.
    pub fn contains_point(&self, point: DVec3, eps: f64) -> bool {
        self.center.distance(point) <= self.radius + eps
    }
}

/// The spherical region of interest for one run. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionQuery {
    /// Region center in ECEF.
    pub center: DVec3,
    /// Region radius in meters.
    pub radius: f64,
}

impl RegionQuery {
    /// Builds a region around a geographic point.
    pub fn from_degrees(lon_deg: f64, lat_deg: f64, height: f64, radius: f64) -> Self {
        Self {
            center: ecef_from_degrees(lon_deg, lat_deg, height),
            radius,
        }
    }

    /// Returns the region as a sphere.
    pub fn sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center, self.radius)
    }
}

/// Oriented bounding box: a center and three half-axis vectors.
///
/// The half-axes need not be orthogonal or of equal length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: DVec3,
    pub half_axes: [DVec3; 3],
}

impl OrientedBox {
    /// Builds a box from the 12-float tileset layout
    /// `[cx, cy, cz, xx, xy, xz, yx, yy, yz, zx, zy, zz]`: center, then three half-axis vectors.
    pub fn from_array(values: &[f64; 12]) -> Self {
        Self {
            center: DVec3::new(values[0], values[1], values[2]),
            half_axes: [
                DVec3::new(values[3], values[4], values[5]),
                DVec3::new(values[6], values[7], values[8]),
                DVec3::new(values[9], values[10], values[11]),
            ],
        }
    }

    /// Returns the eight corners of the box.
    pub fn corners(&self) -> [DVec3; 8] {
        let [a, b, c] = self.half_axes;
        std::array::from_fn(|i| {
            let s1 = if i & 1 != 0 { 1.0 } else { -1.0 };
            let s2 = if i & 2 != 0 { 1.0 } else { -1.0 };
            let s3 = if i & 4 != 0 { 1.0 } else { -1.0 };
            self.center + a * s1 + b * s2 + c * s3
        })
    }

    /// Derives a conservative enclosing sphere.
    ///
    /// Takes the axis-aligned range of the corners and returns the sphere
    /// around that range: centered at its midpoint, radius half its diagonal.
    pub fn to_sphere(&self) -> BoundingSphere {
        let corners = self.corners();
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), c| {
                (min.min(*c), max.max(*c))
            });

        BoundingSphere {
            center: (min + max) * 0.5,
            radius: 0.5 * (max - min).length(),
        }
    }
}

/// Culling decision for a node's optional box against the region.
///
/// A node without a box cannot be excluded, so it always intersects.
pub fn node_intersects(volume: Option<&OrientedBox>, region: &BoundingSphere) -> bool {
    match volume {
        Some(obb) => region.intersects(&obb.to_sphere()),
        None => true,
    }
}
