pub mod error;
pub mod geometry;
pub mod topology;

use serde::{Deserialize, Serialize};

pub use error::GeometryError;
pub use topology::brep::{EntityStore, FaceId};
pub use geometry::surfaces::UvBounds;
pub use topology::shape::Shape;

/// Global tolerance configuration for geometric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Points closer than this are considered coincident.
    pub coincidence: f64,
    /// Angles smaller than this (radians) are considered zero.
    pub angular: f64,
    /// Parameter-space tolerance for curve/surface evaluations.
    pub parametric: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-7,
            angular: 1e-10,
            parametric: 1e-9,
        }
    }
}

impl Tolerance {
    pub fn points_coincident(&self, a: &geometry::point::Point3d, b: &geometry::point::Point3d) -> bool {
        a.distance_to(b) < self.coincidence
    }

    pub fn is_zero_length(&self, length: f64) -> bool {
        length.abs() < self.coincidence
    }

    pub fn is_zero_angle(&self, angle: f64) -> bool {
        angle.abs() < self.angular
    }

    /// Absolute comparison of two scalars at the coincidence tolerance.
    pub fn scalars_equal(&self, a: f64, b: f64) -> bool {
        approx::abs_diff_eq!(a, b, epsilon = self.coincidence)
    }
}

pub fn default_tolerance() -> Tolerance {
    Tolerance::default()
}
