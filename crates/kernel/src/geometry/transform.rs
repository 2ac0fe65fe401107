use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// An affine transformation backed by a homogeneous 4x4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    m: Matrix4<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            m: Matrix4::identity(),
        }
    }

    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            m: Matrix4::new_translation(&Vector3::new(dx, dy, dz)),
        }
    }

    pub fn uniform_scaling(s: f64) -> Self {
        Self {
            m: Matrix4::new_scaling(s),
        }
    }

    /// Rotation around an arbitrary axis through the origin.
    pub fn rotation_axis_angle(axis: Vec3, angle: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        let scaled = Vector3::new(axis.x, axis.y, axis.z) * angle;
        Self {
            m: Matrix4::new_rotation(scaled),
        }
    }

    /// Build from a row-major 3x3 linear part and a translation, as
    /// stored by IGES transformation matrix entities.
    pub fn from_rows(rows: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        #[rustfmt::skip]
        let m = Matrix4::new(
            rows[0][0], rows[0][1], rows[0][2], translation[0],
            rows[1][0], rows[1][1], rows[1][2], translation[1],
            rows[2][0], rows[2][1], rows[2][2], translation[2],
            0.0,        0.0,        0.0,        1.0,
        );
        Self { m }
    }

    /// Row-major linear part and translation, the inverse of [`Transform::from_rows`].
    pub fn to_rows(&self) -> ([[f64; 3]; 3], [f64; 3]) {
        let mut rows = [[0.0; 3]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.m[(r, c)];
            }
        }
        (rows, [self.m[(0, 3)], self.m[(1, 3)], self.m[(2, 3)]])
    }

    pub fn transform_point(&self, p: &Point3d) -> Point3d {
        let h = self.m * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3d::new(h.x, h.y, h.z)
    }

    /// Transform a direction (no translation).
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        let linear: Matrix3<f64> = self.m.fixed_view::<3, 3>(0, 0).into_owned();
        let r = linear * Vector3::new(v.x, v.y, v.z);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Compose: applies `other` first, then `self`.
    pub fn then(&self, other: &Transform) -> Transform {
        Transform { m: self.m * other.m }
    }

    pub fn inverse(&self) -> Option<Self> {
        self.m.try_inverse().map(|m| Self { m })
    }

    /// Uniform scale factor of the linear part (cube root of the determinant).
    pub fn scale_factor(&self) -> f64 {
        let linear: Matrix3<f64> = self.m.fixed_view::<3, 3>(0, 0).into_owned();
        linear.determinant().abs().cbrt()
    }

    pub fn is_identity(&self, tol: f64) -> bool {
        (self.m - Matrix4::identity()).abs().max() < tol
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3d,
    pub max: Point3d,
}

impl BoundingBox {
    pub fn new(min: Point3d, max: Point3d) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Point3d]) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand_to_include(p);
        }
        bb
    }

    pub fn expand_to_include(&mut self, p: &Point3d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn contains_point(&self, p: &Point3d, margin: f64) -> bool {
        p.x >= self.min.x - margin
            && p.x <= self.max.x + margin
            && p.y >= self.min.y - margin
            && p.y <= self.max.y + margin
            && p.z >= self.min.z - margin
            && p.z <= self.max.z + margin
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest extent along any axis, zero for an empty box.
    pub fn max_dimension(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }
}
