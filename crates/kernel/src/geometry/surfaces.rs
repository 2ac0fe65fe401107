use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

use super::nurbs::NurbsSurface;
use super::point::Point3d;
use super::transform::Transform;
use super::vector::Vec3;

/// All surface types supported by the kernel.
///
/// Every variant is oriented so that `du x dv` points along `normal_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Plane(Plane),
    Cylinder(Cylinder),
    Cone(Cone),
    Sphere(Sphere),
    Torus(Torus),
    Nurbs(NurbsSurface),
}

/// An infinite plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        Self::with_axes(origin, normal, normal.any_perpendicular())
    }

    /// Plane with an explicit u direction; `v_axis = normal x u_axis`.
    pub fn with_axes(origin: Point3d, normal: Vec3, u_axis: Vec3) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        let u_axis = u_axis
            .orthogonalized_against(&normal)
            .unwrap_or_else(|| normal.any_perpendicular());
        Self {
            origin,
            normal,
            u_axis,
            v_axis: normal.cross(&u_axis),
        }
    }

    pub fn xy() -> Self {
        Self::with_axes(Point3d::ORIGIN, Vec3::Z, Vec3::X)
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.u_axis * u + self.v_axis * v
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.normal)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let v = *p - self.origin;
        (v.dot(&self.u_axis), v.dot(&self.v_axis))
    }
}

/// A cylinder surface, u = angle from `ref_dir`, v = height along `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub origin: Point3d,
    pub axis: Vec3,
    pub radius: f64,
    pub ref_dir: Vec3,
}

impl Cylinder {
    pub fn new(origin: Point3d, axis: Vec3, radius: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        Self::with_axes(origin, axis, axis.any_perpendicular(), radius)
    }

    pub fn with_axes(origin: Point3d, axis: Vec3, ref_dir: Vec3, radius: f64) -> Self {
        let (axis, ref_dir) = frame(axis, ref_dir);
        Self {
            origin,
            axis,
            radius,
            ref_dir,
        }
    }

    fn radial(&self, u: f64) -> Vec3 {
        radial(self.axis, self.ref_dir, u)
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.radial(u) * self.radius + self.axis * v
    }

    pub fn normal_at(&self, u: f64, _v: f64) -> Vec3 {
        self.radial(u)
    }

    pub fn derivatives(&self, u: f64, _v: f64) -> (Vec3, Vec3) {
        (tangential(self.axis, self.ref_dir, u) * self.radius, self.axis)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.origin;
        (angle_around(self.axis, self.ref_dir, d), d.dot(&self.axis))
    }
}

/// A cone surface, u = angle, v = distance from the apex along `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cone {
    pub apex: Point3d,
    pub axis: Vec3,
    pub half_angle: f64,
    pub ref_dir: Vec3,
}

impl Cone {
    pub fn new(apex: Point3d, axis: Vec3, half_angle: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        Self::with_axes(apex, axis, axis.any_perpendicular(), half_angle)
    }

    pub fn with_axes(apex: Point3d, axis: Vec3, ref_dir: Vec3, half_angle: f64) -> Self {
        let (axis, ref_dir) = frame(axis, ref_dir);
        Self {
            apex,
            axis,
            half_angle,
            ref_dir,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let r = v * self.half_angle.tan();
        self.apex + self.axis * v + radial(self.axis, self.ref_dir, u) * r
    }

    pub fn normal_at(&self, u: f64, _v: f64) -> Vec3 {
        let radial = radial(self.axis, self.ref_dir, u);
        (radial * self.half_angle.cos() - self.axis * self.half_angle.sin()).normalized_or(radial)
    }

    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let tan_a = self.half_angle.tan();
        let du = tangential(self.axis, self.ref_dir, u) * (v * tan_a);
        let dv = self.axis + radial(self.axis, self.ref_dir, u) * tan_a;
        (du, dv)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.apex;
        (angle_around(self.axis, self.ref_dir, d), d.dot(&self.axis))
    }
}

/// A sphere surface, u = longitude, v = latitude in [-π/2, π/2].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3d,
    pub radius: f64,
    pub axis: Vec3,
    pub ref_dir: Vec3,
}

impl Sphere {
    pub fn new(center: Point3d, radius: f64) -> Self {
        Self::with_axes(center, Vec3::Z, Vec3::X, radius)
    }

    pub fn with_axes(center: Point3d, axis: Vec3, ref_dir: Vec3, radius: f64) -> Self {
        let (axis, ref_dir) = frame(axis, ref_dir);
        Self {
            center,
            radius,
            axis,
            ref_dir,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.center + self.normal_at(u, v) * self.radius
    }

    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        radial(self.axis, self.ref_dir, u) * v.cos() + self.axis * v.sin()
    }

    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let du = tangential(self.axis, self.ref_dir, u) * (self.radius * v.cos());
        let dv = radial(self.axis, self.ref_dir, u) * (-self.radius * v.sin())
            + self.axis * (self.radius * v.cos());
        (du, dv)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.center;
        let len = d.length();
        let v = if len < 1e-15 {
            0.0
        } else {
            (d.dot(&self.axis) / len).clamp(-1.0, 1.0).asin()
        };
        (angle_around(self.axis, self.ref_dir, d), v)
    }
}

/// A torus surface, u = major angle, v = minor angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Torus {
    pub center: Point3d,
    pub axis: Vec3,
    pub ref_dir: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Torus {
    pub fn new(center: Point3d, axis: Vec3, major_radius: f64, minor_radius: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        Self::with_axes(center, axis, axis.any_perpendicular(), major_radius, minor_radius)
    }

    pub fn with_axes(center: Point3d, axis: Vec3, ref_dir: Vec3, major_radius: f64, minor_radius: f64) -> Self {
        let (axis, ref_dir) = frame(axis, ref_dir);
        Self {
            center,
            axis,
            ref_dir,
            major_radius,
            minor_radius,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let ring_center = self.center + radial(self.axis, self.ref_dir, u) * self.major_radius;
        ring_center + self.normal_at(u, v) * self.minor_radius
    }

    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        radial(self.axis, self.ref_dir, u) * v.cos() + self.axis * v.sin()
    }

    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let du = tangential(self.axis, self.ref_dir, u) * (self.major_radius + self.minor_radius * v.cos());
        let dv = radial(self.axis, self.ref_dir, u) * (-self.minor_radius * v.sin())
            + self.axis * (self.minor_radius * v.cos());
        (du, dv)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.center;
        let u = angle_around(self.axis, self.ref_dir, d);
        let r = radial(self.axis, self.ref_dir, u);
        let e = d - r * self.major_radius;
        let v = e.dot(&self.axis).atan2(e.dot(&r)).rem_euclid(TAU);
        (u, v)
    }
}

/// Axis-aligned rectangle in a surface's parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvBounds {
    pub u_min: f64,
    pub u_max: f64,
    pub v_min: f64,
    pub v_max: f64,
}

impl UvBounds {
    pub fn new(u_min: f64, u_max: f64, v_min: f64, v_max: f64) -> Self {
        Self {
            u_min,
            u_max,
            v_min,
            v_max,
        }
    }

    pub fn empty() -> Self {
        Self::new(f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY)
    }

    pub fn include(&mut self, u: f64, v: f64) {
        self.u_min = self.u_min.min(u);
        self.u_max = self.u_max.max(u);
        self.v_min = self.v_min.min(v);
        self.v_max = self.v_max.max(v);
    }

    /// Finite and non-inverted. Zero-width boxes count as valid.
    pub fn is_valid(&self) -> bool {
        [self.u_min, self.u_max, self.v_min, self.v_max]
            .iter()
            .all(|x| x.is_finite())
            && self.u_min <= self.u_max
            && self.v_min <= self.v_max
    }

    pub fn width(&self) -> f64 {
        self.u_max - self.u_min
    }

    pub fn height(&self) -> f64 {
        self.v_max - self.v_min
    }

    /// Point at fractional position (s, t) in [0, 1]^2.
    pub fn lerp(&self, s: f64, t: f64) -> (f64, f64) {
        (self.u_min + s * self.width(), self.v_min + t * self.height())
    }

    pub fn clamp(&self, u: f64, v: f64) -> (f64, f64) {
        (u.clamp(self.u_min, self.u_max), v.clamp(self.v_min, self.v_max))
    }

    pub fn contains(&self, u: f64, v: f64, tol: f64) -> bool {
        u >= self.u_min - tol && u <= self.u_max + tol && v >= self.v_min - tol && v <= self.v_max + tol
    }
}

impl Surface {
    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        match self {
            Surface::Plane(p) => p.evaluate(u, v),
            Surface::Cylinder(c) => c.evaluate(u, v),
            Surface::Cone(c) => c.evaluate(u, v),
            Surface::Sphere(s) => s.evaluate(u, v),
            Surface::Torus(t) => t.evaluate(u, v),
            Surface::Nurbs(n) => n.evaluate(u, v),
        }
    }

    /// Unit normal of the parameterization (`du x dv` direction).
    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        match self {
            Surface::Plane(p) => p.normal,
            Surface::Cylinder(c) => c.normal_at(u, v),
            Surface::Cone(c) => c.normal_at(u, v),
            Surface::Sphere(s) => s.normal_at(u, v),
            Surface::Torus(t) => t.normal_at(u, v),
            Surface::Nurbs(n) => n.normal(u, v),
        }
    }

    /// First partial derivatives `(dS/du, dS/dv)`.
    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        match self {
            Surface::Plane(p) => (p.u_axis, p.v_axis),
            Surface::Cylinder(c) => c.derivatives(u, v),
            Surface::Cone(c) => c.derivatives(u, v),
            Surface::Sphere(s) => s.derivatives(u, v),
            Surface::Torus(t) => t.derivatives(u, v),
            Surface::Nurbs(n) => n.derivatives(u, v),
        }
    }

    /// Analytic inverse. `None` for freeform surfaces.
    pub fn parameters_of(&self, p: &Point3d) -> Option<(f64, f64)> {
        match self {
            Surface::Plane(s) => Some(s.parameters_of(p)),
            Surface::Cylinder(s) => Some(s.parameters_of(p)),
            Surface::Cone(s) => Some(s.parameters_of(p)),
            Surface::Sphere(s) => Some(s.parameters_of(p)),
            Surface::Torus(s) => Some(s.parameters_of(p)),
            Surface::Nurbs(_) => None,
        }
    }

    pub fn u_period(&self) -> Option<f64> {
        match self {
            Surface::Cylinder(_) | Surface::Cone(_) | Surface::Sphere(_) | Surface::Torus(_) => Some(TAU),
            Surface::Plane(_) | Surface::Nurbs(_) => None,
        }
    }

    pub fn v_period(&self) -> Option<f64> {
        match self {
            Surface::Torus(_) => Some(TAU),
            _ => None,
        }
    }

    /// Parameter ranges outside of which the surface is undefined.
    pub fn natural_bounds(&self) -> (Option<(f64, f64)>, Option<(f64, f64)>) {
        match self {
            Surface::Nurbs(n) => (Some(n.domain_u()), Some(n.domain_v())),
            Surface::Sphere(_) => (None, Some((-FRAC_PI_2, FRAC_PI_2))),
            _ => (None, None),
        }
    }

    pub fn transformed(&self, transform: &Transform) -> Surface {
        let point = |p: &Point3d| transform.transform_point(p);
        let dir = |v: &Vec3| transform.transform_vector(v);
        let scale = transform.scale_factor();
        match self {
            Surface::Plane(p) => Surface::Plane(Plane::with_axes(point(&p.origin), dir(&p.normal), dir(&p.u_axis))),
            Surface::Cylinder(c) => Surface::Cylinder(Cylinder::with_axes(
                point(&c.origin),
                dir(&c.axis),
                dir(&c.ref_dir),
                c.radius * scale,
            )),
            Surface::Cone(c) => Surface::Cone(Cone::with_axes(point(&c.apex), dir(&c.axis), dir(&c.ref_dir), c.half_angle)),
            Surface::Sphere(s) => Surface::Sphere(Sphere::with_axes(
                point(&s.center),
                dir(&s.axis),
                dir(&s.ref_dir),
                s.radius * scale,
            )),
            Surface::Torus(t) => Surface::Torus(Torus::with_axes(
                point(&t.center),
                dir(&t.axis),
                dir(&t.ref_dir),
                t.major_radius * scale,
                t.minor_radius * scale,
            )),
            Surface::Nurbs(n) => Surface::Nurbs(n.transformed(transform)),
        }
    }

    pub fn surface_type_name(&self) -> &'static str {
        match self {
            Surface::Plane(_) => "Plane",
            Surface::Cylinder(_) => "Cylinder",
            Surface::Cone(_) => "Cone",
            Surface::Sphere(_) => "Sphere",
            Surface::Torus(_) => "Torus",
            Surface::Nurbs(_) => "Nurbs",
        }
    }
}

/// Orthonormal (axis, ref_dir) pair from possibly sloppy input.
fn frame(axis: Vec3, ref_dir: Vec3) -> (Vec3, Vec3) {
    let axis = axis.normalized_or(Vec3::Z);
    let ref_dir = ref_dir
        .orthogonalized_against(&axis)
        .unwrap_or_else(|| axis.any_perpendicular());
    (axis, ref_dir)
}

fn radial(axis: Vec3, ref_dir: Vec3, u: f64) -> Vec3 {
    ref_dir * u.cos() + axis.cross(&ref_dir) * u.sin()
}

fn tangential(axis: Vec3, ref_dir: Vec3, u: f64) -> Vec3 {
    ref_dir * (-u.sin()) + axis.cross(&ref_dir) * u.cos()
}

fn angle_around(axis: Vec3, ref_dir: Vec3, d: Vec3) -> f64 {
    d.dot(&axis.cross(&ref_dir)).atan2(d.dot(&ref_dir)).rem_euclid(TAU)
}
