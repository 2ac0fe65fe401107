use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_1_SQRT_2, TAU};

use super::nurbs::NurbsCurve;
use super::point::Point3d;
use super::transform::Transform;
use super::vector::Vec3;
use crate::error::GeometryError;

/// Analytic and parametric curve representations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    Line(Line3d),
    Circle(Circle3d),
    Ellipse(Ellipse3d),
    Nurbs(NurbsCurve),
}

/// An infinite line parameterized by arc length from `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line3d {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Line3d {
    pub fn new(origin: Point3d, direction: Vec3) -> Result<Self, GeometryError> {
        let direction = direction.normalized().ok_or(GeometryError::DegenerateDirection)?;
        Ok(Self { origin, direction })
    }

    pub fn from_points(a: Point3d, b: Point3d) -> Result<Self, GeometryError> {
        Self::new(a, b - a)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }

    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.direction)
    }
}

/// A circle in 3D space, parameterized by angle from `x_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub radius: f64,
    pub x_axis: Vec3,
}

impl Circle3d {
    pub fn new(center: Point3d, normal: Vec3, radius: f64) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        Self {
            center,
            normal,
            radius,
            x_axis: normal.any_perpendicular(),
        }
    }

    /// `x_axis` is made orthogonal to `normal`; a parallel one is replaced.
    pub fn with_axes(center: Point3d, normal: Vec3, x_axis: Vec3, radius: f64) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        let x_axis = x_axis
            .orthogonalized_against(&normal)
            .unwrap_or_else(|| normal.any_perpendicular());
        Self {
            center,
            normal,
            radius,
            x_axis,
        }
    }

    pub fn y_axis(&self) -> Vec3 {
        self.normal.cross(&self.x_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center + self.x_axis * (self.radius * t.cos()) + self.y_axis() * (self.radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.x_axis * (-self.radius * t.sin()) + self.y_axis() * (self.radius * t.cos())
    }

    /// Angle of `p` around the circle in `[0, 2π)`.
    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        let d = *p - self.center;
        d.dot(&self.y_axis()).atan2(d.dot(&self.x_axis)).rem_euclid(TAU)
    }
}

/// An ellipse in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub major_axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Ellipse3d {
    pub fn new(
        center: Point3d,
        normal: Vec3,
        major_axis: Vec3,
        major_radius: f64,
        minor_radius: f64,
    ) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        let major_axis = major_axis
            .orthogonalized_against(&normal)
            .unwrap_or_else(|| normal.any_perpendicular());
        Self {
            center,
            normal,
            major_axis,
            major_radius,
            minor_radius,
        }
    }

    pub fn minor_axis(&self) -> Vec3 {
        self.normal.cross(&self.major_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center
            + self.major_axis * (self.major_radius * t.cos())
            + self.minor_axis() * (self.minor_radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.major_axis * (-self.major_radius * t.sin())
            + self.minor_axis() * (self.minor_radius * t.cos())
    }

    /// Eccentric anomaly of `p` in `[0, 2π)`.
    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        let d = *p - self.center;
        let x = d.dot(&self.major_axis) / self.major_radius;
        let y = d.dot(&self.minor_axis()) / self.minor_radius;
        y.atan2(x).rem_euclid(TAU)
    }

    /// Exact rational quadratic representation over `[0, 1]`, starting
    /// at the end of the major axis.
    pub fn to_nurbs(&self) -> NurbsCurve {
        let a = self.major_axis * self.major_radius;
        let b = self.minor_axis() * self.minor_radius;
        let c = self.center;
        let offsets = [
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (-1.0, 1.0),
            (-1.0, 0.0),
            (-1.0, -1.0),
            (0.0, -1.0),
            (1.0, -1.0),
            (1.0, 0.0),
        ];
        let control_points = offsets.iter().map(|&(x, y)| c + a * x + b * y).collect();
        let weights = (0..9)
            .map(|i| if i % 2 == 0 { 1.0 } else { FRAC_1_SQRT_2 })
            .collect();
        let knots = vec![0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0];
        NurbsCurve {
            degree: 2,
            control_points,
            weights,
            knots,
        }
    }
}

impl Curve {
    pub fn evaluate(&self, t: f64) -> Point3d {
        match self {
            Curve::Line(l) => l.evaluate(t),
            Curve::Circle(c) => c.evaluate(t),
            Curve::Ellipse(e) => e.evaluate(t),
            Curve::Nurbs(n) => n.evaluate(t),
        }
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        match self {
            Curve::Line(l) => l.direction,
            Curve::Circle(c) => c.derivative(t),
            Curve::Ellipse(e) => e.derivative(t),
            Curve::Nurbs(n) => n.derivative(t),
        }
    }

    /// Parameter of the point on the curve closest to `p`.
    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        match self {
            Curve::Line(l) => l.parameter_of(p),
            Curve::Circle(c) => c.parameter_of(p),
            Curve::Ellipse(e) => e.parameter_of(p),
            Curve::Nurbs(n) => n.closest_parameter(p),
        }
    }

    pub fn period(&self) -> Option<f64> {
        match self {
            Curve::Circle(_) | Curve::Ellipse(_) => Some(TAU),
            Curve::Line(_) | Curve::Nurbs(_) => None,
        }
    }

    /// Parameter range of the arc running from `start` to `end`.
    ///
    /// On periodic curves the end parameter is unwrapped past the start;
    /// `closed` arcs span one full period. On a closed NURBS curve the
    /// whole domain is used.
    pub fn parameter_range(&self, start: &Point3d, end: &Point3d, closed: bool) -> (f64, f64) {
        if let Curve::Nurbs(n) = self {
            if closed {
                return n.domain();
            }
        }
        let t0 = self.parameter_of(start);
        let mut t1 = self.parameter_of(end);
        if let Some(period) = self.period() {
            if closed {
                return (t0, t0 + period);
            }
            while t1 <= t0 + 1e-12 {
                t1 += period;
            }
            while t1 - t0 > period {
                t1 -= period;
            }
        }
        (t0, t1)
    }

    pub fn transformed(&self, transform: &Transform) -> Curve {
        let scale = transform.scale_factor();
        match self {
            Curve::Line(l) => Curve::Line(Line3d {
                origin: transform.transform_point(&l.origin),
                direction: transform.transform_vector(&l.direction).normalized_or(l.direction),
            }),
            Curve::Circle(c) => Curve::Circle(Circle3d::with_axes(
                transform.transform_point(&c.center),
                transform.transform_vector(&c.normal),
                transform.transform_vector(&c.x_axis),
                c.radius * scale,
            )),
            Curve::Ellipse(e) => Curve::Ellipse(Ellipse3d::new(
                transform.transform_point(&e.center),
                transform.transform_vector(&e.normal),
                transform.transform_vector(&e.major_axis),
                e.major_radius * scale,
                e.minor_radius * scale,
            )),
            Curve::Nurbs(n) => Curve::Nurbs(n.transformed(transform)),
        }
    }

    pub fn curve_type_name(&self) -> &'static str {
        match self {
            Curve::Line(_) => "Line",
            Curve::Circle(_) => "Circle",
            Curve::Ellipse(_) => "Ellipse",
            Curve::Nurbs(_) => "Nurbs",
        }
    }
}
