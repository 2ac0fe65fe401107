use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::transform::Transform;
use super::vector::Vec3;
use crate::error::GeometryError;

/// A NURBS (Non-Uniform Rational B-Spline) curve in 3D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsCurve {
    pub degree: usize,
    pub control_points: Vec<Point3d>,
    /// Weights for rational curves. If empty, treated as all 1.0 (non-rational).
    pub weights: Vec<f64>,
    /// Knot vector, `control_points.len() + degree + 1` entries.
    pub knots: Vec<f64>,
}

impl NurbsCurve {
    pub fn new(
        degree: usize,
        control_points: Vec<Point3d>,
        weights: Vec<f64>,
        knots: Vec<f64>,
    ) -> Result<Self, GeometryError> {
        if degree == 0 || control_points.len() < degree + 1 {
            return Err(GeometryError::TooFewControlPoints {
                degree,
                count: control_points.len(),
            });
        }
        let expected = control_points.len() + degree + 1;
        if knots.len() != expected {
            return Err(GeometryError::KnotCount {
                expected,
                actual: knots.len(),
            });
        }
        if !weights.is_empty() && weights.len() != control_points.len() {
            return Err(GeometryError::WeightCount {
                expected: control_points.len(),
                actual: weights.len(),
            });
        }
        check_knots(&knots)?;
        Ok(Self {
            degree,
            control_points,
            weights,
            knots,
        })
    }

    /// Create a non-rational B-spline curve.
    pub fn bspline(degree: usize, control_points: Vec<Point3d>, knots: Vec<f64>) -> Result<Self, GeometryError> {
        Self::new(degree, control_points, vec![], knots)
    }

    pub fn is_rational(&self) -> bool {
        !self.weights.is_empty()
    }

    pub fn weight(&self, i: usize) -> f64 {
        if self.is_rational() {
            self.weights[i]
        } else {
            1.0
        }
    }

    pub fn num_control_points(&self) -> usize {
        self.control_points.len()
    }

    /// Parameter domain [t_min, t_max].
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.knots.len() - self.degree - 1])
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        let span = find_span(&self.knots, self.num_control_points(), self.degree, t);
        let basis = basis_functions(&self.knots, span, t, self.degree);
        let p = self.degree;

        let mut wx = 0.0;
        let mut wy = 0.0;
        let mut wz = 0.0;
        let mut w_sum = 0.0;
        for (i, b) in basis.iter().enumerate() {
            let idx = span - p + i;
            let cp = self.control_points[idx];
            let bw = b * self.weight(idx);
            wx += cp.x * bw;
            wy += cp.y * bw;
            wz += cp.z * bw;
            w_sum += bw;
        }
        Point3d::new(wx / w_sum, wy / w_sum, wz / w_sum)
    }

    /// First derivative by central differences, clamped to the domain.
    pub fn derivative(&self, t: f64) -> Vec3 {
        let dt = 1e-7;
        let (tmin, tmax) = self.domain();
        let t0 = (t - dt).max(tmin);
        let t1 = (t + dt).min(tmax);
        let actual_dt = t1 - t0;
        if actual_dt.abs() < 1e-15 {
            return Vec3::ZERO;
        }
        (self.evaluate(t1) - self.evaluate(t0)) / actual_dt
    }

    /// Parameter of the curve point closest to `point`.
    ///
    /// Dense sampling followed by golden-section refinement around the best
    /// sample. Good enough for locating edge vertices on their curve.
    pub fn closest_parameter(&self, point: &Point3d) -> f64 {
        let (t0, t1) = self.domain();
        let samples = (self.num_control_points() * 8).max(32);
        let dist = |t: f64| self.evaluate(t).distance_squared_to(point);

        let mut best_t = t0;
        let mut best_d = f64::MAX;
        for i in 0..=samples {
            let t = t0 + (t1 - t0) * (i as f64 / samples as f64);
            let d = dist(t);
            if d < best_d {
                best_d = d;
                best_t = t;
            }
        }

        let step = (t1 - t0) / samples as f64;
        golden_section_min(dist, (best_t - step).max(t0), (best_t + step).min(t1))
    }

    pub fn transformed(&self, transform: &Transform) -> Self {
        Self {
            control_points: self
                .control_points
                .iter()
                .map(|p| transform.transform_point(p))
                .collect(),
            ..self.clone()
        }
    }
}

/// A NURBS surface (tensor-product).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsSurface {
    pub degree_u: usize,
    pub degree_v: usize,
    /// Control points grid: [u_index * num_v + v_index]
    pub control_points: Vec<Point3d>,
    pub weights: Vec<f64>,
    pub knots_u: Vec<f64>,
    pub knots_v: Vec<f64>,
    pub num_u: usize,
    pub num_v: usize,
}

impl NurbsSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        control_points: Vec<Point3d>,
        weights: Vec<f64>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        num_u: usize,
        num_v: usize,
    ) -> Result<Self, GeometryError> {
        if control_points.len() != num_u * num_v {
            return Err(GeometryError::ControlGrid {
                num_u,
                num_v,
                actual: control_points.len(),
            });
        }
        for (degree, count) in [(degree_u, num_u), (degree_v, num_v)] {
            if degree == 0 || count < degree + 1 {
                return Err(GeometryError::TooFewControlPoints { degree, count });
            }
        }
        for (knots, count, degree) in [(&knots_u, num_u, degree_u), (&knots_v, num_v, degree_v)] {
            if knots.len() != count + degree + 1 {
                return Err(GeometryError::KnotCount {
                    expected: count + degree + 1,
                    actual: knots.len(),
                });
            }
            check_knots(knots)?;
        }
        if !weights.is_empty() && weights.len() != control_points.len() {
            return Err(GeometryError::WeightCount {
                expected: control_points.len(),
                actual: weights.len(),
            });
        }
        Ok(Self {
            degree_u,
            degree_v,
            control_points,
            weights,
            knots_u,
            knots_v,
            num_u,
            num_v,
        })
    }

    pub fn is_rational(&self) -> bool {
        !self.weights.is_empty()
    }

    pub fn weight(&self, u_idx: usize, v_idx: usize) -> f64 {
        if self.is_rational() {
            self.weights[u_idx * self.num_v + v_idx]
        } else {
            1.0
        }
    }

    pub fn control_point(&self, u_idx: usize, v_idx: usize) -> Point3d {
        self.control_points[u_idx * self.num_v + v_idx]
    }

    pub fn domain_u(&self) -> (f64, f64) {
        (
            self.knots_u[self.degree_u],
            self.knots_u[self.knots_u.len() - self.degree_u - 1],
        )
    }

    pub fn domain_v(&self) -> (f64, f64) {
        (
            self.knots_v[self.degree_v],
            self.knots_v[self.knots_v.len() - self.degree_v - 1],
        )
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let span_u = find_span(&self.knots_u, self.num_u, self.degree_u, u);
        let span_v = find_span(&self.knots_v, self.num_v, self.degree_v, v);
        let basis_u = basis_functions(&self.knots_u, span_u, u, self.degree_u);
        let basis_v = basis_functions(&self.knots_v, span_v, v, self.degree_v);

        let mut wx = 0.0;
        let mut wy = 0.0;
        let mut wz = 0.0;
        let mut w_sum = 0.0;

        for (i, bu) in basis_u.iter().enumerate() {
            let u_idx = span_u - self.degree_u + i;
            for (j, bv) in basis_v.iter().enumerate() {
                let v_idx = span_v - self.degree_v + j;
                let cp = self.control_point(u_idx, v_idx);
                let bw = bu * bv * self.weight(u_idx, v_idx);
                wx += cp.x * bw;
                wy += cp.y * bw;
                wz += cp.z * bw;
                w_sum += bw;
            }
        }

        Point3d::new(wx / w_sum, wy / w_sum, wz / w_sum)
    }

    /// Partial derivatives (dS/du, dS/dv) by central differences.
    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let h = 1e-7;
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();

        let u0 = (u - h).max(u_min);
        let u1 = (u + h).min(u_max);
        let v0 = (v - h).max(v_min);
        let v1 = (v + h).min(v_max);

        let du = if u1 > u0 {
            (self.evaluate(u1, v) - self.evaluate(u0, v)) / (u1 - u0)
        } else {
            Vec3::ZERO
        };
        let dv = if v1 > v0 {
            (self.evaluate(u, v1) - self.evaluate(u, v0)) / (v1 - v0)
        } else {
            Vec3::ZERO
        };
        (du, dv)
    }

    pub fn normal(&self, u: f64, v: f64) -> Vec3 {
        let (du, dv) = self.derivatives(u, v);
        du.cross(&dv).normalized_or(Vec3::Z)
    }

    /// The iso-curve at the first (`last == false`) or last control row in u.
    /// Exact for clamped knot vectors.
    pub fn u_boundary(&self, last: bool) -> NurbsCurve {
        let i = if last { self.num_u - 1 } else { 0 };
        NurbsCurve {
            degree: self.degree_v,
            control_points: (0..self.num_v).map(|j| self.control_point(i, j)).collect(),
            weights: if self.is_rational() {
                (0..self.num_v).map(|j| self.weight(i, j)).collect()
            } else {
                vec![]
            },
            knots: self.knots_v.clone(),
        }
    }

    /// The iso-curve at the first or last control column in v.
    pub fn v_boundary(&self, last: bool) -> NurbsCurve {
        let j = if last { self.num_v - 1 } else { 0 };
        NurbsCurve {
            degree: self.degree_u,
            control_points: (0..self.num_u).map(|i| self.control_point(i, j)).collect(),
            weights: if self.is_rational() {
                (0..self.num_u).map(|i| self.weight(i, j)).collect()
            } else {
                vec![]
            },
            knots: self.knots_u.clone(),
        }
    }

    pub fn transformed(&self, transform: &Transform) -> Self {
        Self {
            control_points: self
                .control_points
                .iter()
                .map(|p| transform.transform_point(p))
                .collect(),
            ..self.clone()
        }
    }
}

/// Split a full knot vector into distinct values and their multiplicities.
pub fn compress_knots(knots: &[f64]) -> (Vec<usize>, Vec<f64>) {
    let mut mults: Vec<usize> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for &k in knots {
        match values.last() {
            Some(&last) if (k - last).abs() < 1e-12 => {
                if let Some(m) = mults.last_mut() {
                    *m += 1;
                }
            }
            _ => {
                values.push(k);
                mults.push(1);
            }
        }
    }
    (mults, values)
}

/// Inverse of [`compress_knots`].
pub fn expand_knots(mults: &[usize], values: &[f64]) -> Vec<f64> {
    mults
        .iter()
        .zip(values)
        .flat_map(|(&m, &k)| std::iter::repeat(k).take(m))
        .collect()
}

fn check_knots(knots: &[f64]) -> Result<(), GeometryError> {
    if knots.windows(2).any(|w| w[1] < w[0]) || knots.iter().any(|k| !k.is_finite()) {
        return Err(GeometryError::DecreasingKnots);
    }
    Ok(())
}

/// Knot span index containing `t`, by binary search.
fn find_span(knots: &[f64], num_control_points: usize, degree: usize, t: f64) -> usize {
    let n = num_control_points - 1;
    let p = degree;

    if t >= knots[n + 1] {
        return n;
    }
    if t <= knots[p] {
        return p;
    }

    let mut low = p;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

fn basis_functions(knots: &[f64], span: usize, t: f64, degree: usize) -> Vec<f64> {
    let p = degree;
    let mut n_vals = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    n_vals[0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom.abs() < 1e-300 { 0.0 } else { n_vals[r] / denom };
            n_vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n_vals[j] = saved;
    }
    n_vals
}

pub(crate) fn golden_section_min(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let ratio = (5f64.sqrt() - 1.0) / 2.0;
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    for _ in 0..60 {
        if (b - a).abs() < 1e-14 {
            break;
        }
        if f(c) < f(d) {
            b = d;
        } else {
            a = c;
        }
        c = b - ratio * (b - a);
        d = a + ratio * (b - a);
    }
    (a + b) * 0.5
}
