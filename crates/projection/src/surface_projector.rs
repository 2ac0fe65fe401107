use nalgebra::{Matrix2, Vector2};
use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::{Surface, UvBounds};
use part_kernel::geometry::vector::Vec3;
use tracing::trace;

use crate::config::ProjectionConfig;

/// A local minimum of the distance from the query point to the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub point: Point3d,
    pub u: f64,
    pub v: f64,
    pub distance: f64,
}

/// Stateful orthogonal projection of points onto one surface.
///
/// The search covers the surface's natural domain, unbounded along
/// periodic and infinite directions. With
/// [`ProjectionConfig::restrict_to_face_bounds`] it is limited to the
/// face's parameter box instead. The box also places the seed grid.
///
/// Each [`perform`](Self::perform) replaces the previous result.
#[derive(Debug, Clone)]
pub struct SurfaceProjector {
    surface: Surface,
    bounds: UvBounds,
    /// Region seeded by the grid; always finite.
    seed_box: UvBounds,
    /// Region the refinement may reach; infinite where unbounded.
    domain: UvBounds,
    config: ProjectionConfig,
    extrema: Vec<Extremum>,
    done: bool,
}

impl SurfaceProjector {
    pub fn new(surface: Surface, bounds: UvBounds, config: ProjectionConfig) -> Self {
        let (domain, seed_box) = if config.restrict_to_face_bounds {
            (bounds, bounds)
        } else {
            let domain = natural_domain(&surface);
            let seed_box = if bounds.is_valid() {
                bounds
            } else {
                fallback_seed_box(&surface, &domain)
            };
            (domain, seed_box)
        };
        Self {
            surface,
            bounds,
            seed_box,
            domain,
            config,
            extrema: Vec::new(),
            done: false,
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The face's parameter box as given.
    pub fn bounds(&self) -> &UvBounds {
        &self.bounds
    }

    /// Parameter region searched; infinite limits mark unbounded directions.
    pub fn domain(&self) -> &UvBounds {
        &self.domain
    }

    /// Find the distance minima from `point` over the searched domain.
    pub fn perform(&mut self, point: &Point3d) {
        self.extrema.clear();
        self.done = false;
        if !self.seed_box.is_valid() || !point.is_finite() {
            return;
        }

        let mut seeds = self.seed_grid(point);
        seeds.sort_by(|a, b| a.2.total_cmp(&b.2));
        seeds.truncate(self.config.max_seeds.max(1));
        if let Some(seed) = self.analytic_seed(point) {
            seeds.insert(0, seed);
        }

        for (u, v, _) in seeds {
            match self.refine(point, u, v) {
                Some(extremum) => self.insert(extremum),
                None => trace!(u, v, "seed did not converge"),
            }
        }
        self.extrema.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        self.done = true;
    }

    /// The last run completed on a valid domain.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn nb_points(&self) -> usize {
        self.extrema.len()
    }

    /// Extrema are ordered by increasing distance.
    pub fn point(&self, index: usize) -> Option<&Extremum> {
        self.extrema.get(index)
    }

    pub fn lower_distance(&self) -> Option<f64> {
        self.extrema.first().map(|e| e.distance)
    }

    pub fn lower_distance_parameters(&self) -> Option<(f64, f64)> {
        self.extrema.first().map(|e| (e.u, e.v))
    }

    pub fn nearest_point(&self) -> Option<Point3d> {
        self.extrema.first().map(|e| e.point)
    }

    fn seed_grid(&self, point: &Point3d) -> Vec<(f64, f64, f64)> {
        let n = self.config.seed_divisions.max(1);
        let mut seeds = Vec::with_capacity((n + 1) * (n + 1));
        for i in 0..=n {
            for j in 0..=n {
                let (u, v) = self.seed_box.lerp(i as f64 / n as f64, j as f64 / n as f64);
                seeds.push((u, v, self.surface.evaluate(u, v).distance_to(point)));
            }
        }
        seeds
    }

    /// Closed-form foot point, moved next to the seed box along periodic
    /// directions.
    fn analytic_seed(&self, point: &Point3d) -> Option<(f64, f64, f64)> {
        let (u, v) = self.surface.parameters_of(point)?;
        let (u, v) = self.near_seed_box(u, v);
        let (u, v) = self.domain.clamp(u, v);
        Some((u, v, self.surface.evaluate(u, v).distance_to(point)))
    }

    /// Parameters outside the seed box are shifted by whole periods
    /// towards its centre.
    fn near_seed_box(&self, u: f64, v: f64) -> (f64, f64) {
        let b = &self.seed_box;
        let (cu, cv) = b.lerp(0.5, 0.5);
        let u = if (b.u_min..=b.u_max).contains(&u) { u } else { unwrap_near(u, cu, self.surface.u_period()) };
        let v = if (b.v_min..=b.v_max).contains(&v) { v } else { unwrap_near(v, cv, self.surface.v_period()) };
        (u, v)
    }

    /// Newton iterations on the squared distance, clamped to the domain.
    fn refine(&self, point: &Point3d, u: f64, v: f64) -> Option<Extremum> {
        let (mut u, mut v) = self.domain.clamp(u, v);
        let mut current = self.surface.evaluate(u, v);
        let mut distance = current.distance_to(point);
        let found = |u, v, point, distance| {
            let (u, v) = self.near_seed_box(u, v);
            Extremum { point, u, v, distance }
        };

        for _ in 0..self.config.max_iterations {
            let r = current - *point;
            let (su, sv) = self.surface.derivatives(u, v);
            if self.is_orthogonal(&r, &su, &sv, point) {
                return Some(found(u, v, current, distance));
            }

            let gradient = Vector2::new(su.dot(&r), sv.dot(&r));
            let step = self.newton_step(u, v, &r, &su, &sv, &gradient)?;

            let mut accepted = None;
            let mut alpha = 1.0;
            for _ in 0..16 {
                let (nu, nv) = self.domain.clamp(u + alpha * step.x, v + alpha * step.y);
                let candidate = self.surface.evaluate(nu, nv);
                let d = candidate.distance_to(point);
                if d <= distance {
                    accepted = Some((nu, nv, candidate, d));
                    break;
                }
                alpha *= 0.5;
            }
            // No descent left: stationary up to round-off, or pinned to the domain.
            let Some((nu, nv, candidate, d)) = accepted else {
                return Some(found(u, v, current, distance));
            };

            let moved = ((nu - u).powi(2) + (nv - v).powi(2)).sqrt();
            u = nu;
            v = nv;
            current = candidate;
            distance = d;
            if moved < self.config.parametric_tolerance {
                return Some(found(u, v, current, distance));
            }
        }
        None
    }

    /// Solve `H * step = -gradient`. The curvature term is dropped (plain
    /// Gauss-Newton) when it makes the system indefinite.
    fn newton_step(
        &self,
        u: f64,
        v: f64,
        r: &Vec3,
        su: &Vec3,
        sv: &Vec3,
        gradient: &Vector2<f64>,
    ) -> Option<Vector2<f64>> {
        let gauss = Matrix2::new(su.dot(su), su.dot(sv), su.dot(sv), sv.dot(sv));
        let hu = 1e-5 * self.seed_box.width().max(1e-3);
        let hv = 1e-5 * self.seed_box.height().max(1e-3);
        let (su_p, sv_p) = self.surface.derivatives(u + hu, v);
        let (su_m, sv_m) = self.surface.derivatives(u - hu, v);
        let (su_vp, sv_vp) = self.surface.derivatives(u, v + hv);
        let (su_vm, sv_vm) = self.surface.derivatives(u, v - hv);
        let suu = (su_p - su_m) / (2.0 * hu);
        let svv = (sv_vp - sv_vm) / (2.0 * hv);
        let suv = ((sv_p - sv_m) / (2.0 * hu) + (su_vp - su_vm) / (2.0 * hv)) * 0.5;
        let curvature = Matrix2::new(r.dot(&suu), r.dot(&suv), r.dot(&suv), r.dot(&svv));

        let newton = gauss + curvature;
        let hessian = if newton[(0, 0)] > 0.0 && newton.determinant() > 0.0 {
            newton
        } else {
            gauss
        };
        let damping = 1e-12 * hessian.trace().abs().max(f64::MIN_POSITIVE);
        let inverse = (hessian + Matrix2::identity() * damping).try_inverse()?;
        Some(-(inverse * gradient))
    }

    fn is_orthogonal(&self, r: &Vec3, su: &Vec3, sv: &Vec3, point: &Point3d) -> bool {
        let rl = r.length();
        if rl <= 1e-14 * (1.0 + point.to_vec3().length()) {
            return true;
        }
        [su, sv].into_iter().all(|t| {
            let tl = t.length();
            tl < 1e-15 || r.dot(t).abs() <= self.config.angular_tolerance * rl * tl
        })
    }

    fn insert(&mut self, extremum: Extremum) {
        let merge = self.config.merge_tolerance;
        match self
            .extrema
            .iter_mut()
            .find(|e| e.point.distance_to(&extremum.point) <= merge)
        {
            Some(existing) if extremum.distance < existing.distance => *existing = extremum,
            Some(_) => {}
            None => self.extrema.push(extremum),
        }
    }
}

/// Natural parameter ranges, with infinite limits where the surface is
/// periodic or extends without end.
fn natural_domain(surface: &Surface) -> UvBounds {
    let (u, v) = surface.natural_bounds();
    let (u_min, u_max) = u.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
    let (v_min, v_max) = v.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
    UvBounds::new(u_min, u_max, v_min, v_max)
}

/// Seed region for a face without a usable box: one period along periodic
/// directions and a unit span around zero along infinite ones.
fn fallback_seed_box(surface: &Surface, domain: &UvBounds) -> UvBounds {
    let range = |lo: f64, hi: f64, period: Option<f64>| match period {
        _ if lo.is_finite() && hi.is_finite() => (lo, hi),
        Some(period) => (0.0, period),
        None => (lo.max(-1.0), hi.min(1.0)),
    };
    let (u_min, u_max) = range(domain.u_min, domain.u_max, surface.u_period());
    let (v_min, v_max) = range(domain.v_min, domain.v_max, surface.v_period());
    UvBounds::new(u_min, u_max, v_min, v_max)
}

fn unwrap_near(value: f64, reference: f64, period: Option<f64>) -> f64 {
    match period {
        Some(period) => value - ((value - reference) / period).round() * period,
        None => value,
    }
}
