//! The aggregate handed between loaders, writers and the projection helper.

use serde::{Deserialize, Serialize};

use super::brep::{EntityStore, Face, FaceId, LoopId, SolidId};
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::{Surface, UvBounds};
use crate::geometry::transform::BoundingBox;
use crate::geometry::vector::Vec3;

const EDGE_SAMPLES: usize = 16;

/// A composite topological shape: an entity arena plus its root solids.
///
/// Open surface models are stored as solids whose shells are not closed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shape {
    store: EntityStore,
    solids: Vec<SolidId>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(store: EntityStore, solids: Vec<SolidId>) -> Self {
        Self { store, solids }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn solids(&self) -> &[SolidId] {
        &self.solids
    }

    /// True when the shape has no faces at all (the "null shape").
    pub fn is_empty(&self) -> bool {
        self.faces().next().is_none()
    }

    /// Faces in explorer order: solids, then shells, then faces.
    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.solids
            .iter()
            .filter_map(|&solid| self.store.solids.get(solid))
            .flat_map(|solid| solid.shells.iter())
            .filter_map(|&shell| self.store.shells.get(shell))
            .flat_map(|shell| shell.faces.iter().copied())
    }

    pub fn face_count(&self) -> usize {
        self.faces().count()
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.store.faces.get(id)
    }

    pub fn face_normal(&self, id: FaceId, u: f64, v: f64) -> Option<Vec3> {
        self.face(id).map(|_| self.store.face_normal(id, u, v))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bb = BoundingBox::empty();
        for face_id in self.faces() {
            let face = &self.store.faces[face_id];
            for loop_id in face_loops(face) {
                self.sample_loop(loop_id, |p| bb.expand_to_include(&p));
            }
        }
        bb
    }

    /// Parameter-space box enclosing the face's boundary.
    ///
    /// Periodic directions are unwrapped along each loop; a direction the
    /// boundary does not sweep (closure through a seam) spans one full
    /// period. Freeform surfaces use their knot domain.
    pub fn face_uv_bounds(&self, id: FaceId) -> Option<UvBounds> {
        let face = self.face(id)?;
        let surface = &face.surface;
        let (natural_u, natural_v) = surface.natural_bounds();

        if let (Surface::Nurbs(_), Some(u), Some(v)) = (surface, natural_u, natural_v) {
            return Some(UvBounds::new(u.0, u.1, v.0, v.1));
        }

        let mut bounds = UvBounds::empty();
        let mut u_defined = false;
        for loop_id in face_loops(face) {
            let mut prev: Option<(f64, f64)> = None;
            self.sample_loop(loop_id, |p| {
                let Some((mut u, mut v)) = surface.parameters_of(&p) else {
                    return;
                };
                if let Some((pu, pv)) = prev {
                    u = unwrap_near(u, pu, surface.u_period());
                    v = unwrap_near(v, pv, surface.v_period());
                }
                let (du, _) = surface.derivatives(u, v);
                if du.length() > 1e-9 {
                    bounds.u_min = bounds.u_min.min(u);
                    bounds.u_max = bounds.u_max.max(u);
                    u_defined = true;
                }
                bounds.v_min = bounds.v_min.min(v);
                bounds.v_max = bounds.v_max.max(v);
                prev = Some((u, v));
            });
        }

        if !u_defined {
            bounds.u_min = 0.0;
            bounds.u_max = 0.0;
        }
        widen_periodic(&mut bounds.u_min, &mut bounds.u_max, surface.u_period());
        widen_periodic(&mut bounds.v_min, &mut bounds.v_max, surface.v_period());

        if let Some((lo, hi)) = natural_v {
            bounds.v_min = bounds.v_min.max(lo);
            bounds.v_max = bounds.v_max.min(hi);
        }

        bounds.is_valid().then_some(bounds)
    }

    /// Points along a loop in traversal order, `EDGE_SAMPLES` per half-edge
    /// (the closing point of each half-edge is left to the next one).
    pub fn loop_points(&self, loop_id: LoopId) -> Vec<Point3d> {
        let mut points = Vec::new();
        self.sample_loop(loop_id, |p| points.push(p));
        points
    }

    fn sample_loop(&self, loop_id: LoopId, mut visit: impl FnMut(Point3d)) {
        let Some(loop_data) = self.store.loops.get(loop_id) else {
            return;
        };
        for &he_id in &loop_data.half_edges {
            let he = &self.store.half_edges[he_id];
            let curve = &self.store.edges[he.edge].curve;
            for i in 0..EDGE_SAMPLES {
                let t = he.t_start + (he.t_end - he.t_start) * (i as f64 / EDGE_SAMPLES as f64);
                visit(curve.evaluate(t));
            }
        }
    }
}

fn face_loops(face: &Face) -> impl Iterator<Item = LoopId> + '_ {
    std::iter::once(face.outer_loop).chain(face.inner_loops.iter().copied())
}

fn unwrap_near(value: f64, reference: f64, period: Option<f64>) -> f64 {
    match period {
        Some(period) => value - ((value - reference) / period).round() * period,
        None => value,
    }
}

/// A periodic direction the boundary never sweeps is closed through a seam.
fn widen_periodic(min: &mut f64, max: &mut f64, period: Option<f64>) {
    let Some(period) = period else {
        return;
    };
    if !min.is_finite() || !max.is_finite() {
        return;
    }
    if *max - *min < 1e-6 {
        *max = *min + period;
    } else if *max - *min > period {
        *max = *min + period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::{make_box, make_cylinder, make_sphere};
    use std::f64::consts::{FRAC_PI_2, TAU};

    #[test]
    fn test_empty_shape() {
        let shape = Shape::new();
        assert!(shape.is_empty());
        assert_eq!(shape.face_count(), 0);
        assert!(!shape.bounding_box().is_valid());
    }

    #[test]
    fn test_box_faces_and_bounds() {
        let mut store = EntityStore::new();
        let solid = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        assert_eq!(shape.face_count(), 6);

        let bb = shape.bounding_box();
        assert!((bb.max.y - 2.0).abs() < 1e-12);
        assert!((bb.max.z - 3.0).abs() < 1e-12);

        for face in shape.faces() {
            let b = shape.face_uv_bounds(face).unwrap();
            let area = b.width() * b.height();
            assert!(area > 1.9 && area < 6.1, "unexpected planar uv area {}", area);
        }
    }

    #[test]
    fn test_cylinder_side_spans_full_turn() {
        let mut store = EntityStore::new();
        let solid = make_cylinder(&mut store, Point3d::ORIGIN, 2.0, 5.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let side = shape
            .faces()
            .find(|&f| matches!(shape.face(f).map(|f| &f.surface), Some(Surface::Cylinder(_))))
            .unwrap();
        let b = shape.face_uv_bounds(side).unwrap();
        assert!((b.width() - TAU).abs() < 1e-9, "u width {}", b.width());
        assert!((b.v_min).abs() < 1e-9 && (b.v_max - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_sphere_closed_through_seam() {
        let mut store = EntityStore::new();
        let solid = make_sphere(&mut store, Point3d::new(1.0, 1.0, 1.0), 2.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let face = shape.faces().next().unwrap();
        let b = shape.face_uv_bounds(face).unwrap();
        assert!((b.width() - TAU).abs() < 1e-9);
        assert!((b.v_min + FRAC_PI_2).abs() < 1e-9);
        assert!((b.v_max - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_serde_roundtrip_keeps_face_order() {
        let mut store = EntityStore::new();
        let solid = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let json = serde_json::to_string(&shape).unwrap();
        let back: Shape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape.faces().collect::<Vec<_>>(), back.faces().collect::<Vec<_>>());
    }
}
