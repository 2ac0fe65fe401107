//! The projection result is checked against dense sampling of every face.

use proptest::prelude::*;

use part_kernel::geometry::point::Point3d;
use part_kernel::topology::brep::EntityStore;
use part_kernel::topology::primitives::{make_box, make_cylinder, make_sphere};
use part_kernel::Shape;
use part_projection::{PointOnFacesProjection, ProjectionConfig};

const SAMPLES: usize = 80;

fn face_bounded(shape: &Shape) -> PointOnFacesProjection {
    let mut projection = PointOnFacesProjection::with_config(ProjectionConfig::face_bounded());
    projection.prepare(shape);
    projection
}

fn mixed_shape() -> Shape {
    let mut store = EntityStore::new();
    let cube = make_box(&mut store, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0).unwrap();
    let can = make_cylinder(&mut store, Point3d::new(4.0, 0.0, -1.0), 1.0, 3.0).unwrap();
    let ball = make_sphere(&mut store, Point3d::new(-4.0, 1.0, 0.0), 1.5).unwrap();
    Shape::from_parts(store, vec![cube, can, ball])
}

/// Smallest distance from `point` to a grid of samples over every face's
/// parameter box.
fn sampled_minimum(shape: &Shape, point: &Point3d) -> f64 {
    let mut best = f64::MAX;
    for face_id in shape.faces() {
        let surface = &shape.face(face_id).unwrap().surface;
        let bounds = shape.face_uv_bounds(face_id).unwrap();
        for i in 0..=SAMPLES {
            for j in 0..=SAMPLES {
                let (u, v) = bounds.lerp(i as f64 / SAMPLES as f64, j as f64 / SAMPLES as f64);
                best = best.min(surface.evaluate(u, v).distance_to(point));
            }
        }
    }
    best
}

#[test]
fn test_projector_count_matches_faces() {
    let shape = mixed_shape();
    let projection = PointOnFacesProjection::with_shape(&shape);
    assert_eq!(projection.projector_count(), shape.face_count());
    assert_eq!(shape.face_count(), 6 + 3 + 1);
}

#[test]
fn test_empty_shape_is_never_done() {
    let mut projection = PointOnFacesProjection::with_shape(&Shape::new());
    assert!(!projection.compute(&Point3d::new(0.0, 0.0, 5.0)).is_done());
    assert_eq!(projection.solution_point(), Point3d::ORIGIN);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn projection_is_global_minimum(
        x in -8.0f64..8.0,
        y in -4.0f64..4.0,
        z in -4.0f64..4.0,
    ) {
        let shape = mixed_shape();
        let point = Point3d::new(x, y, z);
        let mut projection = face_bounded(&shape);
        projection.compute(&point);
        prop_assert!(projection.is_done());

        let face = shape.face(projection.solution_face()).unwrap();
        let (u, v) = projection.solution_uv();
        let on_surface = face.surface.evaluate(u, v);
        prop_assert!(on_surface.distance_to(&projection.solution_point()) < 1e-9);

        let found = projection.solution_point().distance_to(&point);
        let sampled = sampled_minimum(&shape, &point);
        prop_assert!(found <= sampled + 1e-7, "projection {} worse than sampling {}", found, sampled);
        // The sampling grid is fine enough to land close to the true minimum.
        prop_assert!(found >= sampled - 0.1, "projection {} far below sampling {}", found, sampled);
    }

    #[test]
    fn whole_surfaces_are_never_farther(
        x in -8.0f64..8.0,
        y in -4.0f64..4.0,
        z in -4.0f64..4.0,
    ) {
        let shape = mixed_shape();
        let point = Point3d::new(x, y, z);
        let mut bounded = face_bounded(&shape);
        let mut natural = PointOnFacesProjection::with_shape(&shape);
        bounded.compute(&point);
        natural.compute(&point);
        prop_assert!(natural.is_done());
        let near = natural.solution_distance().unwrap();
        let far = bounded.solution_distance().unwrap();
        prop_assert!(near <= far + 1e-9, "whole surfaces {} farther than faces {}", near, far);
        let face = shape.face(natural.solution_face()).unwrap();
        let (u, v) = natural.solution_uv();
        prop_assert!(face.surface.evaluate(u, v).distance_to(&natural.solution_point()) < 1e-9);
    }
}
