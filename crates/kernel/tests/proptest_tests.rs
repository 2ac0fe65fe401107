//! Property-based tests for kernel invariants using the `proptest` crate.

use proptest::prelude::*;

use part_kernel::geometry::nurbs::{compress_knots, expand_knots};
use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::{Cone, Cylinder, Plane, Sphere, Surface, Torus};
use part_kernel::geometry::transform::{BoundingBox, Transform};
use part_kernel::geometry::vector::Vec3;
use part_kernel::topology::brep::EntityStore;
use part_kernel::topology::primitives::{make_box, make_cylinder};
use part_kernel::Shape;

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_point() -> impl Strategy<Value = (f64, f64, f64)> {
    (-1000.0f64..1000.0, -1000.0f64..1000.0, -1000.0f64..1000.0)
}

fn arb_positive_dim() -> impl Strategy<Value = f64> {
    0.1f64..1000.0
}

fn arb_angle() -> impl Strategy<Value = f64> {
    -std::f64::consts::PI..std::f64::consts::PI
}

/// A unit axis away from degenerate lengths.
fn arb_axis() -> impl Strategy<Value = Vec3> {
    (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)
        .prop_filter("axis must not vanish", |(x, y, z)| x * x + y * y + z * z > 0.01)
        .prop_map(|(x, y, z)| Vec3::new(x, y, z).normalized().unwrap())
}

fn arb_surface() -> impl Strategy<Value = Surface> {
    let origin = arb_point().prop_map(|(x, y, z)| Point3d::new(x, y, z));
    (origin, arb_axis(), 0.5f64..50.0, 0.1f64..1.2, 0usize..5).prop_map(|(o, axis, r, a, kind)| match kind {
        0 => Surface::Plane(Plane::new(o, axis)),
        1 => Surface::Cylinder(Cylinder::new(o, axis, r)),
        2 => Surface::Cone(Cone::new(o, axis, a)),
        3 => Surface::Sphere(Sphere::with_axes(o, axis, axis.any_perpendicular(), r)),
        _ => Surface::Torus(Torus::new(o, axis, r * 2.0, r)),
    })
}

const TOL: f64 = 1e-6;

// ---------------------------------------------------------------------------
// 1. Analytic inverse: evaluate(parameters_of(S(u, v))) == S(u, v)
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn surface_inverse_recovers_point(
        surface in arb_surface(),
        u in 0.0f64..6.2,
        v in 0.1f64..1.4,
    ) {
        let p = surface.evaluate(u, v);
        let (pu, pv) = surface.parameters_of(&p).unwrap();
        let back = surface.evaluate(pu, pv);
        prop_assert!(back.distance_to(&p) < TOL * (1.0 + p.to_vec3().length()),
            "{} inverse drifted: {:?} -> {:?}", surface.surface_type_name(), p, back);
    }
}

// ---------------------------------------------------------------------------
// 2. Parameterization orientation: du x dv agrees with normal_at
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn surface_normal_matches_derivative_cross(
        surface in arb_surface(),
        u in 0.0f64..6.2,
        v in 0.1f64..1.4,
    ) {
        let (du, dv) = surface.derivatives(u, v);
        if let Some(cross) = du.cross(&dv).normalized() {
            let n = surface.normal_at(u, v);
            prop_assert!(cross.dot(&n) > 1.0 - 1e-9, "normal {:?} vs du x dv {:?}", n, cross);
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Knot vectors survive compression into (multiplicity, value) pairs
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn knot_compression_roundtrip(
        steps in prop::collection::vec((0.0f64..3.0, 1usize..4), 1..8),
    ) {
        let mut knots = Vec::new();
        let mut value = 0.0;
        for (step, mult) in steps {
            value += step.max(0.01);
            knots.extend(std::iter::repeat(value).take(mult));
        }
        let (mults, values) = compress_knots(&knots);
        prop_assert_eq!(mults.iter().sum::<usize>(), knots.len());
        prop_assert_eq!(expand_knots(&mults, &values), knots);
    }
}

// ---------------------------------------------------------------------------
// 4. Transform inverse roundtrip: T^{-1}(T(p)) == p
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn transform_inverse_roundtrip(
        (px, py, pz) in arb_point(),
        (tx, ty, tz) in arb_point(),
        axis in arb_axis(),
        angle in arb_angle(),
    ) {
        let p = Point3d::new(px, py, pz);
        let t = Transform::translation(tx, ty, tz).then(&Transform::rotation_axis_angle(axis, angle));
        let inv = t.inverse().unwrap();
        let roundtrip = inv.transform_point(&t.transform_point(&p));
        prop_assert!(roundtrip.distance_to(&p) < TOL, "roundtrip {:?} != {:?}", roundtrip, p);
        prop_assert!((t.scale_factor() - 1.0).abs() < 1e-9);
    }
}

// ---------------------------------------------------------------------------
// 5. Box Euler formula: for any valid box dimensions, V - E + F = 2
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn box_euler_formula(
        (ox, oy, oz) in arb_point(),
        dx in arb_positive_dim(),
        dy in arb_positive_dim(),
        dz in arb_positive_dim(),
    ) {
        let mut store = EntityStore::new();
        let solid_id = make_box(&mut store, ox, oy, oz, ox + dx, oy + dy, oz + dz).unwrap();

        let shell_id = store.solids[solid_id].shells[0];
        let (v, e, f) = store.count_topology(shell_id);
        prop_assert_eq!((v, e, f), (8, 12, 6));
        for l in store.loops.keys() {
            prop_assert!(store.is_loop_closed(l));
        }
    }
}

// ---------------------------------------------------------------------------
// 6. Shape bounding box contains every vertex of the box
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn shape_bounding_box_contains_vertices(
        (ox, oy, oz) in arb_point(),
        dx in arb_positive_dim(),
        dy in arb_positive_dim(),
        dz in arb_positive_dim(),
    ) {
        let mut store = EntityStore::new();
        let solid = make_box(&mut store, ox, oy, oz, ox + dx, oy + dy, oz + dz).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let bb = shape.bounding_box();
        let expected = BoundingBox::new(Point3d::new(ox, oy, oz), Point3d::new(ox + dx, oy + dy, oz + dz));
        for vertex in shape.store().vertices.values() {
            prop_assert!(bb.contains_point(&vertex.point, TOL));
        }
        prop_assert!((bb.max_dimension() - expected.max_dimension()).abs() < TOL);
    }
}

// ---------------------------------------------------------------------------
// 7. Cylinder lateral face always spans exactly one turn and its height
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn cylinder_side_uv_bounds(
        (ox, oy, oz) in arb_point(),
        radius in arb_positive_dim(),
        height in arb_positive_dim(),
    ) {
        let mut store = EntityStore::new();
        let solid = make_cylinder(&mut store, Point3d::new(ox, oy, oz), radius, height).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let side = shape
            .faces()
            .find(|&f| matches!(shape.face(f).map(|f| &f.surface), Some(Surface::Cylinder(_))))
            .unwrap();
        let b = shape.face_uv_bounds(side).unwrap();
        prop_assert!((b.width() - std::f64::consts::TAU).abs() < 1e-6, "u width {}", b.width());
        prop_assert!((b.height() - height).abs() < 1e-6 * height.max(1.0), "v height {}", b.height());
    }
}
