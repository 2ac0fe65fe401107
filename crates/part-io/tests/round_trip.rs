//! Shapes written to disk and read back through every B-Rep format.

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use part_io::{
    load_part_file, read_brep_file, read_iges_file, read_step_file, write_brep_file, write_iges_file,
    write_iges_file_with, write_step_file, write_step_file_with, IgesUnit, IgesWriteMode, IgesWriterConfig,
    ProgressLog, StepLengthUnit, StepWriterConfig,
};
use part_kernel::geometry::point::Point3d;
use part_kernel::topology::brep::EntityStore;
use part_kernel::topology::primitives::{make_box, make_cylinder};
use part_kernel::Shape;
use part_projection::{PointOnFacesProjection, ProjectionConfig};

fn test_box() -> Shape {
    let mut store = EntityStore::new();
    let solid = make_box(&mut store, -1.0, 0.0, 2.0, 3.0, 1.5, 4.0).unwrap();
    Shape::from_parts(store, vec![solid])
}

fn test_cylinder() -> Shape {
    let mut store = EntityStore::new();
    let solid = make_cylinder(&mut store, Point3d::new(1.0, 2.0, 0.0), 2.5, 4.0).unwrap();
    Shape::from_parts(store, vec![solid])
}

fn surface_kinds(shape: &Shape) -> Vec<&'static str> {
    let mut kinds: Vec<_> = shape
        .faces()
        .map(|f| shape.face(f).unwrap().surface.surface_type_name())
        .collect();
    kinds.sort_unstable();
    kinds
}

/// Every vertex of `expected` has a counterpart in `actual` and the
/// reverse, within `tol`.
fn assert_same_vertices(expected: &Shape, actual: &Shape, tol: f64) {
    let points = |s: &Shape| s.store().vertices.values().map(|v| v.point).collect::<Vec<Point3d>>();
    let (a, b) = (points(expected), points(actual));
    for p in &a {
        assert!(b.iter().any(|q| q.distance_to(p) < tol), "missing vertex {p:?}");
    }
    for q in &b {
        assert!(a.iter().any(|p| p.distance_to(q) < tol), "unexpected vertex {q:?}");
    }
}

fn assert_equivalent(expected: &Shape, actual: &Shape, tol: f64) {
    assert_eq!(actual.face_count(), expected.face_count());
    assert_eq!(surface_kinds(actual), surface_kinds(expected));
    assert_same_vertices(expected, actual, tol);
    let (e, a) = (expected.bounding_box(), actual.bounding_box());
    // Boxes are sampled along edges, so allow for a moved seam.
    assert_abs_diff_eq!(e.min, a.min, epsilon = 1e-6);
    assert_abs_diff_eq!(e.max, a.max, epsilon = 1e-6);
}

fn temp_path(dir: &TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn test_brep_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    for (name, shape) in [("box.brep", test_box()), ("cylinder.brep", test_cylinder())] {
        let path = temp_path(&dir, name);
        write_brep_file(&shape, &path, None).unwrap();
        let back = read_brep_file(&path, None).unwrap();
        assert_eq!(back.solids(), shape.solids());
        let (a, b) = (shape.store(), back.store());
        assert_eq!(b.half_edges.len(), a.half_edges.len());
        for (id, vertex) in &a.vertices {
            assert_eq!(b.vertices.get(id), Some(vertex));
        }
        for (id, edge) in &a.edges {
            assert_eq!(b.edges.get(id), Some(edge));
        }
        for (id, half_edge) in &a.half_edges {
            assert_eq!(b.half_edges.get(id), Some(half_edge));
        }
    }
}

#[test]
fn test_step_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for (name, shape) in [("box.step", test_box()), ("cylinder.stp", test_cylinder())] {
        let path = temp_path(&dir, name);
        let mut log = ProgressLog::new();
        write_step_file(&shape, &path, Some(&mut log)).unwrap();
        assert_eq!(log.scope_names(), vec!["Writing file"]);

        let mut log = ProgressLog::new();
        let back = read_step_file(&path, Some(&mut log)).unwrap();
        assert_eq!(log.scope_names(), vec!["Loading file", "Translating file"]);
        assert!(log.is_balanced());
        assert_equivalent(&shape, &back, 1e-9);
        let shell = back.store().shells.values().next().unwrap();
        assert!(shell.closed);
    }
}

#[test]
fn test_step_metre_output_reads_back_in_millimetres() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "box_m.step");
    let shape = test_box();
    let config = StepWriterConfig::default().with_length_unit(StepLengthUnit::Metre);
    write_step_file_with(&shape, &path, &config, None).unwrap();
    let back = read_step_file(&path, None).unwrap();
    assert_equivalent(&shape, &back, 1e-9);
}

#[test]
fn test_iges_faces_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for (name, shape) in [("box.igs", test_box()), ("cylinder.iges", test_cylinder())] {
        let path = temp_path(&dir, name);
        write_iges_file(&shape, &path, None).unwrap();
        let back = read_iges_file(&path, None).unwrap();
        assert_equivalent(&shape, &back, 1e-9);
        let store = back.store();
        assert!(store.loops.keys().all(|l| store.is_loop_closed(l)));
        // Trimmed surfaces come back as one open sheet.
        assert_eq!(back.solids().len(), 1);
        assert!(store.shells.values().all(|s| !s.closed));
    }
}

#[test]
fn test_iges_brep_round_trip_shares_edges() {
    let dir = tempfile::tempdir().unwrap();
    let config = IgesWriterConfig::default().with_mode(IgesWriteMode::BRep);
    for (name, shape, edges) in [("box.igs", test_box(), 12), ("cylinder.igs", test_cylinder(), 3)] {
        let path = temp_path(&dir, name);
        write_iges_file_with(&shape, &path, &config, None).unwrap();
        let back = read_iges_file(&path, None).unwrap();
        assert_equivalent(&shape, &back, 1e-9);
        let store = back.store();
        assert_eq!(store.edges.len(), edges);
        let shell = store.shells.values().next().unwrap();
        assert!(shell.closed);
        assert!(store.loops.keys().all(|l| store.is_loop_closed(l)));
        assert!(store.half_edges.values().all(|he| store.half_edges.contains_key(he.twin)));
    }
}

#[test]
fn test_iges_inch_units_read_back_in_millimetres() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "box_in.igs");
    let shape = test_box();
    let config = IgesWriterConfig::default().with_unit(IgesUnit::Inch);
    write_iges_file_with(&shape, &path, &config, None).unwrap();
    let back = read_iges_file(&path, None).unwrap();
    assert_equivalent(&shape, &back, 1e-9);
}

#[test]
fn test_loaded_shape_projects_like_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "cylinder.step");
    let shape = test_cylinder();
    write_step_file(&shape, &path, None).unwrap();
    let back = load_part_file(&path);

    let query = Point3d::new(6.0, 2.0, 1.5);
    let mut original = PointOnFacesProjection::with_shape(&shape);
    let mut loaded = PointOnFacesProjection::with_shape(&back);
    assert!(original.compute(&query).is_done());
    assert!(loaded.compute(&query).is_done());
    assert_abs_diff_eq!(original.solution_point(), loaded.solution_point(), epsilon = 1e-7);
    // The bottom cap's plane passes under the query point.
    assert_abs_diff_eq!(loaded.solution_point(), Point3d::new(6.0, 2.0, 0.0), epsilon = 1e-7);

    let mut bounded = PointOnFacesProjection::with_config(ProjectionConfig::face_bounded());
    bounded.prepare(&back);
    assert!(bounded.compute(&query).is_done());
    assert_abs_diff_eq!(bounded.solution_point(), Point3d::new(3.5, 2.0, 1.5), epsilon = 1e-7);
}

#[test]
fn test_load_failures_give_empty_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "garbage.igs");
    std::fs::write(&path, "not an iges file\n").unwrap();
    assert!(load_part_file(&path).is_empty());

    let mut log = ProgressLog::new();
    let shape = part_io::load_brep_file(temp_path(&dir, "missing.brep"), Some(&mut log));
    assert!(shape.is_empty());
    assert_eq!(log.scope_names(), vec!["Loading file"]);
}
