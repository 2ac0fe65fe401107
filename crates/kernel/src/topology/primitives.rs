use std::collections::HashMap;
use std::f64::consts::TAU;

use tracing::{info, instrument};

use super::brep::*;
use crate::error::GeometryError;
use crate::geometry::curves::{Circle3d, Curve, Line3d};
use crate::geometry::nurbs::{NurbsCurve, NurbsSurface};
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::{Cylinder, Plane, Sphere, Surface};
use crate::geometry::vector::Vec3;

/// Build a box solid directly from corner coordinates.
/// The box is axis-aligned with one corner at (x0,y0,z0) and opposite at (x1,y1,z1).
#[instrument(skip(store))]
pub fn make_box(
    store: &mut EntityStore,
    x0: f64,
    y0: f64,
    z0: f64,
    x1: f64,
    y1: f64,
    z1: f64,
) -> Result<SolidId, GeometryError> {
    info!(min = ?[x0, y0, z0], max = ?[x1, y1, z1], "creating box primitive");
    let v = [
        Point3d::new(x0, y0, z0),
        Point3d::new(x1, y0, z0),
        Point3d::new(x1, y1, z0),
        Point3d::new(x0, y1, z0),
        Point3d::new(x0, y0, z1),
        Point3d::new(x1, y0, z1),
        Point3d::new(x1, y1, z1),
        Point3d::new(x0, y1, z1),
    ];
    let vertex_ids: Vec<VertexId> = v.iter().map(|p| store.add_vertex(*p)).collect();

    let solid_id = store.add_solid();
    let shell_id = store.add_shell(solid_id, ShellOrientation::Outward, true);

    // Counter-clockwise seen from outside.
    let face_defs: [([usize; 4], Vec3); 6] = [
        ([0, 3, 2, 1], -Vec3::Z),
        ([4, 5, 6, 7], Vec3::Z),
        ([0, 4, 7, 3], -Vec3::X),
        ([1, 2, 6, 5], Vec3::X),
        ([0, 1, 5, 4], -Vec3::Y),
        ([3, 7, 6, 2], Vec3::Y),
    ];

    let mut edges: HashMap<(usize, usize), EdgeId> = HashMap::new();

    for (corners, normal) in face_defs {
        let center = v[corners[0]].midpoint(&v[corners[2]]);
        let u_dir = v[corners[1]] - v[corners[0]];
        let face_id = store.add_face(shell_id, Surface::Plane(Plane::with_axes(center, normal, u_dir)), true);
        let loop_id = store.faces[face_id].outer_loop;

        for k in 0..4 {
            let (a, b) = (corners[k], corners[(k + 1) % 4]);
            let key = (a.min(b), a.max(b));
            let edge_id = match edges.get(&key) {
                Some(&id) => id,
                None => {
                    let line = Line3d::from_points(v[a], v[b])?;
                    let id = store.add_edge(Curve::Line(line), vertex_ids[a], vertex_ids[b]);
                    edges.insert(key, id);
                    id
                }
            };
            let forward = store.edges[edge_id].start_vertex == vertex_ids[a];
            store.push_half_edge(loop_id, edge_id, forward);
        }
    }

    Ok(solid_id)
}

/// Build an exact cylinder solid standing on `center` along +Z.
///
/// Two circular cap edges and one seam line; the lateral face is a single
/// cylindrical face whose loop uses the seam twice.
#[instrument(skip(store, center), fields(center = ?[center.x, center.y, center.z]))]
pub fn make_cylinder(
    store: &mut EntityStore,
    center: Point3d,
    radius: f64,
    height: f64,
) -> Result<SolidId, GeometryError> {
    info!(radius, height, "creating cylinder primitive");
    if radius <= 0.0 {
        return Err(GeometryError::InvalidRadius(radius));
    }
    let top_center = center + Vec3::Z * height;
    let bottom_start = center + Vec3::X * radius;
    let top_start = top_center + Vec3::X * radius;

    let vb = store.add_vertex(bottom_start);
    let vt = store.add_vertex(top_start);

    let bottom_circle = Circle3d::with_axes(center, Vec3::Z, Vec3::X, radius);
    let top_circle = Circle3d::with_axes(top_center, Vec3::Z, Vec3::X, radius);
    let e_bottom = store.add_edge_with_range(Curve::Circle(bottom_circle), vb, vb, (0.0, TAU));
    let e_top = store.add_edge_with_range(Curve::Circle(top_circle), vt, vt, (0.0, TAU));
    let e_seam = store.add_edge(Curve::Line(Line3d::from_points(bottom_start, top_start)?), vb, vt);

    let solid_id = store.add_solid();
    let shell_id = store.add_shell(solid_id, ShellOrientation::Outward, true);

    let bottom = store.add_face(shell_id, Surface::Plane(Plane::with_axes(center, -Vec3::Z, Vec3::X)), true);
    let bottom_loop = store.faces[bottom].outer_loop;
    store.push_half_edge(bottom_loop, e_bottom, false);

    let top = store.add_face(shell_id, Surface::Plane(Plane::with_axes(top_center, Vec3::Z, Vec3::X)), true);
    let top_loop = store.faces[top].outer_loop;
    store.push_half_edge(top_loop, e_top, true);

    let side_surface = Surface::Cylinder(Cylinder::with_axes(center, Vec3::Z, Vec3::X, radius));
    let side = store.add_face(shell_id, side_surface, true);
    let side_loop = store.faces[side].outer_loop;
    store.push_half_edge(side_loop, e_bottom, true);
    store.push_half_edge(side_loop, e_seam, true);
    store.push_half_edge(side_loop, e_top, false);
    store.push_half_edge(side_loop, e_seam, false);

    Ok(solid_id)
}

/// Build a sphere solid with one face closed through a meridian seam.
#[instrument(skip(store, center), fields(center = ?[center.x, center.y, center.z]))]
pub fn make_sphere(store: &mut EntityStore, center: Point3d, radius: f64) -> Result<SolidId, GeometryError> {
    info!(radius, "creating sphere primitive");
    if radius <= 0.0 {
        return Err(GeometryError::InvalidRadius(radius));
    }
    let south = store.add_vertex(center - Vec3::Z * radius);
    let north = store.add_vertex(center + Vec3::Z * radius);
    let meridian = Circle3d::with_axes(center, -Vec3::Y, Vec3::X, radius);
    let seam = store.add_edge(Curve::Circle(meridian), south, north);

    let solid_id = store.add_solid();
    let shell_id = store.add_shell(solid_id, ShellOrientation::Outward, true);
    let face = store.add_face(shell_id, Surface::Sphere(Sphere::new(center, radius)), true);
    let loop_id = store.faces[face].outer_loop;
    store.push_half_edge(loop_id, seam, true);
    store.push_half_edge(loop_id, seam, false);

    Ok(solid_id)
}

/// Build a single planar face (an open sheet) bounded by a closed polygon.
#[instrument(skip(store, points), fields(corners = points.len()))]
pub fn make_polygon_face(store: &mut EntityStore, points: &[Point3d]) -> Result<SolidId, GeometryError> {
    if points.len() < 3 {
        return Err(GeometryError::TooFewControlPoints {
            degree: 1,
            count: points.len(),
        });
    }
    // Newell's method keeps the normal consistent with the winding.
    let mut normal = Vec3::ZERO;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    let normal = normal.normalized().ok_or(GeometryError::DegenerateDirection)?;

    let vertex_ids: Vec<VertexId> = points.iter().map(|p| store.add_vertex(*p)).collect();
    let solid_id = store.add_solid();
    let shell_id = store.add_shell(solid_id, ShellOrientation::Outward, false);
    let plane = Plane::with_axes(points[0], normal, points[1] - points[0]);
    let face = store.add_face(shell_id, Surface::Plane(plane), true);
    let loop_id = store.faces[face].outer_loop;

    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        let line = Line3d::from_points(points[i], points[j])?;
        let edge = store.add_edge(Curve::Line(line), vertex_ids[i], vertex_ids[j]);
        store.push_half_edge(loop_id, edge, true);
    }

    Ok(solid_id)
}

/// Build a single face covering the whole domain of a NURBS surface, with
/// its four iso-boundaries as edges.
#[instrument(skip(store, surface), fields(num_u = surface.num_u, num_v = surface.num_v))]
pub fn make_nurbs_face(store: &mut EntityStore, surface: NurbsSurface) -> Result<SolidId, GeometryError> {
    let solid_id = store.add_solid();
    let shell_id = store.add_shell(solid_id, ShellOrientation::Outward, false);
    add_nurbs_face(store, shell_id, surface);
    Ok(solid_id)
}

/// Add a face bounded by the natural domain of `surface` to an existing shell.
pub fn add_nurbs_face(store: &mut EntityStore, shell: ShellId, surface: NurbsSurface) -> FaceId {
    let (u0, u1) = surface.domain_u();
    let (v0, v1) = surface.domain_v();
    let corners = [
        surface.evaluate(u0, v0),
        surface.evaluate(u1, v0),
        surface.evaluate(u1, v1),
        surface.evaluate(u0, v1),
    ];
    let c: Vec<VertexId> = corners.iter().map(|p| store.add_vertex(*p)).collect();

    let boundary = |curve: NurbsCurve| Curve::Nurbs(curve);
    let bottom = store.add_edge_with_range(boundary(surface.v_boundary(false)), c[0], c[1], (u0, u1));
    let right = store.add_edge_with_range(boundary(surface.u_boundary(true)), c[1], c[2], (v0, v1));
    let top = store.add_edge_with_range(boundary(surface.v_boundary(true)), c[3], c[2], (u0, u1));
    let left = store.add_edge_with_range(boundary(surface.u_boundary(false)), c[0], c[3], (v0, v1));

    let face = store.add_face(shell, Surface::Nurbs(surface), true);
    let loop_id = store.faces[face].outer_loop;
    store.push_half_edge(loop_id, bottom, true);
    store.push_half_edge(loop_id, right, true);
    store.push_half_edge(loop_id, top, false);
    store.push_half_edge(loop_id, left, false);
    face
}
