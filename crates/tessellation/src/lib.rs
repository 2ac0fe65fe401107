use part_kernel::geometry::point::{Point2d, Point3d};
use part_kernel::geometry::surfaces::{Surface, UvBounds};
use part_kernel::geometry::vector::Vec3;
use part_kernel::topology::brep::*;
use part_kernel::Shape;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// A triangle mesh with per-vertex normals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Vertex positions [x, y, z, x, y, z, ...]
    pub positions: Vec<f32>,
    /// Vertex normals [nx, ny, nz, ...]
    pub normals: Vec<f32>,
    /// Triangle indices [i0, i1, i2, ...]
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn add_vertex(&mut self, pos: Point3d, normal: Vec3) -> u32 {
        let idx = self.vertex_count() as u32;
        self.positions.push(pos.x as f32);
        self.positions.push(pos.y as f32);
        self.positions.push(pos.z as f32);
        self.normals.push(normal.x as f32);
        self.normals.push(normal.y as f32);
        self.normals.push(normal.z as f32);
        idx
    }

    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
    }

    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.vertex_count() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        for &idx in &other.indices {
            self.indices.push(idx + offset);
        }
    }

    pub fn position(&self, index: u32) -> [f32; 3] {
        let i = index as usize * 3;
        [self.positions[i], self.positions[i + 1], self.positions[i + 2]]
    }

    /// Corner positions of triangle `t`.
    pub fn triangle(&self, t: usize) -> [[f32; 3]; 3] {
        let i = t * 3;
        [
            self.position(self.indices[i]),
            self.position(self.indices[i + 1]),
            self.position(self.indices[i + 2]),
        ]
    }

    /// Unit normal from the triangle's winding; zero for degenerate triangles.
    pub fn facet_normal(&self, t: usize) -> [f32; 3] {
        let [a, b, c] = self.triangle(t).map(|p| Vec3::new(p[0] as f64, p[1] as f64, p[2] as f64));
        let n = (b - a).cross(&(c - a)).normalized_or(Vec3::ZERO);
        [n.x as f32, n.y as f32, n.z as f32]
    }
}

/// Controls how finely curved faces are subdivided.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TessellationConfig {
    /// Maximum distance between a grid cell's chord midpoint and the surface.
    pub tolerance: f64,
    pub min_divisions: usize,
    pub max_divisions: usize,
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            min_divisions: 4,
            max_divisions: 128,
        }
    }
}

impl TessellationConfig {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }
}

/// Tessellate every face of `shape` into one mesh, in face explorer order.
#[instrument(skip(shape, config), fields(faces = shape.face_count()))]
pub fn tessellate_shape(shape: &Shape, config: &TessellationConfig) -> TriangleMesh {
    let mut mesh = TriangleMesh::new();
    for face_id in shape.faces() {
        mesh.merge(&tessellate_face(shape, face_id, config));
    }
    info!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "tessellated shape"
    );
    mesh
}

/// Tessellate a single face. Triangles wind counter-clockwise around the
/// face normal (the surface normal, flipped for reversed faces).
pub fn tessellate_face(shape: &Shape, face_id: FaceId, config: &TessellationConfig) -> TriangleMesh {
    let Some(face) = shape.face(face_id) else {
        return TriangleMesh::new();
    };
    let store = shape.store();
    let seams = store.seam_edges(face_id);

    let mesh = match &face.surface {
        Surface::Plane(_) if face.inner_loops.is_empty() && seams.is_empty() => tessellate_planar_face(shape, face_id),
        _ => {
            let Some(bounds) = shape.face_uv_bounds(face_id) else {
                debug!(?face_id, "face has no usable parameter bounds");
                return TriangleMesh::new();
            };
            let trim = match &face.surface {
                Surface::Nurbs(_) => None,
                _ if !seams.is_empty() => None,
                surface => Some(uv_loops(shape, face, surface, &bounds)),
            };
            tessellate_uv_grid(store, face_id, &bounds, trim.as_deref(), config)
        }
    };
    debug!(
        ?face_id,
        surface = face.surface.surface_type_name(),
        triangles = mesh.triangle_count(),
        "tessellated face"
    );
    mesh
}

/// Ear clipping of the face boundary in the plane's own coordinates.
fn tessellate_planar_face(shape: &Shape, face_id: FaceId) -> TriangleMesh {
    let store = shape.store();
    let face = &store.faces[face_id];
    let mut mesh = TriangleMesh::new();
    let Surface::Plane(plane) = &face.surface else {
        return mesh;
    };

    let mut points = shape.loop_points(face.outer_loop);
    let mut uv: Vec<Point2d> = points
        .iter()
        .map(|p| {
            let (u, v) = plane.parameters_of(p);
            Point2d::new(u, v)
        })
        .collect();
    simplify_polygon(&mut points, &mut uv);
    if uv.len() < 3 {
        return mesh;
    }

    let normal = store.face_normal(face_id, 0.0, 0.0);
    let base: Vec<u32> = points.iter().map(|p| mesh.add_vertex(*p, normal)).collect();
    for [a, b, c] in ear_clip(&uv) {
        push_oriented(&mut mesh, &points, normal, [a, b, c], &base);
    }
    mesh
}

fn tessellate_uv_grid(
    store: &EntityStore,
    face_id: FaceId,
    bounds: &UvBounds,
    trim: Option<&[Vec<Point2d>]>,
    config: &TessellationConfig,
) -> TriangleMesh {
    let surface = &store.faces[face_id].surface;
    let (nu, nv) = grid_divisions(surface, bounds, config);
    let mut mesh = TriangleMesh::new();

    let mut points = Vec::with_capacity((nu + 1) * (nv + 1));
    let mut normals = Vec::with_capacity(points.capacity());
    for i in 0..=nu {
        for j in 0..=nv {
            let (u, v) = bounds.lerp(i as f64 / nu as f64, j as f64 / nv as f64);
            points.push(surface.evaluate(u, v));
            normals.push(store.face_normal(face_id, u, v));
        }
    }
    let base: Vec<u32> = points
        .iter()
        .zip(&normals)
        .map(|(p, n)| mesh.add_vertex(*p, *n))
        .collect();

    let index = |i: usize, j: usize| i * (nv + 1) + j;
    for i in 0..nu {
        for j in 0..nv {
            let (uc, vc) = bounds.lerp((i as f64 + 0.5) / nu as f64, (j as f64 + 0.5) / nv as f64);
            if let Some(loops) = trim {
                if !point_in_loops(Point2d::new(uc, vc), loops) {
                    continue;
                }
            }
            let normal = store.face_normal(face_id, uc, vc);
            let (a, b, c, d) = (index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1));
            push_oriented(&mut mesh, &points, normal, [a, b, c], &base);
            push_oriented(&mut mesh, &points, normal, [a, c, d], &base);
        }
    }
    mesh
}

/// Double the grid in each direction until chord midpoints stay within tolerance.
fn grid_divisions(surface: &Surface, bounds: &UvBounds, config: &TessellationConfig) -> (usize, usize) {
    let min = config.min_divisions.max(1);
    let max = config.max_divisions.max(min);
    let (mut nu, mut nv) = (min, min);

    if let Surface::Plane(_) = surface {
        return (nu, nv);
    }
    while nu < max && chord_deviation(surface, bounds, nu, nv, true) > config.tolerance {
        nu = (nu * 2).min(max);
    }
    while nv < max && chord_deviation(surface, bounds, nu, nv, false) > config.tolerance {
        nv = (nv * 2).min(max);
    }
    (nu, nv)
}

fn chord_deviation(surface: &Surface, bounds: &UvBounds, nu: usize, nv: usize, along_u: bool) -> f64 {
    let (steps, across) = if along_u { (nu, nv) } else { (nv, nu) };
    let mut worst: f64 = 0.0;
    for k in 0..=across {
        let s = k as f64 / across as f64;
        for i in 0..steps {
            let t0 = i as f64 / steps as f64;
            let t1 = (i + 1) as f64 / steps as f64;
            let at = |t: f64| {
                let (u, v) = if along_u { bounds.lerp(t, s) } else { bounds.lerp(s, t) };
                surface.evaluate(u, v)
            };
            let chord_mid = at(t0).midpoint(&at(t1));
            worst = worst.max(chord_mid.distance_to(&at((t0 + t1) / 2.0)));
        }
    }
    worst
}

/// Append triangle `tri` wound to agree with `normal`; degenerate triangles are dropped.
fn push_oriented(mesh: &mut TriangleMesh, points: &[Point3d], normal: Vec3, tri: [usize; 3], base: &[u32]) {
    let [a, b, c] = tri;
    let cross = (points[b] - points[a]).cross(&(points[c] - points[a]));
    if cross.length_squared() < 1e-24 {
        return;
    }
    if cross.dot(&normal) >= 0.0 {
        mesh.add_triangle(base[a], base[b], base[c]);
    } else {
        mesh.add_triangle(base[a], base[c], base[b]);
    }
}

/// Boundary loops of a face in parameter space, shifted into `bounds`
/// along periodic directions.
fn uv_loops(shape: &Shape, face: &Face, surface: &Surface, bounds: &UvBounds) -> Vec<Vec<Point2d>> {
    std::iter::once(face.outer_loop)
        .chain(face.inner_loops.iter().copied())
        .map(|loop_id| {
            let mut prev: Option<(f64, f64)> = None;
            let mut uv: Vec<Point2d> = shape
                .loop_points(loop_id)
                .iter()
                .filter_map(|p| surface.parameters_of(p))
                .map(|(mut u, mut v)| {
                    if let Some((pu, pv)) = prev {
                        u = unwrap_near(u, pu, surface.u_period());
                        v = unwrap_near(v, pv, surface.v_period());
                    }
                    prev = Some((u, v));
                    Point2d::new(u, v)
                })
                .collect();
            if let (Some(period), Some(first)) = (surface.u_period(), uv.first()) {
                let shift = unwrap_near(first.x, bounds.u_min + bounds.width() / 2.0, Some(period)) - first.x;
                uv.iter_mut().for_each(|p| p.x += shift);
            }
            uv
        })
        .collect()
}

fn unwrap_near(value: f64, reference: f64, period: Option<f64>) -> f64 {
    match period {
        Some(period) => value - ((value - reference) / period).round() * period,
        None => value,
    }
}

/// Even-odd containment against all loops.
fn point_in_loops(p: Point2d, loops: &[Vec<Point2d>]) -> bool {
    let mut inside = false;
    for ring in loops {
        let n = ring.len();
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
    }
    inside
}

fn signed_area(poly: &[Point2d]) -> f64 {
    let n = poly.len();
    (0..n)
        .map(|i| {
            let (a, b) = (poly[i], poly[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

fn cross2(a: Point2d, b: Point2d, c: Point2d) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Drop repeated and collinear boundary samples, keeping the 3D points in step.
fn simplify_polygon(points: &mut Vec<Point3d>, uv: &mut Vec<Point2d>) {
    let scale = uv.iter().fold(0.0f64, |m, p| m.max(p.x.abs()).max(p.y.abs())).max(1.0);
    let eps = 1e-12 * scale * scale;
    let mut changed = true;
    while changed && uv.len() > 3 {
        changed = false;
        let n = uv.len();
        for i in 0..n {
            let prev = uv[(i + n - 1) % n];
            let next = uv[(i + 1) % n];
            if uv[i].distance_to(&next) * uv[i].distance_to(&next) < eps || cross2(prev, uv[i], next).abs() < eps {
                uv.remove(i);
                points.remove(i);
                changed = true;
                break;
            }
        }
    }
}

fn point_in_triangle(p: Point2d, a: Point2d, b: Point2d, c: Point2d) -> bool {
    let d1 = cross2(a, b, p);
    let d2 = cross2(b, c, p);
    let d3 = cross2(c, a, p);
    d1 > 0.0 && d2 > 0.0 && d3 > 0.0
}

/// Ear-clipping triangulation of a simple polygon; triangles are returned
/// counter-clockwise in the polygon's coordinates.
fn ear_clip(poly: &[Point2d]) -> Vec<[usize; 3]> {
    let n = poly.len();
    let mut triangles = Vec::with_capacity(n.saturating_sub(2));
    if n < 3 {
        return triangles;
    }
    let mut remaining: Vec<usize> = (0..n).collect();
    if signed_area(poly) < 0.0 {
        remaining.reverse();
    }

    while remaining.len() > 3 {
        let m = remaining.len();
        let ear = (0..m).find(|&k| {
            let (a, b, c) = (remaining[(k + m - 1) % m], remaining[k], remaining[(k + 1) % m]);
            cross2(poly[a], poly[b], poly[c]) > 0.0
                && !remaining
                    .iter()
                    .any(|&o| o != a && o != b && o != c && point_in_triangle(poly[o], poly[a], poly[b], poly[c]))
        });
        let Some(k) = ear else {
            // Self-overlapping input: fan what is left.
            break;
        };
        triangles.push([remaining[(k + m - 1) % m], remaining[k], remaining[(k + 1) % m]]);
        remaining.remove(k);
    }
    for k in 1..remaining.len() - 1 {
        triangles.push([remaining[0], remaining[k], remaining[k + 1]]);
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use part_kernel::topology::primitives::{make_box, make_cylinder, make_polygon_face, make_sphere};

    fn to_vec3(p: [f32; 3]) -> Vec3 {
        Vec3::new(p[0] as f64, p[1] as f64, p[2] as f64)
    }

    fn vertex_normal(mesh: &TriangleMesh, index: usize) -> Vec3 {
        to_vec3([mesh.normals[3 * index], mesh.normals[3 * index + 1], mesh.normals[3 * index + 2]])
    }

    fn triangle_area(mesh: &TriangleMesh, t: usize) -> f64 {
        let [a, b, c] = mesh.triangle(t).map(to_vec3);
        (b - a).cross(&(c - a)).length() / 2.0
    }

    fn centroid(mesh: &TriangleMesh, t: usize) -> Point3d {
        let [a, b, c] = mesh.triangle(t);
        Point3d::new(
            (a[0] + b[0] + c[0]) as f64 / 3.0,
            (a[1] + b[1] + c[1]) as f64 / 3.0,
            (a[2] + b[2] + c[2]) as f64 / 3.0,
        )
    }

    #[test]
    fn test_tessellate_box() {
        let mut store = EntityStore::new();
        let solid_id = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid_id]);

        let mesh = tessellate_shape(&shape, &TessellationConfig::default());
        // Each face of a box has 2 triangles, 6 faces = 12 triangles
        assert_eq!(mesh.triangle_count(), 12);
        let area: f64 = (0..mesh.triangle_count()).map(|t| triangle_area(&mesh, t)).sum();
        assert_abs_diff_eq!(area, 6.0, epsilon = 1e-5);

        let center = Point3d::new(0.5, 0.5, 0.5);
        for t in 0..mesh.triangle_count() {
            let n = mesh.facet_normal(t);
            let out = centroid(&mesh, t) - center;
            assert!(out.dot(&to_vec3(n)) > 0.0);
        }
    }

    #[test]
    fn test_concave_polygon_area() {
        let mut store = EntityStore::new();
        let l_shape = [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(2.0, 0.0, 0.0),
            Point3d::new(2.0, 1.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(1.0, 2.0, 0.0),
            Point3d::new(0.0, 2.0, 0.0),
        ];
        let solid = make_polygon_face(&mut store, &l_shape).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let mesh = tessellate_shape(&shape, &TessellationConfig::default());
        assert_eq!(mesh.triangle_count(), 4);
        let area: f64 = (0..mesh.triangle_count()).map(|t| triangle_area(&mesh, t)).sum();
        assert_abs_diff_eq!(area, 3.0, epsilon = 1e-6);
        for t in 0..mesh.triangle_count() {
            assert_abs_diff_eq!(to_vec3(mesh.facet_normal(t)), Vec3::Z, epsilon = 1e-6);
        }
        for i in 0..mesh.vertex_count() {
            assert_abs_diff_eq!(vertex_normal(&mesh, i), Vec3::Z, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cylinder_triangles_face_outward() {
        let mut store = EntityStore::new();
        let solid = make_cylinder(&mut store, Point3d::ORIGIN, 1.0, 2.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let mesh = tessellate_shape(&shape, &TessellationConfig::with_tolerance(0.005));
        assert!(mesh.triangle_count() > 12);

        for t in 0..mesh.triangle_count() {
            let c = centroid(&mesh, t);
            let [nx, ny, nz] = mesh.facet_normal(t);
            if nz.abs() > 0.9 {
                // Caps.
                assert!((c.z - 1.0) * nz as f64 > 0.0);
            } else {
                assert!(c.x * nx as f64 + c.y * ny as f64 > 0.0);
            }
        }
    }

    #[test]
    fn test_sphere_mesh_lies_on_surface() {
        let mut store = EntityStore::new();
        let solid = make_sphere(&mut store, Point3d::ORIGIN, 3.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let config = TessellationConfig::with_tolerance(0.01);
        let mesh = tessellate_shape(&shape, &config);
        assert!(!mesh.is_empty());

        for i in 0..mesh.vertex_count() {
            let p = to_vec3(mesh.position(i as u32));
            assert_abs_diff_eq!(p.length(), 3.0, epsilon = 1e-5);
            // Vertex normals are radial on a sphere.
            assert_abs_diff_eq!(vertex_normal(&mesh, i), p / 3.0, epsilon = 1e-5);
        }
        for t in 0..mesh.triangle_count() {
            let n = mesh.facet_normal(t);
            let c = centroid(&mesh, t);
            assert!(c.x * n[0] as f64 + c.y * n[1] as f64 + c.z * n[2] as f64 > 0.0);
            assert!(c.to_vec3().length() > 3.0 - 2.0 * config.tolerance);
        }
    }

    #[test]
    fn test_ear_clip_keeps_winding() {
        let square = [
            Point2d::new(0.0, 0.0),
            Point2d::new(0.0, 1.0),
            Point2d::new(1.0, 1.0),
            Point2d::new(1.0, 0.0),
        ];
        let tris = ear_clip(&square);
        assert_eq!(tris.len(), 2);
        for [a, b, c] in tris {
            assert!(cross2(square[a], square[b], square[c]) > 0.0);
        }
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut a = TriangleMesh::new();
        for p in [Point3d::ORIGIN, Point3d::new(1.0, 0.0, 0.0), Point3d::new(0.0, 1.0, 0.0)] {
            a.add_vertex(p, Vec3::Z);
        }
        a.add_triangle(0, 1, 2);
        let mut merged = a.clone();
        merged.merge(&a);
        assert_eq!(merged.triangle_count(), 2);
        assert_eq!(&merged.indices[3..], &[3, 4, 5]);
        assert_abs_diff_eq!(to_vec3(merged.facet_normal(1)), Vec3::Z, epsilon = 1e-12);
    }
}
