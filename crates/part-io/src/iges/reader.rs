//! Translation of IGES entities into a [`Shape`].
//!
//! Two representations are understood: MSBO solids built from the 186/514/
//! 510/508/504/502 family, and loose trimmed surfaces (144 over 142
//! boundaries, or bare 128 patches). Loose surfaces are gathered into one
//! open shell.

use std::collections::{HashMap, HashSet};

use part_kernel::geometry::curves::{Circle3d, Curve, Ellipse3d, Line3d};
use part_kernel::geometry::nurbs::{NurbsCurve, NurbsSurface};
use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::{Cone, Cylinder, Plane, Sphere, Surface, Torus};
use part_kernel::geometry::transform::Transform;
use part_kernel::geometry::vector::Vec3;
use part_kernel::topology::brep::{EdgeId, EntityStore, FaceId, LoopId, ShellId, ShellOrientation, SolidId, VertexId};
use part_kernel::topology::primitives::add_nurbs_face;
use part_kernel::{GeometryError, Shape};
use tracing::{debug, warn};

use crate::errors::IgesError;

use super::record::{DirectoryEntry, IgesFile, Param};

/// Longest 124 chain followed before giving up.
const MAX_TRANSFORM_DEPTH: usize = 16;

/// Deepest nesting of 102 composite curves.
const MAX_COMPOSITE_DEPTH: usize = 16;

/// Build a shape from every root of `file`.
pub fn translate(file: &IgesFile) -> Result<Shape, IgesError> {
    let scale = file.global.unit_scale();
    let resolution = file
        .global
        .param(19)
        .and_then(Param::as_real)
        .filter(|r| *r > 0.0)
        .unwrap_or(1e-6);
    debug!(scale, entries = file.entries.len(), "translating IGES data");

    let mut translator = Translator {
        file,
        scale: Transform::uniform_scaling(scale),
        weld_tolerance: (resolution * scale).max(1e-9),
        store: EntityStore::new(),
        welded: Vec::new(),
        list_vertices: HashMap::new(),
        list_edges: HashMap::new(),
        skipped_faces: 0,
    };
    let roots = Roots::find(file);
    let mut solids = Vec::new();
    for de in roots.solids {
        solids.push(translator.solid(de)?);
    }
    for de in roots.shells {
        let solid = translator.store.add_solid();
        translator.shell(de, solid, ShellOrientation::Outward)?;
        solids.push(solid);
    }
    if !roots.faces.is_empty() {
        let solid = translator.store.add_solid();
        let shell = translator.store.add_shell(solid, ShellOrientation::Outward, false);
        for de in roots.faces {
            translator.loose_face(de, shell)?;
        }
        solids.push(solid);
    }
    if translator.skipped_faces > 0 {
        warn!(count = translator.skipped_faces, "skipped faces with unsupported geometry");
    }
    Ok(Shape::from_parts(translator.store, solids))
}

/// Root entities in file order, grouped by what they become.
#[derive(Debug, Default)]
struct Roots {
    solids: Vec<usize>,
    shells: Vec<usize>,
    faces: Vec<usize>,
}

impl Roots {
    fn find(file: &IgesFile) -> Roots {
        let mut used = HashSet::new();
        for entry in &file.entries {
            match entry.entity_type {
                186 => {
                    used.extend(entry.pointer(1).ok().flatten());
                    let voids = entry.int_or(3, 0).max(0) as usize;
                    used.extend((0..voids).filter_map(|i| entry.pointer(4 + 2 * i).ok().flatten()));
                }
                514 => {
                    let faces = entry.int_or(1, 0).max(0) as usize;
                    used.extend((0..faces).filter_map(|i| entry.pointer(2 + 2 * i).ok().flatten()));
                }
                510 | 144 => {
                    used.extend(entry.pointer(1).ok().flatten());
                }
                142 => {
                    used.extend(entry.pointer(2).ok().flatten());
                }
                _ => {}
            }
        }

        let mut roots = Roots::default();
        for entry in &file.entries {
            match entry.entity_type {
                186 => roots.solids.push(entry.de),
                514 if !used.contains(&entry.de) => roots.shells.push(entry.de),
                510 | 128 if !used.contains(&entry.de) => roots.faces.push(entry.de),
                144 => roots.faces.push(entry.de),
                _ => {}
            }
        }
        roots
    }
}

/// A bounded piece of model-space curve, oriented along its loop.
#[derive(Debug, Clone)]
struct Segment {
    curve: Curve,
    start: Point3d,
    end: Point3d,
}

struct Translator<'a> {
    file: &'a IgesFile,
    /// File units to millimetres.
    scale: Transform,
    weld_tolerance: f64,
    store: EntityStore,
    /// Vertices shared by every face, merged by distance.
    welded: Vec<VertexId>,
    /// (502 entry, 1-based index) to vertex.
    list_vertices: HashMap<(usize, usize), VertexId>,
    /// (504 entry, 1-based index) to edge.
    list_edges: HashMap<(usize, usize), EdgeId>,
    skipped_faces: usize,
}

impl<'a> Translator<'a> {
    fn entry(&self, de: usize) -> Result<&'a DirectoryEntry, IgesError> {
        self.file.require(de)
    }

    fn expect(&self, de: usize, types: &[u32]) -> Result<&'a DirectoryEntry, IgesError> {
        let entry = self.entry(de)?;
        if types.contains(&entry.entity_type) {
            Ok(entry)
        } else {
            Err(IgesError::Entity {
                de,
                entity_type: entry.entity_type,
                message: format!("expected entity type {types:?}"),
            })
        }
    }

    /// The 124 chain starting at `pointer`, outermost applied last.
    fn transform_chain(&self, pointer: usize, depth: usize) -> Result<Transform, IgesError> {
        if pointer == 0 {
            return Ok(Transform::identity());
        }
        if depth > MAX_TRANSFORM_DEPTH {
            return Err(IgesError::Directory {
                de: pointer,
                message: "transformation chain is too deep".into(),
            });
        }
        let entry = self.expect(pointer, &[124])?;
        let r = |n: usize| entry.real(n);
        let rows = [
            [r(1)?, r(2)?, r(3)?],
            [r(5)?, r(6)?, r(7)?],
            [r(9)?, r(10)?, r(11)?],
        ];
        let own = Transform::from_rows(rows, [r(4)?, r(8)?, r(12)?]);
        let parent = self.transform_chain(entry.transform, depth + 1)?;
        Ok(parent.then(&own))
    }

    /// Definition space of `entry` to model space of its parent.
    fn placement(&self, entry: &DirectoryEntry, parent: &Transform) -> Result<Transform, IgesError> {
        Ok(parent.then(&self.transform_chain(entry.transform, 0)?))
    }

    // ─── Points and directions ──────────────────────────────────────────

    fn point_entity(&self, de: usize) -> Result<Point3d, IgesError> {
        let entry = self.expect(de, &[116])?;
        let local = Point3d::from_array(entry.point(1)?);
        Ok(self.transform_chain(entry.transform, 0)?.transform_point(&local))
    }

    fn direction_entity(&self, de: usize) -> Result<Vec3, IgesError> {
        let entry = self.expect(de, &[123])?;
        let local = Vec3::from_array(entry.point(1)?);
        let v = self.transform_chain(entry.transform, 0)?.transform_vector(&local);
        Ok(v.normalized().ok_or(GeometryError::DegenerateDirection)?)
    }

    fn optional_direction(&self, entry: &DirectoryEntry, number: usize) -> Result<Option<Vec3>, IgesError> {
        entry.pointer(number)?.map(|de| self.direction_entity(de)).transpose()
    }

    /// Existing vertex within the weld tolerance, or a new one.
    fn weld(&mut self, point: Point3d) -> VertexId {
        let existing = self
            .welded
            .iter()
            .copied()
            .find(|&v| self.store.vertices[v].point.distance_to(&point) <= self.weld_tolerance);
        existing.unwrap_or_else(|| {
            let v = self.store.add_vertex(point);
            self.welded.push(v);
            v
        })
    }

    /// Edge from `start` to `end` along `curve`; returns the edge and
    /// whether it is used forward. Non-periodic curves that run against
    /// the requested direction get their vertices swapped.
    fn oriented_edge(&mut self, curve: Curve, start: VertexId, end: VertexId) -> (EdgeId, bool) {
        let p0 = self.store.vertices[start].point;
        let p1 = self.store.vertices[end].point;
        let (t0, t1) = curve.parameter_range(&p0, &p1, start == end);
        if curve.period().is_none() && t1 < t0 {
            (self.store.add_edge_with_range(curve, end, start, (t1, t0)), false)
        } else {
            (self.store.add_edge_with_range(curve, start, end, (t0, t1)), true)
        }
    }

    // ─── Curves ─────────────────────────────────────────────────────────

    /// Segments of a curve entity in model space; composite curves are
    /// flattened.
    fn segments(&self, de: usize, parent: &Transform) -> Result<Vec<Segment>, IgesError> {
        self.composite_segments(de, parent, &mut Vec::new())
    }

    /// `open` holds the composites being expanded, outermost first.
    fn composite_segments(
        &self,
        de: usize,
        parent: &Transform,
        open: &mut Vec<usize>,
    ) -> Result<Vec<Segment>, IgesError> {
        let entry = self.entry(de)?;
        let placement = self.placement(entry, parent)?;
        if entry.entity_type == 102 {
            if open.contains(&de) {
                return Err(IgesError::Directory {
                    de,
                    message: "composite curve contains itself".into(),
                });
            }
            if open.len() >= MAX_COMPOSITE_DEPTH {
                return Err(IgesError::Directory {
                    de,
                    message: "composite curves nested too deeply".into(),
                });
            }
            open.push(de);
            let count = entry.count(1)?;
            let mut out = Vec::new();
            for i in 0..count {
                out.extend(self.composite_segments(entry.required_pointer(2 + i)?, &placement, open)?);
            }
            open.pop();
            return Ok(out);
        }
        let (curve, start, end) = self.local_curve(entry)?;
        Ok(vec![Segment {
            curve: curve.transformed(&placement),
            start: placement.transform_point(&start),
            end: placement.transform_point(&end),
        }])
    }

    /// A single curve entity in its definition space with its end points.
    fn local_curve(&self, entry: &DirectoryEntry) -> Result<(Curve, Point3d, Point3d), IgesError> {
        match entry.entity_type {
            110 => {
                let a = Point3d::from_array(entry.point(1)?);
                let b = Point3d::from_array(entry.point(4)?);
                Ok((Curve::Line(Line3d::from_points(a, b)?), a, b))
            }
            100 => {
                let zt = entry.real(1)?;
                let center = Point3d::new(entry.real(2)?, entry.real(3)?, zt);
                let start = Point3d::new(entry.real(4)?, entry.real(5)?, zt);
                let end = Point3d::new(entry.real(6)?, entry.real(7)?, zt);
                let radius = center.distance_to(&start);
                if radius <= 0.0 {
                    return Err(GeometryError::InvalidRadius(radius).into());
                }
                Ok((Curve::Circle(Circle3d::with_axes(center, Vec3::Z, Vec3::X, radius)), start, end))
            }
            126 => {
                let curve = bspline_curve(entry)?;
                let (lo, hi) = curve.domain();
                let v0 = entry.real_or(curve_tail(entry)?, lo);
                let v1 = entry.real_or(curve_tail(entry)? + 1, hi);
                let (start, end) = (curve.evaluate(v0), curve.evaluate(v1));
                Ok((Curve::Nurbs(curve), start, end))
            }
            other => Err(IgesError::Entity {
                de: entry.de,
                entity_type: other,
                message: "unsupported curve entity".into(),
            }),
        }
    }

    // ─── Surfaces ───────────────────────────────────────────────────────

    /// Model-space surface, or `None` for surface types that are not
    /// translated.
    fn surface(&self, de: usize) -> Result<Option<Surface>, IgesError> {
        let entry = self.entry(de)?;
        let placement = self.placement(entry, &self.scale)?;
        let local = match entry.entity_type {
            108 => {
                let normal = Vec3::new(entry.real(1)?, entry.real(2)?, entry.real(3)?);
                let d = entry.real(4)?;
                let length2 = normal.length_squared();
                if length2 <= 0.0 {
                    return Err(GeometryError::DegenerateDirection.into());
                }
                let origin = Point3d::ORIGIN + normal * (d / length2);
                Surface::Plane(Plane::new(origin, normal))
            }
            190 => {
                let origin = self.point_entity(entry.required_pointer(1)?)?;
                let normal = self.direction_entity(entry.required_pointer(2)?)?;
                match self.optional_direction(entry, 3)? {
                    Some(u_axis) => Surface::Plane(Plane::with_axes(origin, normal, u_axis)),
                    None => Surface::Plane(Plane::new(origin, normal)),
                }
            }
            192 => {
                let origin = self.point_entity(entry.required_pointer(1)?)?;
                let axis = self.direction_entity(entry.required_pointer(2)?)?;
                let radius = positive(entry.real(3)?)?;
                let ref_dir = self.optional_direction(entry, 4)?.unwrap_or_else(|| axis.any_perpendicular());
                Surface::Cylinder(Cylinder::with_axes(origin, axis, ref_dir, radius))
            }
            194 => {
                let location = self.point_entity(entry.required_pointer(1)?)?;
                let axis = self.direction_entity(entry.required_pointer(2)?)?;
                let radius = entry.real(3)?;
                let half_angle = entry.real(4)?.to_radians();
                if !(half_angle > 0.0 && half_angle < std::f64::consts::FRAC_PI_2) || radius < 0.0 {
                    return Err(IgesError::Entity {
                        de,
                        entity_type: 194,
                        message: format!("invalid cone radius {radius} or semi-angle {half_angle}"),
                    });
                }
                let apex = location - axis * (radius / half_angle.tan());
                let ref_dir = self.optional_direction(entry, 5)?.unwrap_or_else(|| axis.any_perpendicular());
                Surface::Cone(Cone::with_axes(apex, axis, ref_dir, half_angle))
            }
            196 => {
                let center = self.point_entity(entry.required_pointer(1)?)?;
                let radius = positive(entry.real(2)?)?;
                let axis = self.optional_direction(entry, 3)?.unwrap_or(Vec3::Z);
                let ref_dir = self.optional_direction(entry, 4)?.unwrap_or_else(|| axis.any_perpendicular());
                Surface::Sphere(Sphere::with_axes(center, axis, ref_dir, radius))
            }
            198 => {
                let center = self.point_entity(entry.required_pointer(1)?)?;
                let axis = self.direction_entity(entry.required_pointer(2)?)?;
                let major = positive(entry.real(3)?)?;
                let minor = positive(entry.real(4)?)?;
                let ref_dir = self.optional_direction(entry, 5)?.unwrap_or_else(|| axis.any_perpendicular());
                Surface::Torus(Torus::with_axes(center, axis, ref_dir, major, minor))
            }
            128 => Surface::Nurbs(bspline_surface(entry)?),
            other => {
                warn!(de, entity_type = other, "unsupported IGES surface");
                return Ok(None);
            }
        };
        Ok(Some(local.transformed(&placement)))
    }

    // ─── Loose faces ────────────────────────────────────────────────────

    fn loose_face(&mut self, de: usize, shell: ShellId) -> Result<(), IgesError> {
        let entry = self.entry(de)?;
        match entry.entity_type {
            144 => self.trimmed_face(entry, shell),
            510 => self.face(de, shell, true).map(|_| ()),
            _ => self.natural_face(de, shell),
        }
    }

    fn natural_face(&mut self, de: usize, shell: ShellId) -> Result<(), IgesError> {
        match self.surface(de)? {
            Some(Surface::Nurbs(surface)) => {
                add_nurbs_face(&mut self.store, shell, surface);
            }
            Some(other) => {
                warn!(de, surface = other.surface_type_name(), "unbounded surface has no natural boundary");
                self.skipped_faces += 1;
            }
            None => self.skipped_faces += 1,
        }
        Ok(())
    }

    fn trimmed_face(&mut self, entry: &DirectoryEntry, shell: ShellId) -> Result<(), IgesError> {
        let surface_de = entry.required_pointer(1)?;
        let natural_outer = entry.int_or(2, 1) == 0;
        if natural_outer {
            return self.natural_face(surface_de, shell);
        }
        let Some(surface) = self.surface(surface_de)? else {
            self.skipped_faces += 1;
            return Ok(());
        };
        let inner_count = entry.count(3)?;
        let mut boundaries = vec![entry.required_pointer(4)?];
        for i in 0..inner_count {
            boundaries.push(entry.required_pointer(5 + i)?);
        }

        let mut loops = Vec::with_capacity(boundaries.len());
        for boundary in boundaries {
            let curve_on_surface = self.expect(boundary, &[142])?;
            let Some(model_curve) = curve_on_surface.pointer(4)? else {
                warn!(de = boundary, "boundary has no model-space curve; skipping face");
                self.skipped_faces += 1;
                return Ok(());
            };
            let placement = self.placement(curve_on_surface, &self.scale)?;
            loops.push(self.segments(model_curve, &placement)?);
        }

        let face = self.store.add_face(shell, surface, true);
        for (index, segments) in loops.into_iter().enumerate() {
            let loop_id = if index == 0 {
                self.store.faces[face].outer_loop
            } else {
                self.store.add_inner_loop(face)
            };
            self.push_segments(loop_id, segments);
        }
        Ok(())
    }

    fn push_segments(&mut self, loop_id: LoopId, segments: Vec<Segment>) {
        let mut previous_end = None;
        for segment in segments {
            let mut start = self.weld(segment.start);
            let mut end = self.weld(segment.end);
            let mut curve = segment.curve;
            // Tolerate constituents stored tail to head.
            if previous_end.is_some_and(|p| p != start && p == end) {
                std::mem::swap(&mut start, &mut end);
                curve = reversed_periodic(curve);
            }
            let (edge, forward) = self.oriented_edge(curve, start, end);
            self.store.push_half_edge(loop_id, edge, forward);
            previous_end = Some(end);
        }
    }

    // ─── Solids ─────────────────────────────────────────────────────────

    fn solid(&mut self, de: usize) -> Result<SolidId, IgesError> {
        let entry = self.expect(de, &[186])?;
        let solid = self.store.add_solid();
        self.shell(entry.required_pointer(1)?, solid, ShellOrientation::Outward)?;
        let voids = entry.count(3)?;
        for i in 0..voids {
            self.shell(entry.required_pointer(4 + 2 * i)?, solid, ShellOrientation::Inward)?;
        }
        Ok(solid)
    }

    fn shell(&mut self, de: usize, solid: SolidId, orientation: ShellOrientation) -> Result<ShellId, IgesError> {
        let entry = self.expect(de, &[514])?;
        let closed = entry.form != 2;
        let shell = self.store.add_shell(solid, orientation, closed);
        let count = entry.count(1)?;
        for i in 0..count {
            let face = entry.required_pointer(2 + 2 * i)?;
            let same_sense = entry.int_or(3 + 2 * i, 1) != 0;
            self.face(face, shell, same_sense)?;
        }
        Ok(shell)
    }

    fn face(&mut self, de: usize, shell: ShellId, same_sense: bool) -> Result<Option<FaceId>, IgesError> {
        let entry = self.expect(de, &[510])?;
        let Some(surface) = self.surface(entry.required_pointer(1)?)? else {
            self.skipped_faces += 1;
            return Ok(None);
        };
        if entry.int_or(3, 1) == 0 {
            debug!(de, "face has no outer loop flag; using its first loop");
        }
        let face = self.store.add_face(shell, surface, same_sense);
        let loop_count = entry.count(2)?;
        for i in 0..loop_count {
            let loop_id = if i == 0 {
                self.store.faces[face].outer_loop
            } else {
                self.store.add_inner_loop(face)
            };
            self.edge_loop(entry.required_pointer(4 + i)?, loop_id)?;
        }
        Ok(Some(face))
    }

    fn edge_loop(&mut self, de: usize, loop_id: LoopId) -> Result<(), IgesError> {
        let entry = self.expect(de, &[508])?;
        let count = entry.count(1)?;
        let mut n = 2;
        for _ in 0..count {
            let kind = entry.int(n)?;
            let list = entry.required_pointer(n + 1)?;
            let index = entry.count(n + 2)?;
            let agrees = entry.int(n + 3)? != 0;
            let pcurves = entry.count(n + 4)?;
            n += 5 + 2 * pcurves;
            if kind == 1 {
                debug!(de, "skipping vertex loop member");
                continue;
            }
            // Kernel edges run with their curve, as the flag is measured.
            let edge = self.list_edge(list, index)?;
            self.store.push_half_edge(loop_id, edge, agrees);
        }
        Ok(())
    }

    fn list_edge(&mut self, list: usize, index: usize) -> Result<EdgeId, IgesError> {
        if let Some(&cached) = self.list_edges.get(&(list, index)) {
            return Ok(cached);
        }
        let entry = self.expect(list, &[504])?;
        let base = 2 + 5 * index.checked_sub(1).ok_or_else(|| IgesError::Parameter {
            de: list,
            message: "edge index 0".into(),
        })?;
        if index > entry.count(1)? {
            return Err(IgesError::Parameter {
                de: list,
                message: format!("edge index {index} is out of range"),
            });
        }
        let curve_de = entry.required_pointer(base)?;
        let start = self.list_vertex(entry.required_pointer(base + 1)?, entry.count(base + 2)?)?;
        let end = self.list_vertex(entry.required_pointer(base + 3)?, entry.count(base + 4)?)?;

        let placement = self.placement(entry, &self.scale)?;
        let mut segments = self.segments(curve_de, &placement)?;
        if segments.len() != 1 {
            return Err(IgesError::Entity {
                de: curve_de,
                entity_type: self.entry(curve_de)?.entity_type,
                message: format!("edge curve has {} segments", segments.len()),
            });
        }
        let segment = segments.remove(0);
        let (edge, _) = self.oriented_edge(segment.curve, start, end);
        self.list_edges.insert((list, index), edge);
        Ok(edge)
    }

    fn list_vertex(&mut self, list: usize, index: usize) -> Result<VertexId, IgesError> {
        if let Some(&vertex) = self.list_vertices.get(&(list, index)) {
            return Ok(vertex);
        }
        let entry = self.expect(list, &[502])?;
        if index == 0 || index > entry.count(1)? {
            return Err(IgesError::Parameter {
                de: list,
                message: format!("vertex index {index} is out of range"),
            });
        }
        let local = Point3d::from_array(entry.point(2 + 3 * (index - 1))?);
        let point = self.placement(entry, &self.scale)?.transform_point(&local);
        let vertex = self.store.add_vertex(point);
        self.list_vertices.insert((list, index), vertex);
        Ok(vertex)
    }
}

/// Periodic curves traversed the other way round; other curves are
/// reversed through their edge use instead.
fn reversed_periodic(curve: Curve) -> Curve {
    match curve {
        Curve::Circle(c) => Curve::Circle(Circle3d::with_axes(c.center, -c.normal, c.x_axis, c.radius)),
        Curve::Ellipse(e) => Curve::Ellipse(Ellipse3d::new(
            e.center,
            -e.normal,
            e.major_axis,
            e.major_radius,
            e.minor_radius,
        )),
        other => other,
    }
}

fn positive(radius: f64) -> Result<f64, IgesError> {
    if radius > 0.0 {
        Ok(radius)
    } else {
        Err(GeometryError::InvalidRadius(radius).into())
    }
}

/// Reals `first..first + count`.
fn reals(entry: &DirectoryEntry, first: usize, count: usize) -> Result<Vec<f64>, IgesError> {
    (first..first + count).map(|n| entry.real(n)).collect()
}

fn points(entry: &DirectoryEntry, first: usize, count: usize) -> Result<Vec<Point3d>, IgesError> {
    (0..count)
        .map(|i| entry.point(first + 3 * i).map(Point3d::from_array))
        .collect()
}

/// Weights, or none when they are all equal.
fn rational_weights(weights: Vec<f64>, polynomial: bool) -> Vec<f64> {
    let uniform = weights.windows(2).all(|w| (w[0] - w[1]).abs() <= 1e-12);
    if polynomial || uniform {
        Vec::new()
    } else {
        weights
    }
}

/// Parameter number just after the control points of a 126 entity.
fn curve_tail(entry: &DirectoryEntry) -> Result<usize, IgesError> {
    let k = entry.count(1)?;
    let m = entry.count(2)?;
    Ok(7 + (k + m + 2) + (k + 1) + 3 * (k + 1))
}

fn bspline_curve(entry: &DirectoryEntry) -> Result<NurbsCurve, IgesError> {
    let k = entry.count(1)?;
    let degree = entry.count(2)?;
    let polynomial = entry.int_or(5, 0) == 1;
    let knots_at = 7;
    let knots = reals(entry, knots_at, k + degree + 2)?;
    let weights_at = knots_at + knots.len();
    let weights = reals(entry, weights_at, k + 1)?;
    let control_points = points(entry, weights_at + k + 1, k + 1)?;
    Ok(NurbsCurve::new(
        degree,
        control_points,
        rational_weights(weights, polynomial),
        knots,
    )?)
}

/// 128 stores weights and control points with u varying fastest.
fn bspline_surface(entry: &DirectoryEntry) -> Result<NurbsSurface, IgesError> {
    let k1 = entry.count(1)?;
    let k2 = entry.count(2)?;
    let degree_u = entry.count(3)?;
    let degree_v = entry.count(4)?;
    let polynomial = entry.int_or(7, 0) == 1;
    let (num_u, num_v) = (k1 + 1, k2 + 1);

    let knots_u_at = 10;
    let knots_u = reals(entry, knots_u_at, num_u + degree_u + 1)?;
    let knots_v_at = knots_u_at + knots_u.len();
    let knots_v = reals(entry, knots_v_at, num_v + degree_v + 1)?;
    let weights_at = knots_v_at + knots_v.len();
    let file_weights = reals(entry, weights_at, num_u * num_v)?;
    let file_points = points(entry, weights_at + num_u * num_v, num_u * num_v)?;

    let file_index = |i: usize, j: usize| j * num_u + i;
    let mut control_points = Vec::with_capacity(num_u * num_v);
    let mut weights = Vec::with_capacity(num_u * num_v);
    for i in 0..num_u {
        for j in 0..num_v {
            control_points.push(file_points[file_index(i, j)]);
            weights.push(file_weights[file_index(i, j)]);
        }
    }
    Ok(NurbsSurface::new(
        degree_u,
        degree_v,
        control_points,
        rational_weights(weights, polynomial),
        knots_u,
        knots_v,
        num_u,
        num_v,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iges::record::parse;
    use approx::assert_abs_diff_eq;

    /// Lay out `entities` (type, form, transform DE, parameter data) as
    /// an IGES document in millimetres.
    fn document(unit_flag: u32, entities: &[(u32, u32, usize, &str)]) -> String {
        let mut lines = vec![format!("{:<72}S{:>7}", "", 1)];
        let global = format!("1H,,1H;,,,,,,,,,,,,{unit_flag},,,,,1.0E-6;");
        lines.push(format!("{global:<72}G{:>7}", 1));
        let mut params = Vec::new();
        for (index, (entity_type, form, transform, data)) in entities.iter().enumerate() {
            let de = 2 * index + 1;
            let first = params.len() + 1;
            let chunks: Vec<String> = data
                .as_bytes()
                .chunks(64)
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect();
            lines.push(format!(
                "{entity_type:>8}{first:>8}{:>8}{:>8}{:>8}{:>8}{transform:>8}{:>8}00000000D{de:>7}",
                0, 0, 0, 0, 0
            ));
            lines.push(format!(
                "{entity_type:>8}{:>8}{:>8}{:>8}{form:>8}{:>8}{:>8}{:>8}{:>8}D{:>7}",
                0,
                0,
                chunks.len(),
                "",
                "",
                "",
                "",
                de + 1
            ));
            for chunk in chunks {
                params.push(format!("{chunk:<64}{de:>8}P{:>7}", params.len() + 1));
            }
        }
        lines.extend(params);
        lines.join("\n")
    }

    fn read(text: &str) -> Shape {
        translate(&parse(text).unwrap()).unwrap()
    }

    /// Unit square in z = 0 as a trimmed plane bounded by four lines.
    fn square_entities() -> Vec<(u32, u32, usize, &'static str)> {
        vec![
            (116, 0, 0, "116,0.,0.,0.;"),            // 1
            (123, 0, 0, "123,0.,0.,1.;"),            // 3
            (190, 0, 0, "190,1,3;"),                 // 5
            (110, 0, 0, "110,0.,0.,0.,1.,0.,0.;"),   // 7
            (110, 0, 0, "110,1.,0.,0.,1.,1.,0.;"),   // 9
            (110, 0, 0, "110,1.,1.,0.,0.,1.,0.;"),   // 11
            (110, 0, 0, "110,0.,0.,0.,0.,1.,0.;"),   // 13, runs against the loop
            (102, 0, 0, "102,4,7,9,11,13;"),         // 15
            (142, 0, 0, "142,0,5,0,15,2;"),          // 17
            (144, 0, 0, "144,5,1,0,17;"),            // 19
        ]
    }

    #[test]
    fn test_trimmed_plane_square() {
        let shape = read(&document(2, &square_entities()));
        assert_eq!(shape.face_count(), 1);
        let store = shape.store();
        assert_eq!(store.vertices.len(), 4);
        assert_eq!(store.edges.len(), 4);
        let face = shape.faces().next().unwrap();
        let outer = store.faces[face].outer_loop;
        assert!(store.is_loop_closed(outer));
        let forward: Vec<bool> = store.loops[outer]
            .half_edges
            .iter()
            .map(|&he| store.half_edges[he].forward)
            .collect();
        assert_eq!(forward, vec![true, true, true, false]);
        assert!(!store.shells[store.faces[face].shell].closed);
    }

    #[test]
    fn test_inch_units_scale_points() {
        let shape = read(&document(1, &square_entities()));
        let bbox = shape.bounding_box();
        assert_abs_diff_eq!(bbox.max.x, 25.4, epsilon = 1e-9);
        assert_abs_diff_eq!(bbox.max.y, 25.4, epsilon = 1e-9);
    }

    #[test]
    fn test_transformed_arc() {
        // Quarter arc in the ZT plane, rotated so that its plane is y = 0.
        let entities = vec![
            (124, 0, 0, "124,1.,0.,0.,5.,0.,0.,-1.,0.,0.,1.,0.,0.;"), // 1
            (100, 0, 1, "100,0.,0.,0.,2.,0.,0.,2.;"),                 // 3
        ];
        let file = parse(&document(2, &entities)).unwrap();
        let translator = Translator {
            file: &file,
            scale: Transform::identity(),
            weld_tolerance: 1e-9,
            store: EntityStore::new(),
            welded: Vec::new(),
            list_vertices: HashMap::new(),
            list_edges: HashMap::new(),
            skipped_faces: 0,
        };
        let segments = translator.segments(3, &Transform::identity()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_abs_diff_eq!(segments[0].start, Point3d::new(7.0, 0.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(segments[0].end, Point3d::new(5.0, 0.0, 2.0), epsilon = 1e-12);
        let Curve::Circle(circle) = &segments[0].curve else {
            panic!("arc becomes a circle");
        };
        assert_abs_diff_eq!(circle.normal, -Vec3::Y, epsilon = 1e-12);
        assert_abs_diff_eq!(circle.radius, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bare_bspline_surface_is_natural_face() {
        // Bilinear patch over [0,1]x[0,1], u varies fastest in the file.
        let data = "128,1,1,1,1,0,0,1,0,0,0.,0.,1.,1.,0.,0.,1.,1.,1.,1.,1.,1.,\
                    0.,0.,0.,2.,0.,0.,0.,3.,0.,2.,3.,0.,0.,1.,0.,1.;";
        let shape = read(&document(2, &[(128, 0, 0, data)]));
        assert_eq!(shape.face_count(), 1);
        let face = shape.face(shape.faces().next().unwrap()).unwrap();
        let Surface::Nurbs(surface) = &face.surface else {
            panic!("expected a NURBS face");
        };
        assert_abs_diff_eq!(surface.control_point(1, 0), Point3d::new(2.0, 0.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(surface.control_point(0, 1), Point3d::new(0.0, 3.0, 0.0), epsilon = 1e-12);
        assert!(!surface.is_rational());
        assert_eq!(shape.store().edges.len(), 4);
    }

    #[test]
    fn test_cone_apex_and_degrees() {
        let entities = vec![
            (116, 0, 0, "116,0.,0.,1.;"),       // 1
            (123, 0, 0, "123,0.,0.,1.;"),       // 3
            (194, 0, 0, "194,1,3,1.,45.;"),     // 5
        ];
        let file = parse(&document(2, &entities)).unwrap();
        let translator = Translator {
            file: &file,
            scale: Transform::identity(),
            weld_tolerance: 1e-9,
            store: EntityStore::new(),
            welded: Vec::new(),
            list_vertices: HashMap::new(),
            list_edges: HashMap::new(),
            skipped_faces: 0,
        };
        let Some(Surface::Cone(cone)) = translator.surface(5).unwrap() else {
            panic!("expected a cone");
        };
        assert_abs_diff_eq!(cone.apex, Point3d::ORIGIN, epsilon = 1e-12);
        assert_abs_diff_eq!(cone.half_angle, std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
    }

    #[test]
    fn test_unsupported_surface_is_skipped() {
        let shape = read(&document(2, &[(144, 0, 0, "144,3,1,0,0;"), (120, 0, 0, "120,0,0,0.,1.;")]));
        assert_eq!(shape.face_count(), 0);
    }

    #[test]
    fn test_composite_curve_cycles_are_errors() {
        let mut entities = square_entities();
        entities[7] = (102, 0, 0, "102,4,7,9,11,15;");
        let err = translate(&parse(&document(2, &entities)).unwrap()).unwrap_err();
        assert!(matches!(err, IgesError::Directory { de: 15, .. }));

        // 15 -> 21 -> 15
        let mut entities = square_entities();
        entities[7] = (102, 0, 0, "102,2,7,21;");
        entities.push((102, 0, 0, "102,3,9,11,15;")); // 21
        let err = translate(&parse(&document(2, &entities)).unwrap()).unwrap_err();
        assert!(matches!(err, IgesError::Directory { de: 15, .. }));
    }

    #[test]
    fn test_nested_composite_curve_is_flattened() {
        let mut entities = square_entities();
        entities[7] = (102, 0, 0, "102,2,7,21;");
        entities.push((102, 0, 0, "102,3,9,11,13;")); // 21
        let shape = read(&document(2, &entities));
        assert_eq!(shape.face_count(), 1);
        assert_eq!(shape.store().edges.len(), 4);
    }

    #[test]
    fn test_dangling_pointer_is_an_error() {
        let text = document(2, &[(144, 0, 0, "144,41,1,0,0;")]);
        let err = translate(&parse(&text).unwrap()).unwrap_err();
        assert!(matches!(err, IgesError::Directory { de: 41, .. }));
    }
}
