//! IGES 5.3 output, either as trimmed surfaces or as an MSBO solid.

use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, TAU};

use chrono::Utc;
use part_kernel::geometry::curves::{Curve, Ellipse3d};
use part_kernel::geometry::nurbs::{NurbsCurve, NurbsSurface};
use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::Surface;
use part_kernel::geometry::vector::Vec3;
use part_kernel::topology::brep::{EdgeId, EntityStore, FaceId, HalfEdgeId, LoopId, ShellId, SolidId, VertexId};
use part_kernel::{GeometryError, Shape};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::numbers::real;

use super::record::{DATA_LEN, PARAM_DATA_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IgesUnit {
    #[default]
    Millimetre,
    Inch,
    Metre,
}

impl IgesUnit {
    /// Global section unit flag.
    pub fn flag(self) -> u32 {
        match self {
            IgesUnit::Millimetre => 2,
            IgesUnit::Inch => 1,
            IgesUnit::Metre => 6,
        }
    }

    fn name(self) -> &'static str {
        match self {
            IgesUnit::Millimetre => "MM",
            IgesUnit::Inch => "IN",
            IgesUnit::Metre => "M",
        }
    }

    fn per_mm(self) -> f64 {
        match self {
            IgesUnit::Millimetre => 1.0,
            IgesUnit::Inch => 1.0 / 25.4,
            IgesUnit::Metre => 1.0e-3,
        }
    }
}

/// How faces are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IgesWriteMode {
    /// Independent trimmed surfaces (144). Widely readable but drops
    /// shell topology and face orientation.
    #[default]
    Faces,
    /// Manifold solid B-Rep objects (186) with shared edges and vertices.
    BRep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgesWriterConfig {
    pub unit: IgesUnit,
    pub mode: IgesWriteMode,
    pub author: String,
    pub organization: String,
}

impl Default for IgesWriterConfig {
    fn default() -> Self {
        Self {
            unit: IgesUnit::Millimetre,
            mode: IgesWriteMode::Faces,
            author: String::new(),
            organization: String::new(),
        }
    }
}

impl IgesWriterConfig {
    pub fn with_mode(mut self, mode: IgesWriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_unit(mut self, unit: IgesUnit) -> Self {
        self.unit = unit;
        self
    }
}

/// Smallest distance the file claims to resolve, in millimetres.
const RESOLUTION_MM: f64 = 1.0e-6;

const STATUS_ROOT: &str = "00000000";
const STATUS_SUBORDINATE: &str = "00010000";

/// Serialize `shape` as a complete IGES document.
pub fn write(shape: &Shape, name: &str, config: &IgesWriterConfig) -> String {
    let mut writer = IgesWriter {
        shape,
        scale: config.unit.per_mm(),
        entities: Vec::new(),
    };
    match config.mode {
        IgesWriteMode::Faces => {
            for face in shape.faces() {
                writer.trimmed_face(face);
            }
        }
        IgesWriteMode::BRep => writer.brep(),
    }
    debug!(entities = writer.entities.len(), mode = ?config.mode, "IGES entities built");
    writer.finish(name, config)
}

struct Entity {
    entity_type: u32,
    form: u32,
    params: Vec<String>,
    transform: usize,
    subordinate: bool,
}

struct IgesWriter<'a> {
    shape: &'a Shape,
    /// File units per millimetre.
    scale: f64,
    entities: Vec<Entity>,
}

impl<'a> IgesWriter<'a> {
    fn store(&self) -> &'a EntityStore {
        self.shape.store()
    }

    fn add(&mut self, entity_type: u32, form: u32, params: Vec<String>) -> usize {
        self.add_entity(Entity {
            entity_type,
            form,
            params,
            transform: 0,
            subordinate: true,
        })
    }

    fn add_root(&mut self, entity_type: u32, form: u32, params: Vec<String>) -> usize {
        self.add_entity(Entity {
            entity_type,
            form,
            params,
            transform: 0,
            subordinate: false,
        })
    }

    /// Append an entity and return its directory pointer.
    fn add_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        2 * self.entities.len() - 1
    }

    fn length(&self, v: f64) -> String {
        real(v * self.scale)
    }

    fn coords(&self, p: &Point3d) -> [String; 3] {
        [self.length(p.x), self.length(p.y), self.length(p.z)]
    }

    fn point(&mut self, p: &Point3d) -> usize {
        let params = self.coords(p).to_vec();
        self.add(116, 0, params)
    }

    fn direction(&mut self, v: &Vec3) -> usize {
        self.add(123, 0, vec![real(v.x), real(v.y), real(v.z)])
    }

    // ─── Surfaces ───────────────────────────────────────────────────────

    fn surface(&mut self, surface: &Surface) -> usize {
        match surface {
            Surface::Plane(p) => {
                let params = vec![self.point(&p.origin), self.direction(&p.normal), self.direction(&p.u_axis)];
                self.add(190, 1, pointers(&params))
            }
            Surface::Cylinder(c) => {
                let location = self.point(&c.origin);
                let axis = self.direction(&c.axis);
                let ref_dir = self.direction(&c.ref_dir);
                let params = vec![location.to_string(), axis.to_string(), self.length(c.radius), ref_dir.to_string()];
                self.add(192, 1, params)
            }
            Surface::Cone(c) => {
                // One millimetre up the axis, where the radius is tan(angle).
                let location = self.point(&(c.apex + c.axis));
                let axis = self.direction(&c.axis);
                let ref_dir = self.direction(&c.ref_dir);
                let params = vec![
                    location.to_string(),
                    axis.to_string(),
                    self.length(c.half_angle.tan()),
                    real(c.half_angle.to_degrees()),
                    ref_dir.to_string(),
                ];
                self.add(194, 1, params)
            }
            Surface::Sphere(s) => {
                let center = self.point(&s.center);
                let axis = self.direction(&s.axis);
                let ref_dir = self.direction(&s.ref_dir);
                let params = vec![center.to_string(), self.length(s.radius), axis.to_string(), ref_dir.to_string()];
                self.add(196, 1, params)
            }
            Surface::Torus(t) => {
                let center = self.point(&t.center);
                let axis = self.direction(&t.axis);
                let ref_dir = self.direction(&t.ref_dir);
                let params = vec![
                    center.to_string(),
                    axis.to_string(),
                    self.length(t.major_radius),
                    self.length(t.minor_radius),
                    ref_dir.to_string(),
                ];
                self.add(198, 1, params)
            }
            Surface::Nurbs(n) => self.bspline_surface(n),
        }
    }

    /// 128 lists weights and control points with u varying fastest.
    fn bspline_surface(&mut self, n: &NurbsSurface) -> usize {
        let mut params = vec![
            (n.num_u - 1).to_string(),
            (n.num_v - 1).to_string(),
            n.degree_u.to_string(),
            n.degree_v.to_string(),
            "0".into(),
            "0".into(),
            flag(!n.is_rational()),
            "0".into(),
            "0".into(),
        ];
        params.extend(n.knots_u.iter().map(|&k| real(k)));
        params.extend(n.knots_v.iter().map(|&k| real(k)));
        for j in 0..n.num_v {
            for i in 0..n.num_u {
                params.push(real(n.weight(i, j)));
            }
        }
        for j in 0..n.num_v {
            for i in 0..n.num_u {
                params.extend(self.coords(&n.control_point(i, j)));
            }
        }
        let (u0, u1) = n.domain_u();
        let (v0, v1) = n.domain_v();
        params.extend([u0, u1, v0, v1].map(real));
        self.add(128, 0, params)
    }

    // ─── Curves ─────────────────────────────────────────────────────────

    /// Entities tracing `curve` from parameter `t0` to `t1`, in that
    /// direction.
    fn curve(&mut self, curve: &Curve, t0: f64, t1: f64) -> Vec<usize> {
        match curve {
            Curve::Line(_) => {
                let mut params = self.coords(&curve.evaluate(t0)).to_vec();
                params.extend(self.coords(&curve.evaluate(t1)));
                vec![self.add(110, 0, params)]
            }
            Curve::Circle(c) => {
                // A decreasing arc is increasing about the opposite normal.
                let (y_axis, normal, a0, a1) = if t1 >= t0 {
                    (c.y_axis(), c.normal, t0, t1)
                } else {
                    (-c.y_axis(), -c.normal, -t0, -t1)
                };
                let r = c.radius * self.scale;
                let start = [r * a0.cos(), r * a0.sin()];
                let end = if (a1 - a0) >= TAU - 1e-9 {
                    start
                } else {
                    [r * a1.cos(), r * a1.sin()]
                };
                let x = c.x_axis;
                let mut frame = vec![real(x.x), real(y_axis.x), real(normal.x), self.length(c.center.x)];
                frame.extend([real(x.y), real(y_axis.y), real(normal.y), self.length(c.center.y)]);
                frame.extend([real(x.z), real(y_axis.z), real(normal.z), self.length(c.center.z)]);
                let transform = self.add(124, 0, frame);
                let params = ["0.0".to_string(), "0.0".into(), "0.0".into()]
                    .into_iter()
                    .chain([start[0], start[1], end[0], end[1]].map(real))
                    .collect();
                vec![self.add_entity(Entity {
                    entity_type: 100,
                    form: 0,
                    params,
                    transform,
                    subordinate: true,
                })]
            }
            Curve::Ellipse(e) => match ellipse_arc(e, t0, t1) {
                Ok(arc) => {
                    let (v0, v1) = arc.domain();
                    vec![self.bspline_curve(&arc, v0, v1)]
                }
                Err(err) => {
                    warn!(%err, "skipping elliptical arc");
                    Vec::new()
                }
            },
            Curve::Nurbs(n) if t1 >= t0 => vec![self.bspline_curve(n, t0, t1)],
            Curve::Nurbs(n) => {
                let (reversed, shift) = reversed_nurbs(n);
                vec![self.bspline_curve(&reversed, shift - t0, shift - t1)]
            }
        }
    }

    fn bspline_curve(&mut self, n: &NurbsCurve, v0: f64, v1: f64) -> usize {
        let count = n.num_control_points();
        let closed = n.control_points[0].distance_to(&n.control_points[count - 1]) < 1e-12;
        let mut params = vec![
            (count - 1).to_string(),
            n.degree.to_string(),
            "0".into(),
            flag(closed),
            flag(!n.is_rational()),
            "0".into(),
        ];
        params.extend(n.knots.iter().map(|&k| real(k)));
        params.extend((0..count).map(|i| real(n.weight(i))));
        for p in &n.control_points {
            params.extend(self.coords(p));
        }
        params.extend([v0, v1].map(real));
        params.extend(["0.0", "0.0", "0.0"].map(String::from));
        self.add(126, 0, params)
    }

    // ─── Trimmed surfaces ───────────────────────────────────────────────

    fn trimmed_face(&mut self, face_id: FaceId) -> usize {
        let face = &self.store().faces[face_id];
        let surface = self.surface(&face.surface);
        let outer = self.boundary(surface, face.outer_loop);
        let inner: Vec<usize> = face
            .inner_loops
            .iter()
            .filter_map(|&l| self.boundary(surface, l))
            .collect();
        let mut params = vec![
            surface.to_string(),
            flag(outer.is_some()),
            inner.len().to_string(),
            outer.unwrap_or(0).to_string(),
        ];
        params.extend(inner.iter().map(usize::to_string));
        self.add_root(144, 0, params)
    }

    /// Curve on surface (142) over a composite of the loop's edge uses,
    /// or `None` for an empty loop.
    fn boundary(&mut self, surface: usize, loop_id: LoopId) -> Option<usize> {
        let half_edges: &'a [HalfEdgeId] = &self.store().loops[loop_id].half_edges;
        if half_edges.is_empty() {
            return None;
        }
        let mut segments = Vec::new();
        for &he_id in half_edges {
            let he = &self.store().half_edges[he_id];
            let edge = &self.store().edges[he.edge];
            segments.extend(self.curve(&edge.curve, he.t_start, he.t_end));
        }
        let mut params = vec![segments.len().to_string()];
        params.extend(segments.iter().map(usize::to_string));
        let composite = self.add(102, 0, params);
        Some(self.add(142, 0, pointers(&[0, surface, 0, composite, 2])))
    }

    // ─── Manifold solids ────────────────────────────────────────────────

    fn brep(&mut self) {
        let store = self.store();
        let shape = self.shape;
        let mut edge_order: Vec<EdgeId> = Vec::new();
        let mut edge_index: HashMap<EdgeId, usize> = HashMap::new();
        let mut vertex_order: Vec<VertexId> = Vec::new();
        let mut vertex_index: HashMap<VertexId, usize> = HashMap::new();
        for face_id in shape.faces() {
            let face = &store.faces[face_id];
            for loop_id in std::iter::once(face.outer_loop).chain(face.inner_loops.iter().copied()) {
                for &he_id in &store.loops[loop_id].half_edges {
                    let edge_id = store.half_edges[he_id].edge;
                    if edge_index.contains_key(&edge_id) {
                        continue;
                    }
                    edge_order.push(edge_id);
                    edge_index.insert(edge_id, edge_order.len());
                    let edge = &store.edges[edge_id];
                    for v in [edge.start_vertex, edge.end_vertex] {
                        if !vertex_index.contains_key(&v) {
                            vertex_order.push(v);
                            vertex_index.insert(v, vertex_order.len());
                        }
                    }
                }
            }
        }

        let mut edge_list = 0;
        if !edge_order.is_empty() {
            let mut params = vec![vertex_order.len().to_string()];
            for &v in &vertex_order {
                params.extend(self.coords(&store.vertices[v].point));
            }
            let vertex_list = self.add(502, 1, params);

            let mut params = vec![edge_order.len().to_string()];
            for &edge_id in &edge_order {
                let edge = &store.edges[edge_id];
                let curves = self.curve(&edge.curve, edge.range.0, edge.range.1);
                params.push(curves.first().copied().unwrap_or(0).to_string());
                params.extend(pointers(&[
                    vertex_list,
                    vertex_index[&edge.start_vertex],
                    vertex_list,
                    vertex_index[&edge.end_vertex],
                ]));
            }
            edge_list = self.add(504, 1, params);
        }

        let lists = EdgeList {
            de: edge_list,
            index: edge_index,
        };
        let shape = self.shape;
        for &solid in shape.solids() {
            self.solid(solid, &lists);
        }
    }

    fn solid(&mut self, solid: SolidId, lists: &EdgeList) {
        let shells = &self.store().solids[solid].shells;
        let Some((&outer, voids)) = shells.split_first() else {
            return;
        };
        if !self.store().shells[outer].closed {
            for &shell in shells {
                self.shell(shell, lists, false);
            }
            return;
        }
        let outer = self.shell(outer, lists, true);
        let void_shells: Vec<usize> = voids.iter().map(|&v| self.shell(v, lists, true)).collect();
        let mut params = pointers(&[outer, 1, void_shells.len()]);
        for v in void_shells {
            params.extend(pointers(&[v, 0]));
        }
        self.add_root(186, 0, params);
    }

    fn shell(&mut self, shell_id: ShellId, lists: &EdgeList, subordinate: bool) -> usize {
        let shell = &self.store().shells[shell_id];
        let mut params = vec![shell.faces.len().to_string()];
        for &face_id in &shell.faces {
            let face = self.face(face_id, lists);
            params.extend([face.to_string(), flag(self.store().faces[face_id].same_sense)]);
        }
        self.add_entity(Entity {
            entity_type: 514,
            form: if shell.closed { 1 } else { 2 },
            params,
            transform: 0,
            subordinate,
        })
    }

    fn face(&mut self, face_id: FaceId, lists: &EdgeList) -> usize {
        let face = &self.store().faces[face_id];
        let surface = self.surface(&face.surface);
        let store = self.store();
        let non_empty: Vec<LoopId> = std::iter::once(face.outer_loop)
            .chain(face.inner_loops.iter().copied())
            .filter(|&l| !store.loops[l].half_edges.is_empty())
            .collect();
        let loops: Vec<usize> = non_empty.into_iter().map(|l| self.edge_loop(l, lists)).collect();
        let mut params = pointers(&[surface, loops.len(), 1]);
        params.extend(loops.iter().map(usize::to_string));
        self.add(510, 1, params)
    }

    fn edge_loop(&mut self, loop_id: LoopId, lists: &EdgeList) -> usize {
        let store = self.store();
        let half_edges = &store.loops[loop_id].half_edges;
        let mut params = vec![half_edges.len().to_string()];
        for &he_id in half_edges {
            let he = &store.half_edges[he_id];
            params.extend(pointers(&[0, lists.de, lists.index[&he.edge]]));
            params.extend([flag(he.forward), "0".into()]);
        }
        self.add(508, 1, params)
    }

    // ─── Sections ───────────────────────────────────────────────────────

    fn finish(self, name: &str, config: &IgesWriterConfig) -> String {
        let date = Utc::now().format("%Y%m%d.%H%M%S").to_string();
        let bbox = self.shape.bounding_box();
        let max_coordinate = if bbox.is_valid() {
            [bbox.min.x, bbox.min.y, bbox.min.z, bbox.max.x, bbox.max.y, bbox.max.z]
                .iter()
                .fold(0.0_f64, |m, v| m.max(v.abs()))
                * self.scale
        } else {
            0.0
        };
        let global = vec![
            "1H,".to_string(),
            "1H;".into(),
            hollerith(name),
            hollerith(&format!("{name}.igs")),
            hollerith("part-io"),
            hollerith(env!("CARGO_PKG_VERSION")),
            "32".into(),
            "38".into(),
            "6".into(),
            "308".into(),
            "15".into(),
            hollerith(name),
            "1.0".into(),
            config.unit.flag().to_string(),
            hollerith(config.unit.name()),
            "1".into(),
            "0.0".into(),
            hollerith(&date),
            real(RESOLUTION_MM * self.scale),
            real(max_coordinate),
            hollerith(&config.author),
            hollerith(&config.organization),
            "11".into(),
            "0".into(),
            hollerith(&date),
            String::new(),
        ];

        let mut out = String::new();
        let start = format!("part-io IGES export: {}", sanitize(name));
        let start_lines = pack(&[start], DATA_LEN);
        for (i, line) in start_lines.iter().enumerate() {
            out.push_str(&format!("{line:<72}S{:>7}\n", i + 1));
        }
        let global_lines = pack(&delimited(global), DATA_LEN);
        for (i, line) in global_lines.iter().enumerate() {
            out.push_str(&format!("{line:<72}G{:>7}\n", i + 1));
        }

        let mut directory = String::new();
        let mut parameters = String::new();
        let mut param_seq = 1;
        for (index, entity) in self.entities.iter().enumerate() {
            let de = 2 * index + 1;
            let mut tokens = vec![entity.entity_type.to_string()];
            tokens.extend(entity.params.iter().cloned());
            let lines = pack(&delimited(tokens), PARAM_DATA_LEN);
            let status = if entity.subordinate { STATUS_SUBORDINATE } else { STATUS_ROOT };
            directory.push_str(&format!(
                "{:>8}{param_seq:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{status}D{de:>7}\n",
                entity.entity_type, 0, 0, 0, 0, entity.transform, 0,
            ));
            directory.push_str(&format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}D{:>7}\n",
                entity.entity_type,
                0,
                0,
                lines.len(),
                entity.form,
                "",
                "",
                "",
                0,
                de + 1
            ));
            for line in &lines {
                parameters.push_str(&format!("{line:<64}{de:>8}P{param_seq:>7}\n"));
                param_seq += 1;
            }
        }
        out.push_str(&directory);
        out.push_str(&parameters);
        let totals = format!(
            "S{:>7}G{:>7}D{:>7}P{:>7}",
            start_lines.len(),
            global_lines.len(),
            2 * self.entities.len(),
            param_seq - 1
        );
        out.push_str(&format!("{totals:<72}T{:>7}\n", 1));
        out
    }
}

/// Edge list pointer and the 1-based index of every edge in it.
struct EdgeList {
    de: usize,
    index: HashMap<EdgeId, usize>,
}

fn pointers(values: &[usize]) -> Vec<String> {
    values.iter().map(usize::to_string).collect()
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// ASCII-only text as a Hollerith constant; empty text is defaulted.
fn hollerith(text: &str) -> String {
    let text = sanitize(text);
    if text.is_empty() {
        String::new()
    } else {
        format!("{}H{text}", text.len())
    }
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

/// Append parameter delimiters, ending with the record delimiter.
fn delimited(tokens: Vec<String>) -> Vec<String> {
    let last = tokens.len().saturating_sub(1);
    tokens
        .into_iter()
        .enumerate()
        .map(|(i, t)| if i == last { t + ";" } else { t + "," })
        .collect()
}

/// Greedy line filling that only breaks between tokens. Tokens wider than
/// a line are split into full-width pieces.
fn pack(tokens: &[String], width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for token in tokens {
        if current.len() + token.len() <= width {
            current.push_str(token);
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        let mut rest = token.as_str();
        while rest.len() > width {
            let (head, tail) = rest.split_at(width);
            lines.push(head.to_string());
            rest = tail;
        }
        current.push_str(rest);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Exact rational quadratic form of an elliptical arc, at most a quarter
/// turn per piece, parameterized over `[0, pieces]`.
fn ellipse_arc(e: &Ellipse3d, t0: f64, t1: f64) -> Result<NurbsCurve, GeometryError> {
    let sweep = t1 - t0;
    let pieces = ((sweep.abs() / FRAC_PI_2 - 1e-9).ceil() as usize).max(1);
    let step = sweep / pieces as f64;
    let w = (step / 2.0).cos();
    let a = e.major_axis * e.major_radius;
    let b = e.minor_axis() * e.minor_radius;
    let at = |t: f64, s: f64| e.center + a * (t.cos() * s) + b * (t.sin() * s);

    let mut control_points = vec![at(t0, 1.0)];
    let mut weights = vec![1.0];
    let mut knots = vec![0.0; 3];
    for i in 0..pieces {
        let lo = t0 + step * i as f64;
        control_points.push(at(lo + step / 2.0, 1.0 / w));
        weights.push(w);
        control_points.push(at(lo + step, 1.0));
        weights.push(1.0);
        let k = (i + 1) as f64;
        let multiplicity = if i + 1 == pieces { 3 } else { 2 };
        knots.extend(std::iter::repeat(k).take(multiplicity));
    }
    NurbsCurve::new(2, control_points, weights, knots)
}

/// The same curve traversed backwards, and the shift `s` such that the
/// old parameter `t` becomes `s - t`.
fn reversed_nurbs(n: &NurbsCurve) -> (NurbsCurve, f64) {
    let shift = n.knots[0] + n.knots[n.knots.len() - 1];
    let mut control_points = n.control_points.clone();
    control_points.reverse();
    let mut weights = n.weights.clone();
    weights.reverse();
    let knots = n.knots.iter().rev().map(|k| shift - k).collect();
    (
        NurbsCurve {
            degree: n.degree,
            control_points,
            weights,
            knots,
        },
        shift,
    )
}
