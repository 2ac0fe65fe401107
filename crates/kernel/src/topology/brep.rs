use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key, SlotMap};
use std::collections::HashSet;

use crate::geometry::curves::Curve;
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::Surface;
use crate::geometry::vector::Vec3;

// ─── Entity Keys ─────────────────────────────────────────────────────────────

new_key_type! {
    pub struct VertexId;
    pub struct EdgeId;
    pub struct HalfEdgeId;
    pub struct LoopId;
    pub struct FaceId;
    pub struct ShellId;
    pub struct SolidId;
}

// ─── Topological Entities ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Point3d,
    pub tolerance: f64,
}

/// A bounded piece of curve running from `start_vertex` to `end_vertex`
/// as the curve parameter increases over `range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub curve: Curve,
    pub range: (f64, f64),
    /// First and second use of the edge; null keys until attached to a loop.
    pub half_edges: (HalfEdgeId, HalfEdgeId),
    pub start_vertex: VertexId,
    pub end_vertex: VertexId,
}

impl Edge {
    pub fn is_closed(&self) -> bool {
        self.start_vertex == self.end_vertex
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfEdge {
    pub edge: EdgeId,
    pub twin: HalfEdgeId,
    pub face: FaceId,
    pub loop_id: LoopId,
    pub start_vertex: VertexId,
    pub end_vertex: VertexId,
    /// Parameter range on the edge's curve, in traversal order.
    pub t_start: f64,
    pub t_end: f64,
    /// true if this half-edge traverses the curve in the forward direction.
    pub forward: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub half_edges: Vec<HalfEdgeId>,
    pub face: FaceId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub surface: Surface,
    pub outer_loop: LoopId,
    pub inner_loops: Vec<LoopId>,
    /// true if the face normal agrees with the surface normal.
    pub same_sense: bool,
    pub shell: ShellId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShellOrientation {
    /// Outer shell (normals point outward).
    Outward,
    /// Void shell (normals point inward, represents a cavity).
    Inward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    pub faces: Vec<FaceId>,
    pub orientation: ShellOrientation,
    /// false for surface models (sheet bodies).
    pub closed: bool,
    pub solid: SolidId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solid {
    pub shells: Vec<ShellId>,
}

// ─── Entity Store ────────────────────────────────────────────────────────────

/// Arena-based storage for all topological entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    pub vertices: SlotMap<VertexId, Vertex>,
    pub edges: SlotMap<EdgeId, Edge>,
    pub half_edges: SlotMap<HalfEdgeId, HalfEdge>,
    pub loops: SlotMap<LoopId, Loop>,
    pub faces: SlotMap<FaceId, Face>,
    pub shells: SlotMap<ShellId, Shell>,
    pub solids: SlotMap<SolidId, Solid>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, point: Point3d) -> VertexId {
        self.vertices.insert(Vertex {
            point,
            tolerance: crate::default_tolerance().coincidence,
        })
    }

    /// Add an edge; its parameter range is derived from the vertex positions.
    pub fn add_edge(&mut self, curve: Curve, start: VertexId, end: VertexId) -> EdgeId {
        let p0 = self.vertices[start].point;
        let p1 = self.vertices[end].point;
        let range = curve.parameter_range(&p0, &p1, start == end);
        self.add_edge_with_range(curve, start, end, range)
    }

    pub fn add_edge_with_range(&mut self, curve: Curve, start: VertexId, end: VertexId, range: (f64, f64)) -> EdgeId {
        self.edges.insert(Edge {
            curve,
            range,
            half_edges: (HalfEdgeId::null(), HalfEdgeId::null()),
            start_vertex: start,
            end_vertex: end,
        })
    }

    pub fn add_solid(&mut self) -> SolidId {
        self.solids.insert(Solid { shells: vec![] })
    }

    pub fn add_shell(&mut self, solid: SolidId, orientation: ShellOrientation, closed: bool) -> ShellId {
        let shell_id = self.shells.insert(Shell {
            faces: vec![],
            orientation,
            closed,
            solid,
        });
        self.solids[solid].shells.push(shell_id);
        shell_id
    }

    /// Add a face with an empty outer loop to `shell`.
    pub fn add_face(&mut self, shell: ShellId, surface: Surface, same_sense: bool) -> FaceId {
        let loop_id = self.loops.insert(Loop {
            half_edges: vec![],
            face: FaceId::null(),
        });
        let face_id = self.faces.insert(Face {
            surface,
            outer_loop: loop_id,
            inner_loops: vec![],
            same_sense,
            shell,
        });
        self.loops[loop_id].face = face_id;
        self.shells[shell].faces.push(face_id);
        face_id
    }

    pub fn add_inner_loop(&mut self, face: FaceId) -> LoopId {
        let loop_id = self.loops.insert(Loop {
            half_edges: vec![],
            face,
        });
        self.faces[face].inner_loops.push(loop_id);
        loop_id
    }

    /// Append a use of `edge` to `loop_id`, linking twins on the second use.
    pub fn push_half_edge(&mut self, loop_id: LoopId, edge_id: EdgeId, forward: bool) -> HalfEdgeId {
        let face = self.loops[loop_id].face;
        let edge = &self.edges[edge_id];
        let (start_vertex, end_vertex, t_start, t_end) = if forward {
            (edge.start_vertex, edge.end_vertex, edge.range.0, edge.range.1)
        } else {
            (edge.end_vertex, edge.start_vertex, edge.range.1, edge.range.0)
        };
        let first_use = edge.half_edges.0;

        let he_id = self.half_edges.insert(HalfEdge {
            edge: edge_id,
            twin: HalfEdgeId::null(),
            face,
            loop_id,
            start_vertex,
            end_vertex,
            t_start,
            t_end,
            forward,
        });
        self.loops[loop_id].half_edges.push(he_id);

        let edge = &mut self.edges[edge_id];
        if first_use.is_null() {
            edge.half_edges.0 = he_id;
        } else if edge.half_edges.1.is_null() {
            edge.half_edges.1 = he_id;
            self.half_edges[he_id].twin = first_use;
            self.half_edges[first_use].twin = he_id;
        }
        he_id
    }

    /// Count topological entities for a shell: (vertices, edges, faces).
    pub fn count_topology(&self, shell_id: ShellId) -> (usize, usize, usize) {
        let shell = &self.shells[shell_id];
        let mut edge_set = HashSet::new();
        let mut vertex_set = HashSet::new();

        for &face_id in &shell.faces {
            let face = &self.faces[face_id];
            for loop_id in std::iter::once(face.outer_loop).chain(face.inner_loops.iter().copied()) {
                for &he_id in &self.loops[loop_id].half_edges {
                    let he = &self.half_edges[he_id];
                    edge_set.insert(he.edge);
                    vertex_set.insert(he.start_vertex);
                    vertex_set.insert(he.end_vertex);
                }
            }
        }

        (vertex_set.len(), edge_set.len(), shell.faces.len())
    }

    /// Edges used twice by the same face (periodic surface seams).
    pub fn seam_edges(&self, face_id: FaceId) -> HashSet<EdgeId> {
        let face = &self.faces[face_id];
        let mut seen = HashSet::new();
        let mut seams = HashSet::new();
        for loop_id in std::iter::once(face.outer_loop).chain(face.inner_loops.iter().copied()) {
            for &he_id in &self.loops[loop_id].half_edges {
                let edge = self.half_edges[he_id].edge;
                if !seen.insert(edge) {
                    seams.insert(edge);
                }
            }
        }
        seams
    }

    /// Face normal at a parameter point, flipped for reversed faces.
    pub fn face_normal(&self, face_id: FaceId, u: f64, v: f64) -> Vec3 {
        let face = &self.faces[face_id];
        let n = face.surface.normal_at(u, v);
        if face.same_sense { n } else { -n }
    }

    pub fn is_loop_closed(&self, loop_id: LoopId) -> bool {
        let half_edges = &self.loops[loop_id].half_edges;
        let (Some(first), Some(last)) = (half_edges.first(), half_edges.last()) else {
            return false;
        };
        let chained = half_edges
            .windows(2)
            .all(|w| self.half_edges[w[0]].end_vertex == self.half_edges[w[1]].start_vertex);
        chained && self.half_edges[*first].start_vertex == self.half_edges[*last].end_vertex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::curves::Line3d;
    use crate::geometry::surfaces::Plane;

    #[test]
    fn test_entity_store_creation() {
        let store = EntityStore::new();
        assert_eq!(store.vertices.len(), 0);
        assert_eq!(store.edges.len(), 0);
    }

    #[test]
    fn test_edge_range_from_vertices() {
        let mut store = EntityStore::new();
        let a = store.add_vertex(Point3d::new(1.0, 0.0, 0.0));
        let b = store.add_vertex(Point3d::new(4.0, 0.0, 0.0));
        let line = Line3d::new(Point3d::ORIGIN, Vec3::X).unwrap();
        let e = store.add_edge(Curve::Line(line), a, b);
        assert_eq!(store.edges[e].range, (1.0, 4.0));
        assert!(!store.edges[e].is_closed());
    }

    #[test]
    fn test_second_use_links_twins() {
        let mut store = EntityStore::new();
        let solid = store.add_solid();
        let shell = store.add_shell(solid, ShellOrientation::Outward, false);
        let f1 = store.add_face(shell, Surface::Plane(Plane::xy()), true);
        let f2 = store.add_face(shell, Surface::Plane(Plane::xy()), false);

        let a = store.add_vertex(Point3d::ORIGIN);
        let b = store.add_vertex(Point3d::new(2.0, 0.0, 0.0));
        let e = store.add_edge(Curve::Line(Line3d::from_points(Point3d::ORIGIN, Point3d::new(2.0, 0.0, 0.0)).unwrap()), a, b);

        let h1 = store.push_half_edge(store.faces[f1].outer_loop, e, true);
        let h2 = store.push_half_edge(store.faces[f2].outer_loop, e, false);
        assert_eq!(store.half_edges[h1].twin, h2);
        assert_eq!(store.half_edges[h2].twin, h1);
        assert_eq!(store.half_edges[h2].start_vertex, b);
        assert_eq!((store.half_edges[h2].t_start, store.half_edges[h2].t_end), (2.0, 0.0));
        assert!(!store.is_loop_closed(store.faces[f1].outer_loop));
    }
}
