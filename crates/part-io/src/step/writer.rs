//! Part 21 output for AP214 boundary representations.

use std::collections::HashMap;

use chrono::Utc;
use part_kernel::geometry::curves::Curve;
use part_kernel::geometry::nurbs::{compress_knots, NurbsCurve, NurbsSurface};
use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::Surface;
use part_kernel::geometry::vector::Vec3;
use part_kernel::topology::brep::{EdgeId, EntityStore, FaceId, LoopId, ShellId, ShellOrientation, SolidId, VertexId};
use part_kernel::Shape;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::numbers::real;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepLengthUnit {
    #[default]
    Millimetre,
    Metre,
}

impl StepLengthUnit {
    /// File units per millimetre.
    fn per_mm(self) -> f64 {
        match self {
            StepLengthUnit::Millimetre => 1.0,
            StepLengthUnit::Metre => 1.0e-3,
        }
    }

    fn si_prefix(self) -> &'static str {
        match self {
            StepLengthUnit::Millimetre => ".MILLI.",
            StepLengthUnit::Metre => "$",
        }
    }
}

/// Header and unit settings for STEP output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepWriterConfig {
    pub author: String,
    pub organization: String,
    pub originating_system: String,
    pub length_unit: StepLengthUnit,
}

impl Default for StepWriterConfig {
    fn default() -> Self {
        Self {
            author: String::new(),
            organization: String::new(),
            originating_system: "part-io".to_string(),
            length_unit: StepLengthUnit::Millimetre,
        }
    }
}

impl StepWriterConfig {
    pub fn with_length_unit(mut self, length_unit: StepLengthUnit) -> Self {
        self.length_unit = length_unit;
        self
    }
}

/// Serialize `shape` as a complete Part 21 document.
pub fn write(shape: &Shape, name: &str, config: &StepWriterConfig) -> String {
    let mut writer = StepWriter {
        shape,
        scale: config.length_unit.per_mm(),
        data: String::new(),
        next_id: 1,
        vertices: HashMap::new(),
        edges: HashMap::new(),
    };

    let context = writer.product_skeleton(name, config.length_unit);
    let origin = writer.placement(Point3d::ORIGIN, Vec3::Z, Vec3::X);
    let mut items = vec![origin];
    let mut all_closed = true;
    for &solid in shape.solids() {
        let (item, closed) = writer.solid(solid);
        all_closed &= closed;
        items.push(item);
    }
    let representation = if all_closed {
        "ADVANCED_BREP_SHAPE_REPRESENTATION"
    } else {
        "SHAPE_REPRESENTATION"
    };
    let rep = writer.add(format!("{representation}('',{},#{})", refs(&items), context.context));
    writer.add(format!("SHAPE_DEFINITION_REPRESENTATION(#{},#{rep})", context.product_shape));
    debug!(entities = writer.next_id - 1, "STEP data section built");

    let mut out = String::new();
    out.push_str("ISO-10303-21;\nHEADER;\n");
    out.push_str("FILE_DESCRIPTION(('boundary representation model'),'2;1');\n");
    out.push_str(&format!(
        "FILE_NAME({},'{}',({}),({}),{},{},'');\n",
        string(name),
        Utc::now().format("%Y-%m-%dT%H:%M:%S"),
        string(&config.author),
        string(&config.organization),
        string("part-io"),
        string(&config.originating_system),
    ));
    out.push_str("FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'));\nENDSEC;\nDATA;\n");
    out.push_str(&writer.data);
    out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    out
}

struct Skeleton {
    product_shape: u64,
    context: u64,
}

struct StepWriter<'a> {
    shape: &'a Shape,
    scale: f64,
    data: String,
    next_id: u64,
    vertices: HashMap<VertexId, u64>,
    edges: HashMap<EdgeId, u64>,
}

impl<'a> StepWriter<'a> {
    fn store(&self) -> &'a EntityStore {
        self.shape.store()
    }

    fn add(&mut self, body: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.data.push_str(&format!("#{id}={body};\n"));
        id
    }

    fn product_skeleton(&mut self, name: &str, unit: StepLengthUnit) -> Skeleton {
        let app = self.add("APPLICATION_CONTEXT('core data for automotive mechanical design processes')".into());
        self.add(format!(
            "APPLICATION_PROTOCOL_DEFINITION('international standard','automotive_design',2000,#{app})"
        ));
        let product_context = self.add(format!("PRODUCT_CONTEXT('',#{app},'mechanical')"));
        let product = self.add(format!(
            "PRODUCT({0},{0},'',(#{product_context}))",
            string(name)
        ));
        self.add(format!("PRODUCT_RELATED_PRODUCT_CATEGORY('part',$,(#{product}))"));
        let formation = self.add(format!("PRODUCT_DEFINITION_FORMATION('','',#{product})"));
        let definition_context = self.add(format!("PRODUCT_DEFINITION_CONTEXT('part definition',#{app},'design')"));
        let definition = self.add(format!(
            "PRODUCT_DEFINITION('design','',#{formation},#{definition_context})"
        ));
        let product_shape = self.add(format!("PRODUCT_DEFINITION_SHAPE('','',#{definition})"));

        let length = self.add(format!(
            "(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT({},.METRE.))",
            unit.si_prefix()
        ));
        let angle = self.add("(NAMED_UNIT(*)PLANE_ANGLE_UNIT()SI_UNIT($,.RADIAN.))".into());
        let solid_angle = self.add("(NAMED_UNIT(*)SI_UNIT($,.STERADIAN.)SOLID_ANGLE_UNIT())".into());
        let uncertainty = self.add(format!(
            "UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE({}),#{length},'distance_accuracy_value','confusion accuracy')",
            real(1.0e-7 * self.scale)
        ));
        let context = self.add(format!(
            "(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNCERTAINTY_ASSIGNED_CONTEXT((#{uncertainty}))\
             GLOBAL_UNIT_ASSIGNED_CONTEXT((#{length},#{angle},#{solid_angle}))\
             REPRESENTATION_CONTEXT('Context #1','3D Context with UNIT and UNCERTAINTY'))"
        ));
        Skeleton { product_shape, context }
    }

    /// Returns the representation item and whether it is a closed solid.
    fn solid(&mut self, solid: SolidId) -> (u64, bool) {
        let store = self.store();
        let shells = store.solids[solid].shells.clone();
        let all_closed = !shells.is_empty() && shells.iter().all(|&s| store.shells[s].closed);
        if !all_closed {
            let shell_ids: Vec<u64> = shells.iter().map(|&s| self.shell(s)).collect();
            let model = self.add(format!("SHELL_BASED_SURFACE_MODEL('',{})", refs(&shell_ids)));
            return (model, false);
        }

        let (outer, voids): (Vec<ShellId>, Vec<ShellId>) = shells
            .iter()
            .copied()
            .partition(|&s| store.shells[s].orientation == ShellOrientation::Outward);
        // A solid with several outer shells is written with the first one
        // as its boundary and the rest as voids.
        let mut rest = outer.iter().skip(1).copied().collect::<Vec<_>>();
        rest.extend(voids);
        let outer_id = self.shell(outer.first().copied().unwrap_or(shells[0]));
        if rest.is_empty() || outer.is_empty() {
            let item = self.add(format!("MANIFOLD_SOLID_BREP('',#{outer_id})"));
            return (item, true);
        }
        let void_ids: Vec<u64> = rest
            .iter()
            .map(|&s| {
                let shell = self.shell(s);
                self.add(format!("ORIENTED_CLOSED_SHELL('',*,#{shell},.F.)"))
            })
            .collect();
        let item = self.add(format!("BREP_WITH_VOIDS('',#{outer_id},{})", refs(&void_ids)));
        (item, true)
    }

    fn shell(&mut self, shell: ShellId) -> u64 {
        let store = self.store();
        let faces: Vec<u64> = store.shells[shell].faces.iter().map(|&f| self.face(f)).collect();
        let kind = if store.shells[shell].closed {
            "CLOSED_SHELL"
        } else {
            "OPEN_SHELL"
        };
        self.add(format!("{kind}('',{})", refs(&faces)))
    }

    fn face(&mut self, face_id: FaceId) -> u64 {
        let face = &self.store().faces[face_id];
        let mut bounds = Vec::new();
        if let Some(outer) = self.bound(face.outer_loop, "FACE_OUTER_BOUND") {
            bounds.push(outer);
        }
        for &inner in &face.inner_loops {
            if let Some(bound) = self.bound(inner, "FACE_BOUND") {
                bounds.push(bound);
            }
        }
        let surface = self.surface(&face.surface);
        self.add(format!(
            "ADVANCED_FACE('',{},#{surface},{})",
            refs(&bounds),
            boolean(face.same_sense)
        ))
    }

    fn bound(&mut self, loop_id: LoopId, kind: &str) -> Option<u64> {
        let store = self.store();
        let half_edges = &store.loops[loop_id].half_edges;
        if half_edges.is_empty() {
            return None;
        }
        let oriented: Vec<u64> = half_edges
            .iter()
            .map(|&he_id| {
                let he = store.half_edges[he_id];
                let edge = self.edge(he.edge);
                self.add(format!("ORIENTED_EDGE('',*,*,#{edge},{})", boolean(he.forward)))
            })
            .collect();
        let edge_loop = self.add(format!("EDGE_LOOP('',{})", refs(&oriented)));
        Some(self.add(format!("{kind}('',#{edge_loop},.T.)")))
    }

    fn edge(&mut self, edge_id: EdgeId) -> u64 {
        if let Some(&id) = self.edges.get(&edge_id) {
            return id;
        }
        let edge = &self.store().edges[edge_id];
        let start = self.vertex(edge.start_vertex);
        let end = self.vertex(edge.end_vertex);
        let curve = self.curve(&edge.curve);
        let id = self.add(format!("EDGE_CURVE('',#{start},#{end},#{curve},.T.)"));
        self.edges.insert(edge_id, id);
        id
    }

    fn vertex(&mut self, vertex_id: VertexId) -> u64 {
        if let Some(&id) = self.vertices.get(&vertex_id) {
            return id;
        }
        let point = self.store().vertices[vertex_id].point;
        let point = self.point(point);
        let id = self.add(format!("VERTEX_POINT('',#{point})"));
        self.vertices.insert(vertex_id, id);
        id
    }

    fn point(&mut self, p: Point3d) -> u64 {
        let s = self.scale;
        self.add(format!(
            "CARTESIAN_POINT('',({},{},{}))",
            real(p.x * s),
            real(p.y * s),
            real(p.z * s)
        ))
    }

    fn direction(&mut self, d: Vec3) -> u64 {
        self.add(format!("DIRECTION('',({},{},{}))", real(d.x), real(d.y), real(d.z)))
    }

    fn placement(&mut self, location: Point3d, axis: Vec3, ref_dir: Vec3) -> u64 {
        let location = self.point(location);
        let axis = self.direction(axis);
        let ref_dir = self.direction(ref_dir);
        self.add(format!("AXIS2_PLACEMENT_3D('',#{location},#{axis},#{ref_dir})"))
    }

    fn curve(&mut self, curve: &Curve) -> u64 {
        let s = self.scale;
        match curve {
            Curve::Line(line) => {
                let origin = self.point(line.origin);
                let direction = self.direction(line.direction);
                let vector = self.add(format!("VECTOR('',#{direction},1.)"));
                self.add(format!("LINE('',#{origin},#{vector})"))
            }
            Curve::Circle(circle) => {
                let placement = self.placement(circle.center, circle.normal, circle.x_axis);
                self.add(format!("CIRCLE('',#{placement},{})", real(circle.radius * s)))
            }
            Curve::Ellipse(ellipse) => {
                let placement = self.placement(ellipse.center, ellipse.normal, ellipse.major_axis);
                self.add(format!(
                    "ELLIPSE('',#{placement},{},{})",
                    real(ellipse.major_radius * s),
                    real(ellipse.minor_radius * s)
                ))
            }
            Curve::Nurbs(nurbs) => self.bspline_curve(nurbs),
        }
    }

    fn bspline_curve(&mut self, nurbs: &NurbsCurve) -> u64 {
        let points: Vec<u64> = nurbs.control_points.iter().map(|&p| self.point(p)).collect();
        let (mults, values) = compress_knots(&nurbs.knots);
        let knots = format!("({}),({}),.UNSPECIFIED.", integers(&mults), reals(&values));
        let base = format!("{},{},.UNSPECIFIED.,.F.,.F.", nurbs.degree, refs(&points));
        if nurbs.is_rational() {
            self.add(format!(
                "(BOUNDED_CURVE()B_SPLINE_CURVE({base})B_SPLINE_CURVE_WITH_KNOTS({knots})CURVE()\
                 GEOMETRIC_REPRESENTATION_ITEM()RATIONAL_B_SPLINE_CURVE(({}))REPRESENTATION_ITEM(''))",
                reals(&nurbs.weights)
            ))
        } else {
            self.add(format!("B_SPLINE_CURVE_WITH_KNOTS('',{base},{knots})"))
        }
    }

    fn surface(&mut self, surface: &Surface) -> u64 {
        let s = self.scale;
        match surface {
            Surface::Plane(plane) => {
                let placement = self.placement(plane.origin, plane.normal, plane.u_axis);
                self.add(format!("PLANE('',#{placement})"))
            }
            Surface::Cylinder(cyl) => {
                let placement = self.placement(cyl.origin, cyl.axis, cyl.ref_dir);
                self.add(format!("CYLINDRICAL_SURFACE('',#{placement},{})", real(cyl.radius * s)))
            }
            Surface::Cone(cone) => {
                // Placed at the apex, where the reference radius is zero.
                let placement = self.placement(cone.apex, cone.axis, cone.ref_dir);
                self.add(format!("CONICAL_SURFACE('',#{placement},0.,{})", real(cone.half_angle)))
            }
            Surface::Sphere(sphere) => {
                let placement = self.placement(sphere.center, sphere.axis, sphere.ref_dir);
                self.add(format!("SPHERICAL_SURFACE('',#{placement},{})", real(sphere.radius * s)))
            }
            Surface::Torus(torus) => {
                let placement = self.placement(torus.center, torus.axis, torus.ref_dir);
                self.add(format!(
                    "TOROIDAL_SURFACE('',#{placement},{},{})",
                    real(torus.major_radius * s),
                    real(torus.minor_radius * s)
                ))
            }
            Surface::Nurbs(nurbs) => self.bspline_surface(nurbs),
        }
    }

    fn bspline_surface(&mut self, nurbs: &NurbsSurface) -> u64 {
        let rows: Vec<String> = (0..nurbs.num_u)
            .map(|i| {
                let row: Vec<u64> = (0..nurbs.num_v).map(|j| self.point(nurbs.control_point(i, j))).collect();
                refs(&row)
            })
            .collect();
        let (u_mults, u_values) = compress_knots(&nurbs.knots_u);
        let (v_mults, v_values) = compress_knots(&nurbs.knots_v);
        let base = format!(
            "{},{},({}),.UNSPECIFIED.,.F.,.F.,.F.",
            nurbs.degree_u,
            nurbs.degree_v,
            rows.join(",")
        );
        let knots = format!(
            "({}),({}),({}),({}),.UNSPECIFIED.",
            integers(&u_mults),
            integers(&v_mults),
            reals(&u_values),
            reals(&v_values)
        );
        if nurbs.is_rational() {
            let weights: Vec<String> = (0..nurbs.num_u)
                .map(|i| {
                    let row: Vec<f64> = (0..nurbs.num_v).map(|j| nurbs.weight(i, j)).collect();
                    format!("({})", reals(&row))
                })
                .collect();
            self.add(format!(
                "(BOUNDED_SURFACE()B_SPLINE_SURFACE({base})B_SPLINE_SURFACE_WITH_KNOTS({knots})\
                 GEOMETRIC_REPRESENTATION_ITEM()RATIONAL_B_SPLINE_SURFACE(({}))REPRESENTATION_ITEM('')SURFACE())",
                weights.join(",")
            ))
        } else {
            self.add(format!("B_SPLINE_SURFACE_WITH_KNOTS('',{base},{knots})"))
        }
    }
}

fn reals(values: &[f64]) -> String {
    values.iter().map(|&v| real(v)).collect::<Vec<_>>().join(",")
}

fn integers(values: &[usize]) -> String {
    values.iter().map(usize::to_string).collect::<Vec<_>>().join(",")
}

fn refs(ids: &[u64]) -> String {
    let list: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
    format!("({})", list.join(","))
}

fn string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn boolean(b: bool) -> &'static str {
    if b {
        ".T."
    } else {
        ".F."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::data::parse;
    use part_kernel::topology::primitives::make_box;

    #[test]
    fn test_string_escaping() {
        assert_eq!(string("it's"), "'it''s'");
    }

    #[test]
    fn test_box_document_parses() {
        let mut store = EntityStore::new();
        let solid = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let text = write(&shape, "box", &StepWriterConfig::default());
        assert!(text.starts_with("ISO-10303-21;\nHEADER;"));
        assert!(text.trim_end().ends_with("END-ISO-10303-21;"));

        let file = parse(&text).unwrap();
        assert_eq!(file.of_type("MANIFOLD_SOLID_BREP").count(), 1);
        assert_eq!(file.of_type("CLOSED_SHELL").count(), 1);
        assert_eq!(file.of_type("ADVANCED_FACE").count(), 6);
        assert_eq!(file.of_type("EDGE_CURVE").count(), 12);
        assert_eq!(file.of_type("VERTEX_POINT").count(), 8);
        assert_eq!(file.of_type("ADVANCED_BREP_SHAPE_REPRESENTATION").count(), 1);
        let unit = file.entities.values().find(|e| e.has_part("LENGTH_UNIT")).unwrap();
        assert_eq!(unit.part_args("SI_UNIT").unwrap().enumeration(0).unwrap(), "MILLI");
    }

    #[test]
    fn test_metre_output_scales_points() {
        let mut store = EntityStore::new();
        let solid = make_box(&mut store, 0.0, 0.0, 0.0, 1000.0, 1000.0, 1000.0).unwrap();
        let shape = Shape::from_parts(store, vec![solid]);
        let config = StepWriterConfig::default().with_length_unit(StepLengthUnit::Metre);
        let file = parse(&write(&shape, "box", &config)).unwrap();
        let max = file
            .of_type("CARTESIAN_POINT")
            .flat_map(|p| p.args().reals(1).unwrap())
            .fold(f64::MIN, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
    }
}
