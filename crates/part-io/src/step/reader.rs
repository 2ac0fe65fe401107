//! Translation of a parsed entity graph into a [`Shape`].

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use part_kernel::geometry::curves::{Circle3d, Curve, Ellipse3d, Line3d};
use part_kernel::geometry::nurbs::{expand_knots, NurbsCurve, NurbsSurface};
use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::{Cone, Cylinder, Plane, Sphere, Surface, Torus};
use part_kernel::geometry::vector::Vec3;
use part_kernel::topology::brep::{EdgeId, EntityStore, ShellId, ShellOrientation, SolidId, VertexId};
use part_kernel::{GeometryError, Shape};
use tracing::{debug, warn};

use crate::errors::StepError;

use super::data::{collect_refs, Args, ParameterExt, StepEntity, StepFile};

const SOLID_TYPES: [&str; 3] = ["MANIFOLD_SOLID_BREP", "BREP_WITH_VOIDS", "SHELL_BASED_SURFACE_MODEL"];
const SHELL_TYPES: [&str; 2] = ["CLOSED_SHELL", "OPEN_SHELL"];
/// Longest chain of SURFACE_CURVE/SEAM_CURVE/TRIMMED_CURVE wrappers followed.
const MAX_CURVE_DEPTH: usize = 16;

/// Build a shape from every root of `file`.
pub fn translate(file: &StepFile) -> Result<Shape, StepError> {
    let (length_scale, angle_scale) = unit_scales(file);
    debug!(length_scale, angle_scale, entities = file.entities.len(), "translating STEP data");

    let mut translator = Translator {
        file,
        length_scale,
        angle_scale,
        store: EntityStore::new(),
        vertices: HashMap::new(),
        edges: HashMap::new(),
        skipped_faces: 0,
    };
    let mut solids = Vec::new();
    for id in roots(file) {
        solids.push(translator.root(id)?);
    }
    if translator.skipped_faces > 0 {
        warn!(count = translator.skipped_faces, "skipped faces with unsupported surfaces");
    }
    Ok(Shape::from_parts(translator.store, solids))
}

/// Solids, surface models and unreferenced shells, in ascending id order.
fn roots(file: &StepFile) -> Vec<u64> {
    let mut referenced = HashSet::new();
    for entity in file.entities.values() {
        for part in &entity.parts {
            collect_refs(&part.parameter, &mut referenced);
        }
    }
    file.entities
        .values()
        .filter(|e| {
            let t = e.type_name();
            SOLID_TYPES.contains(&t) || (SHELL_TYPES.contains(&t) && !referenced.contains(&e.id))
        })
        .map(|e| e.id)
        .collect()
}

/// Millimetres per file length unit, and radians per file angle unit.
fn unit_scales(file: &StepFile) -> (f64, f64) {
    let length = file
        .entities
        .values()
        .filter(|e| e.has_part("LENGTH_UNIT"))
        .find_map(|e| length_unit_scale(file, e, 0))
        .unwrap_or(1.0);
    let angle = file
        .entities
        .values()
        .find(|e| e.has_part("PLANE_ANGLE_UNIT"))
        .map(|e| if e.has_part("CONVERSION_BASED_UNIT") { PI / 180.0 } else { 1.0 })
        .unwrap_or(1.0);
    (length, angle)
}

fn length_unit_scale(file: &StepFile, unit: &StepEntity, depth: usize) -> Option<f64> {
    if let Ok(si) = unit.part_args("SI_UNIT") {
        let prefix = si.first().and_then(ParameterExt::as_enum);
        return Some(match prefix {
            None => 1000.0,
            Some("KILO") => 1.0e6,
            Some("DECI") => 100.0,
            Some("CENTI") => 10.0,
            Some("MILLI") => 1.0,
            Some("MICRO") => 1.0e-3,
            Some("NANO") => 1.0e-6,
            Some(other) => {
                warn!(prefix = other, "unknown SI prefix; assuming millimetres");
                1.0
            }
        });
    }
    let conversion = unit.part_args("CONVERSION_BASED_UNIT").ok()?;
    if let Ok(name) = conversion.string(0) {
        match name.to_ascii_uppercase().as_str() {
            "INCH" => return Some(25.4),
            "FOOT" => return Some(304.8),
            _ => {}
        }
    }
    // Follow MEASURE_WITH_UNIT(value, base unit).
    if depth > 4 {
        return None;
    }
    let measure = file.get(conversion.reference(1).ok()?)?;
    let factor = measure.args().real(0).ok()?;
    let base = file.get(measure.args().reference(1).ok()?)?;
    Some(factor * length_unit_scale(file, base, depth + 1)?)
}

struct Translator<'a> {
    file: &'a StepFile,
    length_scale: f64,
    angle_scale: f64,
    store: EntityStore,
    vertices: HashMap<u64, VertexId>,
    /// EDGE_CURVE id to the kernel edge and the entity's `same_sense`.
    edges: HashMap<u64, (EdgeId, bool)>,
    skipped_faces: usize,
}

impl<'a> Translator<'a> {
    fn entity(&self, id: u64) -> Result<&'a StepEntity, StepError> {
        self.file.require(id)
    }

    fn expect_type(&self, id: u64, types: &[&str]) -> Result<&'a StepEntity, StepError> {
        let entity = self.entity(id)?;
        if types.contains(&entity.type_name()) {
            Ok(entity)
        } else {
            Err(StepError::unexpected(id, types.join(" or "), entity.type_name()))
        }
    }

    fn root(&mut self, id: u64) -> Result<SolidId, StepError> {
        let entity = self.entity(id)?;
        let args = entity.args();
        let solid = self.store.add_solid();
        match entity.type_name() {
            "MANIFOLD_SOLID_BREP" => {
                self.shell(args.reference(1)?, solid, ShellOrientation::Outward)?;
            }
            "BREP_WITH_VOIDS" => {
                self.shell(args.reference(1)?, solid, ShellOrientation::Outward)?;
                for void in args.references(2)? {
                    let oriented = self.expect_type(void, &["ORIENTED_CLOSED_SHELL"])?;
                    let shell = oriented.args().reference(2)?;
                    self.shell(shell, solid, ShellOrientation::Inward)?;
                }
            }
            "SHELL_BASED_SURFACE_MODEL" => {
                for shell in args.references(1)? {
                    self.shell(shell, solid, ShellOrientation::Outward)?;
                }
            }
            _ => {
                self.shell(id, solid, ShellOrientation::Outward)?;
            }
        }
        Ok(solid)
    }

    fn shell(&mut self, id: u64, solid: SolidId, orientation: ShellOrientation) -> Result<ShellId, StepError> {
        let entity = self.expect_type(id, &["CLOSED_SHELL", "OPEN_SHELL", "ORIENTED_CLOSED_SHELL"])?;
        let entity = if entity.type_name() == "ORIENTED_CLOSED_SHELL" {
            self.expect_type(entity.args().reference(2)?, &SHELL_TYPES)?
        } else {
            entity
        };
        let closed = entity.type_name() == "CLOSED_SHELL";
        let shell = self.store.add_shell(solid, orientation, closed);
        for face in entity.args().references(1)? {
            self.face(face, shell)?;
        }
        Ok(shell)
    }

    fn face(&mut self, id: u64, shell: ShellId) -> Result<(), StepError> {
        let entity = self.expect_type(id, &["ADVANCED_FACE", "FACE_SURFACE"])?;
        let args = entity.args();
        let Some(surface) = self.surface(args.reference(2)?)? else {
            self.skipped_faces += 1;
            return Ok(());
        };
        let same_sense = args.boolean(3)?;
        let face = self.store.add_face(shell, surface, same_sense);

        let bounds = args.references(1)?;
        let outer = bounds
            .iter()
            .position(|&b| self.file.get(b).is_some_and(|e| e.type_name() == "FACE_OUTER_BOUND"))
            .unwrap_or(0);
        for (index, &bound_id) in bounds.iter().enumerate() {
            let bound = self.expect_type(bound_id, &["FACE_BOUND", "FACE_OUTER_BOUND"])?;
            let bound_args = bound.args();
            let edge_loop = self.expect_type(bound_args.reference(1)?, &["EDGE_LOOP", "VERTEX_LOOP"])?;
            if edge_loop.type_name() == "VERTEX_LOOP" {
                debug!(face = id, "skipping vertex loop");
                continue;
            }
            let uses = self.loop_uses(edge_loop, bound_args.boolean(2)?)?;
            let loop_id = if index == outer {
                self.store.faces[face].outer_loop
            } else {
                self.store.add_inner_loop(face)
            };
            for (edge, forward) in uses {
                self.store.push_half_edge(loop_id, edge, forward);
            }
        }
        Ok(())
    }

    /// Edges of an EDGE_LOOP with their traversal direction, reversed when
    /// the bound's orientation is false.
    fn loop_uses(&mut self, edge_loop: &StepEntity, orientation: bool) -> Result<Vec<(EdgeId, bool)>, StepError> {
        let mut uses = Vec::new();
        for oriented_id in edge_loop.args().references(1)? {
            let oriented = self.expect_type(oriented_id, &["ORIENTED_EDGE"])?;
            let args = oriented.args();
            let (edge, same_sense) = self.edge(args.reference(3)?)?;
            let forward = args.boolean(4)? == same_sense;
            uses.push((edge, forward));
        }
        if !orientation {
            uses.reverse();
            for (_, forward) in &mut uses {
                *forward = !*forward;
            }
        }
        Ok(uses)
    }

    fn edge(&mut self, id: u64) -> Result<(EdgeId, bool), StepError> {
        if let Some(&cached) = self.edges.get(&id) {
            return Ok(cached);
        }
        let entity = self.expect_type(id, &["EDGE_CURVE"])?;
        let args = entity.args();
        let v1 = self.vertex(args.reference(1)?)?;
        let v2 = self.vertex(args.reference(2)?)?;
        let curve = self.curve(args.reference(3)?)?;
        let same_sense = args.boolean(4)?;
        // Kernel edges always run with the curve parameter.
        let (start, end) = if same_sense { (v1, v2) } else { (v2, v1) };
        let edge = self.store.add_edge(curve, start, end);
        self.edges.insert(id, (edge, same_sense));
        Ok((edge, same_sense))
    }

    fn vertex(&mut self, id: u64) -> Result<VertexId, StepError> {
        if let Some(&vertex) = self.vertices.get(&id) {
            return Ok(vertex);
        }
        let entity = self.expect_type(id, &["VERTEX_POINT"])?;
        let point = self.point(entity.args().reference(1)?)?;
        let vertex = self.store.add_vertex(point);
        self.vertices.insert(id, vertex);
        Ok(vertex)
    }

    fn point(&self, id: u64) -> Result<Point3d, StepError> {
        let entity = self.expect_type(id, &["CARTESIAN_POINT"])?;
        let coords = entity.args().reals(1)?;
        if coords.is_empty() || coords.len() > 3 {
            return Err(StepError::BadArgument {
                id,
                index: 1,
                message: format!("{} coordinates", coords.len()),
            });
        }
        let c = |i: usize| coords.get(i).copied().unwrap_or(0.0) * self.length_scale;
        Ok(Point3d::new(c(0), c(1), c(2)))
    }

    fn direction(&self, id: u64) -> Result<Vec3, StepError> {
        let entity = self.expect_type(id, &["DIRECTION"])?;
        let ratios = entity.args().reals(1)?;
        let r = |i: usize| ratios.get(i).copied().unwrap_or(0.0);
        Ok(Vec3::new(r(0), r(1), r(2)).normalized().ok_or(GeometryError::DegenerateDirection)?)
    }

    /// Location, axis and reference direction, with Z and X defaults.
    fn placement(&self, id: u64) -> Result<(Point3d, Vec3, Vec3), StepError> {
        let entity = self.expect_type(id, &["AXIS2_PLACEMENT_3D"])?;
        let args = entity.args();
        let location = self.point(args.reference(1)?)?;
        let axis = match args.optional_reference(2)? {
            Some(d) => self.direction(d)?,
            None => Vec3::Z,
        };
        let ref_dir = match args.optional_reference(3)? {
            Some(d) => self.direction(d)?,
            None => Vec3::X,
        };
        let ref_dir = ref_dir
            .orthogonalized_against(&axis)
            .unwrap_or_else(|| axis.any_perpendicular());
        Ok((location, axis, ref_dir))
    }

    fn length(&self, args: &Args<'_>, index: usize) -> Result<f64, StepError> {
        Ok(args.real(index)? * self.length_scale)
    }

    fn curve(&self, id: u64) -> Result<Curve, StepError> {
        self.curve_at(id, 0)
    }

    /// `depth` counts the wrapper curves already unwrapped on the way here.
    fn curve_at(&self, id: u64, depth: usize) -> Result<Curve, StepError> {
        if depth > MAX_CURVE_DEPTH {
            return Err(StepError::TooDeep(id));
        }
        let entity = self.entity(id)?;
        if entity.has_part("B_SPLINE_CURVE_WITH_KNOTS") {
            return self.bspline_curve(entity);
        }
        let args = entity.args();
        match entity.type_name() {
            "LINE" => {
                let origin = self.point(args.reference(1)?)?;
                let vector = self.expect_type(args.reference(2)?, &["VECTOR"])?;
                let direction = self.direction(vector.args().reference(1)?)?;
                Ok(Curve::Line(Line3d::new(origin, direction)?))
            }
            "CIRCLE" => {
                let (center, axis, ref_dir) = self.placement(args.reference(1)?)?;
                let radius = self.length(&args, 2)?;
                if radius <= 0.0 {
                    return Err(GeometryError::InvalidRadius(radius).into());
                }
                Ok(Curve::Circle(Circle3d::with_axes(center, axis, ref_dir, radius)))
            }
            "ELLIPSE" => {
                let (center, axis, ref_dir) = self.placement(args.reference(1)?)?;
                Ok(Curve::Ellipse(Ellipse3d::new(
                    center,
                    axis,
                    ref_dir,
                    self.length(&args, 2)?,
                    self.length(&args, 3)?,
                )))
            }
            "POLYLINE" => {
                let points = args
                    .references(1)?
                    .into_iter()
                    .map(|p| self.point(p))
                    .collect::<Result<Vec<_>, _>>()?;
                let n = points.len();
                let mut knots = vec![0.0];
                knots.extend((0..n).map(|i| i as f64));
                knots.push(n.saturating_sub(1) as f64);
                Ok(Curve::Nurbs(NurbsCurve::bspline(1, points, knots)?))
            }
            "SURFACE_CURVE" | "SEAM_CURVE" | "TRIMMED_CURVE" => self.curve_at(args.reference(1)?, depth + 1),
            other => Err(StepError::unexpected(id, "supported curve", other)),
        }
    }

    fn bspline_curve(&self, entity: &StepEntity) -> Result<Curve, StepError> {
        let (base, knot_args) = if entity.is_complex() {
            (entity.part_args("B_SPLINE_CURVE")?, entity.part_args("B_SPLINE_CURVE_WITH_KNOTS")?)
        } else {
            // Simple instances carry the name first; knot data follows the base attributes.
            let args = entity.args();
            (args, args)
        };
        let offset = usize::from(!entity.is_complex());
        let degree = base.integer(offset)?;
        let points = base
            .references(offset + 1)?
            .into_iter()
            .map(|p| self.point(p))
            .collect::<Result<Vec<_>, _>>()?;
        let knot_offset = if entity.is_complex() { 0 } else { 6 };
        let knots = self.knots(&knot_args, knot_offset, knot_offset + 1)?;
        let weights = match entity.part_args("RATIONAL_B_SPLINE_CURVE") {
            Ok(rational) => rational.reals(0)?,
            Err(_) => Vec::new(),
        };
        let degree = usize::try_from(degree).map_err(|_| base.error(offset, format!("negative degree {degree}")))?;
        Ok(Curve::Nurbs(NurbsCurve::new(degree, points, weights, knots)?))
    }

    fn knots(&self, args: &Args<'_>, mults_index: usize, values_index: usize) -> Result<Vec<f64>, StepError> {
        let mults = args
            .integers(mults_index)?
            .into_iter()
            .map(|m| usize::try_from(m).unwrap_or(0))
            .collect::<Vec<_>>();
        let values = args.reals(values_index)?;
        if mults.len() != values.len() {
            return Err(args.error(
                mults_index,
                format!("{} multiplicities for {} knots", mults.len(), values.len()),
            ));
        }
        Ok(expand_knots(&mults, &values))
    }

    /// `None` for surface kinds the kernel does not carry.
    fn surface(&self, id: u64) -> Result<Option<Surface>, StepError> {
        let entity = self.entity(id)?;
        if entity.has_part("B_SPLINE_SURFACE_WITH_KNOTS") {
            return self.bspline_surface(entity).map(Some);
        }
        let args = entity.args();
        let surface = match entity.type_name() {
            "PLANE" => {
                let (origin, normal, u_axis) = self.placement(args.reference(1)?)?;
                Surface::Plane(Plane::with_axes(origin, normal, u_axis))
            }
            "CYLINDRICAL_SURFACE" => {
                let (origin, axis, ref_dir) = self.placement(args.reference(1)?)?;
                Surface::Cylinder(Cylinder::with_axes(origin, axis, ref_dir, self.length(&args, 2)?))
            }
            "CONICAL_SURFACE" => {
                let (location, axis, ref_dir) = self.placement(args.reference(1)?)?;
                let radius = self.length(&args, 2)?;
                let half_angle = args.real(3)? * self.angle_scale;
                if half_angle <= 0.0 || half_angle >= PI / 2.0 {
                    return Err(StepError::BadArgument {
                        id,
                        index: 3,
                        message: format!("semi-angle {half_angle} out of range"),
                    });
                }
                let apex = location - axis * (radius / half_angle.tan());
                Surface::Cone(Cone::with_axes(apex, axis, ref_dir, half_angle))
            }
            "SPHERICAL_SURFACE" => {
                let (center, axis, ref_dir) = self.placement(args.reference(1)?)?;
                Surface::Sphere(Sphere::with_axes(center, axis, ref_dir, self.length(&args, 2)?))
            }
            "TOROIDAL_SURFACE" => {
                let (center, axis, ref_dir) = self.placement(args.reference(1)?)?;
                Surface::Torus(Torus::with_axes(
                    center,
                    axis,
                    ref_dir,
                    self.length(&args, 2)?,
                    self.length(&args, 3)?,
                ))
            }
            other => {
                warn!(id, surface = other, "unsupported surface; face skipped");
                return Ok(None);
            }
        };
        Ok(Some(surface))
    }

    fn bspline_surface(&self, entity: &StepEntity) -> Result<Surface, StepError> {
        let complex = entity.is_complex();
        let (base, knot_args) = if complex {
            (entity.part_args("B_SPLINE_SURFACE")?, entity.part_args("B_SPLINE_SURFACE_WITH_KNOTS")?)
        } else {
            let args = entity.args();
            (args, args)
        };
        let offset = usize::from(!complex);
        let degree_u = base.integer(offset)?;
        let degree_v = base.integer(offset + 1)?;
        let grid = base.nested(offset + 2, ParameterExt::as_ref_id)?;
        let num_u = grid.len();
        let num_v = grid.first().map_or(0, Vec::len);
        let mut control_points = Vec::with_capacity(num_u * num_v);
        for row in &grid {
            for &p in row {
                control_points.push(self.point(p)?);
            }
        }
        let k = if complex { 0 } else { 8 };
        let knots_u = self.knots(&knot_args, k, k + 2)?;
        let knots_v = self.knots(&knot_args, k + 1, k + 3)?;
        let weights = match entity.part_args("RATIONAL_B_SPLINE_SURFACE") {
            Ok(rational) => rational.nested(0, ParameterExt::as_real)?.into_iter().flatten().collect(),
            Err(_) => Vec::new(),
        };
        let to_degree =
            |d: i64, index: usize| usize::try_from(d).map_err(|_| base.error(index, format!("negative degree {d}")));
        Ok(Surface::Nurbs(NurbsSurface::new(
            to_degree(degree_u, offset)?,
            to_degree(degree_v, offset + 1)?,
            control_points,
            weights,
            knots_u,
            knots_v,
            num_u,
            num_v,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::data::parse;
    use approx::assert_abs_diff_eq;

    fn wrap(data: &str) -> String {
        format!(
            "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');\n\
             FILE_NAME('t.stp','2024-01-01T00:00:00',(''),(''),'','','');\n\
             FILE_SCHEMA(('AUTOMOTIVE_DESIGN'));\nENDSEC;\nDATA;\n{data}ENDSEC;\nEND-ISO-10303-21;\n"
        )
    }

    /// A unit square face bounded by four lines, as an unreferenced open shell.
    const SQUARE: &str = "#1=CARTESIAN_POINT('',(0.,0.,0.));
#2=CARTESIAN_POINT('',(1.,0.,0.));
#3=CARTESIAN_POINT('',(1.,1.,0.));
#4=CARTESIAN_POINT('',(0.,1.,0.));
#5=VERTEX_POINT('',#1);
#6=VERTEX_POINT('',#2);
#7=VERTEX_POINT('',#3);
#8=VERTEX_POINT('',#4);
#9=DIRECTION('',(1.,0.,0.));
#10=DIRECTION('',(0.,1.,0.));
#11=VECTOR('',#9,1.);
#12=VECTOR('',#10,1.);
#13=LINE('',#1,#11);
#14=LINE('',#2,#12);
#15=LINE('',#4,#11);
#16=LINE('',#1,#12);
#17=EDGE_CURVE('',#5,#6,#13,.T.);
#18=EDGE_CURVE('',#6,#7,#14,.T.);
#19=EDGE_CURVE('',#8,#7,#15,.T.);
#20=EDGE_CURVE('',#5,#8,#16,.T.);
#21=ORIENTED_EDGE('',*,*,#17,.T.);
#22=ORIENTED_EDGE('',*,*,#18,.T.);
#23=ORIENTED_EDGE('',*,*,#19,.F.);
#24=ORIENTED_EDGE('',*,*,#20,.F.);
#25=EDGE_LOOP('',(#21,#22,#23,#24));
#26=FACE_OUTER_BOUND('',#25,.T.);
#27=AXIS2_PLACEMENT_3D('',#1,$,$);
#28=PLANE('',#27);
#29=ADVANCED_FACE('',(#26),#28,.T.);
#30=OPEN_SHELL('',(#29));
";

    #[test]
    fn test_open_shell_root_square() {
        let file = parse(&wrap(SQUARE)).unwrap();
        let shape = translate(&file).unwrap();
        assert_eq!(shape.solids().len(), 1);
        assert_eq!(shape.face_count(), 1);
        let face = shape.faces().next().unwrap();
        let outer = shape.face(face).unwrap().outer_loop;
        assert!(shape.store().is_loop_closed(outer));
        let b = shape.face_uv_bounds(face).unwrap();
        assert_abs_diff_eq!(b.width(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.height(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reversed_bound_and_edge_sense() {
        let data = SQUARE
            .replace("#26=FACE_OUTER_BOUND('',#25,.T.);", "#26=FACE_OUTER_BOUND('',#25,.F.);")
            .replace("#17=EDGE_CURVE('',#5,#6,#13,.T.);", "#17=EDGE_CURVE('',#6,#5,#13,.F.);")
            .replace("#21=ORIENTED_EDGE('',*,*,#17,.T.);", "#21=ORIENTED_EDGE('',*,*,#17,.F.);");
        let shape = translate(&parse(&wrap(&data)).unwrap()).unwrap();
        let store = shape.store();
        let face = shape.faces().next().unwrap();
        let outer = store.faces[face].outer_loop;
        assert!(store.is_loop_closed(outer));
        // The loop now runs clockwise, starting from the last edge.
        let first = store.half_edges[store.loops[outer].half_edges[0]];
        assert_eq!(store.vertices[first.start_vertex].point, Point3d::new(0.0, 0.0, 0.0));
        assert_eq!(store.vertices[first.end_vertex].point, Point3d::new(0.0, 1.0, 0.0));
        let edge = store.edges.values().find(|e| e.range == (0.0, 1.0) && store.vertices[e.start_vertex].point == Point3d::ORIGIN);
        assert!(edge.is_some());
    }

    #[test]
    fn test_unsupported_surface_skips_face() {
        let data = SQUARE.replace("#28=PLANE('',#27);", "#28=SURFACE_OF_LINEAR_EXTRUSION('',#13,#11);");
        let shape = translate(&parse(&wrap(&data)).unwrap()).unwrap();
        assert_eq!(shape.solids().len(), 1);
        assert_eq!(shape.face_count(), 0);
    }

    #[test]
    fn test_metre_units_scale_to_millimetres() {
        let data = format!("{SQUARE}#31=(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT($,.METRE.));\n");
        let shape = translate(&parse(&wrap(&data)).unwrap()).unwrap();
        let bb = shape.bounding_box();
        assert_abs_diff_eq!(bb.max.x, 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cone_apex_from_reference_radius() {
        let data = "#1=CARTESIAN_POINT('',(0.,0.,2.));
#2=AXIS2_PLACEMENT_3D('',#1,$,$);
#3=CONICAL_SURFACE('',#2,1.,0.7853981633974483);
";
        let file = parse(&wrap(data)).unwrap();
        let translator = Translator {
            file: &file,
            length_scale: 1.0,
            angle_scale: 1.0,
            store: EntityStore::new(),
            vertices: HashMap::new(),
            edges: HashMap::new(),
            skipped_faces: 0,
        };
        let Some(Surface::Cone(cone)) = translator.surface(3).unwrap() else {
            panic!("expected a cone");
        };
        assert_abs_diff_eq!(cone.apex, Point3d::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_missing_reference_is_an_error() {
        let data = SQUARE.replace("#29=ADVANCED_FACE('',(#26),#28,.T.);", "#29=ADVANCED_FACE('',(#26),#99,.T.);");
        let err = translate(&parse(&wrap(&data)).unwrap()).unwrap_err();
        assert_eq!(err, StepError::MissingEntity(99));
    }

    #[test]
    fn test_wrapped_curves_use_their_basis() {
        let data = SQUARE.replace(
            "#13=LINE('',#1,#11);",
            "#13=SURFACE_CURVE('',#31,(),.CURVE_3D.);\n#31=TRIMMED_CURVE('',#32,(),(),.T.,.PARAMETER.);\n#32=LINE('',#1,#11);",
        );
        let shape = translate(&parse(&wrap(&data)).unwrap()).unwrap();
        assert_eq!(shape.face_count(), 1);
        let store = shape.store();
        assert!(store.edges.values().all(|e| matches!(e.curve, Curve::Line(_))));
    }

    #[test]
    fn test_self_referencing_curve_is_an_error() {
        let data = SQUARE.replace("#13=LINE('',#1,#11);", "#13=TRIMMED_CURVE('',#13,(),(),.T.,.PARAMETER.);");
        let err = translate(&parse(&wrap(&data)).unwrap()).unwrap_err();
        assert_eq!(err, StepError::TooDeep(13));

        let cycle = SQUARE.replace(
            "#13=LINE('',#1,#11);",
            "#13=SEAM_CURVE('',#31,(),.CURVE_3D.);\n#31=SURFACE_CURVE('',#13,(),.CURVE_3D.);",
        );
        assert!(matches!(translate(&parse(&wrap(&cycle)).unwrap()), Err(StepError::TooDeep(_))));
    }

    #[test]
    fn test_oriented_shell_must_wrap_a_shell() {
        let data = format!("{SQUARE}#31=ORIENTED_CLOSED_SHELL('',*,#31,.T.);\n#32=MANIFOLD_SOLID_BREP('',#31);\n");
        let err = translate(&parse(&wrap(&data)).unwrap()).unwrap_err();
        assert!(matches!(err, StepError::UnexpectedType { id: 31, .. }));
    }
}
