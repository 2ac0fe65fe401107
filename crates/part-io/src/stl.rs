//! STL triangle soup in ASCII and binary form.

use part_kernel::geometry::vector::Vec3;
use part_kernel::geometry::point::Point3d;
use part_kernel::Shape;
use part_tessellation::{tessellate_shape, TessellationConfig, TriangleMesh};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StlError;

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// ASCII or binary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StlMode {
    Ascii,
    #[default]
    Binary,
}

/// Chordal deflection used when meshing a shape for STL output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StlWriterConfig {
    /// Deflection as a fraction of the largest bounding-box dimension.
    pub relative_deflection: f64,
    /// Overrides the relative deflection when set.
    pub absolute_deflection: Option<f64>,
}

impl Default for StlWriterConfig {
    fn default() -> Self {
        Self {
            relative_deflection: 0.001,
            absolute_deflection: None,
        }
    }
}

impl StlWriterConfig {
    pub fn with_absolute_deflection(deflection: f64) -> Self {
        Self {
            absolute_deflection: Some(deflection),
            ..Self::default()
        }
    }

    pub fn deflection(&self, shape: &Shape) -> f64 {
        if let Some(d) = self.absolute_deflection {
            return d;
        }
        let bb = shape.bounding_box();
        let size = if bb.is_valid() { bb.max_dimension() } else { 0.0 };
        if size > 0.0 {
            size * self.relative_deflection
        } else {
            TessellationConfig::default().tolerance
        }
    }
}

/// Triangulate every face of `shape` at the configured deflection.
pub fn mesh_shape(shape: &Shape, config: &StlWriterConfig) -> TriangleMesh {
    let deflection = config.deflection(shape);
    debug!(deflection, "meshing shape for STL");
    tessellate_shape(shape, &TessellationConfig::with_tolerance(deflection))
}

fn check_not_empty(mesh: &TriangleMesh) -> Result<(), StlError> {
    if mesh.triangle_count() == 0 {
        Err(StlError::EmptyMesh)
    } else {
        Ok(())
    }
}

/// Binary STL: 80-byte header, little-endian facet count, 50-byte facets.
pub fn write_binary_stl(mesh: &TriangleMesh, name: &str) -> Result<Vec<u8>, StlError> {
    check_not_empty(mesh)?;
    let count = mesh.triangle_count();
    let mut buf = Vec::with_capacity(HEADER_LEN + 4 + count * FACET_LEN);

    // Never start the header with "solid"; readers would take it for ASCII.
    let header = format!("binary STL: {name}");
    let header = header.as_bytes();
    buf.extend_from_slice(&header[..header.len().min(HEADER_LEN)]);
    buf.resize(HEADER_LEN, 0u8);
    buf.extend_from_slice(&(count as u32).to_le_bytes());

    for t in 0..count {
        for value in mesh.facet_normal(t) {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        for corner in mesh.triangle(t) {
            for value in corner {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        buf.extend_from_slice(&0u16.to_le_bytes());
    }
    Ok(buf)
}

pub fn write_ascii_stl(mesh: &TriangleMesh, name: &str) -> Result<String, StlError> {
    check_not_empty(mesh)?;
    let mut out = String::with_capacity(mesh.triangle_count() * 256);
    out.push_str(&format!("solid {name}\n"));
    for t in 0..mesh.triangle_count() {
        let [nx, ny, nz] = mesh.facet_normal(t);
        out.push_str(&format!("  facet normal {nx:e} {ny:e} {nz:e}\n"));
        out.push_str("    outer loop\n");
        for [x, y, z] in mesh.triangle(t) {
            out.push_str(&format!("      vertex {x:e} {y:e} {z:e}\n"));
        }
        out.push_str("    endloop\n");
        out.push_str("  endfacet\n");
    }
    out.push_str(&format!("endsolid {name}\n"));
    Ok(out)
}

/// Read either STL flavour. An exact binary size match wins over an
/// ASCII-looking header.
pub fn read_stl_bytes(bytes: &[u8]) -> Result<TriangleMesh, StlError> {
    if let Some(count) = binary_facet_count(bytes) {
        if HEADER_LEN + 4 + count * FACET_LEN == bytes.len() {
            return read_binary(bytes, count);
        }
    }
    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with("solid") {
        return read_ascii(&text);
    }
    match binary_facet_count(bytes) {
        Some(count) => read_binary(bytes, count),
        None => Err(StlError::Truncated {
            expected: (HEADER_LEN + 4) as u64,
            actual: bytes.len() as u64,
        }),
    }
}

fn binary_facet_count(bytes: &[u8]) -> Option<usize> {
    let count = bytes.get(HEADER_LEN..HEADER_LEN + 4)?;
    Some(u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize)
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_binary(bytes: &[u8], count: usize) -> Result<TriangleMesh, StlError> {
    let expected = HEADER_LEN + 4 + count * FACET_LEN;
    if bytes.len() < expected {
        return Err(StlError::Truncated {
            expected: expected as u64,
            actual: bytes.len() as u64,
        });
    }
    let mut mesh = TriangleMesh::new();
    for facet in bytes[HEADER_LEN + 4..expected].chunks_exact(FACET_LEN) {
        let v = |i: usize| {
            let o = i * 12;
            [read_f32(facet, o), read_f32(facet, o + 4), read_f32(facet, o + 8)]
        };
        push_facet(&mut mesh, v(0), [v(1), v(2), v(3)]);
    }
    Ok(mesh)
}

fn read_ascii(text: &str) -> Result<TriangleMesh, StlError> {
    let mut mesh = TriangleMesh::new();
    let mut normal = [0.0f32; 3];
    let mut corners: Vec<[f32; 3]> = Vec::with_capacity(3);

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let parse_error = |message: String| StlError::Parse {
            line: line_no,
            message,
        };
        let mut words = line.split_whitespace();
        match words.next() {
            Some("facet") => {
                if words.next() != Some("normal") {
                    return Err(parse_error("expected 'facet normal'".into()));
                }
                normal = parse_triple(&mut words).map_err(parse_error)?;
                corners.clear();
            }
            Some("vertex") => {
                if corners.len() == 3 {
                    return Err(parse_error("more than three vertices in facet".into()));
                }
                corners.push(parse_triple(&mut words).map_err(parse_error)?);
            }
            Some("endfacet") => {
                let [a, b, c] = corners[..] else {
                    return Err(parse_error(format!("facet has {} vertices", corners.len())));
                };
                push_facet(&mut mesh, normal, [a, b, c]);
                corners.clear();
            }
            Some("solid" | "outer" | "endloop" | "endsolid") | None => {}
            Some(other) => return Err(parse_error(format!("unexpected keyword '{other}'"))),
        }
    }
    Ok(mesh)
}

fn parse_triple<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<[f32; 3], String> {
    let mut out = [0.0f32; 3];
    for slot in &mut out {
        let word = words.next().ok_or_else(|| "expected three numbers".to_string())?;
        *slot = word.parse().map_err(|_| format!("invalid number '{word}'"))?;
    }
    Ok(out)
}

/// Append a facet with its own three vertices; a zero normal is replaced
/// by the winding normal.
fn push_facet(mesh: &mut TriangleMesh, normal: [f32; 3], corners: [[f32; 3]; 3]) {
    let [a, b, c] = corners.map(|p| Point3d::new(p[0] as f64, p[1] as f64, p[2] as f64));
    let stored = Vec3::new(normal[0] as f64, normal[1] as f64, normal[2] as f64);
    let n = stored
        .normalized()
        .or_else(|| (b - a).cross(&(c - a)).normalized())
        .unwrap_or(Vec3::ZERO);
    let i0 = mesh.add_vertex(a, n);
    let i1 = mesh.add_vertex(b, n);
    let i2 = mesh.add_vertex(c, n);
    mesh.add_triangle(i0, i1, i2);
}
