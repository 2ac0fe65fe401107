//! Native boundary-representation documents.

use part_kernel::Shape;
use serde::{Deserialize, Serialize};

use crate::errors::BrepError;

/// Current native format version.
pub const BREP_FORMAT_VERSION: u32 = 1;

/// Format identifier written into every document.
pub const BREP_FORMAT_NAME: &str = "part-brep";

#[derive(Debug, Serialize)]
struct BrepFile<'a> {
    format: &'a str,
    version: u32,
    shape: &'a Shape,
}

#[derive(Debug, Deserialize)]
struct BrepFileRaw {
    format: String,
    version: u32,
    shape: Shape,
}

/// Serialize a shape to a pretty-printed JSON document.
pub fn write_brep_string(shape: &Shape) -> Result<String, BrepError> {
    let file = BrepFile {
        format: BREP_FORMAT_NAME,
        version: BREP_FORMAT_VERSION,
        shape,
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

/// Deserialize a shape, validating the format identifier and version.
pub fn read_brep_str(json: &str) -> Result<Shape, BrepError> {
    let raw: BrepFileRaw = serde_json::from_str(json)?;

    if raw.format != BREP_FORMAT_NAME {
        return Err(BrepError::UnknownFormat(raw.format));
    }

    if raw.version > BREP_FORMAT_VERSION {
        return Err(BrepError::FutureVersion {
            file_version: raw.version,
            supported_version: BREP_FORMAT_VERSION,
        });
    }

    Ok(raw.shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use part_kernel::topology::brep::EntityStore;
    use part_kernel::topology::primitives::make_cylinder;
    use part_kernel::geometry::point::Point3d;

    fn cylinder() -> Shape {
        let mut store = EntityStore::new();
        let solid = make_cylinder(&mut store, Point3d::new(1.0, 2.0, 3.0), 2.0, 5.0).unwrap();
        Shape::from_parts(store, vec![solid])
    }

    #[test]
    fn test_roundtrip_is_exact() {
        let shape = cylinder();
        let json = write_brep_string(&shape).unwrap();
        assert!(json.contains("\"format\": \"part-brep\""));
        let back = read_brep_str(&json).unwrap();
        assert_eq!(back.solids(), shape.solids());
        assert_eq!(back.face_count(), 3);
        assert_eq!(back.store().faces.len(), shape.store().faces.len());
        for face in shape.faces() {
            assert_eq!(back.face(face), shape.face(face));
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        let json = write_brep_string(&Shape::new()).unwrap().replace("part-brep", "other-brep");
        match read_brep_str(&json) {
            Err(BrepError::UnknownFormat(name)) => assert_eq!(name, "other-brep"),
            other => panic!("expected UnknownFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_future_version() {
        let json = write_brep_string(&Shape::new())
            .unwrap()
            .replace("\"version\": 1", "\"version\": 99");
        match read_brep_str(&json) {
            Err(BrepError::FutureVersion {
                file_version,
                supported_version,
            }) => {
                assert_eq!(file_version, 99);
                assert_eq!(supported_version, BREP_FORMAT_VERSION);
            }
            other => panic!("expected FutureVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(read_brep_str("{not json"), Err(BrepError::Json(_))));
    }
}
