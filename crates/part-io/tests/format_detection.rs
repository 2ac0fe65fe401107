//! Format classification of files on disk, and the STL adapters.

use proptest::prelude::*;

use part_io::{
    part_format, read_stl_file, sniff_format, write_ascii_stl_file, write_binary_stl_file, write_brep_file,
    write_iges_file, write_step_file, PartFormat,
};
use part_kernel::topology::brep::EntityStore;
use part_kernel::topology::primitives::make_box;
use part_kernel::Shape;

fn unit_cube() -> Shape {
    let mut store = EntityStore::new();
    let solid = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0).unwrap();
    Shape::from_parts(store, vec![solid])
}

fn binary_stl(count: u32, trailing: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&count.to_le_bytes());
    bytes.resize(84 + 50 * count as usize + trailing, 0);
    bytes
}

#[test]
fn test_written_files_are_recognized_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    let shape = unit_cube();

    let step = dir.path().join("cube.step");
    let iges = dir.path().join("cube.igs");
    let brep = dir.path().join("cube.brep");
    let ascii = dir.path().join("cube.stla");
    let binary = dir.path().join("cube.stlb");
    write_step_file(&shape, &step, None).unwrap();
    write_iges_file(&shape, &iges, None).unwrap();
    write_brep_file(&shape, &brep, None).unwrap();
    write_ascii_stl_file(&shape, &ascii).unwrap();
    write_binary_stl_file(&shape, &binary).unwrap();

    for (path, format) in [
        (step, PartFormat::Step),
        (iges, PartFormat::Iges),
        (brep, PartFormat::NativeBRep),
        (ascii, PartFormat::AsciiStl),
        (binary, PartFormat::BinaryStl),
    ] {
        assert_eq!(part_format(&path), format);
        let bare = path.with_extension("dat");
        std::fs::rename(&path, &bare).unwrap();
        assert_eq!(part_format(&bare), format, "{}", bare.display());
    }
}

#[test]
fn test_extension_wins_over_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("really_step.IGS");
    std::fs::write(&path, "ISO-10303-21;\nHEADER;\n").unwrap();
    assert_eq!(part_format(&path), PartFormat::Iges);
}

#[test]
fn test_missing_and_empty_files_are_unknown() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(part_format(dir.path().join("absent")), PartFormat::Unknown);
    let empty = dir.path().join("empty");
    std::fs::write(&empty, b"").unwrap();
    assert_eq!(part_format(&empty), PartFormat::Unknown);
}

#[test]
fn test_stl_files_read_back_with_the_same_triangles() {
    let dir = tempfile::tempdir().unwrap();
    let shape = unit_cube();
    let ascii = dir.path().join("cube.stla");
    let binary = dir.path().join("cube.stlb");
    write_ascii_stl_file(&shape, &ascii).unwrap();
    write_binary_stl_file(&shape, &binary).unwrap();

    let from_ascii = read_stl_file(&ascii).unwrap();
    let from_binary = read_stl_file(&binary).unwrap();
    assert!(from_ascii.triangle_count() >= 12);
    assert_eq!(from_ascii.triangle_count(), from_binary.triangle_count());
    let len = std::fs::metadata(&binary).unwrap().len();
    assert_eq!(len, 84 + 50 * from_binary.triangle_count() as u64);
    for t in 0..from_binary.triangle_count() {
        for corner in from_binary.triangle(t) {
            assert!(corner.iter().all(|c| (-1e-6..=1.0 + 1e-6).contains(c)));
        }
    }
}

#[test]
fn test_truncated_stl_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.stlb");
    let mut bytes = binary_stl(2, 0);
    bytes.truncate(bytes.len() - 10);
    std::fs::write(&path, &bytes).unwrap();
    assert!(read_stl_file(&path).is_err());
    assert!(part_io::load_stl_file(&path).is_none());
}

proptest! {
    #[test]
    fn prop_binary_stl_size_law(count in 0u32..64, delta in prop_oneof![Just(-1i64), Just(1i64)]) {
        let bytes = binary_stl(count, 0);
        prop_assert_eq!(sniff_format(&bytes, bytes.len() as u64), PartFormat::BinaryStl);
        let off = (bytes.len() as i64 + delta) as u64;
        prop_assert_eq!(sniff_format(&bytes, off), PartFormat::Unknown);
    }

    #[test]
    fn prop_sniffing_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let first = sniff_format(&bytes, bytes.len() as u64);
        prop_assert_eq!(sniff_format(&bytes, bytes.len() as u64), first);
    }

    #[test]
    fn prop_extension_lookup_ignores_case(stem in "[a-z]{1,8}", upper in any::<bool>()) {
        for (ext, format) in [("step", PartFormat::Step), ("igs", PartFormat::Iges), ("brep", PartFormat::NativeBRep)] {
            let ext = if upper { ext.to_ascii_uppercase() } else { ext.to_string() };
            let path = format!("/no/such/dir/{stem}.{ext}");
            prop_assert_eq!(part_format(&path), format);
        }
    }
}
