use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of leading bytes inspected when the extension is not recognized.
pub const SNIFF_LEN: usize = 2048;

const BINARY_STL_HEADER: u64 = 84;
const BINARY_STL_FACET: u64 = 50;

/// File formats understood by the load and save adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartFormat {
    Step,
    Iges,
    NativeBRep,
    AsciiStl,
    BinaryStl,
    Unknown,
}

impl PartFormat {
    /// Lower-case extensions mapped to this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            PartFormat::Step => &["step", "stp"],
            PartFormat::Iges => &["iges", "igs"],
            PartFormat::NativeBRep => &["brep", "rle"],
            PartFormat::AsciiStl => &["stla"],
            PartFormat::BinaryStl => &["stlb"],
            PartFormat::Unknown => &[],
        }
    }

    /// Case-insensitive extension lookup; never touches the file system.
    pub fn from_extension(path: impl AsRef<Path>) -> Option<PartFormat> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        [
            PartFormat::Step,
            PartFormat::Iges,
            PartFormat::NativeBRep,
            PartFormat::AsciiStl,
            PartFormat::BinaryStl,
        ]
        .into_iter()
        .find(|format| format.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for PartFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartFormat::Step => "STEP",
            PartFormat::Iges => "IGES",
            PartFormat::NativeBRep => "BREP",
            PartFormat::AsciiStl => "ASCII STL",
            PartFormat::BinaryStl => "binary STL",
            PartFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

struct Signatures {
    iges: Regex,
    step: Regex,
    brep: Regex,
    native: Regex,
    ascii_stl: Regex,
}

static SIGNATURES: OnceLock<Option<Signatures>> = OnceLock::new();

fn signatures() -> Option<&'static Signatures> {
    SIGNATURES
        .get_or_init(|| {
            Some(Signatures {
                iges: Regex::new(r"^.{72}S\s*[0-9]+\s*[\n\r\f]").ok()?,
                step: Regex::new(r"^\s*ISO-10303-21\s*;\s*HEADER").ok()?,
                brep: Regex::new(r"^\s*DBRep_DrawableShape").ok()?,
                native: Regex::new(r#"^\s*\{\s*"format"\s*:\s*"part-brep""#).ok()?,
                ascii_stl: Regex::new(r"^\s*solid").ok()?,
            })
        })
        .as_ref()
}

/// Classify a file by extension, falling back to its content.
pub fn part_format(path: impl AsRef<Path>) -> PartFormat {
    let path = path.as_ref();
    if let Some(format) = PartFormat::from_extension(path) {
        return format;
    }

    let Ok(file) = File::open(path) else {
        debug!(path = %path.display(), "cannot open file for format detection");
        return PartFormat::Unknown;
    };
    let file_len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    if file.take(SNIFF_LEN as u64).read_to_end(&mut prefix).is_err() {
        return PartFormat::Unknown;
    }
    let format = sniff_format(&prefix, file_len);
    debug!(path = %path.display(), %format, "sniffed file format");
    format
}

/// Content classification of a file prefix. `file_len` is the size of the
/// whole file, used for the binary STL size check.
pub fn sniff_format(prefix: &[u8], file_len: u64) -> PartFormat {
    let prefix = &prefix[..prefix.len().min(SNIFF_LEN)];
    if let Some(sig) = signatures() {
        let text = String::from_utf8_lossy(prefix);
        if sig.iges.is_match(&text) {
            return PartFormat::Iges;
        }
        if sig.step.is_match(&text) {
            return PartFormat::Step;
        }
        if sig.brep.is_match(&text) || sig.native.is_match(&text) {
            return PartFormat::NativeBRep;
        }
        if sig.ascii_stl.is_match(&text) {
            return PartFormat::AsciiStl;
        }
    }
    if is_binary_stl(prefix, file_len) {
        PartFormat::BinaryStl
    } else {
        PartFormat::Unknown
    }
}

fn is_binary_stl(prefix: &[u8], file_len: u64) -> bool {
    let Some(count) = prefix.get(80..84) else {
        return false;
    };
    let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]);
    BINARY_STL_HEADER + BINARY_STL_FACET * u64::from(count) == file_len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_stl_prefix(count: u32) -> Vec<u8> {
        let mut bytes = vec![b' '; 80];
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes
    }

    #[test]
    fn test_extension_lookup_ignores_case() {
        assert_eq!(PartFormat::from_extension("a/b/part.STEP"), Some(PartFormat::Step));
        assert_eq!(PartFormat::from_extension("part.Igs"), Some(PartFormat::Iges));
        assert_eq!(PartFormat::from_extension("part.rle"), Some(PartFormat::NativeBRep));
        assert_eq!(PartFormat::from_extension("part.stla"), Some(PartFormat::AsciiStl));
        assert_eq!(PartFormat::from_extension("part.stlb"), Some(PartFormat::BinaryStl));
        assert_eq!(PartFormat::from_extension("part.stl"), None);
        assert_eq!(PartFormat::from_extension("part"), None);
    }

    #[test]
    fn test_known_extension_skips_file_system() {
        assert_eq!(part_format("/definitely/not/here/model.stp"), PartFormat::Step);
        assert_eq!(part_format("/definitely/not/here/model.bin"), PartFormat::Unknown);
    }

    #[test]
    fn test_sniff_text_signatures() {
        let step = b"ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');";
        assert_eq!(sniff_format(step, step.len() as u64), PartFormat::Step);

        let mut iges = format!("{:<72}S      1\n", "start record");
        iges.push_str("more");
        assert_eq!(sniff_format(iges.as_bytes(), iges.len() as u64), PartFormat::Iges);

        let occ = b"DBRep_DrawableShape\n\nCASCADE Topology V1";
        assert_eq!(sniff_format(occ, 100), PartFormat::NativeBRep);
        let native = b"{\n  \"format\": \"part-brep\",\n  \"version\": 1";
        assert_eq!(sniff_format(native, 100), PartFormat::NativeBRep);

        let stl = b"  solid cube\n facet normal 0 0 1";
        assert_eq!(sniff_format(stl, 100), PartFormat::AsciiStl);
        assert_eq!(sniff_format(b"hello", 5), PartFormat::Unknown);
    }

    #[test]
    fn test_binary_stl_size_law() {
        let prefix = binary_stl_prefix(3);
        assert_eq!(sniff_format(&prefix, 84 + 150), PartFormat::BinaryStl);
        assert_eq!(sniff_format(&prefix, 84 + 151), PartFormat::Unknown);
        assert_eq!(sniff_format(&binary_stl_prefix(4), 84 + 150), PartFormat::Unknown);
        assert_eq!(sniff_format(&prefix[..83], 84 + 150), PartFormat::Unknown);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PartFormat::BinaryStl.to_string(), "binary STL");
        assert_eq!(PartFormat::Unknown.to_string(), "unknown");
    }
}
