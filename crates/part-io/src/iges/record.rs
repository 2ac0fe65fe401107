//! Fixed-column record layer of IGES 5.3: sections, directory entries and
//! free-format parameter data.

use std::collections::HashMap;

use crate::errors::IgesError;
use crate::numbers::parse_real;

pub const RECORD_LEN: usize = 80;
/// Columns 1-72 carry data in the S, G and D sections.
pub const DATA_LEN: usize = 72;
/// Columns 1-64 carry data in the P section.
pub const PARAM_DATA_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Start,
    Global,
    Directory,
    Parameter,
    Terminate,
}

impl Section {
    fn from_letter(letter: u8) -> Option<Section> {
        match letter {
            b'S' => Some(Section::Start),
            b'G' => Some(Section::Global),
            b'D' => Some(Section::Directory),
            b'P' => Some(Section::Parameter),
            b'T' => Some(Section::Terminate),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Section::Start => 'S',
            Section::Global => 'G',
            Section::Directory => 'D',
            Section::Parameter => 'P',
            Section::Terminate => 'T',
        }
    }
}

/// One parameter value; `Empty` stands for a defaulted field.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Empty,
    Token(String),
    Text(String),
}

impl Param {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Param::Token(t) => parse_real(t),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Param::Token(t) => t.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Param::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Parameter and record delimiters plus the fields the reader uses.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSection {
    pub param_delimiter: char,
    pub record_delimiter: char,
    pub params: Vec<Param>,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            param_delimiter: ',',
            record_delimiter: ';',
            params: Vec::new(),
        }
    }
}

impl GlobalSection {
    /// 1-based global parameter.
    pub fn param(&self, number: usize) -> Option<&Param> {
        self.params.get(number.checked_sub(1)?)
    }

    /// Unit flag (parameter 14); millimetres when absent.
    pub fn unit_flag(&self) -> i64 {
        self.param(14).and_then(Param::as_int).unwrap_or(2)
    }

    /// Millimetres per model unit.
    pub fn unit_scale(&self) -> f64 {
        match self.unit_flag() {
            1 => 25.4,
            2 => 1.0,
            4 => 304.8,
            5 => 1_609_344.0,
            6 => 1000.0,
            7 => 1.0e6,
            8 => 0.0254,
            9 => 1.0e-3,
            10 => 10.0,
            11 => 2.54e-5,
            // Flag 3 names the unit in parameter 15.
            _ => match self.param(15).and_then(Param::as_text).map(str::to_ascii_uppercase).as_deref() {
                Some("IN" | "INCH") => 25.4,
                Some("M") => 1000.0,
                Some("CM") => 10.0,
                _ => 1.0,
            },
        }
    }
}

/// Directory entry decoded from its two records.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    /// Sequence number of the first record; odd.
    pub de: usize,
    pub entity_type: u32,
    pub param_pointer: usize,
    pub transform: usize,
    pub status: String,
    pub param_lines: usize,
    pub form: u32,
    /// Parameters after the entity type number.
    pub params: Vec<Param>,
}

impl DirectoryEntry {
    fn err(&self, message: impl Into<String>) -> IgesError {
        IgesError::Parameter {
            de: self.de,
            message: message.into(),
        }
    }

    /// 1-based parameter, as numbered in the entity definitions.
    pub fn param(&self, number: usize) -> Option<&Param> {
        self.params.get(number.checked_sub(1)?)
    }

    pub fn real(&self, number: usize) -> Result<f64, IgesError> {
        self.param(number)
            .and_then(Param::as_real)
            .ok_or_else(|| self.err(format!("parameter {number} is not a real")))
    }

    pub fn real_or(&self, number: usize, default: f64) -> f64 {
        match self.param(number) {
            None | Some(Param::Empty) => default,
            Some(p) => p.as_real().unwrap_or(default),
        }
    }

    pub fn int(&self, number: usize) -> Result<i64, IgesError> {
        self.param(number)
            .and_then(Param::as_int)
            .ok_or_else(|| self.err(format!("parameter {number} is not an integer")))
    }

    pub fn int_or(&self, number: usize, default: i64) -> i64 {
        self.param(number).and_then(Param::as_int).unwrap_or(default)
    }

    /// A non-negative count. No list in an entity can be longer than its
    /// parameter data, so larger values are rejected.
    pub fn count(&self, number: usize) -> Result<usize, IgesError> {
        let value = self.int(number)?;
        let count =
            usize::try_from(value).map_err(|_| self.err(format!("parameter {number} is a negative count")))?;
        if count > self.params.len() {
            return Err(self.err(format!("parameter {number} counts past the end of the data")));
        }
        Ok(count)
    }

    /// A DE pointer; zero and defaulted fields are `None`.
    pub fn pointer(&self, number: usize) -> Result<Option<usize>, IgesError> {
        match self.param(number) {
            None | Some(Param::Empty) => Ok(None),
            Some(p) => {
                let value = p
                    .as_int()
                    .ok_or_else(|| self.err(format!("parameter {number} is not a pointer")))?;
                Ok(usize::try_from(value.unsigned_abs()).ok().filter(|&v| v > 0))
            }
        }
    }

    pub fn required_pointer(&self, number: usize) -> Result<usize, IgesError> {
        self.pointer(number)?
            .ok_or_else(|| self.err(format!("parameter {number} is a null pointer")))
    }

    pub fn point(&self, first: usize) -> Result<[f64; 3], IgesError> {
        Ok([self.real(first)?, self.real(first + 1)?, self.real(first + 2)?])
    }
}

/// A parsed file: global section plus directory entries in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IgesFile {
    pub start: String,
    pub global: GlobalSection,
    pub entries: Vec<DirectoryEntry>,
}

impl IgesFile {
    pub fn entry(&self, de: usize) -> Option<&DirectoryEntry> {
        if de % 2 == 0 {
            return None;
        }
        self.entries.get((de - 1) / 2).filter(|e| e.de == de)
    }

    pub fn require(&self, de: usize) -> Result<&DirectoryEntry, IgesError> {
        self.entry(de).ok_or_else(|| IgesError::Directory {
            de,
            message: "no such directory entry".into(),
        })
    }

    pub fn of_type(&self, entity_type: u32) -> impl Iterator<Item = &DirectoryEntry> + '_ {
        self.entries.iter().filter(move |e| e.entity_type == entity_type)
    }
}

/// Split `input` into sections of 80-column records.
fn records(input: &str) -> Result<HashMap<Section, Vec<String>>, IgesError> {
    let mut sections: HashMap<Section, Vec<String>> = HashMap::new();
    let mut line_no = 0;
    for raw in input.lines() {
        let raw = raw.trim_end_matches(['\r', '\n', '\u{1a}']);
        // Some writers omit newlines entirely.
        let chunks: Vec<&str> = if raw.len() > RECORD_LEN && raw.is_char_boundary(RECORD_LEN) && raw.is_ascii() {
            raw.as_bytes()
                .chunks(RECORD_LEN)
                .map(|c| std::str::from_utf8(c).unwrap_or(""))
                .collect()
        } else {
            vec![raw]
        };
        for record in chunks {
            line_no += 1;
            if record.trim().is_empty() {
                continue;
            }
            let bytes = record.as_bytes();
            if bytes.len() < DATA_LEN + 1 {
                return Err(IgesError::Section {
                    line: line_no,
                    message: format!("record is only {} columns wide", bytes.len()),
                });
            }
            let Some(section) = Section::from_letter(bytes[DATA_LEN]) else {
                return Err(IgesError::Section {
                    line: line_no,
                    message: format!("unknown section letter '{}'", bytes[DATA_LEN] as char),
                });
            };
            sections.entry(section).or_default().push(record.to_string());
        }
    }
    Ok(sections)
}

fn column(record: &str, from: usize, to: usize) -> &str {
    let end = to.min(record.len());
    record.get(from.min(end)..end).unwrap_or("")
}

/// Split free-format data into parameters, decoding Hollerith strings.
/// Parsing stops at the record delimiter.
pub fn split_params(data: &str, param_delim: char, record_delim: char) -> Vec<Param> {
    let chars: Vec<char> = data.chars().collect();
    let mut params = Vec::new();
    let mut i = 0;
    loop {
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        // Hollerith: count, 'H', then exactly count characters.
        let digits_end = chars[i..].iter().position(|c| !c.is_ascii_digit()).map_or(chars.len(), |p| i + p);
        if digits_end > i && chars.get(digits_end) == Some(&'H') {
            let count: usize = chars[i..digits_end].iter().collect::<String>().parse().unwrap_or(0);
            let start = digits_end + 1;
            let end = start.saturating_add(count).min(chars.len());
            params.push(Param::Text(chars[start..end].iter().collect()));
            i = end;
            while i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
        } else {
            let end = chars[i..]
                .iter()
                .position(|&c| c == param_delim || c == record_delim)
                .map_or(chars.len(), |p| i + p);
            let token: String = chars[i..end].iter().collect::<String>().trim().to_string();
            params.push(if token.is_empty() {
                Param::Empty
            } else {
                Param::Token(token)
            });
            i = end;
        }
        match chars.get(i) {
            Some(&c) if c == param_delim => i += 1,
            _ => break,
        }
    }
    params
}

/// Delimiters come first in the global section, each either defaulted or a
/// one-character Hollerith string.
fn global_delimiters(data: &str) -> (char, char) {
    let chars: Vec<char> = data.chars().collect();
    let mut param_delim = ',';
    let mut pos = 0;
    if chars.first() == Some(&'1') && chars.get(1) == Some(&'H') {
        if let Some(&c) = chars.get(2) {
            param_delim = c;
        }
        pos = 3;
    }
    // Skip the delimiter that ends the first parameter.
    if chars.get(pos) == Some(&param_delim) {
        pos += 1;
    }
    let mut record_delim = ';';
    if chars.get(pos) == Some(&'1') && chars.get(pos + 1) == Some(&'H') {
        if let Some(&c) = chars.get(pos + 2) {
            record_delim = c;
        }
    }
    (param_delim, record_delim)
}

fn parse_global(records: &[String]) -> GlobalSection {
    let data: String = records.iter().map(|r| column(r, 0, DATA_LEN)).collect();
    let (param_delimiter, record_delimiter) = global_delimiters(&data);
    GlobalSection {
        param_delimiter,
        record_delimiter,
        params: split_params(&data, param_delimiter, record_delimiter),
    }
}

fn field(record: &str, index: usize) -> &str {
    column(record, index * 8, index * 8 + 8).trim()
}

fn numeric_field(record: &str, index: usize, de: usize) -> Result<usize, IgesError> {
    let text = field(record, index);
    if text.is_empty() {
        return Ok(0);
    }
    text.parse::<i64>()
        .map(|v| usize::try_from(v.unsigned_abs()).unwrap_or(0))
        .map_err(|_| IgesError::Directory {
            de,
            message: format!("field {} is not numeric: '{text}'", index + 1),
        })
}

/// Parse a complete IGES document.
pub fn parse(input: &str) -> Result<IgesFile, IgesError> {
    let sections = records(input)?;
    let empty = Vec::new();
    let start = sections
        .get(&Section::Start)
        .unwrap_or(&empty)
        .iter()
        .map(|r| column(r, 0, DATA_LEN).trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let global = parse_global(sections.get(&Section::Global).unwrap_or(&empty));

    let directory = sections.get(&Section::Directory).unwrap_or(&empty);
    if directory.len() % 2 != 0 {
        return Err(IgesError::Section {
            line: 0,
            message: format!("directory section has an odd number of records ({})", directory.len()),
        });
    }
    let parameter = sections.get(&Section::Parameter).unwrap_or(&empty);

    let mut entries = Vec::with_capacity(directory.len() / 2);
    for (index, pair) in directory.chunks(2).enumerate() {
        let de = 2 * index + 1;
        let (first, second) = (&pair[0], &pair[1]);
        let entity_type = numeric_field(first, 0, de)? as u32;
        let param_pointer = numeric_field(first, 1, de)?;
        let transform = numeric_field(first, 6, de)?;
        let status = field(first, 8).to_string();
        let param_lines = numeric_field(second, 3, de)?;
        let form = numeric_field(second, 4, de)? as u32;

        let mut entry = DirectoryEntry {
            de,
            entity_type,
            param_pointer,
            transform,
            status,
            param_lines,
            form,
            params: Vec::new(),
        };
        if param_pointer > 0 {
            let lines = parameter
                .get(param_pointer - 1..param_pointer - 1 + param_lines.max(1))
                .ok_or_else(|| IgesError::Directory {
                    de,
                    message: format!("parameter pointer {param_pointer} is out of range"),
                })?;
            let data: String = lines.iter().map(|r| column(r, 0, PARAM_DATA_LEN)).collect();
            let mut params = split_params(&data, global.param_delimiter, global.record_delimiter);
            let stated = params.first().and_then(Param::as_int);
            if stated != Some(i64::from(entity_type)) {
                return Err(IgesError::Parameter {
                    de,
                    message: format!("parameter data starts with {stated:?}, expected {entity_type}"),
                });
            }
            params.remove(0);
            entry.params = params;
        }
        entries.push(entry);
    }

    Ok(IgesFile { start, global, entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(data: &str, section: char, seq: usize) -> String {
        format!("{data:<72}{section}{seq:>7}")
    }

    fn param_record(data: &str, de: usize, seq: usize) -> String {
        format!("{data:<64}{de:>8}P{seq:>7}")
    }

    fn de_records(entity_type: u32, pointer: usize, lines: usize, form: u32, seq: usize) -> String {
        format!(
            "{}\n{}",
            record(&format!("{entity_type:>8}{pointer:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}00000000", 0, 0, 0, 0, 0, 0), 'D', seq),
            record(&format!("{entity_type:>8}{:>8}{:>8}{lines:>8}{form:>8}", 0, 0), 'D', seq + 1)
        )
    }

    #[test]
    fn test_hollerith_and_defaults() {
        let params = split_params("110,5HA,B;C,,1.5D1 , 3;ignored", ',', ';');
        assert_eq!(
            params,
            vec![
                Param::Token("110".into()),
                Param::Text("A,B;C".into()),
                Param::Empty,
                Param::Token("1.5D1".into()),
                Param::Token("3".into()),
            ]
        );
        assert_eq!(params[3].as_real(), Some(15.0));
    }

    #[test]
    fn test_custom_delimiters() {
        let g = parse_global(&[record("1H/;1H!/4Hpart/2/", 'G', 1)]);
        assert_eq!(g.param_delimiter, '/');
        assert_eq!(g.record_delimiter, '!');
        assert_eq!(g.param(3), Some(&Param::Text("part".into())));
        assert_eq!(g.unit_flag(), 2);

        let defaulted = parse_global(&[record(",,4Hpart;", 'G', 1)]);
        assert_eq!((defaulted.param_delimiter, defaulted.record_delimiter), (',', ';'));
    }

    #[test]
    fn test_oversized_hollerith_count_is_truncated() {
        let params = split_params("18446744073709551615H,;", ',', ';');
        assert_eq!(params, vec![Param::Text(",;".into())]);
        let params = split_params("99999999999999999999H,;", ',', ';');
        assert!(!params.is_empty());

        let g = parse_global(&[record("18446744073709551615H,;", 'G', 1)]);
        assert_eq!(g.params.len(), 1);
    }

    #[test]
    fn test_unit_scale_from_flag() {
        let mut g = GlobalSection::default();
        g.params = vec![Param::Empty; 13];
        g.params.push(Param::Token("1".into()));
        assert_eq!(g.unit_scale(), 25.4);
        g.params[13] = Param::Token("6".into());
        assert_eq!(g.unit_scale(), 1000.0);
        g.params[13] = Param::Token("3".into());
        g.params.push(Param::Text("CM".into()));
        assert_eq!(g.unit_scale(), 10.0);
    }

    #[test]
    fn test_parse_line_entity() {
        let text = [
            record("test file", 'S', 1),
            record("1H,,1H;;", 'G', 1),
            de_records(110, 1, 1, 0, 1),
            param_record("110,0.,0.,0.,1.,2.,3.;", 1, 1),
            record("S      1G      1D      2P      1", 'T', 1),
        ]
        .join("\n");
        let file = parse(&text).unwrap();
        assert_eq!(file.start, "test file");
        assert_eq!(file.entries.len(), 1);
        let line = file.require(1).unwrap();
        assert_eq!(line.entity_type, 110);
        assert_eq!(line.point(4).unwrap(), [1.0, 2.0, 3.0]);
        assert!(file.require(3).is_err());
        assert!(file.entry(2).is_none());
    }

    #[test]
    fn test_bad_records() {
        assert!(matches!(parse("short"), Err(IgesError::Section { line: 1, .. })));
        let odd = [record("", 'S', 1), record("110", 'D', 1)].join("\n");
        assert!(parse(&odd).is_err());
        let wrong_type = [de_records(110, 1, 1, 0, 1), param_record("100,0.;", 1, 1)].join("\n");
        assert!(matches!(parse(&wrong_type), Err(IgesError::Parameter { de: 1, .. })));

        let huge = [
            record("", 'S', 1),
            record("1H,,1H;;", 'G', 1),
            de_records(126, 1, 1, 0, 1),
            param_record("126,9223372036854775807,9223372036854775807,0,0,1,0;", 1, 1),
        ]
        .join("\n");
        let file = parse(&huge).unwrap();
        let entry = file.require(1).unwrap();
        assert!(matches!(entry.count(1), Err(IgesError::Parameter { de: 1, .. })));
        assert_eq!(entry.count(3).unwrap(), 0);
    }
}
