//! Entity graph of a Part 21 DATA section, indexed by instance id.
//!
//! Parsing is done by `ruststep`; this module only groups the records
//! and offers checked positional access to their parameters.

use std::collections::BTreeMap;

use truck_stepio::r#in::ruststep;
use truck_stepio::r#in::ruststep::ast::{EntityInstance, Name, Parameter, Record};

use crate::errors::StepError;

/// Conversions of a single parameter value.
pub trait ParameterExt {
    fn as_ref_id(&self) -> Option<u64>;
    /// Integers are accepted where reals are expected.
    fn as_real(&self) -> Option<f64>;
    fn as_integer(&self) -> Option<i64>;
    fn as_enum(&self) -> Option<&str>;
    fn as_list(&self) -> Option<&[Parameter]>;
    fn as_bool(&self) -> Option<bool>;
    fn is_null(&self) -> bool;
}

impl ParameterExt for Parameter {
    fn as_ref_id(&self) -> Option<u64> {
        match self {
            Parameter::Ref(Name::Entity(id)) => Some(*id),
            _ => None,
        }
    }

    fn as_real(&self) -> Option<f64> {
        match self {
            Parameter::Real(v) => Some(*v),
            Parameter::Integer(v) => Some(*v as f64),
            Parameter::Typed { parameter, .. } => match parameter.as_ref() {
                Parameter::List(items) if items.len() == 1 => items[0].as_real(),
                inner => inner.as_real(),
            },
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Parameter::Integer(v) => Some(*v),
            _ => None,
        }
    }

    fn as_enum(&self) -> Option<&str> {
        match self {
            Parameter::Enumeration(s) => Some(s),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&[Parameter]> {
        match self {
            Parameter::List(items) => Some(items),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self.as_enum()? {
            "T" | "TRUE" => Some(true),
            "F" | "FALSE" => Some(false),
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Parameter::NotProvided)
    }
}

/// Every entity id referenced anywhere inside `value`.
pub fn collect_refs(value: &Parameter, out: &mut impl Extend<u64>) {
    match value {
        Parameter::Ref(Name::Entity(id)) => out.extend([*id]),
        Parameter::List(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Parameter::Typed { parameter, .. } => collect_refs(parameter, out),
        _ => {}
    }
}

fn record_args(record: &Record) -> &[Parameter] {
    match &record.parameter {
        Parameter::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepEntity {
    pub id: u64,
    /// One record for a simple instance, several for a complex one.
    pub parts: Vec<Record>,
}

impl StepEntity {
    pub fn is_complex(&self) -> bool {
        self.parts.len() > 1
    }

    /// Type name of a simple instance, or the first part of a complex one.
    pub fn type_name(&self) -> &str {
        self.parts.first().map(|p| p.name.as_str()).unwrap_or("")
    }

    pub fn part(&self, type_name: &str) -> Option<&Record> {
        self.parts.iter().find(|p| p.name == type_name)
    }

    pub fn has_part(&self, type_name: &str) -> bool {
        self.part(type_name).is_some()
    }

    /// Arguments of the first part.
    pub fn args(&self) -> Args<'_> {
        Args {
            id: self.id,
            values: self.parts.first().map(record_args).unwrap_or(&[]),
        }
    }

    pub fn part_args(&self, type_name: &str) -> Result<Args<'_>, StepError> {
        self.part(type_name)
            .map(|p| Args {
                id: self.id,
                values: record_args(p),
            })
            .ok_or_else(|| StepError::unexpected(self.id, type_name, self.type_name()))
    }
}

/// Checked positional access to an entity's arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    id: u64,
    values: &'a [Parameter],
}

impl<'a> Args<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn error(&self, index: usize, message: impl Into<String>) -> StepError {
        StepError::BadArgument {
            id: self.id,
            index,
            message: message.into(),
        }
    }

    pub fn get(&self, index: usize) -> Result<&'a Parameter, StepError> {
        self.values.get(index).ok_or_else(|| self.error(index, "missing"))
    }

    pub fn first(&self) -> Option<&'a Parameter> {
        self.values.first()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).map_or(true, Parameter::is_null)
    }

    pub fn real(&self, index: usize) -> Result<f64, StepError> {
        self.get(index)?.as_real().ok_or_else(|| self.error(index, "expected a real"))
    }

    pub fn integer(&self, index: usize) -> Result<i64, StepError> {
        self.get(index)?.as_integer().ok_or_else(|| self.error(index, "expected an integer"))
    }

    pub fn string(&self, index: usize) -> Result<&'a str, StepError> {
        match self.get(index)? {
            Parameter::String(s) => Ok(s),
            _ => Err(self.error(index, "expected a string")),
        }
    }

    pub fn reference(&self, index: usize) -> Result<u64, StepError> {
        self.get(index)?.as_ref_id().ok_or_else(|| self.error(index, "expected a reference"))
    }

    pub fn optional_reference(&self, index: usize) -> Result<Option<u64>, StepError> {
        if self.is_null(index) {
            Ok(None)
        } else {
            self.reference(index).map(Some)
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool, StepError> {
        self.get(index)?.as_bool().ok_or_else(|| self.error(index, "expected .T. or .F."))
    }

    pub fn enumeration(&self, index: usize) -> Result<&'a str, StepError> {
        self.get(index)?.as_enum().ok_or_else(|| self.error(index, "expected an enumeration"))
    }

    pub fn list(&self, index: usize) -> Result<&'a [Parameter], StepError> {
        self.get(index)?.as_list().ok_or_else(|| self.error(index, "expected a list"))
    }

    pub fn references(&self, index: usize) -> Result<Vec<u64>, StepError> {
        self.list(index)?
            .iter()
            .map(|v| v.as_ref_id().ok_or_else(|| self.error(index, "expected a list of references")))
            .collect()
    }

    pub fn reals(&self, index: usize) -> Result<Vec<f64>, StepError> {
        self.list(index)?
            .iter()
            .map(|v| v.as_real().ok_or_else(|| self.error(index, "expected a list of reals")))
            .collect()
    }

    pub fn integers(&self, index: usize) -> Result<Vec<i64>, StepError> {
        self.list(index)?
            .iter()
            .map(|v| v.as_integer().ok_or_else(|| self.error(index, "expected a list of integers")))
            .collect()
    }

    /// A list of lists, e.g. a control point grid.
    pub fn nested<T>(&self, index: usize, item: impl Fn(&Parameter) -> Option<T>) -> Result<Vec<Vec<T>>, StepError> {
        self.list(index)?
            .iter()
            .map(|row| {
                row.as_list()
                    .and_then(|items| items.iter().map(&item).collect::<Option<Vec<T>>>())
                    .ok_or_else(|| self.error(index, "expected a nested list"))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepFile {
    pub entities: BTreeMap<u64, StepEntity>,
}

impl StepFile {
    pub fn get(&self, id: u64) -> Option<&StepEntity> {
        self.entities.get(&id)
    }

    pub fn require(&self, id: u64) -> Result<&StepEntity, StepError> {
        self.entities.get(&id).ok_or(StepError::MissingEntity(id))
    }

    /// Entities whose (first) type is `type_name`, in ascending id order.
    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a StepEntity> + 'a {
        self.entities.values().filter(move |e| e.type_name() == type_name)
    }
}

/// Parse an exchange structure and index the instances of all its DATA
/// sections.
pub fn parse(input: &str) -> Result<StepFile, StepError> {
    let exchange = ruststep::parser::parse(input).map_err(|e| StepError::Syntax(e.to_string()))?;
    let mut file = StepFile::default();
    for section in &exchange.data {
        for instance in &section.entities {
            let (id, parts) = match instance {
                EntityInstance::Simple { id, record } => (*id, vec![record.clone()]),
                EntityInstance::Complex { id, subsuper } => (*id, subsuper.0.clone()),
            };
            if parts.is_empty() {
                return Err(StepError::unexpected(id, "entity record", "empty complex instance"));
            }
            if file.entities.insert(id, StepEntity { id, parts }).is_some() {
                return Err(StepError::DuplicateEntity(id));
            }
        }
    }
    Ok(file)
}
