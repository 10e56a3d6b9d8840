//! Declarative mapping from Rally fields to the canonical model.
//!
//! Each table row names a dotted vendor path and the canonical field it fills.
//! Supporting another vendor field means adding a row; the transform code never
//! changes.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::envelope::RallyObject;
use super::{ConnectorError, Result};
use crate::model::story::{short_name, Story, Task};
use crate::util::sanitize::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Identifier,
    FullName,
    Owner,
    Estimate,
    DetailedEstimate,
    TodoRemaining,
    EffortApplied,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Number,
}

impl Field {
    fn value_kind(self) -> ValueKind {
        match self {
            Field::Estimate
            | Field::DetailedEstimate
            | Field::TodoRemaining
            | Field::EffortApplied => ValueKind::Number,
            Field::Identifier | Field::FullName | Field::Owner | Field::Description => {
                ValueKind::Text
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub source: &'static str,
    pub target: Field,
}

const fn map(source: &'static str, target: Field) -> FieldMapping {
    FieldMapping { source, target }
}

pub const STORY_MAPPING: &[FieldMapping] = &[
    map("FormattedID", Field::Identifier),
    map("Name", Field::FullName),
    map("Owner._refObjectName", Field::Owner),
    map("PlanEstimate", Field::Estimate),
    map("Description", Field::Description),
];

pub const TASK_MAPPING: &[FieldMapping] = &[
    map("FormattedID", Field::Identifier),
    map("Name", Field::FullName),
    map("Owner._refObjectName", Field::Owner),
    map("Estimate", Field::DetailedEstimate),
    map("ToDo", Field::TodoRemaining),
    map("Actuals", Field::EffortApplied),
    map("Description", Field::Description),
];

const STORY_FIELDS: &[Field] = &[
    Field::Identifier,
    Field::FullName,
    Field::Owner,
    Field::Estimate,
    Field::Description,
];

const TASK_FIELDS: &[Field] = &[
    Field::Identifier,
    Field::FullName,
    Field::Owner,
    Field::DetailedEstimate,
    Field::TodoRemaining,
    Field::EffortApplied,
    Field::Description,
];

/// Check both mapping tables. Run once when a connector is built.
pub fn validate_mappings() -> Result<()> {
    validate_table("story", STORY_MAPPING, STORY_FIELDS)?;
    validate_table("task", TASK_MAPPING, TASK_FIELDS)
}

fn validate_table(entity: &str, table: &[FieldMapping], allowed: &[Field]) -> Result<()> {
    let invalid = |reason: String| ConnectorError::Transform {
        artifact: format!("{entity} mapping"),
        reason,
    };

    let mut seen = HashSet::new();
    for mapping in table {
        if mapping.source.is_empty() || mapping.source.split('.').any(str::is_empty) {
            return Err(invalid(format!("malformed source path {:?}", mapping.source)));
        }
        if !allowed.contains(&mapping.target) {
            return Err(invalid(format!("{:?} is not a {entity} field", mapping.target)));
        }
        if !seen.insert(mapping.target) {
            return Err(invalid(format!("{:?} is mapped twice", mapping.target)));
        }
    }
    for required in [Field::Identifier, Field::FullName] {
        if !seen.contains(&required) {
            return Err(invalid(format!("{required:?} is not mapped")));
        }
    }
    Ok(())
}

/// Top-level vendor attributes referenced by a table, for the query `fetch` list.
pub fn fetch_fields(table: &[FieldMapping]) -> Vec<&'static str> {
    let mut fields: Vec<&'static str> = Vec::new();
    for mapping in table {
        let head = mapping.source.split('.').next().unwrap_or(mapping.source);
        if !fields.contains(&head) {
            fields.push(head);
        }
    }
    fields
}

/// Field values pulled from one artifact, with defaults applied on read.
struct Extracted {
    text: HashMap<Field, String>,
    numbers: HashMap<Field, f64>,
}

impl Extracted {
    fn text(&mut self, field: Field) -> String {
        self.text.remove(&field).unwrap_or_default()
    }

    fn number(&self, field: Field) -> f64 {
        self.numbers.get(&field).copied().unwrap_or(0.0)
    }
}

fn extract(object: &RallyObject, table: &[FieldMapping]) -> Result<Extracted> {
    let mut extracted = Extracted {
        text: HashMap::new(),
        numbers: HashMap::new(),
    };
    for mapping in table {
        let Some(value) = object.lookup(mapping.source) else {
            continue;
        };
        let mismatch = || ConnectorError::Transform {
            artifact: describe(object),
            reason: format!(
                "{} has unexpected value {value} for {:?}",
                mapping.source, mapping.target
            ),
        };
        match mapping.target.value_kind() {
            ValueKind::Text => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(mismatch()),
                };
                extracted.text.insert(mapping.target, text);
            }
            ValueKind::Number => {
                let number = match value {
                    Value::Number(n) => n.as_f64().ok_or_else(mismatch)?,
                    Value::String(s) => s.trim().parse::<f64>().map_err(|_| mismatch())?,
                    _ => return Err(mismatch()),
                };
                extracted.numbers.insert(mapping.target, number);
            }
        }
    }
    Ok(extracted)
}

fn describe(object: &RallyObject) -> String {
    object
        .reference()
        .or_else(|| object.discriminator())
        .unwrap_or("artifact")
        .to_string()
}

pub fn transform_story(object: &RallyObject) -> Result<Story> {
    let mut fields = extract(object, STORY_MAPPING)?;
    let full_name = fields.text(Field::FullName);
    Ok(Story {
        identifier: fields.text(Field::Identifier),
        short_name: short_name(&full_name),
        full_name,
        owner: fields.text(Field::Owner),
        estimate: fields.number(Field::Estimate),
        description: sanitize(&fields.text(Field::Description)),
        links: Vec::new(),
    })
}

/// Transform a task artifact. The parent identifier is filled in by the caller.
pub fn transform_task(object: &RallyObject) -> Result<Task> {
    let mut fields = extract(object, TASK_MAPPING)?;
    let full_name = fields.text(Field::FullName);
    Ok(Task {
        identifier: fields.text(Field::Identifier),
        parent_identifier: String::new(),
        short_name: short_name(&full_name),
        full_name,
        owner: fields.text(Field::Owner),
        detailed_estimate: fields.number(Field::DetailedEstimate),
        todo_remaining: fields.number(Field::TodoRemaining),
        effort_applied: fields.number(Field::EffortApplied),
        description: sanitize(&fields.text(Field::Description)),
        links: Vec::new(),
    })
}
