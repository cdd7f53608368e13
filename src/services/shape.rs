//! Backend payload shapes
//!
//! Drupal returns the same field in several shapes depending on the endpoint:
//! a field array (`[{value: ...}]`), a wrapped object (`{value, processed}`),
//! or a plain scalar. Foreign keys come either as JSON:API relationships with
//! metadata or as flat `[{target_id: ...}]` arrays. Every reader here matches
//! the shapes explicitly and returns `None` when nothing usable is present.

use serde_json::{Map, Value};

/// Shape of a single field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldShape<'a> {
    /// Drupal field array, `[{value: ...}, ...]`
    Items(&'a [Value]),
    /// Single object such as `{value, processed, format}`
    Wrapped(&'a Map<String, Value>),
    /// String, number or boolean
    Plain(&'a Value),
    /// Missing, null or empty array
    Absent,
}

impl<'a> FieldShape<'a> {
    pub fn classify(field: Option<&'a Value>) -> Self {
        match field {
            None | Some(Value::Null) => FieldShape::Absent,
            Some(Value::Array(items)) if items.is_empty() => FieldShape::Absent,
            Some(Value::Array(items)) => FieldShape::Items(items),
            Some(Value::Object(map)) => FieldShape::Wrapped(map),
            Some(value) => FieldShape::Plain(value),
        }
    }
}

/// Render a scalar as a string; empty strings count as absent
pub fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_of(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| map.get(*key).and_then(scalar))
}

/// Plain text of a field: `[0].value`, then `[0].target_id`, then the scalar itself
pub fn text(field: Option<&Value>) -> Option<String> {
    match FieldShape::classify(field) {
        FieldShape::Items(items) => match &items[0] {
            Value::Object(item) => first_of(item, &["value", "target_id"]),
            other => scalar(other),
        },
        FieldShape::Wrapped(map) => first_of(map, &["value"]),
        FieldShape::Plain(value) => scalar(value),
        FieldShape::Absent => None,
    }
}

/// Rich text of a field, preferring the rendered `processed` form over `value`
pub fn rich_text(field: Option<&Value>) -> Option<String> {
    match FieldShape::classify(field) {
        FieldShape::Items(items) => match &items[0] {
            Value::Object(item) => first_of(item, &["processed", "value"]),
            other => scalar(other),
        },
        FieldShape::Wrapped(map) => first_of(map, &["processed", "value"]),
        FieldShape::Plain(value) => scalar(value),
        FieldShape::Absent => None,
    }
}

/// Identifier of a record: flat `id`, or Drupal `id: [{value}]`
pub fn to_id(field: Option<&Value>) -> Option<String> {
    text(field)
}

/// Foreign-key IDs a record holds for relationship `name`
///
/// Reads `relationships.<name>.data` (a single resource identifier or an
/// array of them) and takes each `meta.drupal_internal__target_id`. When that
/// `data` is missing, null or a scalar, falls back to a flat `<name>` field
/// array of `target_id`/`value` items. Neither present yields an empty list.
pub fn relationship_targets(record: &Value, name: &str) -> Vec<String> {
    let data = record
        .get("relationships")
        .and_then(|relationships| relationships.get(name))
        .and_then(|relationship| relationship.get("data"));

    let identifiers: Option<Vec<&Value>> = match data {
        Some(Value::Array(items)) => Some(items.iter().collect()),
        Some(item @ Value::Object(_)) => Some(vec![item]),
        _ => None,
    };
    if let Some(identifiers) = identifiers {
        return identifiers
            .into_iter()
            .filter_map(|identifier| {
                identifier
                    .get("meta")
                    .and_then(|meta| meta.get("drupal_internal__target_id"))
                    .and_then(scalar)
            })
            .collect();
    }

    match record.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => first_of(map, &["target_id", "value"]),
                other => scalar(other),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// First foreign key for a single-valued relationship
pub fn relationship_target(record: &Value, name: &str) -> Option<String> {
    relationship_targets(record, name).into_iter().next()
}
