//! Flattening of nested attribute trees into dot/bracket keyed rows.
//!
//! `{"address": {"city": "Oslo"}, "tags": [{"name": "a"}]}` becomes
//! `address`, `address.city`, `tags`, `tags[0]`, `tags[0].name`. Composite
//! values stay available under their own key next to their expanded leaves.

use crate::constants::{MAX_FLATTEN_DEPTH, SCALAR_KEY};
use crate::data::geometry::{FeatureCollection, Properties};
use indexmap::IndexMap;
use serde_json::Value;

/// Flat key → value mapping in first-seen key order
pub type FlattenedRow = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlattener {
    max_depth: usize,
}

impl Default for PropertyFlattener {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyFlattener {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_FLATTEN_DEPTH,
        }
    }

    /// Composites nested deeper than `max_depth` are stored whole instead of
    /// being expanded further.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Flattens any JSON value. A bare scalar is stored under `"value"`.
    pub fn flatten(&self, value: &Value) -> FlattenedRow {
        let mut row = FlattenedRow::new();
        match value {
            Value::Object(map) => self.flatten_object(map, "", 0, &mut row),
            Value::Array(items) => self.flatten_array(items, "", 0, &mut row),
            scalar => {
                row.insert(SCALAR_KEY.to_string(), scalar.clone());
            }
        }
        row
    }

    pub fn flatten_properties(&self, properties: &Properties) -> FlattenedRow {
        let mut row = FlattenedRow::new();
        self.flatten_object(properties, "", 0, &mut row);
        row
    }

    /// One row per feature, in feature order
    pub fn flatten_collection(&self, collection: &FeatureCollection) -> Vec<FlattenedRow> {
        collection
            .features
            .iter()
            .map(|feature| self.flatten_properties(&feature.properties))
            .collect()
    }

    fn flatten_object(
        &self,
        map: &serde_json::Map<String, Value>,
        prefix: &str,
        depth: usize,
        row: &mut FlattenedRow,
    ) {
        for (key, value) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            self.flatten_value(value, path, depth, row);
        }
    }

    fn flatten_array(&self, items: &[Value], prefix: &str, depth: usize, row: &mut FlattenedRow) {
        for (index, item) in items.iter().enumerate() {
            self.flatten_value(item, format!("{}[{}]", prefix, index), depth, row);
        }
    }

    fn flatten_value(&self, value: &Value, path: String, depth: usize, row: &mut FlattenedRow) {
        match value {
            Value::Object(map) if depth < self.max_depth => {
                insert_first(row, path.clone(), value);
                self.flatten_object(map, &path, depth + 1, row);
            }
            Value::Array(items) if depth < self.max_depth => {
                insert_first(row, path.clone(), value);
                self.flatten_array(items, &path, depth + 1, row);
            }
            _ => insert_first(row, path, value),
        }
    }
}

/// A literal key like `"a.b"` and the expansion of `{"a": {"b": ..}}` land
/// on the same path; the first one seen is kept.
fn insert_first(row: &mut FlattenedRow, path: String, value: &Value) {
    match row.entry(path) {
        indexmap::map::Entry::Occupied(entry) => {
            log::warn!(
                "Flattened key '{}' is produced twice; keeping the first value",
                entry.key()
            );
        }
        indexmap::map::Entry::Vacant(entry) => {
            entry.insert(value.clone());
        }
    }
}

/// Text for a tabular cell: `null` is empty, strings are unquoted and
/// composites are rendered as compact JSON
pub fn to_cell_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}
