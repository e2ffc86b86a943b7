use crate::constants::FEATURE_GEOMETRY_COLUMN;
use crate::data::flatten::PropertyFlattener;
use crate::data::geometry::FeatureCollection;
use crate::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tabular row: column name → cell
pub type Row = IndexMap<String, Value>;

static NULL: Value = Value::Null;

/// Ordered column list plus ordered rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl TabularData {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Columns are the union of row keys in first-seen order
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns = IndexSet::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
        }
        Self {
            columns: columns.into_iter().collect(),
            rows,
        }
    }

    /// Accepts a JSON array of objects; non-object items are rejected
    pub fn from_json(value: &Value) -> Result<Self> {
        let rows = Vec::<Row>::deserialize(value)?;
        Ok(Self::from_rows(rows))
    }

    /// One row per feature: flattened properties plus the feature geometry
    /// under [`FEATURE_GEOMETRY_COLUMN`]
    pub fn from_features(collection: &FeatureCollection, flattener: &PropertyFlattener) -> Self {
        let rows = collection
            .features
            .iter()
            .map(|feature| {
                let mut row = flattener.flatten_properties(&feature.properties);
                let geometry = feature
                    .geometry
                    .as_ref()
                    .and_then(|g| serde_json::to_value(g).ok())
                    .unwrap_or(Value::Null);
                row.insert(FEATURE_GEOMETRY_COLUMN.to_string(), geometry);
                row
            })
            .collect();
        Self::from_rows(rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Cells of `column`, with missing cells reported as `null`
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(column).unwrap_or(&NULL))
    }
}

/// Numeric coercion for a cell: numbers and numeric strings, finite only
pub fn cell_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Category/label text for a cell. `null` and blank strings have none.
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        other => Some(crate::data::flatten::to_cell_string(other)),
    }
}

impl From<Vec<Row>> for TabularData {
    fn from(rows: Vec<Row>) -> Self {
        Self::from_rows(rows)
    }
}

impl TryFrom<&Value> for TabularData {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Self::from_json(value)
    }
}
