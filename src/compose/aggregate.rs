use crate::compose::tabular::{ResolvedRow, ResolvedShape};
use crate::core::config::AggregationMode;
use crate::Error;
use fxhash::FxHashMap;

/// Rows collapsed onto one (shape, category) key
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedItem {
    /// First row of the group; carries the shape and style inputs
    pub row: ResolvedRow,
    /// Rows in the group
    pub count: usize,
    /// Aggregate of the group's numeric values; `None` when there is none
    pub elevation: Option<f64>,
}

#[derive(Debug)]
pub struct Aggregation {
    pub items: Vec<AggregatedItem>,
    /// Set when the mode needs a numeric value column that is missing or
    /// has no numeric cell at all. Items are then emitted ungrouped with no
    /// elevation.
    pub issue: Option<Error>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ShapeKey {
    Coordinates(Vec<u64>),
    Geometry(String),
}

impl ShapeKey {
    fn of(shape: &ResolvedShape) -> Self {
        match shape {
            ResolvedShape::Point(position) => ShapeKey::Coordinates(bits(position.iter())),
            ResolvedShape::Path(path) => ShapeKey::Coordinates(bits(path.iter().flatten())),
            ResolvedShape::Polygon(rings) => {
                ShapeKey::Coordinates(bits(rings.iter().flatten().flatten()))
            }
            ResolvedShape::Feature(feature) => ShapeKey::Geometry(
                serde_json::to_string(&feature.geometry).unwrap_or_default(),
            ),
        }
    }
}

fn bits<'a>(values: impl Iterator<Item = &'a f64>) -> Vec<u64> {
    values.map(|v| v.to_bits()).collect()
}

/// Collapses resolved rows per grouping key and computes their elevation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationEngine {
    mode: AggregationMode,
}

impl AggregationEngine {
    pub fn new(mode: AggregationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Statistic over one group. `values` are the group's numeric cells and
    /// `rows` its size. Empty numeric input has no value, not zero.
    pub fn compute(mode: AggregationMode, values: &[f64], rows: usize) -> Option<f64> {
        if mode == AggregationMode::Count {
            return Some(rows as f64);
        }
        let (first, rest) = values.split_first()?;
        let value = match mode {
            AggregationMode::Sum => values.iter().sum(),
            AggregationMode::Avg => values.iter().sum::<f64>() / values.len() as f64,
            AggregationMode::Min => rest.iter().copied().fold(*first, f64::min),
            AggregationMode::Max => rest.iter().copied().fold(*first, f64::max),
            AggregationMode::None | AggregationMode::Count => *first,
        };
        Some(value)
    }

    /// Checks that the mode can run over these rows
    pub fn check(&self, rows: &[ResolvedRow], has_value_column: bool) -> Result<(), Error> {
        if !self.mode.requires_value_column() {
            return Ok(());
        }
        if !has_value_column {
            return Err(Error::AggregationUnavailable {
                mode: self.mode,
                reason: "no value column selected".to_string(),
            });
        }
        if !rows.is_empty() && rows.iter().all(|row| row.value.is_none()) {
            return Err(Error::AggregationUnavailable {
                mode: self.mode,
                reason: "value column has no numeric cells".to_string(),
            });
        }
        Ok(())
    }

    /// Groups rows by (shape, category) in first-seen order. With mode
    /// `none` every row stays separate and keeps its own value.
    pub fn aggregate(&self, rows: Vec<ResolvedRow>, has_value_column: bool) -> Aggregation {
        if let Err(issue) = self.check(&rows, has_value_column) {
            log::warn!("{}", issue);
            let items = rows.into_iter().map(|row| single(row, None)).collect();
            return Aggregation {
                items,
                issue: Some(issue),
            };
        }

        if self.mode == AggregationMode::None {
            let items = rows
                .into_iter()
                .map(|row| {
                    let value = row.value;
                    single(row, value)
                })
                .collect();
            return Aggregation { items, issue: None };
        }

        let mut index: FxHashMap<(ShapeKey, String), usize> = FxHashMap::default();
        let mut groups: Vec<(ResolvedRow, Vec<f64>, usize)> = Vec::new();
        for row in rows {
            let key = (ShapeKey::of(&row.shape), row.category.clone());
            match index.get(&key) {
                Some(&slot) => {
                    let group = &mut groups[slot];
                    group.1.extend(row.value);
                    group.2 += 1;
                }
                None => {
                    index.insert(key, groups.len());
                    let values = row.value.into_iter().collect();
                    groups.push((row, values, 1));
                }
            }
        }

        let items = groups
            .into_iter()
            .map(|(row, values, count)| AggregatedItem {
                elevation: Self::compute(self.mode, &values, count),
                row,
                count,
            })
            .collect();
        Aggregation { items, issue: None }
    }
}

fn single(row: ResolvedRow, elevation: Option<f64>) -> AggregatedItem {
    AggregatedItem {
        row,
        count: 1,
        elevation,
    }
}
