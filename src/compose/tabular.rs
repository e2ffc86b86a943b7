//! Geometry resolution for tabular rows.
//!
//! Each row is tried against the mapped columns in a fixed priority:
//! GeoJSON cell, WKT cell, path cell, polygon cell, then the latitude and
//! longitude pair. The first that yields a usable shape wins. Rows matching
//! none are excluded and counted, never reported as a batch failure.

use crate::compose::aggregate::AggregationEngine;
use crate::compose::color::{CategoryColorAssigner, CategoryColorMap};
use crate::compose::dataset::GeoDataset;
use crate::core::config::{ColumnMapping, ColumnRole};
use crate::core::geo::LatLng;
use crate::data::geometry::{is_valid_position, Feature, Geometry, Position, Properties};
use crate::data::parsers::{geojson::GeoJsonParser, wkt};
use crate::data::table::{cell_number, cell_text, Row, TabularData};
use crate::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// Which mapped column produced a row's geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GeometrySource {
    GeoJson,
    Wkt,
    Path,
    Polygon,
    LatLng,
}

/// Shape resolved from one row
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedShape {
    Point(Position),
    Path(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    /// Non-point GeoJSON/WKT geometry, kept as a feature with the row's cells
    Feature(Feature),
}

/// A row whose geometry was resolved, with its style inputs
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub row_index: usize,
    pub source: GeometrySource,
    pub shape: ResolvedShape,
    pub category: String,
    /// The category is the layer's synthetic key, not a cell value
    pub fallback_category: bool,
    pub color_value: String,
    /// Numeric height cell, if a height column is mapped and the cell is numeric
    pub value: Option<f64>,
}

/// Per-layer resolution counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowStats {
    pub total_rows: usize,
    pub resolved_rows: usize,
    pub no_geometry_rows: usize,
    pub by_source: IndexMap<GeometrySource, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub rows: Vec<ResolvedRow>,
    pub stats: RowStats,
}

impl Resolution {
    /// Distinct observed categories of the resolved rows in first-seen
    /// order. Rows colored by the fallback key are left out.
    pub fn categories(&self) -> Vec<String> {
        let seen: IndexSet<&str> = self
            .rows
            .iter()
            .filter(|row| !row.fallback_category)
            .map(|row| row.category.as_str())
            .collect();
        seen.into_iter().map(str::to_string).collect()
    }
}

/// Everything a tabular source turns into
#[derive(Debug)]
pub struct TabularBuild {
    pub dataset: GeoDataset,
    pub color_map: CategoryColorMap,
    pub stats: RowStats,
    pub aggregation_issue: Option<Error>,
}

pub struct TabularGeometryBuilder {
    mapping: ColumnMapping,
    fallback_category: String,
}

impl TabularGeometryBuilder {
    /// `fallback_category` is used for rows without a category cell
    pub fn new(mapping: ColumnMapping, fallback_category: impl Into<String>) -> Self {
        Self {
            mapping,
            fallback_category: fallback_category.into(),
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Resolves, aggregates and colors a whole table
    pub fn build(
        &self,
        table: &TabularData,
        engine: &AggregationEngine,
        assigner: &CategoryColorAssigner,
        layer_id: &str,
    ) -> TabularBuild {
        let resolution = self.resolve(table);
        let categories = resolution.categories();
        let color_map = assigner.assign(layer_id, &categories);

        let has_value_column = self.mapping.height_column.is_some();
        let aggregation = engine.aggregate(resolution.rows, has_value_column);
        let dataset = GeoDataset::from_items(&aggregation.items, &color_map, categories);

        TabularBuild {
            dataset,
            color_map,
            stats: resolution.stats,
            aggregation_issue: aggregation.issue,
        }
    }

    /// Resolves every row, counting the ones without geometry
    pub fn resolve(&self, table: &TabularData) -> Resolution {
        let mut resolution = Resolution::default();
        resolution.stats.total_rows = table.len();

        for (index, row) in table.rows.iter().enumerate() {
            match self.resolve_row(index, row) {
                Ok(resolved) => {
                    *resolution.stats.by_source.entry(resolved.source).or_insert(0) += 1;
                    resolution.rows.push(resolved);
                }
                Err(_) => resolution.stats.no_geometry_rows += 1,
            }
        }
        resolution.stats.resolved_rows = resolution.rows.len();

        if resolution.stats.no_geometry_rows > 0 {
            log::debug!(
                "{} of {} rows have no geometry",
                resolution.stats.no_geometry_rows,
                resolution.stats.total_rows
            );
        }
        resolution
    }

    /// Resolves a single row, or `RowGeometryUnresolved`
    pub fn resolve_row(&self, row_index: usize, row: &Row) -> Result<ResolvedRow> {
        let (source, shape) = self
            .resolve_shape(row)
            .ok_or_else(|| Error::RowGeometryUnresolved { row: row_index })?;

        let observed = self.cell(row, ColumnRole::Category).and_then(cell_text);
        let fallback_category = observed.is_none();
        let category = observed.unwrap_or_else(|| self.fallback_category.clone());
        let color_value = self
            .cell(row, ColumnRole::Color)
            .and_then(cell_text)
            .unwrap_or_else(|| category.clone());
        let value = self.cell(row, ColumnRole::Height).and_then(cell_number);

        Ok(ResolvedRow {
            row_index,
            source,
            shape,
            category,
            fallback_category,
            color_value,
            value,
        })
    }

    fn cell<'r>(&self, row: &'r Row, role: ColumnRole) -> Option<&'r Value> {
        self.mapping.get(role).and_then(|column| row.get(column))
    }

    fn resolve_shape(&self, row: &Row) -> Option<(GeometrySource, ResolvedShape)> {
        if let Some(geometry) = self
            .cell(row, ColumnRole::GeoJson)
            .and_then(GeoJsonParser::geometry_from_cell)
        {
            return Some((GeometrySource::GeoJson, self.geometry_shape(geometry, row)));
        }

        if let Some(geometry) = self
            .cell(row, ColumnRole::Wkt)
            .and_then(Value::as_str)
            .and_then(|text| wkt::parse_entry(text).ok())
        {
            return Some((GeometrySource::Wkt, self.geometry_shape(geometry, row)));
        }

        if let Some(path) = self.cell(row, ColumnRole::Path).and_then(parse_path_cell) {
            return Some((GeometrySource::Path, ResolvedShape::Path(path)));
        }

        if let Some(rings) = self.cell(row, ColumnRole::Polygon).and_then(parse_polygon_cell) {
            return Some((GeometrySource::Polygon, ResolvedShape::Polygon(rings)));
        }

        let lat = self.cell(row, ColumnRole::Latitude).and_then(cell_number)?;
        let lng = self.cell(row, ColumnRole::Longitude).and_then(cell_number)?;
        let point = LatLng::new(lat, lng);
        point
            .is_valid()
            .then(|| (GeometrySource::LatLng, ResolvedShape::Point(vec![lng, lat])))
    }

    fn geometry_shape(&self, geometry: Geometry, row: &Row) -> ResolvedShape {
        match geometry.as_point() {
            Some([lng, lat]) => ResolvedShape::Point(vec![lng, lat]),
            None => ResolvedShape::Feature(Feature::new(Some(geometry), self.row_properties(row))),
        }
    }

    /// Row cells minus geometry columns and minus flattened keys whose root
    /// composite is also present
    fn row_properties(&self, row: &Row) -> Properties {
        let geometry_columns: Vec<&str> = ColumnRole::GEOMETRY
            .iter()
            .chain(&[ColumnRole::Latitude, ColumnRole::Longitude])
            .filter_map(|role| self.mapping.get(*role))
            .collect();

        row.iter()
            .filter(|(key, _)| !geometry_columns.contains(&key.as_str()))
            .filter(|(key, _)| {
                let key: &str = key;
                let root = key.split(['.', '[']).next().unwrap_or(key);
                root == key || !row.contains_key(root)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn position_from_value(value: &Value) -> Option<Position> {
    let items = value.as_array()?;
    let position: Position = items.iter().map(Value::as_f64).collect::<Option<_>>()?;
    is_valid_position(&position).then_some(position)
}

fn positions_from_value(value: &Value) -> Option<Vec<Position>> {
    value.as_array()?.iter().map(position_from_value).collect()
}

/// `"lng,lat;lng,lat"` or `"lng lat; lng lat"`
fn positions_from_separated(text: &str) -> Option<Vec<Position>> {
    text.split(';')
        .map(str::trim)
        .filter(|point| !point.is_empty())
        .map(|point| {
            let position: Position = point
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(|part| part.parse::<f64>().ok())
                .collect::<Option<_>>()?;
            is_valid_position(&position).then_some(position)
        })
        .collect()
}

fn json_cell(cell: &Value) -> Option<Cow<'_, Value>> {
    match cell {
        Value::Array(_) => Some(Cow::Borrowed(cell)),
        Value::String(text) if text.trim_start().starts_with('[') => {
            serde_json::from_str::<Value>(text).ok().map(Cow::Owned)
        }
        _ => None,
    }
}

/// A path cell: JSON `[[lng, lat], ...]` or the separator encoding.
/// At least two positions.
pub fn parse_path_cell(cell: &Value) -> Option<Vec<Position>> {
    let path = match json_cell(cell) {
        Some(value) => positions_from_value(&value)?,
        None => positions_from_separated(cell.as_str()?)?,
    };
    (path.len() >= 2).then_some(path)
}

/// A polygon cell: JSON rings (`[[[lng, lat], ...], ...]`), a single JSON
/// ring, or the separator encoding with rings split by `|`. Rings are closed.
pub fn parse_polygon_cell(cell: &Value) -> Option<Vec<Vec<Position>>> {
    let rings = match json_cell(cell) {
        Some(value) => {
            let items = value.as_array()?;
            let nested = items
                .first()
                .and_then(Value::as_array)
                .and_then(|first| first.first())
                .map_or(false, Value::is_array);
            if nested {
                items
                    .iter()
                    .map(positions_from_value)
                    .collect::<Option<Vec<_>>>()?
            } else {
                vec![positions_from_value(&value)?]
            }
        }
        None => cell
            .as_str()?
            .split('|')
            .filter(|ring| !ring.trim().is_empty())
            .map(positions_from_separated)
            .collect::<Option<Vec<_>>>()?,
    };

    if rings.is_empty() {
        return None;
    }
    rings.into_iter().map(close_ring).collect()
}

fn close_ring(mut ring: Vec<Position>) -> Option<Vec<Position>> {
    if ring.first() != ring.last() {
        let first = ring.first()?.clone();
        ring.push(first);
    }
    (ring.len() >= 4).then_some(ring)
}
