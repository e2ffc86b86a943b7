//! Engine and per-layer configuration.
//!
//! [`LayerSettings`] mirrors the settings object a caller persists for each
//! data source; the engine only validates it. [`EngineConfig`] holds the
//! tunables shared by every layer.

use crate::compose::color::Color;
use crate::constants::{
    BASE_ZOOM, DEFAULT_PALETTE, MAX_FLATTEN_DEPTH, MAX_ZOOM, MIN_ZOOM, ZOOM_EPSILON,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The nine column roles a mapping can assign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnRole {
    Latitude,
    Longitude,
    GeoJson,
    Wkt,
    Path,
    Polygon,
    Category,
    Color,
    Height,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 9] = [
        ColumnRole::Latitude,
        ColumnRole::Longitude,
        ColumnRole::GeoJson,
        ColumnRole::Wkt,
        ColumnRole::Path,
        ColumnRole::Polygon,
        ColumnRole::Category,
        ColumnRole::Color,
        ColumnRole::Height,
    ];

    /// Roles that can produce a geometry on their own
    pub const GEOMETRY: [ColumnRole; 4] = [
        ColumnRole::GeoJson,
        ColumnRole::Wkt,
        ColumnRole::Path,
        ColumnRole::Polygon,
    ];

    /// Name of the corresponding field in a persisted settings object
    pub fn field_name(&self) -> &'static str {
        match self {
            ColumnRole::Latitude => "latitudeColumn",
            ColumnRole::Longitude => "longitudeColumn",
            ColumnRole::GeoJson => "geoJsonColumn",
            ColumnRole::Wkt => "wktColumn",
            ColumnRole::Path => "pathColumn",
            ColumnRole::Polygon => "polygonColumn",
            ColumnRole::Category => "categoryColumn",
            ColumnRole::Color => "colorColumn",
            ColumnRole::Height => "heightColumn",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Latitude => "latitude",
            ColumnRole::Longitude => "longitude",
            ColumnRole::GeoJson => "GeoJSON",
            ColumnRole::Wkt => "WKT",
            ColumnRole::Path => "path",
            ColumnRole::Polygon => "polygon",
            ColumnRole::Category => "category",
            ColumnRole::Color => "color",
            ColumnRole::Height => "height",
        };
        f.write_str(name)
    }
}

/// A mapped column that is missing from the source's current column list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleColumn {
    pub role: ColumnRole,
    pub column: String,
}

impl From<StaleColumn> for Error {
    fn from(stale: StaleColumn) -> Self {
        Error::ColumnMappingStale {
            role: stale.role,
            column: stale.column,
        }
    }
}

/// Column-to-role assignments. Every field is either a column name or unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMapping {
    pub latitude_column: Option<String>,
    pub longitude_column: Option<String>,
    pub geo_json_column: Option<String>,
    pub wkt_column: Option<String>,
    pub path_column: Option<String>,
    pub polygon_column: Option<String>,
    pub category_column: Option<String>,
    pub color_column: Option<String>,
    pub height_column: Option<String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: ColumnRole) -> &Option<String> {
        match role {
            ColumnRole::Latitude => &self.latitude_column,
            ColumnRole::Longitude => &self.longitude_column,
            ColumnRole::GeoJson => &self.geo_json_column,
            ColumnRole::Wkt => &self.wkt_column,
            ColumnRole::Path => &self.path_column,
            ColumnRole::Polygon => &self.polygon_column,
            ColumnRole::Category => &self.category_column,
            ColumnRole::Color => &self.color_column,
            ColumnRole::Height => &self.height_column,
        }
    }

    fn slot_mut(&mut self, role: ColumnRole) -> &mut Option<String> {
        match role {
            ColumnRole::Latitude => &mut self.latitude_column,
            ColumnRole::Longitude => &mut self.longitude_column,
            ColumnRole::GeoJson => &mut self.geo_json_column,
            ColumnRole::Wkt => &mut self.wkt_column,
            ColumnRole::Path => &mut self.path_column,
            ColumnRole::Polygon => &mut self.polygon_column,
            ColumnRole::Category => &mut self.category_column,
            ColumnRole::Color => &mut self.color_column,
            ColumnRole::Height => &mut self.height_column,
        }
    }

    pub fn get(&self, role: ColumnRole) -> Option<&str> {
        self.slot(role).as_deref()
    }

    pub fn set(&mut self, role: ColumnRole, column: Option<String>) {
        *self.slot_mut(role) = column;
    }

    /// Builder form of [`ColumnMapping::set`]
    pub fn with(mut self, role: ColumnRole, column: impl Into<String>) -> Self {
        self.set(role, Some(column.into()));
        self
    }

    /// Assigned roles in [`ColumnRole::ALL`] order
    pub fn assigned(&self) -> impl Iterator<Item = (ColumnRole, &str)> + '_ {
        ColumnRole::ALL
            .into_iter()
            .filter_map(|role| self.get(role).map(|column| (role, column)))
    }

    /// Drops every reference to a column not in `columns`. Returns the
    /// cleaned mapping and what was dropped.
    pub fn validate<S: AsRef<str>>(&self, columns: &[S]) -> (ColumnMapping, Vec<StaleColumn>) {
        let mut valid = self.clone();
        let mut stale = Vec::new();
        for role in ColumnRole::ALL {
            if let Some(column) = self.get(role) {
                if !columns.iter().any(|c| c.as_ref() == column) {
                    log::debug!("Dropping stale {} column '{}'", role, column);
                    stale.push(StaleColumn {
                        role,
                        column: column.to_string(),
                    });
                    valid.set(role, None);
                }
            }
        }
        (valid, stale)
    }

    /// A geometry column, or both coordinate columns, are assigned
    pub fn has_geometry_selection(&self) -> bool {
        ColumnRole::GEOMETRY.iter().any(|role| self.get(*role).is_some())
            || (self.latitude_column.is_some() && self.longitude_column.is_some())
    }
}

/// Statistic computed when several rows collapse onto one grouping key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    #[default]
    None,
}

impl AggregationMode {
    pub const ALL: [AggregationMode; 6] = [
        AggregationMode::Sum,
        AggregationMode::Avg,
        AggregationMode::Count,
        AggregationMode::Min,
        AggregationMode::Max,
        AggregationMode::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMode::Sum => "sum",
            AggregationMode::Avg => "avg",
            AggregationMode::Count => "count",
            AggregationMode::Min => "min",
            AggregationMode::Max => "max",
            AggregationMode::None => "none",
        }
    }

    /// Whether the mode needs a numeric value column
    pub fn requires_value_column(&self) -> bool {
        matches!(
            self,
            AggregationMode::Sum | AggregationMode::Avg | AggregationMode::Min | AggregationMode::Max
        )
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = if s.eq_ignore_ascii_case("average") { "avg" } else { s };
        AggregationMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::AggregationUnavailable {
                mode: AggregationMode::None,
                reason: format!("unknown aggregation mode '{}'", s),
            })
    }
}

/// Persisted per-source settings. Radii and elevation scale are passed
/// through untouched for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerSettings {
    #[serde(flatten)]
    pub columns: ColumnMapping,
    pub aggregation: AggregationMode,
    pub point_radius: f64,
    pub column_radius: f64,
    pub elevation_scale: f64,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            aggregation: AggregationMode::None,
            point_radius: 100.0,
            column_radius: 1000.0,
            elevation_scale: 1.0,
        }
    }
}

impl LayerSettings {
    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationMode) -> Self {
        self.aggregation = aggregation;
        self
    }
}

/// Parameters of the initial-view heuristic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub base: f64,
    pub min: f64,
    pub max: f64,
    pub epsilon: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            base: BASE_ZOOM,
            min: MIN_ZOOM,
            max: MAX_ZOOM,
            epsilon: ZOOM_EPSILON,
        }
    }
}

/// Engine-wide tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub palette: Vec<Color>,
    pub max_flatten_depth: usize,
    pub zoom: ZoomConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.to_vec(),
            max_flatten_depth: MAX_FLATTEN_DEPTH,
            zoom: ZoomConfig::default(),
        }
    }
}
