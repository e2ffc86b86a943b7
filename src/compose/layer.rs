//! Per-layer orchestration and multi-layer merging.
//!
//! Every layer is composed independently: its column mapping is validated
//! against its own columns, its categories are colored in its own scope and a
//! failure in one layer is recorded on that layer only. The merged dataset,
//! bounds and view are derived from whatever the layers produced.

use crate::compose::aggregate::AggregationEngine;
use crate::compose::color::{CategoryColorAssigner, CategoryColorMap, LegendEntry};
use crate::compose::dataset::GeoDataset;
use crate::compose::tabular::{RowStats, TabularGeometryBuilder};
use crate::constants::FEATURE_GEOMETRY_COLUMN;
use crate::core::bounds::BoundsCalculator;
use crate::core::config::{AggregationMode, ColumnMapping, EngineConfig, LayerSettings, StaleColumn};
use crate::core::geo::{LatLngBounds, ViewState};
use crate::data::flatten::PropertyFlattener;
use crate::data::formats::{DataFormat, SourceInput};
use crate::data::geometry::FeatureCollection;
use crate::data::parsers::ParserRegistry;
use crate::data::table::TabularData;
use crate::Error;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;

/// What a layer is built from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Tabular(TabularData),
    Features(FeatureCollection),
    /// Parsed through the registry on every composition
    Raw(SourceInput),
}

/// One data source plus its persisted settings
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSource {
    pub id: String,
    pub label: String,
    pub data: SourceData,
    pub settings: LayerSettings,
    /// Explicit format for raw input; detection is used when unset
    pub format: Option<DataFormat>,
}

impl LayerSource {
    pub fn new(id: impl Into<String>, label: impl Into<String>, data: SourceData) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data,
            settings: LayerSettings::default(),
            format: None,
        }
    }

    pub fn tabular(id: impl Into<String>, label: impl Into<String>, table: TabularData) -> Self {
        Self::new(id, label, SourceData::Tabular(table))
    }

    pub fn features(
        id: impl Into<String>,
        label: impl Into<String>,
        collection: FeatureCollection,
    ) -> Self {
        Self::new(id, label, SourceData::Features(collection))
    }

    pub fn raw(id: impl Into<String>, label: impl Into<String>, input: SourceInput) -> Self {
        Self::new(id, label, SourceData::Raw(input))
    }

    pub fn with_settings(mut self, settings: LayerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.settings.columns = columns;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationMode) -> Self {
        self.settings.aggregation = aggregation;
        self
    }

    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Category used for rows without one: the label, or the id if unlabeled
    pub fn fallback_category(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Composition result of one layer, including its diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub id: String,
    pub source_ref: String,
    pub format: Option<DataFormat>,
    /// Validated mapping actually used for this composition
    pub column_mapping: ColumnMapping,
    pub aggregation: AggregationMode,
    pub point_radius: f64,
    pub column_radius: f64,
    pub elevation_scale: f64,
    pub geo_dataset: GeoDataset,
    pub category_color_map: CategoryColorMap,
    pub using_fallback_category: bool,
    pub valid_columns: Vec<String>,
    pub has_renderable_data: bool,
    pub has_geometry_selection: bool,
    pub legend: Vec<LegendEntry>,
    pub stats: RowStats,
    pub stale_columns: Vec<StaleColumn>,
    pub aggregation_issue: Option<String>,
    /// Set when the source itself could not be read
    pub error: Option<String>,
}

impl LayerConfig {
    fn failed(
        source: &LayerSource,
        format: DataFormat,
        error: &Error,
        colors: CategoryColorMap,
    ) -> Self {
        Self {
            id: source.id.clone(),
            source_ref: source.label.clone(),
            format: Some(format),
            column_mapping: ColumnMapping::default(),
            aggregation: source.settings.aggregation,
            point_radius: source.settings.point_radius,
            column_radius: source.settings.column_radius,
            elevation_scale: source.settings.elevation_scale,
            geo_dataset: GeoDataset::default(),
            category_color_map: colors,
            using_fallback_category: source.settings.columns.category_column.is_none(),
            valid_columns: Vec::new(),
            has_renderable_data: false,
            has_geometry_selection: false,
            legend: Vec::new(),
            stats: RowStats::default(),
            stale_columns: Vec::new(),
            aggregation_issue: None,
            error: Some(error.to_string()),
        }
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        self.geo_dataset.bounds
    }
}

/// Merged output of all layers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedMap {
    pub layers: Vec<LayerConfig>,
    pub dataset: GeoDataset,
    pub bounds: Option<LatLngBounds>,
    pub view_state: Option<ViewState>,
}

impl ComposedMap {
    pub fn layer(&self, id: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn has_renderable_data(&self) -> bool {
        self.layers.iter().any(|layer| layer.has_renderable_data)
    }
}

/// Drives detection, parsing, resolution, aggregation, coloring and bounds
/// for a list of layer sources
pub struct LayerComposer {
    config: EngineConfig,
    registry: Arc<ParserRegistry>,
    flattener: PropertyFlattener,
    assigner: CategoryColorAssigner,
}

impl Default for LayerComposer {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl LayerComposer {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(ParserRegistry::new()))
    }

    /// Shares an existing registry so its loaded codecs are reused
    pub fn with_registry(config: EngineConfig, registry: Arc<ParserRegistry>) -> Self {
        Self {
            flattener: PropertyFlattener::with_max_depth(config.max_flatten_depth),
            assigner: CategoryColorAssigner::new(config.palette.clone()),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.registry
    }

    /// Composes one source into a single-layer map
    pub fn compose_single(&self, source: &LayerSource) -> ComposedMap {
        self.compose(std::slice::from_ref(source))
    }

    /// Composes every source in order and merges the results
    pub fn compose(&self, sources: &[LayerSource]) -> ComposedMap {
        let layers: Vec<LayerConfig> = sources.iter().map(|s| self.compose_layer(s)).collect();

        let mut dataset = GeoDataset::default();
        for layer in &layers {
            dataset.merge(layer.geo_dataset.clone());
        }
        let bounds = BoundsCalculator::union(layers.iter().map(LayerConfig::bounds));
        dataset.bounds = bounds;
        let view_state = bounds.map(|b| BoundsCalculator::view_state(&b, &self.config.zoom));

        ComposedMap {
            layers,
            dataset,
            bounds,
            view_state,
        }
    }

    /// Composes a single layer. Never fails; problems are recorded on the
    /// returned config.
    pub fn compose_layer(&self, source: &LayerSource) -> LayerConfig {
        let (table, format, from_features) = match &source.data {
            SourceData::Tabular(table) => (Cow::Borrowed(table), source.format, false),
            SourceData::Features(collection) => (
                Cow::Owned(TabularData::from_features(collection, &self.flattener)),
                source.format,
                true,
            ),
            SourceData::Raw(input) => {
                let outcome = match source.format {
                    Some(format) => self.registry.parse_as(format, input),
                    None => self.registry.parse(input),
                };
                let format = outcome.format;
                match outcome.into_result() {
                    Ok(collection) => (
                        Cow::Owned(TabularData::from_features(&collection, &self.flattener)),
                        Some(format),
                        true,
                    ),
                    Err(error) => {
                        log::warn!("Layer '{}' has no data: {}", source.id, error);
                        let colors = self.assigner.assign(&source.id, std::iter::empty::<&str>());
                        return LayerConfig::failed(source, format, &error, colors);
                    }
                }
            }
        };

        let settings = &source.settings;
        let (mut mapping, stale_columns) = settings.columns.validate(&table.columns);
        if from_features && !mapping.has_geometry_selection() {
            mapping.geo_json_column = Some(FEATURE_GEOMETRY_COLUMN.to_string());
        }
        let using_fallback_category = mapping.category_column.is_none();
        let has_geometry_selection = mapping.has_geometry_selection();

        let builder = TabularGeometryBuilder::new(mapping, source.fallback_category());
        let build = builder.build(
            &table,
            &AggregationEngine::new(settings.aggregation),
            &self.assigner,
            &source.id,
        );

        log::debug!(
            "Layer '{}': {} of {} rows resolved, {} categories",
            source.id,
            build.stats.resolved_rows,
            build.stats.total_rows,
            build.dataset.categories.len()
        );

        let mut legend = build.color_map.legend();
        if using_fallback_category && build.stats.resolved_rows > 0 {
            let key = source.fallback_category();
            legend.push(LegendEntry {
                category: key.to_string(),
                color: build.color_map.color_for(key),
            });
        }

        LayerConfig {
            id: source.id.clone(),
            source_ref: source.label.clone(),
            format,
            column_mapping: builder.mapping().clone(),
            aggregation: settings.aggregation,
            point_radius: settings.point_radius,
            column_radius: settings.column_radius,
            elevation_scale: settings.elevation_scale,
            has_renderable_data: build.dataset.has_renderable_data(),
            legend,
            geo_dataset: build.dataset,
            category_color_map: build.color_map,
            using_fallback_category,
            valid_columns: table.columns.clone(),
            has_geometry_selection,
            stats: build.stats,
            stale_columns,
            aggregation_issue: build.aggregation_issue.map(|e| e.to_string()),
            error: None,
        }
    }
}
