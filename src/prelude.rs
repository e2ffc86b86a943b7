//! Prelude module for common geocompose types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use geocompose::prelude::*;`

pub use crate::core::{
    bounds::BoundsCalculator,
    config::{
        AggregationMode, ColumnMapping, ColumnRole, EngineConfig, LayerSettings, StaleColumn,
        ZoomConfig,
    },
    geo::{LatLng, LatLngBounds, ViewState},
};

pub use crate::data::{
    flatten::{FlattenedRow, PropertyFlattener},
    formats::{DataFormat, FormatDetector, SourceInput},
    geometry::{Feature, FeatureCollection, FeatureId, Geometry, Position, Properties},
    parsers::{ParseOutcome, Parser, ParserRegistry},
    table::{Row, TabularData},
};

pub use crate::compose::{
    aggregate::AggregationEngine,
    color::{CategoryColorAssigner, CategoryColorMap, Color, LegendEntry},
    dataset::{GeoDataset, RenderColumn, RenderPath, RenderPoint, RenderPolygon},
    layer::{ComposedMap, LayerComposer, LayerConfig, LayerSource, SourceData},
    tabular::{RowStats, TabularGeometryBuilder},
};

pub use crate::background::{
    compose_in_background, parse_all, parse_in_background, RecomputeGate, Ticket,
};

pub use crate::{Error as GeoError, ParseFailureKind, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
