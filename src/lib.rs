//! # geocompose
//!
//! A geospatial data normalization and map-composition engine.
//!
//! Heterogeneous inputs (GeoJSON, TopoJSON, WKT, zipped Shapefile, KML/KMZ and
//! plain tabular rows) are normalized into a single renderer-agnostic
//! [`GeoDataset`]: points, extrudable columns, paths, polygons and raw
//! features, each annotated with a category, a color value and an elevation,
//! plus the union bounds and a suggested initial view.
//!
//! Every entry point is a pure function of (input, configuration). Nothing is
//! cached between calls except the lazily-loaded format codecs held by a
//! [`ParserRegistry`].

pub mod background;
pub mod compose;
pub mod core;
pub mod data;
pub mod prelude;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::BoundsCalculator,
    config::{AggregationMode, ColumnMapping, ColumnRole, EngineConfig, LayerSettings},
    geo::{LatLng, LatLngBounds, ViewState},
};

pub use data::{
    flatten::{FlattenedRow, PropertyFlattener},
    formats::{DataFormat, FormatDetector, SourceInput},
    geometry::{Feature, FeatureCollection, FeatureId, Geometry},
    parsers::{ParseOutcome, Parser, ParserRegistry},
    table::{Row, TabularData},
};

pub use compose::{
    aggregate::AggregationEngine,
    color::{CategoryColorAssigner, CategoryColorMap, Color},
    dataset::{GeoDataset, RenderColumn, RenderPath, RenderPoint, RenderPolygon},
    layer::{ComposedMap, LayerComposer, LayerConfig, LayerSource, SourceData},
    tabular::TabularGeometryBuilder,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Why a parser could not produce any feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailureKind {
    /// The document was well formed but held nothing usable.
    Empty,
    /// The document could not be decoded.
    Malformed,
    /// The codec needed for the format could not be loaded.
    CodecUnavailable,
}

impl std::fmt::Display for ParseFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ParseFailureKind::Empty => "document empty",
            ParseFailureKind::Malformed => "document malformed",
            ParseFailureKind::CodecUnavailable => "required codec unavailable",
        };
        f.write_str(text)
    }
}

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unrecognized format: {0}")]
    FormatUnrecognized(String),

    #[error("Failed to parse {format}: {kind}: {reason}")]
    ParseFailure {
        format: DataFormat,
        kind: ParseFailureKind,
        reason: String,
    },

    #[error("Row {row} has no geometry under the current column mapping")]
    RowGeometryUnresolved { row: usize },

    #[error("Aggregation '{mode}' unavailable: {reason}")]
    AggregationUnavailable {
        mode: AggregationMode,
        reason: String,
    },

    #[error("Column '{column}' mapped as {role} is no longer present")]
    ColumnMappingStale { role: ColumnRole, column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::ParseFailure`].
    pub fn parse(format: DataFormat, kind: ParseFailureKind, reason: impl Into<String>) -> Self {
        Error::ParseFailure {
            format,
            kind,
            reason: reason.into(),
        }
    }

    /// Shorthand for a malformed-document [`Error::ParseFailure`].
    pub fn malformed(format: DataFormat, reason: impl Into<String>) -> Self {
        Self::parse(format, ParseFailureKind::Malformed, reason)
    }

    /// Shorthand for an empty-document [`Error::ParseFailure`].
    pub fn empty(format: DataFormat, reason: impl Into<String>) -> Self {
        Self::parse(format, ParseFailureKind::Empty, reason)
    }

    /// Returns the failure kind if this is a parse failure.
    pub fn parse_failure_kind(&self) -> Option<ParseFailureKind> {
        match self {
            Error::ParseFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
