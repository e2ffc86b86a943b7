//! Format parsers and the registry that loads them on demand.
//!
//! Every parser normalizes its format into a [`FeatureCollection`]. Codecs are
//! created lazily the first time their format is requested and memoized for
//! the lifetime of the registry, so repeated parses of the same format do not
//! repeat the load. A failed load is not memoized; the next request retries.

pub mod archive;
pub mod geojson;
pub mod kml;
pub mod shapefile;
pub mod topojson;
pub mod wkt;

use crate::data::formats::{DataFormat, FormatDetector, SourceInput};
use crate::data::geometry::FeatureCollection;
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A format-specific parser
pub trait Parser: Send + Sync {
    /// The format this parser handles
    fn format(&self) -> DataFormat;

    /// Parses the input into a non-empty feature collection
    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection>;
}

/// Factory used by the registry to create a codec for a format
pub type CodecFactory = dyn Fn(DataFormat) -> Result<Arc<dyn Parser>> + Send + Sync;

/// Result of a parse: exactly one of `feature_collection` and `error` is set
#[derive(Debug)]
pub struct ParseOutcome {
    pub format: DataFormat,
    pub feature_collection: Option<FeatureCollection>,
    pub error: Option<Error>,
}

impl ParseOutcome {
    pub fn from_result(format: DataFormat, result: Result<FeatureCollection>) -> Self {
        match result {
            Ok(collection) => Self {
                format,
                feature_collection: Some(collection),
                error: None,
            },
            Err(error) => Self {
                format,
                feature_collection: None,
                error: Some(error),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.feature_collection.is_some()
    }

    pub fn into_result(self) -> Result<FeatureCollection> {
        match (self.feature_collection, self.error) {
            (Some(collection), _) => Ok(collection),
            (None, Some(error)) => Err(error),
            (None, None) => Err(Error::empty(self.format, "parser produced no output")),
        }
    }
}

/// The built-in codec for a format
pub fn builtin_codec(format: DataFormat) -> Result<Arc<dyn Parser>> {
    let parser: Arc<dyn Parser> = match format {
        DataFormat::GeoJson => Arc::new(geojson::GeoJsonParser),
        DataFormat::TopoJson => Arc::new(topojson::TopoJsonParser),
        DataFormat::Wkt => Arc::new(wkt::WktParser),
        DataFormat::Shapefile => Arc::new(shapefile::ShapefileParser),
        DataFormat::Kml => Arc::new(kml::KmlParser),
        DataFormat::Kmz => Arc::new(kml::KmzParser),
    };
    Ok(parser)
}

/// Dispatches inputs to lazily-created, memoized format codecs
pub struct ParserRegistry {
    factory: Box<CodecFactory>,
    codecs: [OnceCell<Arc<dyn Parser>>; DataFormat::ALL.len()],
    loads: AtomicUsize,
}

impl ParserRegistry {
    /// A registry backed by the built-in codecs
    pub fn new() -> Self {
        Self::with_factory(builtin_codec)
    }

    /// A registry whose codecs come from `factory`
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(DataFormat) -> Result<Arc<dyn Parser>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            codecs: std::array::from_fn(|_| OnceCell::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of successful codec loads so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Whether the codec for `format` has been loaded
    pub fn is_loaded(&self, format: DataFormat) -> bool {
        self.codecs[slot(format)].get().is_some()
    }

    /// Returns the codec for `format`, loading it on first use
    pub fn parser_for(&self, format: DataFormat) -> Result<Arc<dyn Parser>> {
        self.codecs[slot(format)]
            .get_or_try_init(|| {
                log::debug!("Loading {} codec", format);
                let parser = (self.factory)(format).map_err(|e| match e {
                    Error::ParseFailure { .. } => e,
                    other => Error::parse(
                        format,
                        crate::ParseFailureKind::CodecUnavailable,
                        other.to_string(),
                    ),
                })?;
                self.loads.fetch_add(1, Ordering::Relaxed);
                Ok(parser)
            })
            .cloned()
    }

    /// Detects the format of `input` and parses it
    pub fn parse(&self, input: &SourceInput) -> ParseOutcome {
        let format = FormatDetector::detect(input);
        log::debug!(
            "Detected {} for {}",
            format,
            input.file_name.as_deref().unwrap_or("inline input")
        );
        self.parse_as(format, input)
    }

    /// Parses `input` as `format`, bypassing detection
    pub fn parse_as(&self, format: DataFormat, input: &SourceInput) -> ParseOutcome {
        let result = self
            .parser_for(format)
            .and_then(|parser| parser.parse(input));
        if let Err(e) = &result {
            log::warn!("Parse failed: {}", e);
        }
        ParseOutcome::from_result(format, result)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn slot(format: DataFormat) -> usize {
    DataFormat::ALL
        .iter()
        .position(|f| *f == format)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseFailureKind;

    #[test]
    fn test_codecs_load_once() {
        let registry = ParserRegistry::new();
        assert!(!registry.is_loaded(DataFormat::Wkt));

        let input = SourceInput::text("POINT (1 2)");
        assert!(registry.parse(&input).is_ok());
        assert!(registry.parse(&input).is_ok());

        assert!(registry.is_loaded(DataFormat::Wkt));
        assert_eq!(registry.load_count(), 1);
    }

    #[test]
    fn test_unavailable_codec_is_reported_and_retried() {
        let registry = ParserRegistry::with_factory(|format| match format {
            DataFormat::Kml => Err(Error::FormatUnrecognized("no xml support".into())),
            other => builtin_codec(other),
        });

        let outcome = registry.parse_as(DataFormat::Kml, &SourceInput::text("<kml/>"));
        assert!(!outcome.is_ok());
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.parse_failure_kind(), Some(ParseFailureKind::CodecUnavailable));
        assert!(!registry.is_loaded(DataFormat::Kml));
        assert_eq!(registry.load_count(), 0);
    }

    #[test]
    fn test_parse_outcome_has_exactly_one_side() {
        let registry = ParserRegistry::new();
        let outcome = registry.parse_as(DataFormat::GeoJson, &SourceInput::text("{not json"));
        assert!(outcome.feature_collection.is_none());
        assert!(outcome.error.is_some());
    }
}
