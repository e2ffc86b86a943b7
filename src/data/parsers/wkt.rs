//! Well-Known Text parser.
//!
//! Input is tried as one geometry per line first; if no line yields a
//! geometry the whole input is parsed as a single (possibly pretty-printed)
//! geometry. Each attempt is recorded in a [`WktReport`] so callers can tell
//! which strategy produced the features and which entries were skipped.
//! Single entries are decoded by the `wkt` crate after the EWKT prefix and
//! the dimension tag have been normalized.

use crate::data::formats::{DataFormat, SourceInput};
use crate::data::geometry::{Feature, FeatureCollection, Geometry};
use crate::data::parsers::Parser;
use crate::{Error, Result};
use std::str::FromStr;
use wkt::Wkt;

/// Geometry keywords; a longer keyword precedes any keyword it ends with
const KEYWORDS: [&str; 7] = [
    "GEOMETRYCOLLECTION",
    "MULTIPOLYGON",
    "MULTILINESTRING",
    "MULTIPOINT",
    "LINESTRING",
    "POLYGON",
    "POINT",
];

const DIMENSIONS: [&str; 3] = ["ZM", "Z", "M"];

/// Errors raised while decoding a single WKT entry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WktError {
    #[error("unknown geometry type '{0}'")]
    UnknownType(String),
    #[error("{0}")]
    Syntax(String),
    #[error("unsupported geometry: {0}")]
    Unsupported(String),
    #[error("empty geometry")]
    Empty,
    #[error("coordinate is not a finite number")]
    NonFinite,
    #[error("invalid SRID prefix")]
    InvalidSrid,
}

/// Whole-document strategies, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WktStrategy {
    /// One geometry per non-empty line
    PerLine,
    /// The entire input is one geometry
    WholeInput,
}

/// Outcome of one document strategy
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAttempt {
    pub strategy: WktStrategy,
    pub parsed: usize,
    pub skipped: usize,
}

/// An entry that no entry strategy could decode
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    /// 1-based line number (the first line for [`WktStrategy::WholeInput`])
    pub line: usize,
    pub text: String,
    pub reason: String,
}

/// Detailed result of parsing a WKT document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WktReport {
    /// The strategy whose features were kept, if any produced one
    pub strategy: Option<WktStrategy>,
    pub attempts: Vec<StrategyAttempt>,
    pub features: Vec<Feature>,
    pub skipped: Vec<SkippedEntry>,
}

/// WKT / EWKT parser
pub struct WktParser;

impl WktParser {
    /// Runs the document strategies in order and reports every attempt
    pub fn parse_report(text: &str) -> WktReport {
        let mut report = WktReport::default();

        let (features, skipped) = Self::parse_lines(text);
        report.attempts.push(StrategyAttempt {
            strategy: WktStrategy::PerLine,
            parsed: features.len(),
            skipped: skipped.len(),
        });
        if !features.is_empty() {
            for entry in &skipped {
                log::debug!("Skipped WKT line {}: {}", entry.line, entry.reason);
            }
            report.strategy = Some(WktStrategy::PerLine);
            report.features = features;
            report.skipped = skipped;
            return report;
        }

        let joined = text.lines().map(str::trim).collect::<Vec<_>>().join(" ");
        match parse_entry(&joined).map(Feature::from_geometry) {
            Ok(feature) => {
                report.attempts.push(StrategyAttempt {
                    strategy: WktStrategy::WholeInput,
                    parsed: 1,
                    skipped: 0,
                });
                report.strategy = Some(WktStrategy::WholeInput);
                report.features = vec![feature];
            }
            Err(e) => {
                report.attempts.push(StrategyAttempt {
                    strategy: WktStrategy::WholeInput,
                    parsed: 0,
                    skipped: usize::from(!joined.trim().is_empty()),
                });
                report.skipped = skipped;
                if report.skipped.is_empty() && !joined.trim().is_empty() {
                    report.skipped.push(SkippedEntry {
                        line: 1,
                        text: snippet(&joined),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn parse_lines(text: &str) -> (Vec<Feature>, Vec<SkippedEntry>) {
        let mut features = Vec::new();
        let mut skipped = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') || entry.starts_with("//") {
                continue;
            }
            match parse_entry(entry) {
                Ok(geometry) => features.push(Feature::from_geometry(geometry)),
                Err(e) => skipped.push(SkippedEntry {
                    line: index + 1,
                    text: snippet(entry),
                    reason: e.to_string(),
                }),
            }
        }

        (features, skipped)
    }

    /// Parses WKT text into a feature collection
    pub fn parse_str(text: &str) -> Result<FeatureCollection> {
        if text.trim().is_empty() {
            return Err(Error::empty(DataFormat::Wkt, "document empty"));
        }
        let report = Self::parse_report(text);
        if report.features.is_empty() {
            let reason = report
                .skipped
                .first()
                .map(|entry| format!("line {}: {}", entry.line, entry.reason))
                .unwrap_or_else(|| "no geometry found".to_string());
            return Err(Error::malformed(DataFormat::Wkt, reason));
        }
        FeatureCollection::non_empty(DataFormat::Wkt, report.features)
    }
}

impl Parser for WktParser {
    fn format(&self) -> DataFormat {
        DataFormat::Wkt
    }

    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection> {
        let text = input
            .as_text()
            .ok_or_else(|| Error::malformed(DataFormat::Wkt, "payload is not UTF-8 text"))?;
        Self::parse_str(&text)
    }
}

/// Type keyword, optional dimension tag and the remaining text of an entry
struct Header<'a> {
    keyword: &'static str,
    dimension: Option<&'static str>,
    rest: &'a str,
}

impl Header<'_> {
    fn is_empty(&self) -> bool {
        starts_with_word(self.rest, "EMPTY")
    }

    /// `POINTZ(..)` and `point z (..)` both become `POINT Z (..)`
    fn canonical(&self) -> String {
        match self.dimension {
            Some(tag) => format!("{} {} {}", self.keyword, tag, self.rest),
            None => format!("{} {}", self.keyword, self.rest),
        }
    }
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.get(..word.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(word))
}

/// Splits the geometry header off `body`, shared by detection and parsing
fn split_header(body: &str) -> Option<Header<'_>> {
    let body = body.trim_start();
    let keyword = KEYWORDS
        .iter()
        .copied()
        .find(|keyword| starts_with_word(body, keyword))?;

    let after = body[keyword.len()..].trim_start();
    let dimension = DIMENSIONS
        .iter()
        .copied()
        .find(|tag| starts_with_word(after, tag) && !starts_with_word(after, "EMPTY"));
    let rest = match dimension {
        Some(tag) => after[tag.len()..].trim_start(),
        None => after,
    };

    let header = Header {
        keyword,
        dimension,
        rest,
    };
    (rest.starts_with('(') || header.is_empty()).then_some(header)
}

/// Whether `text` starts with a WKT keyword, optionally behind `SRID=n;`
pub fn looks_like_wkt(text: &str) -> bool {
    match strip_srid(text.trim()) {
        Ok(body) => split_header(body).is_some(),
        Err(_) => false,
    }
}

/// Parses one entry, trying the strict form first and then a lenient form
/// that strips surrounding quotes and trailing separators.
pub fn parse_entry(entry: &str) -> std::result::Result<Geometry, WktError> {
    match parse_geometry(entry) {
        Ok(geometry) => Ok(geometry),
        Err(strict_error) => {
            let relaxed = entry
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .trim_end_matches([';', ','])
                .trim();
            if relaxed == entry.trim() {
                return Err(strict_error);
            }
            parse_geometry(relaxed).map_err(|_| strict_error)
        }
    }
}

/// Parses exactly one WKT geometry
pub fn parse_geometry(text: &str) -> std::result::Result<Geometry, WktError> {
    let body = strip_srid(text.trim())?;
    let header = split_header(body).ok_or_else(|| {
        let word = body.trim_start().split(|c: char| !c.is_ascii_alphanumeric()).next();
        WktError::UnknownType(word.unwrap_or_default().to_string())
    })?;
    if header.is_empty() {
        return Err(WktError::Empty);
    }

    let parsed = Wkt::<f64>::from_str(&header.canonical())
        .map_err(|e| WktError::Syntax(e.to_string()))?;
    let geometry = geo_types::Geometry::<f64>::try_from(parsed)
        .map_err(|e| WktError::Unsupported(e.to_string()))?;
    checked(Geometry::from(&geometry))
}

/// Rejects geometries without positions or with non-finite ordinates
fn checked(geometry: Geometry) -> std::result::Result<Geometry, WktError> {
    let mut positions = 0usize;
    geometry.for_each_position(&mut |_: &[f64]| positions += 1);
    if positions == 0 {
        return Err(WktError::Empty);
    }
    if !geometry.is_well_formed() {
        return Err(WktError::NonFinite);
    }
    Ok(geometry)
}

fn strip_srid(text: &str) -> std::result::Result<&str, WktError> {
    if starts_with_word(text, "SRID=") {
        let (srid, rest) = text[5..].split_once(';').ok_or(WktError::InvalidSrid)?;
        if srid.trim().parse::<i64>().is_err() {
            return Err(WktError::InvalidSrid);
        }
        return Ok(rest);
    }
    Ok(text)
}

fn snippet(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}
