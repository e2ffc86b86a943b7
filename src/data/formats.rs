use crate::data::parsers::{archive, geojson::GeoJsonParser, wkt};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Supported data formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    GeoJson,
    TopoJson,
    Wkt,
    Shapefile,
    Kml,
    Kmz,
}

impl DataFormat {
    pub const ALL: [DataFormat; 6] = [
        DataFormat::GeoJson,
        DataFormat::TopoJson,
        DataFormat::Wkt,
        DataFormat::Shapefile,
        DataFormat::Kml,
        DataFormat::Kmz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::GeoJson => "geojson",
            DataFormat::TopoJson => "topojson",
            DataFormat::Wkt => "wkt",
            DataFormat::Shapefile => "shapefile",
            DataFormat::Kml => "kml",
            DataFormat::Kmz => "kmz",
        }
    }

    /// Whether the format is carried as a binary archive
    pub fn is_binary(&self) -> bool {
        matches!(self, DataFormat::Shapefile | DataFormat::Kmz)
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DataFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::FormatUnrecognized(format!("unknown format name '{}'", s)))
    }
}

/// Raw content of a source, either text or an opaque buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// A raw input plus an optional file-name hint
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInput {
    pub payload: Payload,
    pub file_name: Option<String>,
}

impl SourceInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Payload::Text(text.into()),
            file_name: None,
        }
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Payload::Binary(bytes.into()),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.payload, Payload::Binary(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// The payload as text. Binary payloads are decoded as UTF-8 when possible.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match &self.payload {
            Payload::Text(text) => Some(Cow::Borrowed(text.as_str())),
            Payload::Binary(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        }
    }

    /// Lower-cased extension of the file-name hint
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }
}

/// Classifies raw inputs into a [`DataFormat`]
pub struct FormatDetector;

impl FormatDetector {
    /// Best-effort classification. Never fails; an unparseable input is
    /// reported by the parser stage instead.
    pub fn detect(input: &SourceInput) -> DataFormat {
        Self::classify(input).unwrap_or(if input.is_binary() {
            DataFormat::Shapefile
        } else {
            DataFormat::GeoJson
        })
    }

    /// Like [`FormatDetector::detect`] but a binary payload with no hint and
    /// no recognizable content is reported as unrecognized instead of being
    /// assumed to be a shapefile.
    pub fn detect_strict(input: &SourceInput) -> Result<DataFormat> {
        if let Some(format) = Self::classify(input) {
            return Ok(format);
        }
        if input.is_binary() && input.file_name.is_none() {
            return Err(Error::FormatUnrecognized(
                "binary payload without file name or recognizable content".into(),
            ));
        }
        Ok(Self::detect(input))
    }

    fn classify(input: &SourceInput) -> Option<DataFormat> {
        if let Some(format) = Self::detect_by_extension(input) {
            return Some(format);
        }

        let bytes = input.as_bytes();
        if archive::is_zip(bytes) {
            return Some(Self::detect_archive(bytes));
        }

        if let Some(text) = input.as_text() {
            if let Some(format) = Self::detect_text(&text) {
                return Some(format);
            }
        }

        None
    }

    /// Extension match on the file-name hint
    pub fn detect_by_extension(input: &SourceInput) -> Option<DataFormat> {
        match input.extension()?.as_str() {
            "shp" | "dbf" | "shx" | "prj" => Some(DataFormat::Shapefile),
            "zip" => Some(Self::detect_archive(input.as_bytes())),
            "topojson" => Some(DataFormat::TopoJson),
            "wkt" => Some(DataFormat::Wkt),
            "geojson" => Some(DataFormat::GeoJson),
            "json" => {
                let sniffed = input.as_text().and_then(|text| Self::detect_text(&text));
                match sniffed {
                    Some(DataFormat::TopoJson) => Some(DataFormat::TopoJson),
                    _ => Some(DataFormat::GeoJson),
                }
            }
            "kml" => Some(DataFormat::Kml),
            "kmz" => Some(DataFormat::Kmz),
            _ => None,
        }
    }

    /// A zip holding a `.kml` entry is a KMZ; any other zip is treated as a
    /// shapefile bundle.
    fn detect_archive(bytes: &[u8]) -> DataFormat {
        match archive::entry_names(bytes) {
            Ok(names) if archive::find_entry(&names, ".kml").is_some()
                && archive::find_entry(&names, ".shp").is_none() =>
            {
                DataFormat::Kmz
            }
            _ => DataFormat::Shapefile,
        }
    }

    /// Content sniffing for textual payloads
    pub fn detect_text(text: &str) -> Option<DataFormat> {
        let trimmed = text.trim_start_matches('\u{feff}').trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
                let is_topology = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .is_some_and(|t| t == "Topology")
                    || value.get("objects").is_some();
                if is_topology {
                    return Some(DataFormat::TopoJson);
                }
                if GeoJsonParser::features_from_value(&value).is_ok() {
                    return Some(DataFormat::GeoJson);
                }
            }
        }

        if trimmed.starts_with('<') && trimmed.contains("<kml") {
            return Some(DataFormat::Kml);
        }

        let first_line = trimmed.lines().map(str::trim).find(|line| !line.is_empty())?;
        if wkt::looks_like_wkt(first_line) {
            return Some(DataFormat::Wkt);
        }

        None
    }
}
