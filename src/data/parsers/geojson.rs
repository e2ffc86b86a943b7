use crate::data::formats::{DataFormat, SourceInput};
use crate::data::geometry::{Feature, FeatureCollection, FeatureId, Geometry, Properties};
use crate::data::parsers::Parser;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "LineString",
    "Polygon",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
    "GeometryCollection",
];

/// GeoJSON parser.
///
/// Accepts a `Feature`, a `FeatureCollection`, a bare geometry, or an array
/// of any of these (arrays are flattened recursively). Individual features
/// with malformed geometry are skipped; the document fails only when nothing
/// usable remains.
pub struct GeoJsonParser;

impl GeoJsonParser {
    /// Parses GeoJSON text
    pub fn parse_str(text: &str) -> Result<FeatureCollection> {
        let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
            .map_err(|e| Error::malformed(DataFormat::GeoJson, format!("invalid JSON: {}", e)))?;
        let features = Self::features_from_value(&value)?;
        FeatureCollection::non_empty(DataFormat::GeoJson, features)
    }

    /// Normalizes any accepted GeoJSON value into a list of features
    pub fn features_from_value(value: &Value) -> Result<Vec<Feature>> {
        match value {
            Value::Array(items) => {
                let mut features = Vec::new();
                let mut rejected = 0;
                for item in items {
                    match Self::features_from_value(item) {
                        Ok(mut found) => features.append(&mut found),
                        Err(e) => {
                            log::warn!("Skipping array item: {}", e);
                            rejected += 1;
                        }
                    }
                }
                if features.is_empty() && rejected > 0 {
                    return Err(Error::malformed(
                        DataFormat::GeoJson,
                        "array holds no GeoJSON objects",
                    ));
                }
                Ok(features)
            }
            Value::Object(object) => match object.get("type").and_then(Value::as_str) {
                Some("FeatureCollection") => Self::collection_features(value),
                Some("Feature") => Ok(vec![Self::feature_from_value(value)?]),
                Some(kind) if GEOMETRY_TYPES.contains(&kind) => {
                    Ok(vec![Feature::from_geometry(Self::geometry_from_value(value)?)])
                }
                Some(kind) => Err(Error::malformed(
                    DataFormat::GeoJson,
                    format!("unsupported GeoJSON type '{}'", kind),
                )),
                None => Err(Error::malformed(DataFormat::GeoJson, "object has no 'type'")),
            },
            _ => Err(Error::malformed(
                DataFormat::GeoJson,
                "expected a GeoJSON object or array",
            )),
        }
    }

    fn collection_features(value: &Value) -> Result<Vec<Feature>> {
        let items = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::malformed(DataFormat::GeoJson, "FeatureCollection has no 'features' array")
            })?;

        let mut features = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match Self::feature_from_value(item) {
                Ok(feature) => features.push(feature),
                Err(e) => log::warn!("Skipping feature {}: {}", index, e),
            }
        }

        if features.is_empty() && !items.is_empty() {
            return Err(Error::malformed(
                DataFormat::GeoJson,
                "no feature in the collection is valid",
            ));
        }
        Ok(features)
    }

    /// Normalizes a single `Feature` object
    pub fn feature_from_value(value: &Value) -> Result<Feature> {
        if value.get("type").and_then(Value::as_str) != Some("Feature") {
            return Err(Error::malformed(DataFormat::GeoJson, "expected a Feature"));
        }

        let geometry = match value.get("geometry") {
            None | Some(Value::Null) => None,
            Some(geometry) => Some(Self::geometry_from_value(geometry)?),
        };

        let properties = match value.get("properties") {
            None | Some(Value::Null) => Properties::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(Error::malformed(
                    DataFormat::GeoJson,
                    "feature properties must be an object",
                ))
            }
        };

        let id = value.get("id").and_then(FeatureId::from_value);
        Ok(Feature::new(geometry, properties).with_id(id))
    }

    /// Decodes and validates a geometry object
    pub fn geometry_from_value(value: &Value) -> Result<Geometry> {
        let geometry = Geometry::deserialize(value).map_err(|e| {
            Error::malformed(DataFormat::GeoJson, format!("invalid geometry: {}", e))
        })?;
        if !geometry.is_well_formed() {
            return Err(Error::malformed(
                DataFormat::GeoJson,
                format!("{} has invalid coordinates", geometry.kind()),
            ));
        }
        Ok(geometry)
    }

    /// Extracts a geometry from a tabular cell: a geometry or feature object,
    /// or JSON text encoding one
    pub fn geometry_from_cell(cell: &Value) -> Option<Geometry> {
        let parsed;
        let value = match cell {
            Value::String(text) => {
                let text = text.trim();
                if !text.starts_with('{') {
                    return None;
                }
                parsed = serde_json::from_str::<Value>(text).ok()?;
                &parsed
            }
            Value::Object(_) => cell,
            _ => return None,
        };

        match value.get("type").and_then(Value::as_str)? {
            "Feature" => Self::feature_from_value(value).ok()?.geometry,
            _ => Self::geometry_from_value(value).ok(),
        }
    }
}

impl Parser for GeoJsonParser {
    fn format(&self) -> DataFormat {
        DataFormat::GeoJson
    }

    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection> {
        let text = input
            .as_text()
            .ok_or_else(|| Error::malformed(DataFormat::GeoJson, "payload is not UTF-8 text"))?;
        Self::parse_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseFailureKind;
    use serde_json::json;

    #[test]
    fn test_geojson_parsing() {
        let geojson_str = r#"
        {
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": 7,
                    "properties": {"name": "Test Point"},
                    "geometry": {
                        "type": "Point",
                        "coordinates": [-74.0060, 40.7128]
                    }
                }
            ]
        }
        "#;

        let collection = GeoJsonParser::parse_str(geojson_str).unwrap();
        assert_eq!(collection.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.properties["name"], "Test Point");
        assert_eq!(feature.id, Some(FeatureId::Number(7.into())));
        assert_eq!(feature.geometry.as_ref().unwrap().as_point(), Some([-74.0060, 40.7128]));
    }

    #[test]
    fn test_bare_geometry_and_arrays_are_wrapped() {
        let value = json!([
            {"type": "Point", "coordinates": [1, 2]},
            [
                {"type": "Feature", "geometry": null, "properties": null},
                {"type": "FeatureCollection", "features": [
                    {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}, "properties": {}}
                ]}
            ]
        ]);
        let features = GeoJsonParser::features_from_value(&value).unwrap();
        assert_eq!(features.len(), 3);
        assert!(features[1].geometry.is_none());
        assert!(features[1].properties.is_empty());
    }

    #[test]
    fn test_malformed_features_are_skipped() {
        let value = json!({"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": ["x", 2]}, "properties": {}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [3]}, "properties": {}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [3, 4]}, "properties": {"ok": true}}
        ]});
        let features = GeoJsonParser::features_from_value(&value).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].properties["ok"], true);
    }

    #[test]
    fn test_empty_and_malformed_documents() {
        let empty = GeoJsonParser::parse_str(r#"{"type":"FeatureCollection","features":[]}"#);
        assert_eq!(empty.unwrap_err().parse_failure_kind(), Some(ParseFailureKind::Empty));

        let malformed = GeoJsonParser::parse_str(r#"{"type":"Banana"}"#);
        assert_eq!(malformed.unwrap_err().parse_failure_kind(), Some(ParseFailureKind::Malformed));
    }

    #[test]
    fn test_geometry_from_cell() {
        let cell = json!("{\"type\":\"Point\",\"coordinates\":[10,20]}");
        assert_eq!(GeoJsonParser::geometry_from_cell(&cell).unwrap().as_point(), Some([10.0, 20.0]));

        let feature = json!({"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1, 1]}});
        assert!(GeoJsonParser::geometry_from_cell(&feature).is_some());

        assert!(GeoJsonParser::geometry_from_cell(&json!("POINT (1 2)")).is_none());
        assert!(GeoJsonParser::geometry_from_cell(&json!(42)).is_none());
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let text = r#"{"type":"Feature","properties":{"a":{"b":1}},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}"#;
        assert_eq!(GeoJsonParser::parse_str(text).unwrap(), GeoJsonParser::parse_str(text).unwrap());
    }
}
