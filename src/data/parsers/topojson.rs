//! TopoJSON parser.
//!
//! Arcs are decoded once per document (delta-decoded and transformed when the
//! topology is quantized) and stitched into GeoJSON-style geometries per named
//! object. A top-level `GeometryCollection` object yields one feature per
//! member.

use crate::data::formats::{DataFormat, SourceInput};
use crate::data::geometry::{Feature, FeatureCollection, FeatureId, Geometry, Position, Properties};
use crate::data::parsers::Parser;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum TopoError {
    #[error("arc index {0} out of range")]
    ArcOutOfRange(i64),
    #[error("unsupported geometry type '{0}'")]
    UnsupportedType(String),
    #[error("missing '{0}'")]
    MissingField(&'static str),
    #[error("invalid '{field}': {source}")]
    InvalidField {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("invalid object: {0}")]
    InvalidObject(serde_json::Error),
    #[error("position needs at least two ordinates")]
    InvalidPosition,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

impl Transform {
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.scale[0] + self.translate[0],
            y * self.scale[1] + self.translate[1],
        )
    }
}

#[derive(Deserialize)]
struct RawTopology {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    transform: Option<Transform>,
    #[serde(default)]
    arcs: Vec<Vec<Vec<f64>>>,
    objects: IndexMap<String, Value>,
}

#[derive(Deserialize)]
struct TopoObject {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Properties>,
    #[serde(default)]
    arcs: Option<Value>,
    #[serde(default)]
    coordinates: Option<Value>,
    #[serde(default)]
    geometries: Vec<TopoObject>,
}

/// Decoded arcs plus the optional quantization transform
struct Topology {
    transform: Option<Transform>,
    arcs: Vec<Vec<Position>>,
}

impl Topology {
    fn decode(raw: &RawTopology) -> std::result::Result<Self, TopoError> {
        let arcs = raw
            .arcs
            .iter()
            .map(|arc| {
                let (mut x, mut y) = (0.0, 0.0);
                arc.iter()
                    .map(|p| {
                        if p.len() < 2 {
                            return Err(TopoError::InvalidPosition);
                        }
                        let mut position = p.clone();
                        if let Some(transform) = raw.transform {
                            x += p[0];
                            y += p[1];
                            let (lng, lat) = transform.apply(x, y);
                            position[0] = lng;
                            position[1] = lat;
                        }
                        Ok(position)
                    })
                    .collect::<std::result::Result<Vec<Position>, TopoError>>()
            })
            .collect::<std::result::Result<_, _>>()?;

        Ok(Self {
            transform: raw.transform,
            arcs,
        })
    }

    fn object_features(&self, value: &Value) -> std::result::Result<Vec<Feature>, TopoError> {
        let object = TopoObject::deserialize(value).map_err(TopoError::InvalidObject)?;
        if object.kind.as_deref() == Some("GeometryCollection") {
            object.geometries.iter().map(|member| self.feature(member)).collect()
        } else {
            Ok(vec![self.feature(&object)?])
        }
    }

    fn feature(&self, object: &TopoObject) -> std::result::Result<Feature, TopoError> {
        let geometry = self.geometry(object)?;
        if geometry.as_ref().is_some_and(|g| !g.is_well_formed()) {
            return Err(TopoError::InvalidPosition);
        }
        let id = object.id.as_ref().and_then(FeatureId::from_value);
        Ok(Feature::new(geometry, object.properties.clone().unwrap_or_default()).with_id(id))
    }

    fn geometry(&self, object: &TopoObject) -> std::result::Result<Option<Geometry>, TopoError> {
        let Some(kind) = object.kind.as_deref() else {
            return Ok(None);
        };

        let geometry = match kind {
            "Point" => Geometry::Point {
                coordinates: self.point(field(&object.coordinates, "coordinates")?)?,
            },
            "MultiPoint" => Geometry::MultiPoint {
                coordinates: field::<Vec<Vec<f64>>>(&object.coordinates, "coordinates")?
                    .into_iter()
                    .map(|p| self.point(p))
                    .collect::<std::result::Result<_, _>>()?,
            },
            "LineString" => Geometry::LineString {
                coordinates: self.line(&field::<Vec<i64>>(&object.arcs, "arcs")?)?,
            },
            "MultiLineString" => Geometry::MultiLineString {
                coordinates: field::<Vec<Vec<i64>>>(&object.arcs, "arcs")?
                    .iter()
                    .map(|arcs| self.line(arcs))
                    .collect::<std::result::Result<_, _>>()?,
            },
            "Polygon" => Geometry::Polygon {
                coordinates: self.polygon(&field::<Vec<Vec<i64>>>(&object.arcs, "arcs")?)?,
            },
            "MultiPolygon" => Geometry::MultiPolygon {
                coordinates: field::<Vec<Vec<Vec<i64>>>>(&object.arcs, "arcs")?
                    .iter()
                    .map(|rings| self.polygon(rings))
                    .collect::<std::result::Result<_, _>>()?,
            },
            "GeometryCollection" => {
                let mut geometries = Vec::with_capacity(object.geometries.len());
                for member in &object.geometries {
                    if let Some(geometry) = self.geometry(member)? {
                        geometries.push(geometry);
                    }
                }
                Geometry::GeometryCollection { geometries }
            }
            other => return Err(TopoError::UnsupportedType(other.to_string())),
        };
        Ok(Some(geometry))
    }

    /// Point coordinates are quantized but never delta-encoded
    fn point(&self, mut position: Vec<f64>) -> std::result::Result<Position, TopoError> {
        if position.len() < 2 {
            return Err(TopoError::InvalidPosition);
        }
        if let Some(transform) = self.transform {
            let (lng, lat) = transform.apply(position[0], position[1]);
            position[0] = lng;
            position[1] = lat;
        }
        Ok(position)
    }

    /// Concatenates arcs; consecutive arcs share an endpoint, kept once.
    /// A negative index `i` refers to arc `!i` traversed backwards.
    fn stitch(&self, indices: &[i64]) -> std::result::Result<Vec<Position>, TopoError> {
        let mut points: Vec<Position> = Vec::new();
        for &index in indices {
            let (slot, reversed) = if index >= 0 {
                (index as usize, false)
            } else {
                ((!index) as usize, true)
            };
            let arc = self.arcs.get(slot).ok_or(TopoError::ArcOutOfRange(index))?;
            if !points.is_empty() {
                points.pop();
            }
            if reversed {
                points.extend(arc.iter().rev().cloned());
            } else {
                points.extend(arc.iter().cloned());
            }
        }
        Ok(points)
    }

    fn line(&self, indices: &[i64]) -> std::result::Result<Vec<Position>, TopoError> {
        let mut points = self.stitch(indices)?;
        if points.len() == 1 {
            points.push(points[0].clone());
        }
        Ok(points)
    }

    fn polygon(&self, rings: &[Vec<i64>]) -> std::result::Result<Vec<Vec<Position>>, TopoError> {
        rings
            .iter()
            .map(|indices| {
                let mut ring = self.stitch(indices)?;
                if let Some(first) = ring.first().cloned() {
                    if ring.last() != Some(&first) {
                        ring.push(first.clone());
                    }
                    while ring.len() < 4 {
                        ring.push(first.clone());
                    }
                }
                Ok(ring)
            })
            .collect()
    }
}

fn field<T: DeserializeOwned>(
    value: &Option<Value>,
    name: &'static str,
) -> std::result::Result<T, TopoError> {
    let value = value.as_ref().ok_or(TopoError::MissingField(name))?;
    T::deserialize(value).map_err(|source| TopoError::InvalidField { field: name, source })
}

/// TopoJSON parser
pub struct TopoJsonParser;

impl TopoJsonParser {
    /// Parses TopoJSON text, concatenating the features of every named object
    pub fn parse_str(text: &str) -> Result<FeatureCollection> {
        let raw: RawTopology = serde_json::from_str(text.trim_start_matches('\u{feff}'))
            .map_err(|e| Error::malformed(DataFormat::TopoJson, format!("invalid topology: {}", e)))?;
        if let Some(kind) = raw.kind.as_deref().filter(|kind| *kind != "Topology") {
            return Err(Error::malformed(
                DataFormat::TopoJson,
                format!("expected a Topology, found '{}'", kind),
            ));
        }

        let topology = Topology::decode(&raw)
            .map_err(|e| Error::malformed(DataFormat::TopoJson, format!("invalid arcs: {}", e)))?;

        let mut features = Vec::new();
        let mut failed = 0;
        for (name, object) in &raw.objects {
            match topology.object_features(object) {
                Ok(mut found) => features.append(&mut found),
                Err(e) => {
                    log::warn!("Skipping TopoJSON object '{}': {}", name, e);
                    failed += 1;
                }
            }
        }

        if features.is_empty() && failed > 0 {
            return Err(Error::malformed(
                DataFormat::TopoJson,
                format!("none of the {} objects could be converted", failed),
            ));
        }
        FeatureCollection::non_empty(DataFormat::TopoJson, features)
    }
}

impl Parser for TopoJsonParser {
    fn format(&self) -> DataFormat {
        DataFormat::TopoJson
    }

    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection> {
        let text = input
            .as_text()
            .ok_or_else(|| Error::malformed(DataFormat::TopoJson, "payload is not UTF-8 text"))?;
        Self::parse_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseFailureKind;

    const QUANTIZED: &str = r#"{
        "type": "Topology",
        "transform": {"scale": [0.5, 0.5], "translate": [100, 0]},
        "objects": {"example": {"type": "GeometryCollection", "geometries": [
            {"type": "Point", "id": "p", "properties": {"prop0": "value0"}, "coordinates": [4, 2]},
            {"type": "LineString", "properties": {"prop0": "value1"}, "arcs": [0]},
            {"type": "Polygon", "properties": {"prop0": "value2"}, "arcs": [[-2]]}
        ]}},
        "arcs": [
            [[4, 0], [1, 2], [1, -2], [1, 2]],
            [[0, 0], [0, 9], [2, 0], [0, -9], [-2, 0]]
        ]
    }"#;

    #[test]
    fn test_quantized_topology() {
        let collection = TopoJsonParser::parse_str(QUANTIZED).unwrap();
        assert_eq!(collection.geometry_kinds(), vec!["Point", "LineString", "Polygon"]);

        let point = &collection.features[0];
        assert_eq!(point.geometry.as_ref().unwrap().as_point(), Some([102.0, 1.0]));
        assert_eq!(point.id, Some(FeatureId::String("p".into())));
        assert_eq!(point.properties["prop0"], "value0");

        match collection.features[1].geometry.as_ref().unwrap() {
            Geometry::LineString { coordinates } => {
                assert_eq!(coordinates.len(), 4);
                assert_eq!(coordinates[0], vec![102.0, 0.0]);
                assert_eq!(coordinates[3], vec![103.5, 1.0]);
            }
            other => panic!("unexpected {:?}", other),
        }

        match collection.features[2].geometry.as_ref().unwrap() {
            Geometry::Polygon { coordinates } => {
                let ring = &coordinates[0];
                assert_eq!(ring.len(), 5);
                assert_eq!(ring[0], vec![100.0, 0.0]);
                assert_eq!(ring[1], vec![101.0, 0.0]);
                assert_eq!(ring.first(), ring.last());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arcs_are_stitched() {
        let text = r#"{"type": "Topology",
            "objects": {"road": {"type": "LineString", "arcs": [0, 1]}},
            "arcs": [[[0, 0], [1, 1]], [[1, 1], [2, 0]]]}"#;
        let collection = TopoJsonParser::parse_str(text).unwrap();
        match collection.features[0].geometry.as_ref().unwrap() {
            Geometry::LineString { coordinates } => {
                assert_eq!(coordinates, &vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.0]]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_object_is_skipped() {
        let text = r#"{"type": "Topology",
            "objects": {
                "broken": {"type": "LineString", "arcs": [5]},
                "city": {"type": "Point", "coordinates": [1, 2], "properties": {"name": "x"}},
                "nothing": {"type": null, "properties": {"name": "y"}}
            },
            "arcs": []}"#;
        let collection = TopoJsonParser::parse_str(text).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection.features[1].geometry.is_none());
        assert_eq!(collection.features[1].properties["name"], "y");
    }

    #[test]
    fn test_document_failures() {
        let empty = TopoJsonParser::parse_str(r#"{"type": "Topology", "objects": {}, "arcs": []}"#);
        assert_eq!(empty.unwrap_err().parse_failure_kind(), Some(ParseFailureKind::Empty));

        let broken = TopoJsonParser::parse_str(
            r#"{"type": "Topology", "objects": {"a": {"type": "Polygon", "arcs": [[9]]}}, "arcs": []}"#,
        );
        assert_eq!(broken.unwrap_err().parse_failure_kind(), Some(ParseFailureKind::Malformed));

        let wrong = TopoJsonParser::parse_str(r#"{"type": "FeatureCollection", "objects": {}}"#);
        assert_eq!(wrong.unwrap_err().parse_failure_kind(), Some(ParseFailureKind::Malformed));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        assert_eq!(
            TopoJsonParser::parse_str(QUANTIZED).unwrap(),
            TopoJsonParser::parse_str(QUANTIZED).unwrap()
        );
    }
}
