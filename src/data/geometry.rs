//! Canonical feature model shared by every parser.
//!
//! The model is GeoJSON-shaped so it serializes straight into what the
//! renderer consumes, but every value is validated on the way in: a
//! [`FeatureCollection`] handed out by a parser only contains features whose
//! geometry is either absent or well formed.

use crate::{data::formats::DataFormat, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `[longitude, latitude, ...]` position. Extra ordinates pass through.
pub type Position = Vec<f64>;

/// Per-feature attribute object.
pub type Properties = serde_json::Map<String, Value>;

/// GeoJSON geometry types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    /// Creates a point from longitude and latitude
    pub fn point(lng: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: vec![lng, lat],
        }
    }

    /// The GeoJSON type name
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// Every position holds at least two finite ordinates.
    pub fn is_well_formed(&self) -> bool {
        let mut valid = true;
        self.for_each_position(&mut |p: &[f64]| {
            valid &= is_valid_position(p);
        });
        valid
    }

    /// Visits every position of the geometry, recursing into collections
    pub fn for_each_position<F: FnMut(&[f64])>(&self, visit: &mut F) {
        match self {
            Geometry::Point { coordinates } => visit(coordinates),
            Geometry::LineString { coordinates } | Geometry::MultiPoint { coordinates } => {
                coordinates.iter().for_each(|p| visit(p))
            }
            Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().for_each(|p| visit(p))
            }
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().for_each(|p| visit(p))
            }
            Geometry::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.for_each_position(visit);
                }
            }
        }
    }

    /// The `[lng, lat]` of a `Point`, if this is one
    pub fn as_point(&self) -> Option<[f64; 2]> {
        match self {
            Geometry::Point { coordinates } if is_valid_position(coordinates) => {
                Some([coordinates[0], coordinates[1]])
            }
            _ => None,
        }
    }

    /// Converts into a `geo_types` geometry for planar algorithms
    pub fn to_geo(&self) -> geo_types::Geometry<f64> {
        use geo_types::{GeometryCollection, MultiLineString, MultiPoint, MultiPolygon, Point};

        match self {
            Geometry::Point { coordinates } => Point::from(to_coord(coordinates)).into(),
            Geometry::LineString { coordinates } => to_line_string(coordinates).into(),
            Geometry::Polygon { coordinates } => to_polygon(coordinates).into(),
            Geometry::MultiPoint { coordinates } => MultiPoint::new(
                coordinates.iter().map(|p| Point::from(to_coord(p))).collect(),
            )
            .into(),
            Geometry::MultiLineString { coordinates } => {
                MultiLineString::new(coordinates.iter().map(|l| to_line_string(l)).collect())
                    .into()
            }
            Geometry::MultiPolygon { coordinates } => {
                MultiPolygon::new(coordinates.iter().map(|p| to_polygon(p)).collect()).into()
            }
            Geometry::GeometryCollection { geometries } => {
                geo_types::Geometry::GeometryCollection(GeometryCollection::new_from(
                    geometries.iter().map(Geometry::to_geo).collect(),
                ))
            }
        }
    }
}

impl From<&geo_types::Geometry<f64>> for Geometry {
    fn from(geometry: &geo_types::Geometry<f64>) -> Self {
        use geo_types::Geometry as G;

        match geometry {
            G::Point(p) => Geometry::Point {
                coordinates: from_coord(p.0),
            },
            G::Line(line) => Geometry::LineString {
                coordinates: vec![from_coord(line.start), from_coord(line.end)],
            },
            G::LineString(line) => Geometry::LineString {
                coordinates: from_line_string(line),
            },
            G::Polygon(polygon) => Geometry::Polygon {
                coordinates: from_polygon(polygon),
            },
            G::MultiPoint(points) => Geometry::MultiPoint {
                coordinates: points.0.iter().map(|p| from_coord(p.0)).collect(),
            },
            G::MultiLineString(lines) => Geometry::MultiLineString {
                coordinates: lines.0.iter().map(from_line_string).collect(),
            },
            G::MultiPolygon(polygons) => Geometry::MultiPolygon {
                coordinates: polygons.0.iter().map(from_polygon).collect(),
            },
            G::GeometryCollection(collection) => Geometry::GeometryCollection {
                geometries: collection.0.iter().map(Geometry::from).collect(),
            },
            G::Rect(rect) => Geometry::Polygon {
                coordinates: from_polygon(&rect.to_polygon()),
            },
            G::Triangle(triangle) => Geometry::Polygon {
                coordinates: from_polygon(&triangle.to_polygon()),
            },
        }
    }
}

fn from_coord(coord: geo_types::Coord<f64>) -> Position {
    vec![coord.x, coord.y]
}

fn from_line_string(line: &geo_types::LineString<f64>) -> Vec<Position> {
    line.coords().map(|c| from_coord(*c)).collect()
}

fn from_polygon(polygon: &geo_types::Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(from_line_string)
        .collect()
}

/// At least `[lng, lat]`, all finite.
pub fn is_valid_position(position: &[f64]) -> bool {
    position.len() >= 2 && position.iter().all(|v| v.is_finite())
}

fn to_coord(position: &[f64]) -> geo_types::Coord<f64> {
    geo_types::Coord {
        x: position.first().copied().unwrap_or_default(),
        y: position.get(1).copied().unwrap_or_default(),
    }
}

fn to_line_string(positions: &[Position]) -> geo_types::LineString<f64> {
    geo_types::LineString::new(positions.iter().map(|p| to_coord(p)).collect())
}

fn to_polygon(rings: &[Vec<Position>]) -> geo_types::Polygon<f64> {
    let exterior = rings
        .first()
        .map(|ring| to_line_string(ring))
        .unwrap_or_else(|| geo_types::LineString::new(Vec::new()));
    let interiors = rings.iter().skip(1).map(|ring| to_line_string(ring)).collect();
    geo_types::Polygon::new(exterior, interiors)
}

/// Feature identifier: GeoJSON allows either a string or a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(serde_json::Number),
    String(String),
}

impl FeatureId {
    /// Accepts a JSON string or number; anything else is not an id
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FeatureId::String(s.clone())),
            Value::Number(n) => Some(FeatureId::Number(n.clone())),
            _ => None,
        }
    }
}

/// A single geometry plus its attribute properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, properties: Properties) -> Self {
        Self {
            id: None,
            geometry,
            properties,
        }
    }

    /// Wraps a bare geometry with empty properties
    pub fn from_geometry(geometry: Geometry) -> Self {
        Self::new(Some(geometry), Properties::new())
    }

    pub fn with_id(mut self, id: Option<FeatureId>) -> Self {
        self.id = id;
        self
    }

    /// Geometry is absent or well formed.
    pub fn is_well_formed(&self) -> bool {
        self.geometry.as_ref().map_or(true, Geometry::is_well_formed)
    }
}

/// Ordered collection of features, the output of every parser
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Builds a collection for a successful parse. An empty feature list is
    /// reported as an empty-document failure for `format`.
    pub fn non_empty(format: DataFormat, features: Vec<Feature>) -> Result<Self> {
        if features.is_empty() {
            return Err(Error::empty(format, "no features found"));
        }
        Ok(Self { features })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Geometry type names in feature order (`"null"` for missing geometry)
    pub fn geometry_kinds(&self) -> Vec<&'static str> {
        self.features
            .iter()
            .map(|f| f.geometry.as_ref().map_or("null", Geometry::kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geometry_serde_shape() {
        let geometry = Geometry::point(-74.0060, 40.7128);
        let value = serde_json::to_value(&geometry).unwrap();
        assert_eq!(value, json!({"type": "Point", "coordinates": [-74.0060, 40.7128]}));
    }

    #[test]
    fn test_feature_serializes_with_type_tag() {
        let feature = Feature::from_geometry(Geometry::point(1.0, 2.0));
        let value = serde_json::to_value(&feature).unwrap();
        assert_eq!(value["type"], "Feature");
        assert_eq!(value["geometry"]["type"], "Point");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_well_formed_checks_every_position() {
        let good = Geometry::LineString {
            coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0, 5.0]],
        };
        assert!(good.is_well_formed());

        let bad = Geometry::GeometryCollection {
            geometries: vec![good, Geometry::Point { coordinates: vec![1.0] }],
        };
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn test_empty_collection_is_error() {
        let err = FeatureCollection::non_empty(DataFormat::GeoJson, Vec::new()).unwrap_err();
        assert_eq!(err.parse_failure_kind(), Some(crate::ParseFailureKind::Empty));
    }

    #[test]
    fn test_to_geo_polygon_keeps_holes() {
        let polygon = Geometry::Polygon {
            coordinates: vec![
                vec![vec![0.0, 0.0], vec![4.0, 0.0], vec![4.0, 4.0], vec![0.0, 0.0]],
                vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![2.0, 2.0], vec![1.0, 1.0]],
            ],
        };
        match polygon.to_geo() {
            geo_types::Geometry::Polygon(p) => assert_eq!(p.interiors().len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
