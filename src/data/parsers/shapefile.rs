//! Shapefile parser.
//!
//! Input is a zip bundle holding a `.shp` entry and optionally a `.dbf`
//! entry for attributes. A bare `.shp` payload is also accepted, without
//! attributes.

use crate::data::formats::{DataFormat, SourceInput};
use crate::data::geometry::{Feature, FeatureCollection, Geometry, Position, Properties};
use crate::data::parsers::{archive, Parser};
use crate::{Error, Result};
use serde_json::Value;
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Shape};
use std::io::Cursor;

/// Big-endian file code at the start of every `.shp` file
const SHP_MAGIC: [u8; 4] = [0x00, 0x00, 0x27, 0x0a];

trait Coordinate {
    fn position(&self) -> Position;
}

impl Coordinate for shapefile::Point {
    fn position(&self) -> Position {
        vec![self.x, self.y]
    }
}

impl Coordinate for shapefile::PointM {
    fn position(&self) -> Position {
        vec![self.x, self.y]
    }
}

impl Coordinate for shapefile::PointZ {
    fn position(&self) -> Position {
        vec![self.x, self.y, self.z]
    }
}

fn positions<P: Coordinate>(points: &[P]) -> Vec<Position> {
    points.iter().map(Coordinate::position).collect()
}

fn polyline<P: Coordinate>(parts: &[Vec<P>]) -> Geometry {
    if parts.len() == 1 {
        Geometry::LineString {
            coordinates: positions(&parts[0]),
        }
    } else {
        Geometry::MultiLineString {
            coordinates: parts.iter().map(|part| positions(part)).collect(),
        }
    }
}

/// Inner rings are attached to the nearest preceding outer ring
fn polygon<P: Coordinate>(rings: &[PolygonRing<P>]) -> Option<Geometry> {
    let mut polygons: Vec<Vec<Vec<Position>>> = Vec::new();
    for ring in rings {
        let coordinates = positions(ring.points());
        if matches!(ring, PolygonRing::Inner(_)) {
            if let Some(current) = polygons.last_mut() {
                current.push(coordinates);
                continue;
            }
        }
        polygons.push(vec![coordinates]);
    }

    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(|coordinates| Geometry::Polygon { coordinates }),
        _ => Some(Geometry::MultiPolygon {
            coordinates: polygons,
        }),
    }
}

/// `Ok(None)` for a null shape
fn shape_geometry(shape: &Shape) -> std::result::Result<Option<Geometry>, String> {
    let geometry = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Point(p) => Geometry::Point {
            coordinates: p.position(),
        },
        Shape::PointM(p) => Geometry::Point {
            coordinates: p.position(),
        },
        Shape::PointZ(p) => Geometry::Point {
            coordinates: p.position(),
        },
        Shape::Multipoint(mp) => Geometry::MultiPoint {
            coordinates: positions(mp.points()),
        },
        Shape::MultipointM(mp) => Geometry::MultiPoint {
            coordinates: positions(mp.points()),
        },
        Shape::MultipointZ(mp) => Geometry::MultiPoint {
            coordinates: positions(mp.points()),
        },
        Shape::Polyline(pl) => polyline(pl.parts()),
        Shape::PolylineM(pl) => polyline(pl.parts()),
        Shape::PolylineZ(pl) => polyline(pl.parts()),
        Shape::Polygon(poly) => polygon(poly.rings()).ok_or("polygon has no rings")?,
        Shape::PolygonM(poly) => polygon(poly.rings()).ok_or("polygon has no rings")?,
        Shape::PolygonZ(poly) => polygon(poly.rings()).ok_or("polygon has no rings")?,
        other => return Err(format!("unsupported shape type {:?}", other.shapetype())),
    };
    Ok(Some(geometry))
}

/// Converts a dBase cell to JSON; types without a natural JSON form are
/// rendered through their debug representation
pub fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(text)) => Value::String(text.trim().to_string()),
        FieldValue::Numeric(Some(n)) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        FieldValue::Float(Some(n)) => {
            serde_json::Number::from_f64(f64::from(*n)).map_or(Value::Null, Value::Number)
        }
        FieldValue::Double(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        FieldValue::Integer(n) => Value::from(*n),
        FieldValue::Logical(Some(b)) => Value::Bool(*b),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None) => Value::Null,
        other => Value::String(format!("{:?}", other)),
    }
}

fn read_attributes(dbf: Vec<u8>) -> Result<(Vec<String>, Vec<Record>)> {
    let mut reader = shapefile::dbase::Reader::new(Cursor::new(dbf))
        .map_err(|e| Error::malformed(DataFormat::Shapefile, format!("invalid .dbf: {}", e)))?;
    let fields = reader
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect();
    let records = reader
        .read()
        .map_err(|e| Error::malformed(DataFormat::Shapefile, format!("invalid .dbf: {}", e)))?;
    Ok((fields, records))
}

/// Shapefile parser
pub struct ShapefileParser;

impl ShapefileParser {
    pub fn parse_bytes(bytes: &[u8]) -> Result<FeatureCollection> {
        if bytes.is_empty() {
            return Err(Error::empty(DataFormat::Shapefile, "document empty"));
        }
        if bytes.starts_with(&SHP_MAGIC) {
            return Self::parse_parts(bytes.to_vec(), None);
        }

        let names = archive::entry_names(bytes).map_err(|e| {
            Error::malformed(DataFormat::Shapefile, format!("expected a zipped shapefile bundle: {}", e))
        })?;
        let shp_name = archive::find_entry(&names, ".shp").ok_or_else(|| {
            Error::malformed(DataFormat::Shapefile, "archive contains no .shp entry")
        })?;
        let read = |name: &str| {
            archive::read_entry(bytes, name).map_err(|e| {
                Error::malformed(DataFormat::Shapefile, format!("cannot read '{}': {}", name, e))
            })
        };

        let shp = read(shp_name)?;
        // Prefer the .dbf that sits next to the chosen .shp.
        let stem = &shp_name[..shp_name.len() - 4];
        let sibling = names.iter().map(String::as_str).find(|name| {
            name.len() == shp_name.len()
                && name.get(..stem.len()) == Some(stem)
                && name.to_ascii_lowercase().ends_with(".dbf")
        });
        let dbf_name = sibling.or_else(|| archive::find_entry(&names, ".dbf"));
        let dbf = dbf_name.map(read).transpose()?;

        log::debug!(
            "Reading shapefile '{}' ({} attributes)",
            shp_name,
            if dbf.is_some() { "with" } else { "without" }
        );
        Self::parse_parts(shp, dbf)
    }

    fn parse_parts(shp: Vec<u8>, dbf: Option<Vec<u8>>) -> Result<FeatureCollection> {
        let mut reader = shapefile::ShapeReader::new(Cursor::new(shp))
            .map_err(|e| Error::malformed(DataFormat::Shapefile, format!("invalid .shp: {}", e)))?;

        let (fields, records) = match dbf {
            Some(dbf) => read_attributes(dbf)?,
            None => (Vec::new(), Vec::new()),
        };

        let mut features = Vec::new();
        for (index, shape) in reader.iter_shapes().enumerate() {
            let shape = shape.map_err(|e| {
                Error::malformed(DataFormat::Shapefile, format!("invalid shape {}: {}", index, e))
            })?;

            let geometry = match shape_geometry(&shape) {
                Ok(geometry) => geometry,
                Err(reason) => {
                    log::warn!("Skipping shape {}: {}", index, reason);
                    continue;
                }
            };
            if geometry.as_ref().is_some_and(|g| !g.is_well_formed()) {
                log::warn!("Skipping shape {}: invalid coordinates", index);
                continue;
            }

            let mut properties = Properties::new();
            if let Some(record) = records.get(index) {
                for name in &fields {
                    if let Some(value) = record.get(name) {
                        properties.insert(name.clone(), field_value_to_json(value));
                    }
                }
            }
            features.push(Feature::new(geometry, properties));
        }

        FeatureCollection::non_empty(DataFormat::Shapefile, features)
    }
}

impl Parser for ShapefileParser {
    fn format(&self) -> DataFormat {
        DataFormat::Shapefile
    }

    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection> {
        Self::parse_bytes(input.as_bytes())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// A minimal point `.shp` file holding `points`
    pub fn point_shp(points: &[(f64, f64)]) -> Vec<u8> {
        let content_words = 10;
        let file_words = 50 + points.len() * (4 + content_words);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&9994i32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 20]);
        bytes.extend_from_slice(&(file_words as i32).to_be_bytes());
        bytes.extend_from_slice(&1000i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());

        let xs = points.iter().map(|p| p.0);
        let ys = points.iter().map(|p| p.1);
        let bbox = [
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
            0.0,
            0.0,
            0.0,
            0.0,
        ];
        for value in bbox {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        for (index, (x, y)) in points.iter().enumerate() {
            bytes.extend_from_slice(&(index as i32 + 1).to_be_bytes());
            bytes.extend_from_slice(&(content_words as i32).to_be_bytes());
            bytes.extend_from_slice(&1i32.to_le_bytes());
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
        }
        bytes
    }
}
