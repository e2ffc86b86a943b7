//! KML and KMZ parsers.
//!
//! The XML is read with `quick-xml` into a small element tree; every
//! `Placemark` found under any nesting of `Document`/`Folder` becomes one
//! feature.

use crate::data::formats::{DataFormat, SourceInput};
use crate::data::geometry::{Feature, FeatureCollection, FeatureId, Geometry, Position, Properties};
use crate::data::parsers::{archive, Parser};
use crate::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

const GEOMETRY_ELEMENTS: [&str; 5] = ["Point", "LineString", "LinearRing", "Polygon", "MultiGeometry"];

/// Minimal XML element: local name, attributes, text content and children
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> std::result::Result<Self, quick_xml::Error> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            attributes.push((key, attr.unescape_value()?.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }
}

fn read_document(text: &str) -> Result<Vec<Element>> {
    let malformed = |e: quick_xml::Error| Error::malformed(DataFormat::Kml, format!("invalid XML: {}", e));

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut roots = Vec::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => stack.push(Element::from_start(&start).map_err(malformed)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start).map_err(malformed)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => roots.push(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::malformed(DataFormat::Kml, "unbalanced closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => roots.push(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::malformed(
            DataFormat::Kml,
            format!("unclosed element <{}>", open.name),
        ));
    }
    Ok(roots)
}

fn collect_placemarks<'a>(element: &'a Element, found: &mut Vec<&'a Element>) {
    if element.name == "Placemark" {
        found.push(element);
        return;
    }
    for child in &element.children {
        collect_placemarks(child, found);
    }
}

/// `lon,lat[,alt]` tuples separated by whitespace
fn parse_coordinates(text: &str) -> std::result::Result<Vec<Position>, String> {
    text.split_whitespace()
        .map(|tuple| {
            let position = tuple
                .split(',')
                .filter(|part| !part.is_empty())
                .map(|part| part.parse::<f64>())
                .collect::<std::result::Result<Position, _>>()
                .map_err(|e| format!("invalid coordinate '{}': {}", tuple, e))?;
            if position.len() < 2 {
                return Err(format!("coordinate '{}' needs longitude and latitude", tuple));
            }
            Ok(position)
        })
        .collect()
}

fn coordinates_of(element: &Element) -> std::result::Result<Vec<Position>, String> {
    let text = element
        .child("coordinates")
        .map(|c| c.text.as_str())
        .ok_or_else(|| format!("<{}> has no coordinates", element.name))?;
    parse_coordinates(text)
}

fn ring_of(boundary: &Element) -> impl Iterator<Item = std::result::Result<Vec<Position>, String>> + '_ {
    boundary.children_named("LinearRing").map(coordinates_of)
}

fn geometry_of(element: &Element) -> std::result::Result<Geometry, String> {
    match element.name.as_str() {
        "Point" => {
            let mut positions = coordinates_of(element)?;
            if positions.is_empty() {
                return Err("<Point> has no coordinates".into());
            }
            Ok(Geometry::Point {
                coordinates: positions.swap_remove(0),
            })
        }
        "LineString" | "LinearRing" => Ok(Geometry::LineString {
            coordinates: coordinates_of(element)?,
        }),
        "Polygon" => {
            let mut rings = Vec::new();
            for boundary in element.children_named("outerBoundaryIs") {
                for ring in ring_of(boundary) {
                    rings.push(ring?);
                }
            }
            if rings.is_empty() {
                return Err("<Polygon> has no outer boundary".into());
            }
            for boundary in element.children_named("innerBoundaryIs") {
                for ring in ring_of(boundary) {
                    rings.push(ring?);
                }
            }
            Ok(Geometry::Polygon { coordinates: rings })
        }
        "MultiGeometry" => {
            let geometries = element
                .children
                .iter()
                .filter(|c| GEOMETRY_ELEMENTS.contains(&c.name.as_str()))
                .map(geometry_of)
                .collect::<std::result::Result<_, _>>()?;
            Ok(Geometry::GeometryCollection { geometries })
        }
        other => Err(format!("unsupported geometry <{}>", other)),
    }
}

fn placemark_feature(placemark: &Element) -> std::result::Result<Feature, String> {
    let mut properties = Properties::new();
    for key in ["name", "description"] {
        if let Some(text) = placemark.child_text(key) {
            properties.insert(key.to_string(), Value::String(text.to_string()));
        }
    }

    if let Some(extended) = placemark.child("ExtendedData") {
        for data in extended.children_named("Data") {
            if let Some(name) = data.attribute("name") {
                let value = data.child_text("value").unwrap_or_default();
                properties.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
        for schema in extended.children_named("SchemaData") {
            for simple in schema.children_named("SimpleData") {
                if let Some(name) = simple.attribute("name") {
                    properties.insert(name.to_string(), Value::String(simple.text.trim().to_string()));
                }
            }
        }
    }

    let geometry = placemark
        .children
        .iter()
        .find(|c| GEOMETRY_ELEMENTS.contains(&c.name.as_str()))
        .map(geometry_of)
        .transpose()?;
    if geometry.as_ref().is_some_and(|g| !g.is_well_formed()) {
        return Err("geometry has invalid coordinates".into());
    }

    let id = placemark.attribute("id").map(|id| FeatureId::String(id.to_string()));
    Ok(Feature::new(geometry, properties).with_id(id))
}

/// KML parser
pub struct KmlParser;

impl KmlParser {
    /// Parses KML text; placemarks with unusable geometry are skipped
    pub fn parse_str(text: &str) -> Result<FeatureCollection> {
        let text = text.trim_start_matches('\u{feff}');
        if text.trim().is_empty() {
            return Err(Error::empty(DataFormat::Kml, "document empty"));
        }

        let roots = read_document(text)?;
        if !roots.iter().any(|root| root.name == "kml") {
            return Err(Error::malformed(DataFormat::Kml, "missing <kml> root element"));
        }

        let mut placemarks = Vec::new();
        for root in &roots {
            collect_placemarks(root, &mut placemarks);
        }

        let mut features = Vec::with_capacity(placemarks.len());
        for (index, placemark) in placemarks.iter().enumerate() {
            match placemark_feature(placemark) {
                Ok(feature) => features.push(feature),
                Err(reason) => log::warn!("Skipping placemark {}: {}", index, reason),
            }
        }

        if features.is_empty() && !placemarks.is_empty() {
            return Err(Error::malformed(DataFormat::Kml, "no placemark is valid"));
        }
        FeatureCollection::non_empty(DataFormat::Kml, features)
    }
}

impl Parser for KmlParser {
    fn format(&self) -> DataFormat {
        DataFormat::Kml
    }

    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection> {
        let text = input
            .as_text()
            .ok_or_else(|| Error::malformed(DataFormat::Kml, "payload is not UTF-8 text"))?;
        Self::parse_str(&text)
    }
}

/// KMZ parser: a zip archive whose first `.kml` entry holds the document
pub struct KmzParser;

impl KmzParser {
    pub fn parse_bytes(bytes: &[u8]) -> Result<FeatureCollection> {
        let names = archive::entry_names(bytes)
            .map_err(|e| Error::malformed(DataFormat::Kmz, format!("not a zip archive: {}", e)))?;
        let entry = archive::find_entry(&names, ".kml").ok_or_else(|| {
            Error::malformed(DataFormat::Kmz, "archive contains no .kml entry")
        })?;
        log::debug!("Reading KML entry '{}' from KMZ", entry);

        let content = archive::read_entry(bytes, entry)
            .map_err(|e| Error::malformed(DataFormat::Kmz, format!("cannot read '{}': {}", entry, e)))?;
        let text = String::from_utf8(content)
            .map_err(|_| Error::malformed(DataFormat::Kmz, format!("'{}' is not UTF-8", entry)))?;

        KmlParser::parse_str(&text).map_err(|e| match e {
            Error::ParseFailure { kind, reason, .. } => Error::parse(DataFormat::Kmz, kind, reason),
            other => other,
        })
    }
}

impl Parser for KmzParser {
    fn format(&self) -> DataFormat {
        DataFormat::Kmz
    }

    fn parse(&self, input: &SourceInput) -> Result<FeatureCollection> {
        Self::parse_bytes(input.as_bytes())
    }
}
