use geocompose::constants::FEATURE_GEOMETRY_COLUMN;
use geocompose::data::parsers::geojson::GeoJsonParser;
use geocompose::data::parsers::wkt::{WktParser, WktStrategy};
use geocompose::prelude::*;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

const GEOJSON: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "id": 1, "geometry": {"type": "Point", "coordinates": [1, 2]},
         "properties": {"name": "a"}},
        {"type": "Feature", "geometry": null, "properties": {"name": "b"}}
    ]
}"#;

const TOPOJSON: &str = r#"{
    "type": "Topology",
    "arcs": [[[0, 0], [1, 0], [1, 1], [0, 0]]],
    "objects": {
        "shapes": {"type": "GeometryCollection", "geometries": [
            {"type": "Polygon", "arcs": [[0]], "properties": {"name": "tri"}},
            {"type": "Point", "coordinates": [5, 5]}
        ]}
    }
}"#;

const KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark><name>HQ</name><Point><coordinates>10,20</coordinates></Point></Placemark>
    <Folder>
      <Placemark><name>Road</name>
        <LineString><coordinates>0,0 1,1 2,1</coordinates></LineString>
      </Placemark>
    </Folder>
  </Document>
</kml>"#;

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn shape_summary(collection: &FeatureCollection) -> Vec<(Option<&'static str>, Vec<String>)> {
    collection
        .features
        .iter()
        .map(|feature| {
            (
                feature.geometry.as_ref().map(Geometry::kind),
                feature.properties.keys().cloned().collect(),
            )
        })
        .collect()
}

#[test]
fn test_text_formats_are_detected() {
    assert_eq!(FormatDetector::detect(&SourceInput::text(GEOJSON)), DataFormat::GeoJson);
    assert_eq!(FormatDetector::detect(&SourceInput::text(TOPOJSON)), DataFormat::TopoJson);
    assert_eq!(FormatDetector::detect(&SourceInput::text(KML)), DataFormat::Kml);
    assert_eq!(
        FormatDetector::detect(&SourceInput::text("SRID=4326;POINT (1 2)")),
        DataFormat::Wkt
    );
    assert_eq!(FormatDetector::detect(&SourceInput::text("hello")), DataFormat::GeoJson);
}

#[test]
fn test_unknown_binary_needs_an_override() {
    let input = SourceInput::binary(vec![0xde, 0xad, 0xbe, 0xef]);
    assert!(matches!(
        FormatDetector::detect_strict(&input),
        Err(GeoError::FormatUnrecognized(_))
    ));
    assert_eq!(FormatDetector::detect(&input), DataFormat::Shapefile);

    let registry = ParserRegistry::new();
    let outcome = registry.parse_as(DataFormat::Shapefile, &input);
    assert!(outcome.feature_collection.is_none());
    assert!(outcome.error.is_some());
}

#[test]
fn test_parsing_twice_gives_identical_collections() {
    let registry = ParserRegistry::new();
    for text in [GEOJSON, TOPOJSON, KML, "POINT (1 2)\nLINESTRING (0 0, 1 1)"] {
        let input = SourceInput::text(text);
        let first = registry.parse(&input).into_result().unwrap();
        let second = registry.parse(&input).into_result().unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(shape_summary(&first), shape_summary(&second));
        assert_eq!(first, second);
    }
    assert_eq!(registry.load_count(), 4);
}

#[test]
fn test_topojson_objects_become_features() {
    let collection = ParserRegistry::new()
        .parse(&SourceInput::text(TOPOJSON))
        .into_result()
        .unwrap();
    assert_eq!(collection.geometry_kinds(), vec!["Polygon", "Point"]);
    assert_eq!(collection.features[0].properties["name"], "tri");
}

#[test]
fn test_wkt_bad_line_is_skipped() {
    let outcome = ParserRegistry::new().parse(&SourceInput::text("POINT (10 20)\nINVALID"));
    assert_eq!(outcome.format, DataFormat::Wkt);
    let collection = outcome.into_result().unwrap();
    assert_eq!(collection.len(), 1);

    let report = WktParser::parse_report("POINT (10 20)\nINVALID");
    assert_eq!(report.strategy, Some(WktStrategy::PerLine));
    assert_eq!(report.features.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].line, 2);
}

#[test]
fn test_kmz_without_kml_entry_reports_it() {
    let bytes = build_zip(&[("readme.txt", b"nothing here".as_slice())]);
    let input = SourceInput::binary(bytes).with_file_name("bundle.kmz");
    let outcome = ParserRegistry::new().parse(&input);

    assert_eq!(outcome.format, DataFormat::Kmz);
    assert!(outcome.feature_collection.is_none());
    let error = outcome.error.unwrap();
    assert_eq!(error.parse_failure_kind(), Some(ParseFailureKind::Malformed));
    assert!(error.to_string().contains(".kml entry"));
}

#[test]
fn test_kmz_delegates_to_kml() {
    let bytes = build_zip(&[("doc.kml", KML.as_bytes())]);
    let input = SourceInput::binary(bytes);
    assert_eq!(FormatDetector::detect(&input), DataFormat::Kmz);

    let collection = ParserRegistry::new().parse(&input).into_result().unwrap();
    assert_eq!(collection.geometry_kinds(), vec!["Point", "LineString"]);
    assert_eq!(collection.features[0].properties["name"], "HQ");
}

#[test]
fn test_features_flatten_to_one_row_each() {
    let collection = ParserRegistry::new()
        .parse(&SourceInput::text(GEOJSON))
        .into_result()
        .unwrap();
    let rows = PropertyFlattener::new().flatten_collection(&collection);
    assert_eq!(rows.len(), collection.len());
    assert!(rows.iter().all(|row| row.contains_key("name")));
}

#[test]
fn test_kmz_uses_first_kml_entry() {
    let other = KML.replace("HQ", "Annex");
    let bytes = build_zip(&[
        ("layers/deep/first.kml", KML.as_bytes()),
        ("doc.kml", other.as_bytes()),
    ]);
    let collection = ParserRegistry::new()
        .parse(&SourceInput::binary(bytes).with_file_name("bundle.kmz"))
        .into_result()
        .unwrap();
    assert_eq!(collection.features[0].properties["name"], "HQ");
}

#[test]
fn test_wkt_with_non_finite_coordinates_is_skipped() {
    let report = WktParser::parse_report("POINT (1e999 2)\nPOINT (3 4)");
    assert_eq!(report.features.len(), 1);
    assert_eq!(report.skipped[0].line, 1);

    let outcome = ParserRegistry::new().parse(&SourceInput::text("POINT (1e999 2)"));
    assert_eq!(outcome.format, DataFormat::Wkt);
    assert!(outcome.feature_collection.is_none());
}

#[test]
fn test_dimension_suffixed_wkt_detects_and_parses() {
    let input = SourceInput::text("POINTZ (1 2 3)");
    assert_eq!(FormatDetector::detect(&input), DataFormat::Wkt);
    let collection = ParserRegistry::new().parse(&input).into_result().unwrap();
    let point = collection.features[0].geometry.as_ref().and_then(Geometry::as_point);
    assert_eq!(point, Some([1.0, 2.0]));
}

#[test]
fn test_flattened_rows_rewrap_into_the_same_features() {
    let text = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
         "properties": {"name": "road", "meta": {"lanes": 2, "tags": ["a", "b"]}}},
        {"type": "Feature", "geometry": null, "properties": {"name": "none"}}
    ]}"#;
    let collection = ParserRegistry::new()
        .parse(&SourceInput::text(text))
        .into_result()
        .unwrap();
    let table = TabularData::from_features(&collection, &PropertyFlattener::new());
    assert_eq!(table.len(), collection.len());

    for (row, feature) in table.rows.iter().zip(&collection.features) {
        let geometry = GeoJsonParser::geometry_from_cell(&row[FEATURE_GEOMETRY_COLUMN]);
        assert_eq!(geometry, feature.geometry);
        for (key, value) in &feature.properties {
            assert_eq!(&row[key.as_str()], value);
        }
    }
    assert_eq!(table.rows[0]["meta.tags[1]"], "b");
}
