use geocompose::constants::DEFAULT_PALETTE;
use geocompose::prelude::*;
use serde_json::json;

fn cities() -> TabularData {
    TabularData::from_json(&json!([
        {"lat": 35.0, "lon": 139.0, "city": "Tokyo"},
        {"lat": 34.0, "lon": 135.0, "city": "Osaka"}
    ]))
    .unwrap()
}

fn city_mapping() -> ColumnMapping {
    ColumnMapping::new()
        .with(ColumnRole::Latitude, "lat")
        .with(ColumnRole::Longitude, "lon")
        .with(ColumnRole::Category, "city")
}

fn square(min: f64, max: f64) -> TabularData {
    TabularData::from_json(&json!([
        {"lat": min, "lon": min},
        {"lat": max, "lon": max}
    ]))
    .unwrap()
}

#[test]
fn test_cities_become_points_with_categories_and_bounds() {
    let composer = LayerComposer::default();
    let source = LayerSource::tabular("cities", "Cities", cities()).with_columns(city_mapping());
    let map = composer.compose_single(&source);

    let dataset = &map.dataset;
    assert_eq!(dataset.points.len(), 2);
    assert_eq!(dataset.columns.len(), 2);
    assert_eq!(dataset.categories, vec!["Tokyo", "Osaka"]);
    assert_eq!(
        map.bounds.map(<[[f64; 2]; 2]>::from),
        Some([[135.0, 34.0], [139.0, 35.0]])
    );

    let layer = &map.layers[0];
    assert!(!layer.using_fallback_category);
    assert_eq!(
        layer.category_color_map.get("Tokyo"),
        Some(DEFAULT_PALETTE[0])
    );
    assert_eq!(dataset.points[1].style.color, DEFAULT_PALETTE[1]);

    let view = map.view_state.unwrap();
    assert_eq!(view.longitude, 137.0);
    assert_eq!(view.latitude, 34.5);
    assert!(view.zoom >= 1.0 && view.zoom <= 15.0);
}

#[test]
fn test_bounds_union_across_layers() {
    let composer = LayerComposer::default();
    let lat_lon = ColumnMapping::new()
        .with(ColumnRole::Latitude, "lat")
        .with(ColumnRole::Longitude, "lon");

    let a = LayerSource::tabular("a", "A", square(0.0, 1.0)).with_columns(lat_lon.clone());
    let b = LayerSource::tabular("b", "B", square(2.0, 3.0)).with_columns(lat_lon.clone());
    let empty = LayerSource::tabular("c", "C", square(5.0, 6.0));

    let both = composer.compose(&[a.clone(), b.clone()]);
    assert_eq!(both.bounds.map(<[[f64; 2]; 2]>::from), Some([[0.0, 0.0], [3.0, 3.0]]));

    let one = composer.compose(&[empty.clone(), b]);
    assert_eq!(one.bounds.map(<[[f64; 2]; 2]>::from), Some([[2.0, 2.0], [3.0, 3.0]]));

    let none = composer.compose(&[empty]);
    assert_eq!(none.bounds, None);
    assert_eq!(none.view_state, None);
    assert!(!none.has_renderable_data());
}

#[test]
fn test_removed_column_resolves_to_unset() {
    let composer = LayerComposer::default();
    let source = LayerSource::tabular("cities", "Cities", cities()).with_columns(city_mapping());
    let before = composer.compose_layer(&source);
    assert_eq!(before.column_mapping.category_column.as_deref(), Some("city"));

    let renamed = TabularData::from_json(&json!([
        {"lat": 35.0, "lon": 139.0, "town": "Tokyo"}
    ]))
    .unwrap();
    let after = composer.compose_layer(&LayerSource {
        data: SourceData::Tabular(renamed),
        ..source
    });

    assert_eq!(after.column_mapping.category_column, None);
    assert!(after.using_fallback_category);
    assert_eq!(after.stale_columns.len(), 1);
    assert_eq!(after.stale_columns[0].role, ColumnRole::Category);
    assert!(after.geo_dataset.categories.is_empty());
    for (_, column) in after.column_mapping.assigned() {
        assert!(after.valid_columns.iter().any(|c| c == column));
    }
}

#[test]
fn test_layers_color_categories_independently() {
    let composer = LayerComposer::default();
    let first = TabularData::from_json(&json!([
        {"lat": 1, "lon": 1, "kind": "park"},
        {"lat": 2, "lon": 2, "kind": "lake"}
    ]))
    .unwrap();
    let second = TabularData::from_json(&json!([
        {"lat": 3, "lon": 3, "kind": "lake"}
    ]))
    .unwrap();
    let mapping = ColumnMapping::new()
        .with(ColumnRole::Latitude, "lat")
        .with(ColumnRole::Longitude, "lon")
        .with(ColumnRole::Category, "kind");

    let sources = [
        LayerSource::tabular("one", "One", first).with_columns(mapping.clone()),
        LayerSource::tabular("two", "Two", second).with_columns(mapping),
    ];
    let map = composer.compose(&sources);
    let again = composer.compose(&sources);

    let one = map.layer("one").unwrap();
    let two = map.layer("two").unwrap();
    assert_eq!(one.category_color_map.get("lake"), Some(DEFAULT_PALETTE[1]));
    assert_eq!(two.category_color_map.get("lake"), Some(DEFAULT_PALETTE[0]));
    assert_eq!(map.dataset.categories, vec!["park", "lake"]);

    assert_eq!(
        map.layers[0].category_color_map,
        again.layers[0].category_color_map
    );
    assert_eq!(map.dataset, again.dataset);
}

fn elevations(layer: &LayerConfig) -> Vec<Option<f64>> {
    layer
        .geo_dataset
        .points
        .iter()
        .map(|p| p.style.elevation)
        .collect()
}

#[test]
fn test_aggregation_edge_cases() {
    let rows = TabularData::from_json(&json!([
        {"lat": 1, "lon": 1, "v": 4},
        {"lat": 1, "lon": 1, "v": "n/a"},
        {"lat": 2, "lon": 2, "v": 7},
        {"lat": 3, "lon": 3, "v": null}
    ]))
    .unwrap();
    let base = ColumnMapping::new()
        .with(ColumnRole::Latitude, "lat")
        .with(ColumnRole::Longitude, "lon");
    let composer = LayerComposer::default();
    let layer = |mapping: ColumnMapping, mode| {
        composer.compose_layer(
            &LayerSource::tabular("l", "L", rows.clone())
                .with_columns(mapping)
                .with_aggregation(mode),
        )
    };

    let count = layer(base.clone(), AggregationMode::Count);
    assert!(count.aggregation_issue.is_none());
    assert_eq!(elevations(&count), vec![Some(2.0), Some(1.0), Some(1.0)]);

    let with_value = base.clone().with(ColumnRole::Height, "v");
    let sum = layer(with_value.clone(), AggregationMode::Sum);
    assert_eq!(elevations(&sum), vec![Some(4.0), Some(7.0), None]);

    let avg = layer(with_value, AggregationMode::Avg);
    assert_eq!(avg.geo_dataset.points[1].style.elevation, Some(7.0));

    let missing = layer(base, AggregationMode::Max);
    assert!(missing.aggregation_issue.is_some());
    assert!(missing.has_renderable_data);
}

#[test]
fn test_failing_layer_does_not_block_others() {
    let composer = LayerComposer::default();
    let broken_kmz = SourceInput::binary(b"PK\x03\x04 definitely not a zip".to_vec())
        .with_file_name("broken.kmz");
    let map = composer.compose(&[
        LayerSource::raw("bad", "Bad", broken_kmz),
        LayerSource::tabular("cities", "Cities", cities()).with_columns(city_mapping()),
    ]);

    let bad = map.layer("bad").unwrap();
    assert!(bad.error.is_some());
    assert!(!bad.has_renderable_data);
    assert_eq!(map.dataset.points.len(), 2);
    assert!(map.has_renderable_data());
}

#[test]
fn test_geojson_layer_with_flattened_properties() {
    let text = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10, 20]},
             "properties": {"meta": {"kind": "a"}, "size": 3}},
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]},
             "properties": {"meta": {"kind": "b"}, "size": 5}}
        ]
    })
    .to_string();
    let mapping = ColumnMapping::new()
        .with(ColumnRole::Category, "meta.kind")
        .with(ColumnRole::Height, "size");
    let map = LayerComposer::default().compose_single(
        &LayerSource::raw("g", "Shapes", SourceInput::text(text)).with_columns(mapping),
    );

    let layer = &map.layers[0];
    assert_eq!(layer.format, Some(DataFormat::GeoJson));
    assert_eq!(layer.geo_dataset.points.len(), 1);
    assert_eq!(layer.geo_dataset.geo_json_features.len(), 1);
    assert_eq!(layer.geo_dataset.categories, vec!["a", "b"]);
    assert_eq!(layer.geo_dataset.points[0].style.elevation, Some(3.0));

    let polygon = &layer.geo_dataset.geo_json_features[0];
    assert_eq!(polygon.properties["meta"], json!({"kind": "b"}));
    assert!(!polygon.properties.contains_key("meta.kind"));
    assert_eq!(
        map.bounds.map(<[[f64; 2]; 2]>::from),
        Some([[0.0, 0.0], [10.0, 20.0]])
    );
}

#[test]
fn test_recomputation_is_idempotent() {
    let composer = LayerComposer::default();
    let source = LayerSource::tabular("cities", "Cities", cities()).with_columns(city_mapping());
    let first = serde_json::to_value(composer.compose_single(&source)).unwrap();
    let second = serde_json::to_value(composer.compose_single(&source)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_layer_settings_round_trip() {
    let settings: LayerSettings = serde_json::from_value(json!({
        "latitudeColumn": "lat",
        "longitudeColumn": "lon",
        "aggregation": "count",
        "pointRadius": 250.0
    }))
    .unwrap();
    assert_eq!(settings.columns.latitude_column.as_deref(), Some("lat"));
    assert_eq!(settings.aggregation, AggregationMode::Count);
    assert_eq!(settings.point_radius, 250.0);

    let layer = LayerComposer::default()
        .compose_layer(&LayerSource::tabular("c", "C", cities()).with_settings(settings));
    assert_eq!(layer.point_radius, 250.0);
    assert_eq!(layer.geo_dataset.points.len(), 2);
}

#[test]
fn test_layers_without_category_column_color_by_layer() {
    let composer = LayerComposer::default();
    let lat_lon = ColumnMapping::new()
        .with(ColumnRole::Latitude, "lat")
        .with(ColumnRole::Longitude, "lon");
    let layers = [
        ("layer-a", "Alpha"),
        ("layer-b", "Beta"),
        ("layer-c", "Gamma"),
        ("layer-d", "Delta"),
    ];
    let sources: Vec<LayerSource> = layers
        .iter()
        .map(|(id, label)| {
            LayerSource::tabular(*id, *label, square(0.0, 1.0)).with_columns(lat_lon.clone())
        })
        .collect();
    let map = composer.compose(&sources);
    let assigner = CategoryColorAssigner::default();

    let mut colors = Vec::new();
    for (layer, source) in map.layers.iter().zip(&sources) {
        assert!(layer.using_fallback_category);
        assert!(layer.geo_dataset.categories.is_empty());
        assert!(layer.category_color_map.is_empty());
        let expected = assigner.hashed_color(&source.id, &source.label);
        assert!(layer.geo_dataset.points.iter().all(|p| p.style.color == expected));
        assert_eq!(layer.legend[0].color, expected);
        colors.push(expected);
    }
    colors.dedup();
    assert!(colors.len() > 1, "every fallback layer got {:?}", colors[0]);
    assert!(map.dataset.categories.is_empty());
    assert_eq!(map.dataset, composer.compose(&sources).dataset);
}

#[test]
fn test_non_finite_geometry_cells_never_reach_bounds() {
    let rows = TabularData::from_json(&json!([
        {"wkt": "POINT (1e999 2)", "geo": null},
        {"wkt": "POINT (0 0)", "geo": null},
        {"wkt": null, "geo": "{\"type\": \"Point\", \"coordinates\": [1e999, 2]}"},
        {"wkt": null, "geo": "{\"type\": \"Point\", \"coordinates\": [3, 4]}"}
    ]))
    .unwrap();
    let mapping = ColumnMapping::new()
        .with(ColumnRole::Wkt, "wkt")
        .with(ColumnRole::GeoJson, "geo");
    let map = LayerComposer::default()
        .compose_single(&LayerSource::tabular("n", "N", rows).with_columns(mapping));

    let layer = &map.layers[0];
    assert_eq!(layer.stats.resolved_rows, 2);
    assert_eq!(layer.stats.no_geometry_rows, 2);
    assert_eq!(
        map.bounds.map(<[[f64; 2]; 2]>::from),
        Some([[0.0, 0.0], [3.0, 4.0]])
    );
    let view = map.view_state.unwrap();
    assert!(view.longitude.is_finite() && view.latitude.is_finite() && view.zoom.is_finite());
}
