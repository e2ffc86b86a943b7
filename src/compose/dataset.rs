//! Renderer-facing output model.

use crate::compose::aggregate::AggregatedItem;
use crate::compose::color::{CategoryColorMap, Color};
use crate::compose::tabular::ResolvedShape;
use crate::constants::FEATURE_STYLE_KEY;
use crate::core::bounds::BoundsCalculator;
use crate::core::geo::LatLngBounds;
use crate::data::geometry::{Feature, Position};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Resolved style scalars shared by every render item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    pub category: String,
    pub color_value: String,
    pub color: Color,
    pub elevation: Option<f64>,
    /// Rows collapsed into this item
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPoint {
    pub position: Position,
    #[serde(flatten)]
    pub style: FeatureStyle,
}

/// Columns share the point bucket's source; the renderer extrudes them.
pub type RenderColumn = RenderPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPath {
    pub path: Vec<Position>,
    #[serde(flatten)]
    pub style: FeatureStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPolygon {
    /// Outer ring first, then holes; every ring closed
    pub rings: Vec<Vec<Position>>,
    #[serde(flatten)]
    pub style: FeatureStyle,
}

/// Unified output of one or more layers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoDataset {
    pub points: Vec<RenderPoint>,
    pub columns: Vec<RenderColumn>,
    pub paths: Vec<RenderPath>,
    pub polygons: Vec<RenderPolygon>,
    pub geo_json_features: Vec<Feature>,
    pub categories: Vec<String>,
    pub bounds: Option<LatLngBounds>,
}

impl GeoDataset {
    /// Buckets aggregated items and styles them with the layer's colors
    pub fn from_items(
        items: &[AggregatedItem],
        colors: &CategoryColorMap,
        categories: Vec<String>,
    ) -> Self {
        let mut dataset = GeoDataset {
            categories,
            ..Default::default()
        };

        for item in items {
            let row = &item.row;
            let style = FeatureStyle {
                category: row.category.clone(),
                color_value: row.color_value.clone(),
                color: colors.color_for(&row.color_value),
                elevation: item.elevation,
                count: item.count,
            };

            match &row.shape {
                ResolvedShape::Point(position) => {
                    let point = RenderPoint {
                        position: position.clone(),
                        style,
                    };
                    dataset.columns.push(point.clone());
                    dataset.points.push(point);
                }
                ResolvedShape::Path(path) => dataset.paths.push(RenderPath {
                    path: path.clone(),
                    style,
                }),
                ResolvedShape::Polygon(rings) => dataset.polygons.push(RenderPolygon {
                    rings: rings.clone(),
                    style,
                }),
                ResolvedShape::Feature(feature) => {
                    let mut feature = feature.clone();
                    if let Ok(value) = serde_json::to_value(&style) {
                        feature.properties.insert(FEATURE_STYLE_KEY.to_string(), value);
                    }
                    dataset.geo_json_features.push(feature);
                }
            }
        }

        dataset.bounds = dataset.compute_bounds();
        dataset
    }

    /// No render item of any kind
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
            && self.paths.is_empty()
            && self.polygons.is_empty()
            && self.geo_json_features.is_empty()
    }

    pub fn has_renderable_data(&self) -> bool {
        !self.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.points.len() + self.paths.len() + self.polygons.len() + self.geo_json_features.len()
    }

    /// Bounds over every render item; `None` when there is no position
    pub fn compute_bounds(&self) -> Option<LatLngBounds> {
        let positions = self
            .points
            .iter()
            .map(|p| &p.position)
            .chain(self.paths.iter().flat_map(|p| p.path.iter()))
            .chain(self.polygons.iter().flat_map(|p| p.rings.iter().flatten()))
            .filter(|p| p.len() >= 2)
            .map(|p| [p[0], p[1]]);

        let features = self
            .geo_json_features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .map(BoundsCalculator::geometry_bounds);

        BoundsCalculator::union(
            std::iter::once(BoundsCalculator::position_bounds(positions)).chain(features),
        )
    }

    /// Appends another layer's output. Categories stay deduplicated in
    /// first-seen order and bounds are unioned.
    pub fn merge(&mut self, other: GeoDataset) {
        self.points.extend(other.points);
        self.columns.extend(other.columns);
        self.paths.extend(other.paths);
        self.polygons.extend(other.polygons);
        self.geo_json_features.extend(other.geo_json_features);

        let mut categories: IndexSet<String> =
            std::mem::take(&mut self.categories).into_iter().collect();
        categories.extend(other.categories);
        self.categories = categories.into_iter().collect();

        self.bounds = BoundsCalculator::union([self.bounds, other.bounds]);
    }
}
