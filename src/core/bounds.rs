use crate::core::config::ZoomConfig;
use crate::core::geo::{LatLng, LatLngBounds, ViewState};
use crate::data::geometry::Geometry;
use geo::BoundingRect;

/// Bounding boxes and the initial-view heuristic.
///
/// The zoom estimate is `base - log2(max(latSpan, lonSpan, epsilon))`, clamped
/// to `[min, max]`. It is a rough fit for a web-mercator viewport of typical
/// size, not a projection-accurate one.
pub struct BoundsCalculator;

impl BoundsCalculator {
    /// Bounds of a single geometry; `None` when it has no positions
    pub fn geometry_bounds(geometry: &Geometry) -> Option<LatLngBounds> {
        let rect = geometry.to_geo().bounding_rect()?;
        let (min, max) = (rect.min(), rect.max());
        Some(LatLngBounds::from_coords(min.y, min.x, max.y, max.x))
    }

    /// Bounds of `[lng, lat]` positions; `None` when empty
    pub fn position_bounds<I>(positions: I) -> Option<LatLngBounds>
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut iter = positions.into_iter().map(LatLng::from_position);
        let first = iter.next()?;
        let mut bounds = LatLngBounds::from_point(first);
        for point in iter {
            bounds.extend(&point);
        }
        Some(bounds)
    }

    /// Union of every present bounds; `None` when all are absent
    pub fn union<I>(bounds: I) -> Option<LatLngBounds>
    where
        I: IntoIterator<Item = Option<LatLngBounds>>,
    {
        bounds
            .into_iter()
            .flatten()
            .reduce(|acc, next| acc.union(&next))
    }

    /// Center and zoom suggestion for a bounding box
    pub fn view_state(bounds: &LatLngBounds, zoom: &ZoomConfig) -> ViewState {
        let center = bounds.center();
        let span = bounds.span();
        let extent = span.lat.max(span.lng).max(zoom.epsilon);
        ViewState {
            longitude: center.lng,
            latitude: center.lat,
            zoom: (zoom.base - extent.log2()).clamp(zoom.min, zoom.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(pair: [[f64; 2]; 2]) -> LatLngBounds {
        LatLngBounds::from(pair)
    }

    #[test]
    fn test_union_of_two_layers() {
        let union = BoundsCalculator::union([
            Some(bounds([[0.0, 0.0], [1.0, 1.0]])),
            Some(bounds([[2.0, 2.0], [3.0, 3.0]])),
        ]);
        assert_eq!(union, Some(bounds([[0.0, 0.0], [3.0, 3.0]])));
    }

    #[test]
    fn test_union_skips_absent_layers() {
        let only = bounds([[2.0, 2.0], [3.0, 3.0]]);
        assert_eq!(BoundsCalculator::union([None, Some(only)]), Some(only));
        assert_eq!(BoundsCalculator::union([None, None]), None);
        assert_eq!(BoundsCalculator::union(Vec::new()), None);
    }

    #[test]
    fn test_geometry_bounds() {
        let polygon = Geometry::Polygon {
            coordinates: vec![vec![
                vec![135.0, 34.0],
                vec![139.0, 34.0],
                vec![139.0, 35.0],
                vec![135.0, 34.0],
            ]],
        };
        let b = BoundsCalculator::geometry_bounds(&polygon).unwrap();
        assert_eq!(<[[f64; 2]; 2]>::from(b), [[135.0, 34.0], [139.0, 35.0]]);

        let empty = Geometry::GeometryCollection { geometries: vec![] };
        assert!(BoundsCalculator::geometry_bounds(&empty).is_none());
    }

    #[test]
    fn test_view_state() {
        let config = ZoomConfig::default();

        let one_degree = BoundsCalculator::view_state(&bounds([[10.0, 20.0], [11.0, 21.0]]), &config);
        assert_eq!(one_degree.longitude, 10.5);
        assert_eq!(one_degree.latitude, 20.5);
        assert!((one_degree.zoom - 8.0).abs() < 1e-9);

        let point = BoundsCalculator::view_state(&bounds([[5.0, 5.0], [5.0, 5.0]]), &config);
        assert!(point.zoom.is_finite());
        assert!(point.zoom <= config.max);

        let world = BoundsCalculator::view_state(&bounds([[-180.0, -85.0], [180.0, 85.0]]), &config);
        assert_eq!(world.zoom, config.min);
    }

    #[test]
    fn test_position_bounds() {
        let b = BoundsCalculator::position_bounds([[139.0, 35.0], [135.0, 34.0]]).unwrap();
        assert_eq!(<[[f64; 2]; 2]>::from(b), [[135.0, 34.0], [139.0, 35.0]]);
        assert!(BoundsCalculator::position_bounds(std::iter::empty()).is_none());
    }
}
