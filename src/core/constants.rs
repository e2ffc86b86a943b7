//! Engine-wide constants.
//! Keeping them in a single place makes it easier to tweak magic numbers.

use crate::compose::color::Color;

/// Zoom level a one-degree-wide dataset maps to in the view heuristic.
pub const BASE_ZOOM: f64 = 8.0;

/// Lowest zoom the view heuristic will suggest.
pub const MIN_ZOOM: f64 = 1.0;

/// Highest zoom the view heuristic will suggest.
pub const MAX_ZOOM: f64 = 15.0;

/// Smallest span (degrees) used by the view heuristic, so a single-point
/// dataset does not hit `log2(0)`.
pub const ZOOM_EPSILON: f64 = 0.01;

/// Nesting depth beyond which the flattener stores composites as-is.
pub const MAX_FLATTEN_DEPTH: usize = 32;

/// Reserved column holding a feature's geometry when a parsed
/// feature collection is fed through the tabular pipeline.
pub const FEATURE_GEOMETRY_COLUMN: &str = "__geometry";

/// Key used when flattening a bare scalar.
pub const SCALAR_KEY: &str = "value";

/// Default categorical palette (Tableau 10).
pub const DEFAULT_PALETTE: [Color; 10] = [
    Color::rgb(0x4e, 0x79, 0xa7),
    Color::rgb(0xf2, 0x8e, 0x2b),
    Color::rgb(0xe1, 0x57, 0x59),
    Color::rgb(0x76, 0xb7, 0xb2),
    Color::rgb(0x59, 0xa1, 0x4f),
    Color::rgb(0xed, 0xc9, 0x48),
    Color::rgb(0xb0, 0x7a, 0xa1),
    Color::rgb(0xff, 0x9d, 0xa7),
    Color::rgb(0x9c, 0x75, 0x5f),
    Color::rgb(0xba, 0xb0, 0xac),
];

/// Property under which a passthrough feature carries its resolved style.
pub const FEATURE_STYLE_KEY: &str = "__style";
