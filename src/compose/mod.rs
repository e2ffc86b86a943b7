//! Map composition: tabular geometry resolution, aggregation, category
//! colors and per-layer orchestration.

pub mod aggregate;
pub mod color;
pub mod dataset;
pub mod layer;
pub mod tabular;
