pub mod flatten;
pub mod formats;
pub mod geometry;
pub mod parsers;
pub mod table;
