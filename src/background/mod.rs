pub mod gate;
pub mod tasks;

pub use gate::{RecomputeGate, Ticket};
pub use tasks::{compose_in_background, parse_all, parse_in_background, AsyncExecutor};
