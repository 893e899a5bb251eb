//! Heuristic calendar spread candidates. Strikes come from fixed percentage
//! offsets around the current price; nothing here prices an option.

pub mod generator;

pub use generator::{aggregate_spreads, detailed_spreads};
