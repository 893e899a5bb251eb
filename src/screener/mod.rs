pub mod criteria;
pub mod evaluator;
pub mod watchlist;

pub use evaluator::{apply, evaluate, Evaluation};
pub use watchlist::validate_symbols;
