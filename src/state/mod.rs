pub mod screener_store;

pub use screener_store::ScreenerStore;
