//! Market data acquisition: providers, retry, caching and source fallback.

pub mod alpha_vantage;
pub mod cache;
pub mod eodhd;
pub mod fetcher;
pub mod http;
pub mod latency;
pub mod provider;
pub mod sample;
pub mod yahoo;

pub use fetcher::DataFetcher;
