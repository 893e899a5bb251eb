use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::data::http::get_json;
use crate::data::provider::{HttpContext, MarketDataProvider};
use crate::error::ProviderError;
use crate::types::{DataSourceKind, Fundamentals, HistoryPeriod, MarketSnapshot, PriceBar};

/// EOD Historical Data daily bars (`/eod/{SYMBOL}.US`). No fundamentals on the free tier.
pub struct EodhdProvider {
    base_url: String,
    api_key: String,
    http: HttpContext,
}

#[derive(Debug, Deserialize)]
struct EodRow {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl EodhdProvider {
    pub fn new(base_url: String, api_key: String, http: HttpContext) -> Self {
        Self { base_url, api_key, http }
    }
}

#[async_trait]
impl MarketDataProvider for EodhdProvider {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::Eodhd
    }

    async fn fetch_snapshot(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> Result<MarketSnapshot, ProviderError> {
        let url = format!("{}/eod/{}.US", self.base_url, symbol);
        let from = (Utc::now().date_naive() - chrono::Duration::days(period.days())).to_string();

        let rows: Vec<EodRow> = get_json("eodhd", &self.http.policy, || {
            self.http.client.get(&url).query(&[
                ("api_token", self.api_key.as_str()),
                ("fmt", "json"),
                ("from", from.as_str()),
            ])
        })
        .await?;

        let mut bars: Vec<PriceBar> = rows
            .into_iter()
            .filter_map(|r| {
                Some(PriceBar {
                    date: r.date,
                    open: r.open?,
                    high: r.high?,
                    low: r.low?,
                    close: r.close?,
                    volume: r.volume.unwrap_or(0.0).max(0.0) as u64,
                })
            })
            .collect();
        bars.sort_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(ProviderError::NoData(symbol.to_string()));
        }

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            bars,
            quote_price: None,
            quote_volume: None,
            fundamentals: Fundamentals::default(),
        })
    }
}
