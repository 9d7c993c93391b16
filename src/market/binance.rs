//! Binance USDT-margined futures market data.
//!
//! ## API Reference
//!
//! Base: `https://fapi.binance.com`
//!
//! - `/fapi/v1/ticker/24hr?symbol=X` - 24h rolling ticker, prices as strings
//! - `/fapi/v1/klines?symbol=X&interval=1m&limit=N` - OHLCV rows, oldest
//!   first, each row a JSON array of mixed numbers and strings
//! - `/fapi/v1/premiumIndex?symbol=X` - mark price and last funding rate
//!
//! Binance answers 400 with code -1121 for a symbol it does not list; the
//! chain treats that as "try the next provider", not as an outage.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::current_timestamp;
use crate::detector_core::{Candle, Snapshot, Timeframe};
use crate::market::provider::{MarketDataProvider, ProviderError};

const PROVIDER: &str = "binance";
const BASE_URL: &str = "https://fapi.binance.com";

pub struct BinanceFutures {
    client: reqwest::Client,
}

impl BinanceFutures {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        symbol: &str,
    ) -> Result<T, ProviderError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::UnknownSymbol {
                provider: PROVIDER,
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            detail: e.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Ticker24hr {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

#[derive(Debug, Deserialize)]
struct PremiumIndex {
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
}

#[async_trait]
impl MarketDataProvider for BinanceFutures {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, ProviderError> {
        let url = format!("{BASE_URL}/fapi/v1/ticker/24hr?symbol={symbol}");
        let raw: Ticker24hr = self.get_json(&url, symbol).await?;

        Ok(Snapshot::ticker(
            symbol,
            parse_decimal(&raw.last_price, "lastPrice")?,
            parse_decimal(&raw.quote_volume, "quoteVolume")?,
            parse_decimal(&raw.price_change_percent, "priceChangePercent")?,
            current_timestamp(),
        ))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        // Binance interval names line up with our timeframe labels
        let url = format!(
            "{BASE_URL}/fapi/v1/klines?symbol={symbol}&interval={}&limit={limit}",
            timeframe.as_str()
        );
        let rows: Vec<Vec<Value>> = self.get_json(&url, symbol).await?;
        parse_klines(&rows)
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        let url = format!("{BASE_URL}/fapi/v1/premiumIndex?symbol={symbol}");
        let raw: PremiumIndex = self.get_json(&url, symbol).await?;

        if raw.last_funding_rate.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_decimal(&raw.last_funding_rate, "lastFundingRate")?))
    }
}

/// Kline rows come back oldest first as
/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume, ...]`
/// with prices encoded as strings.
fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>, ProviderError> {
    rows.iter()
        .map(|row| {
            if row.len() < 8 {
                return Err(decode_error(format!(
                    "kline row has {} fields, expected at least 8",
                    row.len()
                )));
            }
            let open_time_ms = row[0]
                .as_i64()
                .ok_or_else(|| decode_error("kline openTime is not an integer".into()))?;

            Ok(Candle {
                open_time: open_time_ms / 1_000,
                open: value_decimal(&row[1], "open")?,
                high: value_decimal(&row[2], "high")?,
                low: value_decimal(&row[3], "low")?,
                close: value_decimal(&row[4], "close")?,
                volume: value_decimal(&row[5], "volume")?,
                quote_volume: value_decimal(&row[7], "quoteVolume")?,
            })
        })
        .collect()
}

fn parse_decimal(raw: &str, field: &str) -> Result<f64, ProviderError> {
    raw.parse()
        .map_err(|_| decode_error(format!("{field} is not numeric: '{raw}'")))
}

fn value_decimal(value: &Value, field: &str) -> Result<f64, ProviderError> {
    match value {
        Value::String(s) => parse_decimal(s, field),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| decode_error(format!("{field} is out of range"))),
        other => Err(decode_error(format!("{field} has unexpected type: {other}"))),
    }
}

fn decode_error(detail: String) -> ProviderError {
    ProviderError::Decode {
        provider: PROVIDER,
        detail,
    }
}
