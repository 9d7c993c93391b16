//! Bybit linear perpetuals market data (v5 API).
//!
//! ## API Reference
//!
//! Base: `https://api.bybit.com`
//!
//! - `/v5/market/tickers?category=linear&symbol=X` - ticker incl. funding
//!   rate; `price24hPcnt` is a signed fraction ("0.056" = +5.6%)
//! - `/v5/market/kline?category=linear&symbol=X&interval=60&limit=N` - rows
//!   of strings, NEWEST first (reversed before use)
//!
//! Every response is wrapped in a `retCode`/`retMsg` envelope; code 10001
//! marks an invalid symbol.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::current_timestamp;
use crate::detector_core::{Candle, Snapshot, Timeframe};
use crate::market::provider::{MarketDataProvider, ProviderError};

const PROVIDER: &str = "bybit";
const BASE_URL: &str = "https://api.bybit.com";
const INVALID_SYMBOL_CODE: i64 = 10001;

pub struct BybitLinear {
    client: reqwest::Client,
}

impl BybitLinear {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        url: &str,
        symbol: &str,
    ) -> Result<T, ProviderError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let envelope: ApiResponse<T> =
            response.json().await.map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;
        unwrap_envelope(envelope, symbol)
    }

    async fn ticker_entry(&self, symbol: &str) -> Result<TickerEntry, ProviderError> {
        let url = format!("{BASE_URL}/v5/market/tickers?category=linear&symbol={symbol}");
        let result: TickerResult = self.get_envelope(&url, symbol).await?;
        result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::UnknownSymbol {
                provider: PROVIDER,
                symbol: symbol.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "turnover24h")]
    turnover_24h: String,
    #[serde(rename = "price24hPcnt")]
    price_24h_pcnt: String,
    #[serde(rename = "fundingRate", default)]
    funding_rate: String,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

fn unwrap_envelope<T>(envelope: ApiResponse<T>, symbol: &str) -> Result<T, ProviderError> {
    if envelope.ret_code == INVALID_SYMBOL_CODE {
        return Err(ProviderError::UnknownSymbol {
            provider: PROVIDER,
            symbol: symbol.to_string(),
        });
    }
    if envelope.ret_code != 0 {
        return Err(decode_error(format!(
            "retCode {}: {}",
            envelope.ret_code, envelope.ret_msg
        )));
    }
    envelope
        .result
        .ok_or_else(|| decode_error("missing result payload".to_string()))
}

fn interval_name(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1",
        Timeframe::OneHour => "60",
        Timeframe::Daily => "D",
        Timeframe::Weekly => "W",
    }
}

#[async_trait]
impl MarketDataProvider for BybitLinear {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, ProviderError> {
        let entry = self.ticker_entry(symbol).await?;
        snapshot_from_entry(symbol, &entry)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let url = format!(
            "{BASE_URL}/v5/market/kline?category=linear&symbol={symbol}&interval={}&limit={limit}",
            interval_name(timeframe)
        );
        let result: KlineResult = self.get_envelope(&url, symbol).await?;
        parse_klines(&result.list)
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        let entry = self.ticker_entry(symbol).await?;
        funding_from_entry(&entry)
    }
}

fn snapshot_from_entry(symbol: &str, entry: &TickerEntry) -> Result<Snapshot, ProviderError> {
    // price24hPcnt is a fraction, our convention is percent units
    let change_fraction = parse_decimal(&entry.price_24h_pcnt, "price24hPcnt")?;
    let mut snapshot = Snapshot::ticker(
        symbol,
        parse_decimal(&entry.last_price, "lastPrice")?,
        parse_decimal(&entry.turnover_24h, "turnover24h")?,
        change_fraction * 100.0,
        current_timestamp(),
    );
    // The ticker already carries funding, no need for a second call later
    snapshot.funding_rate = funding_from_entry(entry)?;
    Ok(snapshot)
}

fn funding_from_entry(entry: &TickerEntry) -> Result<Option<f64>, ProviderError> {
    if entry.funding_rate.is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_decimal(&entry.funding_rate, "fundingRate")?))
}

/// Kline rows are `[startTime, open, high, low, close, volume, turnover]`,
/// all strings, newest candle first. Output is oldest first.
fn parse_klines(rows: &[Vec<String>]) -> Result<Vec<Candle>, ProviderError> {
    let mut candles = rows
        .iter()
        .map(|row| {
            if row.len() < 7 {
                return Err(decode_error(format!(
                    "kline row has {} fields, expected 7",
                    row.len()
                )));
            }
            let open_time_ms: i64 = row[0]
                .parse()
                .map_err(|_| decode_error(format!("startTime is not numeric: '{}'", row[0])))?;

            Ok(Candle {
                open_time: open_time_ms / 1_000,
                open: parse_decimal(&row[1], "open")?,
                high: parse_decimal(&row[2], "high")?,
                low: parse_decimal(&row[3], "low")?,
                close: parse_decimal(&row[4], "close")?,
                volume: parse_decimal(&row[5], "volume")?,
                quote_volume: parse_decimal(&row[6], "turnover")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    candles.reverse();
    Ok(candles)
}

fn parse_decimal(raw: &str, field: &str) -> Result<f64, ProviderError> {
    raw.parse()
        .map_err(|_| decode_error(format!("{field} is not numeric: '{raw}'")))
}

fn decode_error(detail: String) -> ProviderError {
    ProviderError::Decode {
        provider: PROVIDER,
        detail,
    }
}
