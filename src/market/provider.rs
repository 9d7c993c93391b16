//! Market data provider abstraction.
//!
//! Each exchange client implements [`MarketDataProvider`]; the scan cycle
//! talks to a [`ProviderChain`] that walks the configured providers in
//! priority order and serves the first answer. A symbol an exchange does not
//! list is an expected condition, not a failure of the chain.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::detector_core::{Candle, Snapshot, Timeframe};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned status {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("{provider} response could not be decoded: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} has no market for {symbol}")]
    UnknownSymbol {
        provider: &'static str,
        symbol: String,
    },

    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("all providers failed for {symbol}")]
    Exhausted { symbol: String },
}

/// Read-only access to one exchange's futures market data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ticker-level snapshot: last price, 24h turnover and 24h percent
    /// change. Candle series and funding rate are enriched separately by
    /// the cycle, only for symbols that need them.
    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, ProviderError>;

    /// Most recent `limit` candles, oldest first, the last one still forming.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Current funding rate as a signed fraction (0.0001 = 0.01%). `None`
    /// when the venue does not expose one for the symbol.
    async fn fetch_funding_rate(&self, symbol: &str) -> Result<Option<f64>, ProviderError>;

    /// Whether the venue lists the symbol at all.
    async fn has_symbol(&self, symbol: &str) -> Result<bool, ProviderError> {
        match self.fetch_snapshot(symbol).await {
            Ok(_) => Ok(true),
            Err(ProviderError::UnknownSymbol { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Providers tried in priority order; the first success wins. Only when
/// every provider fails does the chain report the symbol as unavailable
/// for this cycle.
pub struct ProviderChain {
    providers: Vec<Arc<dyn MarketDataProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn log_miss(&self, symbol: &str, provider: &'static str, err: &ProviderError) {
        match err {
            ProviderError::UnknownSymbol { .. } => {
                log::debug!("{} does not list {}", provider, symbol);
            }
            other => {
                log::warn!("⚠️ {} failed for {}: {}", provider, symbol, other);
            }
        }
    }

    fn exhausted(&self, symbol: &str) -> ProviderError {
        ProviderError::Exhausted {
            symbol: symbol.to_string(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for ProviderChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, ProviderError> {
        for provider in &self.providers {
            match provider.fetch_snapshot(symbol).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => self.log_miss(symbol, provider.name(), &err),
            }
        }
        Err(self.exhausted(symbol))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        for provider in &self.providers {
            match provider.fetch_candles(symbol, timeframe, limit).await {
                Ok(candles) => return Ok(candles),
                Err(err) => self.log_miss(symbol, provider.name(), &err),
            }
        }
        Err(self.exhausted(symbol))
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        for provider in &self.providers {
            match provider.fetch_funding_rate(symbol).await {
                Ok(rate) => return Ok(rate),
                Err(err) => self.log_miss(symbol, provider.name(), &err),
            }
        }
        Err(self.exhausted(symbol))
    }

    /// Listed anywhere in the chain counts as listed. A venue that errors
    /// during the check is skipped rather than failing the whole answer.
    async fn has_symbol(&self, symbol: &str) -> Result<bool, ProviderError> {
        for provider in &self.providers {
            match provider.has_symbol(symbol).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => self.log_miss(symbol, provider.name(), &err),
            }
        }
        Ok(false)
    }
}
