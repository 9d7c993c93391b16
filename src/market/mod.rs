//! # Market Data Access
//!
//! Exchange clients for perpetual futures data and the failover chain the
//! scanner reads through. All clients expose the same trait, so detection
//! logic never knows which venue a snapshot came from.
//!
//! ## Module Organization
//!
//! - `provider` - MarketDataProvider trait and the failover ProviderChain
//! - `binance` - Binance USDT-margined futures client
//! - `bybit` - Bybit linear perpetuals client (v5)

pub mod binance;
pub mod bybit;
pub mod provider;

pub use binance::BinanceFutures;
pub use bybit::BybitLinear;
pub use provider::{MarketDataProvider, ProviderChain, ProviderError};

use std::sync::Arc;

/// Assemble the provider chain from a priority list of provider names.
/// Unknown names are skipped with a warning so a typo disables one venue,
/// not the whole scanner.
pub fn build_chain(priority: &[String], client: &reqwest::Client) -> ProviderChain {
    let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();
    for name in priority {
        match name.as_str() {
            "binance" => providers.push(Arc::new(BinanceFutures::new(client.clone()))),
            "bybit" => providers.push(Arc::new(BybitLinear::new(client.clone()))),
            other => log::warn!("⚠️ Unknown market data provider '{}', skipping", other),
        }
    }
    ProviderChain::new(providers)
}
