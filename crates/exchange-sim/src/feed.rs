use anyhow::Result;
use async_trait::async_trait;
use grid_trade_core::{Instrument, PriceOracle, PriceQuote};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

/// Settable price feed with a fixed decimal precision.
///
/// One feed serves one index asset, aggregator style; the registry maps
/// assets to feeds, so the instrument argument is not interpreted here.
pub struct MockPriceFeed {
    decimals: u32,
    answer: RwLock<Decimal>,
}

impl MockPriceFeed {
    #[must_use]
    pub fn new(decimals: u32, initial_answer: Decimal) -> Self {
        Self {
            decimals,
            answer: RwLock::new(initial_answer),
        }
    }

    /// Replaces the reported price.
    pub async fn update_answer(&self, answer: Decimal) {
        *self.answer.write().await = answer;
    }

    #[must_use]
    pub const fn decimals(&self) -> u32 {
        self.decimals
    }
}

#[async_trait]
impl PriceOracle for MockPriceFeed {
    async fn latest_price(&self, _instrument: &Instrument) -> Result<PriceQuote> {
        Ok(PriceQuote {
            price: *self.answer.read().await,
            decimals: self.decimals,
        })
    }
}
