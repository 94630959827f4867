use grid_trade_core::{BotError, BotResult, Instrument, PriceOracle};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-index-asset price feed mapping shared by both fleet registries.
pub(crate) struct FeedRegistry {
    feeds: RwLock<HashMap<String, Arc<dyn PriceOracle>>>,
}

impl FeedRegistry {
    pub(crate) fn new() -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn insert(&self, asset: String, feed: Arc<dyn PriceOracle>) {
        self.feeds.write().await.insert(asset, feed);
    }

    pub(crate) async fn get(&self, asset: &str) -> Option<Arc<dyn PriceOracle>> {
        self.feeds.read().await.get(asset).cloned()
    }

    /// Fresh price for the instrument's index asset; never cached.
    pub(crate) async fn price(&self, instrument: &Instrument) -> BotResult<Decimal> {
        let feed = self.get(&instrument.index_asset).await.ok_or_else(|| {
            BotError::Validation(format!("no price feed for {}", instrument.index_asset))
        })?;
        Ok(feed.latest_price(instrument).await?.price)
    }
}
