use crate::events::BotEvent;
use crate::feeds::FeedRegistry;
use crate::trade_helper::{validate_grid_params, InstanceTemplate, TradeHelper};
use grid_trade_core::{
    BotError, BotResult, BotSetting, ExchangeVenue, InstanceId, Instrument, PriceOracle,
    SettingsStore,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Registry key of the router facade: one instance per owner and instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotKey {
    pub owner: String,
    pub instrument: Instrument,
}

/// Alternate fleet registry keyed by `(owner, instrument)` instead of a flat
/// instance list. Registration and activation carry the same contracts as
/// [`crate::BotManager`], plus a uniqueness invariant on the key.
pub struct Router {
    admin: String,
    venue: Arc<dyn ExchangeVenue>,
    template: InstanceTemplate,
    instances: RwLock<HashMap<BotKey, Arc<RwLock<TradeHelper>>>>,
    key_list: RwLock<Vec<BotKey>>,
    feeds: FeedRegistry,
    next_instance: AtomicU64,
    event_tx: broadcast::Sender<BotEvent>,
}

impl Router {
    /// Creates a router bound to an initialized configuration store.
    ///
    /// # Errors
    /// Returns `BotError::State` if the store has not been initialized.
    pub fn new(
        admin: impl Into<String>,
        settings: Arc<SettingsStore>,
        venue: Arc<dyn ExchangeVenue>,
    ) -> BotResult<Self> {
        settings.get()?;
        let (event_tx, _) = broadcast::channel(1024);
        Ok(Self {
            admin: admin.into(),
            venue,
            template: InstanceTemplate::default(),
            instances: RwLock::new(HashMap::new()),
            key_list: RwLock::new(Vec::new()),
            feeds: FeedRegistry::new(),
            next_instance: AtomicU64::new(1),
            event_tx,
        })
    }

    /// Subscribes to fleet events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.event_tx.subscribe()
    }

    /// Registers a bot for `(owner, instrument)`.
    ///
    /// # Errors
    /// `Validation` if the key is already registered or the grid parameters
    /// are out of range.
    pub async fn register(
        &self,
        owner: impl Into<String>,
        instrument: Instrument,
        leverage: u32,
        grid_size: Decimal,
        trading_size: Decimal,
    ) -> BotResult<BotKey> {
        validate_grid_params(leverage, grid_size, trading_size)?;
        let key = BotKey {
            owner: owner.into(),
            instrument: instrument.clone(),
        };
        let mut instances = self.instances.write().await;
        if instances.contains_key(&key) {
            return Err(BotError::Validation("bot already exists".to_string()));
        }
        let instance_id = InstanceId(self.next_instance.fetch_add(1, Ordering::SeqCst));
        let helper = TradeHelper::new(
            instance_id,
            key.owner.clone(),
            instrument,
            leverage,
            grid_size,
            trading_size,
            self.venue.clone(),
            &self.template,
        );
        instances.insert(key.clone(), Arc::new(RwLock::new(helper)));
        drop(instances);
        self.key_list.write().await.push(key.clone());
        tracing::info!("registered {} for {}", instance_id, key.owner);
        let _ = self.event_tx.send(BotEvent::BotInitialized {
            instance_id,
            owner: key.owner.clone(),
        });
        Ok(key)
    }

    /// Credits collateral to the instance behind `key`.
    ///
    /// # Errors
    /// `Resource` on an unknown key, `Validation` on a non-positive amount.
    pub async fn deposit(&self, key: &BotKey, amount: Decimal) -> BotResult<()> {
        let instance = self.instance(key).await?;
        let mut helper = instance.write().await;
        helper.deposit(amount)
    }

    /// Activates the instance behind `key` around the current oracle price.
    ///
    /// # Errors
    /// Same contract as [`crate::BotManager::activate`].
    pub async fn activate(&self, caller: &str, key: &BotKey) -> BotResult<()> {
        let instance = self.instance(key).await?;
        if caller != key.owner {
            return Err(BotError::Authorization(
                "not the owner of the bot".to_string(),
            ));
        }
        let mut helper = instance.write().await;
        let price = self.feeds.price(&key.instrument).await?;
        let (long_limit_price, short_limit_price) = helper.activate(price)?;
        let instance_id = helper.setting().instance_id;
        let _ = self.event_tx.send(BotEvent::BotActivated {
            instance_id,
            instrument: key.instrument.clone(),
            long_limit_price,
            short_limit_price,
        });
        Ok(())
    }

    /// Maps an index asset to its price feed.
    ///
    /// # Errors
    /// `Authorization` unless called by the administrator.
    pub async fn set_price_feed(
        &self,
        caller: &str,
        asset: impl Into<String>,
        feed: Arc<dyn PriceOracle>,
    ) -> BotResult<()> {
        if caller != self.admin {
            return Err(BotError::Authorization(
                "not the administrator".to_string(),
            ));
        }
        let asset = asset.into();
        self.feeds.insert(asset.clone(), feed).await;
        let _ = self.event_tx.send(BotEvent::PriceFeedUpdated { asset });
        Ok(())
    }

    #[must_use]
    pub async fn price_feed(&self, asset: &str) -> Option<Arc<dyn PriceOracle>> {
        self.feeds.get(asset).await
    }

    /// Registered keys in registration order.
    #[must_use]
    pub async fn bot_key_list(&self) -> Vec<BotKey> {
        self.key_list.read().await.clone()
    }

    /// # Errors
    /// `Resource` on an unknown key.
    pub async fn bot_setting(&self, key: &BotKey) -> BotResult<BotSetting> {
        Ok(self.instance(key).await?.read().await.setting().clone())
    }

    async fn instance(&self, key: &BotKey) -> BotResult<Arc<RwLock<TradeHelper>>> {
        self.instances
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BotError::Resource("not a registered bot".to_string()))
    }
}
