use crate::events::BotEvent;
use crate::feeds::FeedRegistry;
use crate::trade_helper::{validate_grid_params, InstanceTemplate, TradeHelper};
use grid_trade_core::{
    BotError, BotResult, BotSetting, ExchangeVenue, InstanceId, Instrument, PositionRecord,
    PriceOracle, SettingsStore, TradeDirection, VenueEndpoints,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Instance and direction picked by a scan, handed back into dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSelection {
    pub instance_id: InstanceId,
    pub direction: TradeDirection,
    /// The limit level the scan saw crossed. Dispatch re-validates against
    /// the currently stored limit, not this snapshot.
    pub limit_price: Decimal,
}

/// What a dispatch did once the trigger was re-validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Condition no longer holds at the current price; nothing happened.
    Stale,
    IncreaseRequested,
    DecreaseRequested,
}

/// Fleet orchestrator: registers trading instances, activates them around
/// the oracle price, and runs the scan/dispatch automation pair.
///
/// Instances live behind their own lock; the fleet map itself is only locked
/// for resolution, so independent instances never contend.
pub struct BotManager {
    admin: String,
    venue: Arc<dyn ExchangeVenue>,
    settings: RwLock<Arc<SettingsStore>>,
    template: RwLock<InstanceTemplate>,
    instances: RwLock<HashMap<InstanceId, Arc<RwLock<TradeHelper>>>>,
    registry: RwLock<Vec<InstanceId>>,
    feeds: FeedRegistry,
    next_instance: AtomicU64,
    event_tx: broadcast::Sender<BotEvent>,
}

impl BotManager {
    /// Creates a manager bound to an initialized configuration store.
    ///
    /// # Errors
    /// Returns `BotError::State` if the store has not been initialized.
    pub fn new(
        admin: impl Into<String>,
        settings: Arc<SettingsStore>,
        venue: Arc<dyn ExchangeVenue>,
    ) -> BotResult<Self> {
        let endpoints = settings.get()?;
        tracing::info!("bot manager bound to venue router {}", endpoints.router);
        let (event_tx, _) = broadcast::channel(1024);
        Ok(Self {
            admin: admin.into(),
            venue,
            settings: RwLock::new(settings),
            template: RwLock::new(InstanceTemplate::default()),
            instances: RwLock::new(HashMap::new()),
            registry: RwLock::new(Vec::new()),
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

    fn ensure_admin(&self, caller: &str) -> BotResult<()> {
        if caller != self.admin {
            return Err(BotError::Authorization(
                "not the administrator".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves a registered instance.
    ///
    /// # Errors
    /// `BotError::Resource` if the id is not in the registry.
    pub async fn instance(
        &self,
        instance_id: InstanceId,
    ) -> BotResult<Arc<RwLock<TradeHelper>>> {
        self.instances
            .read()
            .await
            .get(&instance_id)
            .cloned()
            .ok_or_else(|| BotError::Resource("not a registered bot".to_string()))
    }

    /// Registers a new inactive instance and appends it to the registry.
    ///
    /// No funding check happens here; the instance must be funded before
    /// activation.
    ///
    /// # Errors
    /// `Validation` on zero leverage, grid size, or trading size.
    pub async fn register(
        &self,
        owner: impl Into<String>,
        instrument: Instrument,
        leverage: u32,
        grid_size: Decimal,
        trading_size: Decimal,
    ) -> BotResult<InstanceId> {
        validate_grid_params(leverage, grid_size, trading_size)?;
        let owner = owner.into();
        let instance_id = InstanceId(self.next_instance.fetch_add(1, Ordering::SeqCst));
        let template = self.template.read().await.clone();
        let helper = TradeHelper::new(
            instance_id,
            owner.clone(),
            instrument,
            leverage,
            grid_size,
            trading_size,
            self.venue.clone(),
            &template,
        );
        self.instances
            .write()
            .await
            .insert(instance_id, Arc::new(RwLock::new(helper)));
        self.registry.write().await.push(instance_id);
        tracing::info!("registered {} for {}", instance_id, owner);
        let _ = self.event_tx.send(BotEvent::BotInitialized { instance_id, owner });
        Ok(instance_id)
    }

    /// Credits collateral to an instance.
    ///
    /// # Errors
    /// `Resource` on an unknown instance, `Validation` on a non-positive
    /// amount.
    pub async fn deposit(&self, instance_id: InstanceId, amount: Decimal) -> BotResult<()> {
        let instance = self.instance(instance_id).await?;
        let mut helper = instance.write().await;
        helper.deposit(amount)
    }

    /// Activates an instance around the current oracle price.
    ///
    /// # Errors
    /// `Resource` if the instance is unknown or underfunded, `Authorization`
    /// if the caller is not its owner, `State` if already activated,
    /// `Validation` if no price feed is mapped for the instrument.
    pub async fn activate(&self, caller: &str, instance_id: InstanceId) -> BotResult<()> {
        let instance = self.instance(instance_id).await?;
        let mut helper = instance.write().await;
        if helper.setting().owner != caller {
            return Err(BotError::Authorization(
                "not the owner of the bot".to_string(),
            ));
        }
        let instrument = helper.setting().instrument.clone();
        let price = self.feeds.price(&instrument).await?;
        let (long_limit_price, short_limit_price) = helper.activate(price)?;
        let _ = self.event_tx.send(BotEvent::BotActivated {
            instance_id,
            instrument,
            long_limit_price,
            short_limit_price,
        });
        Ok(())
    }

    /// Scans the fleet, in registration order, for the first activated
    /// instance whose price has reached a limit.
    ///
    /// Read-only: repeated calls without an intervening dispatch never
    /// change state.
    ///
    /// # Errors
    /// `Venue` if a price feed read fails.
    pub async fn scan_triggers(&self) -> BotResult<Option<TriggerSelection>> {
        let order = self.registry.read().await.clone();
        for instance_id in order {
            let Ok(instance) = self.instance(instance_id).await else {
                continue;
            };
            let helper = instance.read().await;
            let setting = helper.setting();
            if !setting.is_activated {
                continue;
            }
            let price = self.feeds.price(&setting.instrument).await?;
            if price >= setting.long_limit_price {
                return Ok(Some(TriggerSelection {
                    instance_id,
                    direction: TradeDirection::Long,
                    limit_price: setting.long_limit_price,
                }));
            }
            if price <= setting.short_limit_price {
                return Ok(Some(TriggerSelection {
                    instance_id,
                    direction: TradeDirection::Short,
                    limit_price: setting.short_limit_price,
                }));
            }
        }
        Ok(None)
    }

    /// Acts on a trigger picked by an earlier scan.
    ///
    /// Price and limits may have moved between scan and dispatch, so the
    /// condition is re-validated under the instance lock before anything
    /// happens; a selection that no longer holds is dropped as
    /// [`DispatchOutcome::Stale`]. A valid trigger opens an increase request
    /// when the direction has no position, or a full take-profit decrease
    /// when it does, and then ratchets the fired limit one grid step.
    ///
    /// # Errors
    /// `Resource` on an unknown instance; request errors from the instance
    /// (for example an occupied pending slot) pass through unchanged.
    pub async fn dispatch_trigger(
        &self,
        selection: TriggerSelection,
    ) -> BotResult<DispatchOutcome> {
        let instance = self.instance(selection.instance_id).await?;
        let mut helper = instance.write().await;
        let setting = helper.setting().clone();
        if !setting.is_activated {
            return Ok(DispatchOutcome::Stale);
        }
        let price = self.feeds.price(&setting.instrument).await?;
        let crossed_limit = match selection.direction {
            TradeDirection::Long if price >= setting.long_limit_price => {
                setting.long_limit_price
            }
            TradeDirection::Short if price <= setting.short_limit_price => {
                setting.short_limit_price
            }
            _ => {
                tracing::debug!(
                    "{} {} trigger stale at price {}",
                    selection.instance_id,
                    selection.direction,
                    price
                );
                return Ok(DispatchOutcome::Stale);
            }
        };

        let outcome = if let Some(open) = helper.open_position(selection.direction).cloned() {
            // The ladder stepped one level past an open position: take profit.
            helper.request_decrease(
                selection.direction,
                open.collateral,
                open.size,
                crossed_limit,
            )?;
            DispatchOutcome::DecreaseRequested
        } else {
            let size_delta = setting.trading_size * Decimal::from(setting.leverage);
            helper
                .request_increase(
                    selection.direction,
                    setting.trading_size,
                    size_delta,
                    crossed_limit,
                )
                .await?;
            DispatchOutcome::IncreaseRequested
        };
        helper.ratchet_limit(selection.direction);

        if let Some(request) = helper.last_request(selection.direction) {
            let _ = self.event_tx.send(BotEvent::RequestCreated {
                instance_id: selection.instance_id,
                direction: request.direction,
                is_increase: request.is_increase,
                collateral_delta: request.collateral_delta,
                size_delta: request.size_delta,
                limit_trigger_price: request.limit_trigger_price,
            });
        }
        Ok(outcome)
    }

    /// Permissionless settlement entry point for keepers and fallback
    /// callers.
    ///
    /// # Errors
    /// `Resource` on an unknown instance; settlement errors from the
    /// instance pass through unchanged.
    pub async fn settle(
        &self,
        instance_id: InstanceId,
        direction: TradeDirection,
    ) -> BotResult<()> {
        let instance = self.instance(instance_id).await?;
        let mut helper = instance.write().await;
        let instrument = helper.setting().instrument.clone();
        let mark_price = self.feeds.price(&instrument).await?;
        helper.settle(direction, mark_price).await
    }

    /// Registered instance ids in registration order.
    #[must_use]
    pub async fn bot_list(&self) -> Vec<InstanceId> {
        self.registry.read().await.clone()
    }

    /// # Errors
    /// `Resource` on an unknown instance.
    pub async fn bot_setting(&self, instance_id: InstanceId) -> BotResult<BotSetting> {
        Ok(self.instance(instance_id).await?.read().await.setting().clone())
    }

    /// # Errors
    /// `Resource` on an unknown instance.
    pub async fn bot_positions(
        &self,
        instance_id: InstanceId,
    ) -> BotResult<Vec<PositionRecord>> {
        Ok(self
            .instance(instance_id)
            .await?
            .read()
            .await
            .position_records()
            .to_vec())
    }

    #[must_use]
    pub async fn price_feed(&self, asset: &str) -> Option<Arc<dyn PriceOracle>> {
        self.feeds.get(asset).await
    }

    /// Endpoint identities from the bound configuration store.
    ///
    /// # Errors
    /// `State` if the store reference was swapped for an uninitialized one.
    pub async fn venue_endpoints(&self) -> BotResult<VenueEndpoints> {
        Ok(self.settings.read().await.get()?.clone())
    }

    /// Replaces the per-instance defaults used by future registrations.
    ///
    /// # Errors
    /// `Authorization` unless called by the administrator.
    pub async fn set_instance_template(
        &self,
        caller: &str,
        template: InstanceTemplate,
    ) -> BotResult<()> {
        self.ensure_admin(caller)?;
        *self.template.write().await = template;
        Ok(())
    }

    /// Points the manager at a different, already initialized configuration
    /// store.
    ///
    /// # Errors
    /// `Authorization` unless called by the administrator; `State` if the
    /// store is uninitialized.
    pub async fn set_settings_store(
        &self,
        caller: &str,
        settings: Arc<SettingsStore>,
    ) -> BotResult<()> {
        self.ensure_admin(caller)?;
        settings.get()?;
        *self.settings.write().await = settings;
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
        self.ensure_admin(caller)?;
        let asset = asset.into();
        self.feeds.insert(asset.clone(), feed).await;
        tracing::info!("price feed updated for {}", asset);
        let _ = self.event_tx.send(BotEvent::PriceFeedUpdated { asset });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_trade_exchange_sim::{MockPriceFeed, SimulatedVenue};
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument::new("USDC", "WBTC")
    }

    fn endpoints() -> VenueEndpoints {
        VenueEndpoints {
            router: "router".to_string(),
            position_router: "position-router".to_string(),
            vault: "vault".to_string(),
        }
    }

    fn initialized_store() -> Arc<SettingsStore> {
        let store = Arc::new(SettingsStore::new());
        store.initialize(endpoints()).unwrap();
        store
    }

    async fn fixture(price: Decimal) -> (BotManager, Arc<MockPriceFeed>, Arc<SimulatedVenue>) {
        let feed = Arc::new(MockPriceFeed::new(8, price));
        let venue = Arc::new(SimulatedVenue::new(feed.clone()));
        let manager = BotManager::new("admin", initialized_store(), venue.clone()).unwrap();
        manager
            .set_price_feed("admin", "WBTC", feed.clone())
            .await
            .unwrap();
        (manager, feed, venue)
    }

    async fn registered_bot(manager: &BotManager) -> InstanceId {
        manager
            .register("owner", instrument(), 10, dec!(100), dec!(10))
            .await
            .unwrap()
    }

    async fn activated_bot(manager: &BotManager) -> InstanceId {
        let instance_id = registered_bot(manager).await;
        manager.deposit(instance_id, dec!(1000)).await.unwrap();
        manager.activate("owner", instance_id).await.unwrap();
        instance_id
    }

    #[test]
    fn construction_requires_initialized_settings() {
        let feed = Arc::new(MockPriceFeed::new(8, dec!(1000)));
        let venue = Arc::new(SimulatedVenue::new(feed));
        let result = BotManager::new("admin", Arc::new(SettingsStore::new()), venue);
        assert!(matches!(result, Err(BotError::State(_))));
    }

    #[tokio::test]
    async fn register_appends_to_the_registry() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        registered_bot(&manager).await;
        assert_eq!(manager.bot_list().await.len(), 1);
    }

    #[tokio::test]
    async fn register_rejects_zero_grid() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        let result = manager
            .register("owner", instrument(), 10, Decimal::ZERO, dec!(10))
            .await;
        assert!(matches!(result, Err(BotError::Validation(_))));
    }

    #[tokio::test]
    async fn activation_initializes_the_limit_prices() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        let mut events = manager.subscribe();
        let instance_id = activated_bot(&manager).await;

        let setting = manager.bot_setting(instance_id).await.unwrap();
        assert!(setting.is_activated);
        assert_eq!(setting.long_limit_price, dec!(1100));
        assert_eq!(setting.short_limit_price, dec!(900));
        assert_eq!(setting.limit_spread(), dec!(200));

        // Registration event first, then the activation with both limits.
        assert!(matches!(
            events.recv().await.unwrap(),
            BotEvent::BotInitialized { .. }
        ));
        match events.recv().await.unwrap() {
            BotEvent::BotActivated {
                long_limit_price,
                short_limit_price,
                ..
            } => {
                assert_eq!(long_limit_price, dec!(1100));
                assert_eq!(short_limit_price, dec!(900));
            }
            other => panic!("expected activation event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn activation_is_one_shot() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = activated_bot(&manager).await;

        let second = manager.activate("owner", instance_id).await;
        assert!(matches!(second, Err(BotError::State(_))));
    }

    #[tokio::test]
    async fn activation_rejects_non_owner() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = registered_bot(&manager).await;
        manager.deposit(instance_id, dec!(1000)).await.unwrap();

        let result = manager.activate("bad-actor", instance_id).await;
        assert!(matches!(result, Err(BotError::Authorization(_))));
    }

    #[tokio::test]
    async fn activation_rejects_unregistered_instance() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        let result = manager.activate("owner", InstanceId(99)).await;
        assert!(matches!(result, Err(BotError::Resource(_))));
    }

    #[tokio::test]
    async fn activation_rejects_underfunded_instance() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = registered_bot(&manager).await;

        let result = manager.activate("owner", instance_id).await;
        assert!(matches!(result, Err(BotError::Resource(_))));
    }

    #[tokio::test]
    async fn activation_requires_a_price_feed() {
        let feed = Arc::new(MockPriceFeed::new(8, dec!(1000)));
        let venue = Arc::new(SimulatedVenue::new(feed));
        let manager = BotManager::new("admin", initialized_store(), venue).unwrap();
        let instance_id = registered_bot(&manager).await;
        manager.deposit(instance_id, dec!(1000)).await.unwrap();

        let result = manager.activate("owner", instance_id).await;
        assert!(matches!(result, Err(BotError::Validation(_))));
    }

    #[tokio::test]
    async fn scan_reports_nothing_between_the_limits() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;
        activated_bot(&manager).await;

        assert!(manager.scan_triggers().await.unwrap().is_none());
        feed.update_answer(dec!(1050)).await;
        assert!(manager.scan_triggers().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_reports_a_trigger_at_or_past_a_limit() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = activated_bot(&manager).await;

        feed.update_answer(dec!(1100)).await;
        let selection = manager.scan_triggers().await.unwrap().unwrap();
        assert_eq!(selection.instance_id, instance_id);
        assert_eq!(selection.direction, TradeDirection::Long);
        assert_eq!(selection.limit_price, dec!(1100));

        feed.update_answer(dec!(850)).await;
        let selection = manager.scan_triggers().await.unwrap().unwrap();
        assert_eq!(selection.direction, TradeDirection::Short);
        assert_eq!(selection.limit_price, dec!(900));
    }

    #[tokio::test]
    async fn repeated_scans_never_change_state() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = activated_bot(&manager).await;
        feed.update_answer(dec!(1200)).await;

        let before = manager.bot_setting(instance_id).await.unwrap();
        for _ in 0..5 {
            manager.scan_triggers().await.unwrap().unwrap();
        }
        let after = manager.bot_setting(instance_id).await.unwrap();
        assert_eq!(before.long_limit_price, after.long_limit_price);
        assert_eq!(before.short_limit_price, after.short_limit_price);

        let instance = manager.instance(instance_id).await.unwrap();
        assert!(instance
            .read()
            .await
            .pending_request(TradeDirection::Long)
            .is_none());
    }

    #[tokio::test]
    async fn dispatch_opens_a_request_at_the_crossed_level() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = activated_bot(&manager).await;

        // Price gaps past the limit; the request still carries the level.
        feed.update_answer(dec!(1200)).await;
        let selection = manager.scan_triggers().await.unwrap().unwrap();
        let outcome = manager.dispatch_trigger(selection).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::IncreaseRequested);

        let instance = manager.instance(instance_id).await.unwrap();
        let helper = instance.read().await;
        let request = helper.last_request(TradeDirection::Long).unwrap();
        assert!(request.is_increase);
        assert!(!request.executed);
        assert_eq!(request.limit_trigger_price, dec!(1100));
        assert_eq!(request.collateral_delta, dec!(10));
        assert_eq!(request.size_delta, dec!(100));
    }

    #[tokio::test]
    async fn dispatch_ratchets_the_fired_limit() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = activated_bot(&manager).await;

        feed.update_answer(dec!(1200)).await;
        let selection = manager.scan_triggers().await.unwrap().unwrap();
        manager.dispatch_trigger(selection).await.unwrap();

        let setting = manager.bot_setting(instance_id).await.unwrap();
        assert_eq!(setting.long_limit_price, dec!(1200));
        // The other side does not move.
        assert_eq!(setting.short_limit_price, dec!(900));
    }

    #[tokio::test]
    async fn dispatch_drops_a_stale_selection() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;
        let instance_id = activated_bot(&manager).await;

        feed.update_answer(dec!(1100)).await;
        let selection = manager.scan_triggers().await.unwrap().unwrap();

        // Price falls back inside the grid before dispatch runs.
        feed.update_answer(dec!(1000)).await;
        let outcome = manager.dispatch_trigger(selection).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Stale);

        let instance = manager.instance(instance_id).await.unwrap();
        assert!(instance
            .read()
            .await
            .pending_request(TradeDirection::Long)
            .is_none());
        let setting = manager.bot_setting(instance_id).await.unwrap();
        assert_eq!(setting.long_limit_price, dec!(1100));
    }

    #[tokio::test]
    async fn admin_surface_rejects_other_callers() {
        let (manager, feed, _venue) = fixture(dec!(1000)).await;

        let result = manager
            .set_price_feed("bad-actor", "WETH", feed.clone())
            .await;
        assert!(matches!(result, Err(BotError::Authorization(_))));

        let result = manager
            .set_instance_template("bad-actor", InstanceTemplate::default())
            .await;
        assert!(matches!(result, Err(BotError::Authorization(_))));
    }

    #[tokio::test]
    async fn settings_store_reference_can_be_replaced_once_initialized() {
        let (manager, _feed, _venue) = fixture(dec!(1000)).await;

        let uninitialized = Arc::new(SettingsStore::new());
        let result = manager.set_settings_store("admin", uninitialized).await;
        assert!(matches!(result, Err(BotError::State(_))));

        manager
            .set_settings_store("admin", initialized_store())
            .await
            .unwrap();
        assert_eq!(manager.venue_endpoints().await.unwrap(), endpoints());
    }
}
