use chrono::{Duration, Utc};
use grid_trade_core::{
    BotError, BotResult, BotSetting, DecreaseParams, ExchangeVenue, IncreaseParams, InstanceId,
    Instrument, PositionRecord, PositionRequest, TradeDirection, VenuePosition,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-instance defaults applied at registration time.
#[derive(Debug, Clone)]
pub struct InstanceTemplate {
    /// Delay after which a pending request may be settled by any caller.
    pub execution_delay: Duration,
}

impl Default for InstanceTemplate {
    fn default() -> Self {
        Self {
            execution_delay: Duration::seconds(180),
        }
    }
}

pub(crate) fn validate_grid_params(
    leverage: u32,
    grid_size: Decimal,
    trading_size: Decimal,
) -> BotResult<()> {
    if leverage == 0 {
        return Err(BotError::Validation("leverage must be positive".to_string()));
    }
    if grid_size <= Decimal::ZERO || trading_size <= Decimal::ZERO {
        return Err(BotError::Validation(
            "grid size and trading size must be positive".to_string(),
        ));
    }
    Ok(())
}

/// One trading instance: grid settings, balances, request history, and the
/// position records the fleet registries read back.
///
/// Every mutating method is all-or-nothing: validation happens before any
/// internal state changes. Callers must serialize access through the
/// instance lock; the per-direction pending slot assumes it.
pub struct TradeHelper {
    account: String,
    setting: BotSetting,
    balance: Decimal,
    margin_balance: Decimal,
    requests: HashMap<TradeDirection, Vec<PositionRequest>>,
    records: Vec<PositionRecord>,
    venue: Arc<dyn ExchangeVenue>,
    execution_delay: Duration,
}

impl TradeHelper {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: InstanceId,
        owner: String,
        instrument: Instrument,
        leverage: u32,
        grid_size: Decimal,
        trading_size: Decimal,
        venue: Arc<dyn ExchangeVenue>,
        template: &InstanceTemplate,
    ) -> Self {
        Self {
            account: instance_id.to_string(),
            setting: BotSetting {
                owner,
                instrument,
                leverage,
                grid_size,
                trading_size,
                long_limit_price: Decimal::ZERO,
                short_limit_price: Decimal::ZERO,
                is_activated: false,
                instance_id,
            },
            balance: Decimal::ZERO,
            margin_balance: Decimal::ZERO,
            requests: HashMap::new(),
            records: Vec::new(),
            venue,
            execution_delay: template.execution_delay,
        }
    }

    /// Credits collateral to the instance.
    ///
    /// # Errors
    /// Returns `BotError::Validation` if `amount` is not positive.
    pub fn deposit(&mut self, amount: Decimal) -> BotResult<()> {
        if amount <= Decimal::ZERO {
            return Err(BotError::Validation("deposit must be positive".to_string()));
        }
        self.balance += amount;
        Ok(())
    }

    /// Activates the instance around the given oracle price and returns the
    /// initial `(long_limit_price, short_limit_price)` pair.
    ///
    /// # Errors
    /// `BotError::State` if already activated; `BotError::Resource` if the
    /// collateral balance is below the configured trading size.
    pub fn activate(&mut self, oracle_price: Decimal) -> BotResult<(Decimal, Decimal)> {
        if self.setting.is_activated {
            return Err(BotError::State("bot already activated".to_string()));
        }
        if self.balance < self.setting.trading_size {
            return Err(BotError::Resource("bot has not enough funds".to_string()));
        }
        self.setting.long_limit_price = oracle_price + self.setting.grid_size;
        self.setting.short_limit_price = oracle_price - self.setting.grid_size;
        self.setting.is_activated = true;
        tracing::info!(
            "{} activated: long limit {}, short limit {}",
            self.account,
            self.setting.long_limit_price,
            self.setting.short_limit_price
        );
        Ok((
            self.setting.long_limit_price,
            self.setting.short_limit_price,
        ))
    }

    /// Opens a pending increase request for `direction`.
    ///
    /// The request is only recorded here; it reaches the venue when a keeper
    /// or the timeout fallback settles it.
    ///
    /// # Errors
    /// `Validation` on non-positive amounts, `State` if a request for the
    /// direction is already pending, `Resource` if the balance cannot cover
    /// the collateral.
    pub async fn request_increase(
        &mut self,
        direction: TradeDirection,
        collateral_amount: Decimal,
        size_delta: Decimal,
        limit_trigger_price: Decimal,
    ) -> BotResult<()> {
        if collateral_amount <= Decimal::ZERO {
            return Err(BotError::Validation(
                "collateral amount must be positive".to_string(),
            ));
        }
        if size_delta <= Decimal::ZERO {
            return Err(BotError::Validation("size delta must be positive".to_string()));
        }
        if self.pending_request(direction).is_some() {
            return Err(BotError::State(format!(
                "a {} request is already pending",
                direction
            )));
        }
        if collateral_amount > self.balance {
            return Err(BotError::Resource("bot has not enough funds".to_string()));
        }

        // Long positions are margined in the index asset; swap before the
        // request is recorded.
        if direction.is_long() {
            self.convert_to_margin_asset(collateral_amount).await?;
        } else {
            self.balance -= collateral_amount;
        }

        let now = Utc::now();
        self.requests.entry(direction).or_default().push(PositionRequest {
            direction,
            is_increase: true,
            collateral_delta: collateral_amount,
            size_delta,
            limit_trigger_price,
            created_at: now,
            deadline: now + self.execution_delay,
            executed: false,
        });
        tracing::info!(
            "{} pending increase: {} {} @ trigger {}",
            self.account,
            direction,
            size_delta,
            limit_trigger_price
        );
        Ok(())
    }

    /// Opens a pending decrease request for `direction`. The deltas may be a
    /// partial or exact-full reduction of the open position.
    ///
    /// # Errors
    /// `State` if a request is already pending or no position is open;
    /// `Validation` if the deltas are non-positive or exceed the position.
    pub fn request_decrease(
        &mut self,
        direction: TradeDirection,
        collateral_delta: Decimal,
        size_delta: Decimal,
        limit_trigger_price: Decimal,
    ) -> BotResult<()> {
        if collateral_delta < Decimal::ZERO || size_delta <= Decimal::ZERO {
            return Err(BotError::Validation(
                "decrease deltas must be positive".to_string(),
            ));
        }
        if self.pending_request(direction).is_some() {
            return Err(BotError::State(format!(
                "a {} request is already pending",
                direction
            )));
        }
        let Some(open) = self.open_position(direction) else {
            return Err(BotError::State(format!("no open {} position", direction)));
        };
        if size_delta > open.size || collateral_delta > open.collateral {
            return Err(BotError::Validation(
                "decrease exceeds open position".to_string(),
            ));
        }

        let now = Utc::now();
        self.requests.entry(direction).or_default().push(PositionRequest {
            direction,
            is_increase: false,
            collateral_delta,
            size_delta,
            limit_trigger_price,
            created_at: now,
            deadline: now + self.execution_delay,
            executed: false,
        });
        tracing::info!(
            "{} pending decrease: {} {} @ trigger {}",
            self.account,
            direction,
            size_delta,
            limit_trigger_price
        );
        Ok(())
    }

    /// Settles the pending request for `direction` and records the outcome.
    ///
    /// Permissionless: a keeper normally fulfills the venue side on its own,
    /// in which case this call only records the result, no matter how early
    /// it comes. When the keeper has not acted, any caller may force
    /// execution once the request deadline has passed.
    ///
    /// # Errors
    /// `State` if no request is pending, or if the deadline has not passed
    /// and the venue has not settled independently.
    pub async fn settle(
        &mut self,
        direction: TradeDirection,
        mark_price: Decimal,
    ) -> BotResult<()> {
        let Some(request) = self.pending_request(direction).cloned() else {
            return Err(BotError::State(format!("no pending {} request", direction)));
        };

        let position = self
            .venue
            .current_position(&self.account, &self.setting.instrument, direction)
            .await?;
        let venue_settled = position
            .last_update
            .is_some_and(|updated| updated >= request.created_at);

        let position = if venue_settled {
            position
        } else {
            if !request.is_due(Utc::now()) {
                return Err(BotError::State(format!(
                    "{} request not due until {}",
                    direction, request.deadline
                )));
            }
            if request.is_increase {
                self.venue
                    .submit_increase(IncreaseParams {
                        account: self.account.clone(),
                        instrument: self.setting.instrument.clone(),
                        direction,
                        collateral_delta: request.collateral_delta,
                        size_delta: request.size_delta,
                        acceptable_price: request.limit_trigger_price,
                    })
                    .await?;
            } else {
                self.venue
                    .submit_decrease(DecreaseParams {
                        account: self.account.clone(),
                        instrument: self.setting.instrument.clone(),
                        direction,
                        collateral_delta: request.collateral_delta,
                        size_delta: request.size_delta,
                        acceptable_price: request.limit_trigger_price,
                    })
                    .await?;
            }
            self.venue
                .current_position(&self.account, &self.setting.instrument, direction)
                .await?
        };

        if request.is_increase {
            self.records.push(PositionRecord {
                instrument: self.setting.instrument.clone(),
                direction,
                entry_price: position.avg_entry_price,
                exit_price: None,
                size: request.size_delta,
                collateral: request.collateral_delta,
                opened_at: Utc::now(),
                closed_at: None,
            });
        } else {
            let Some(record) = self
                .records
                .iter_mut()
                .rev()
                .find(|record| record.direction == direction && record.is_open())
            else {
                return Err(BotError::State(format!(
                    "no open {} position to settle",
                    direction
                )));
            };
            record.size -= request.size_delta.min(record.size);
            record.exit_price = Some(mark_price);
            if record.size.is_zero() {
                record.closed_at = Some(Utc::now());
            }
            // Margin comes back to the collateral balance at face value;
            // realized PnL stays on the venue side.
            self.balance += request.collateral_delta;
        }

        if let Some(stored) = self
            .requests
            .get_mut(&direction)
            .and_then(|history| history.last_mut())
        {
            stored.executed = true;
        }
        tracing::info!(
            "{} settled {} {}",
            self.account,
            if request.is_increase { "increase" } else { "decrease" },
            direction
        );
        Ok(())
    }

    /// Swaps held collateral into the instrument's index asset.
    ///
    /// # Errors
    /// `Validation` if `amount` is not positive or exceeds the balance;
    /// `Venue` if the swap fails.
    pub async fn convert_to_margin_asset(&mut self, amount: Decimal) -> BotResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(BotError::Validation(
                "swap amount must be positive".to_string(),
            ));
        }
        if amount > self.balance {
            return Err(BotError::Validation(
                "swap amount exceeds balance".to_string(),
            ));
        }
        let amount_out = self
            .venue
            .swap_to_margin(&self.setting.instrument, amount)
            .await?;
        self.balance -= amount;
        self.margin_balance += amount_out;
        Ok(amount_out)
    }

    /// Moves the fired direction's limit one grid step past the crossed
    /// level, so the ladder has to be walked another step before the next
    /// trigger.
    pub(crate) fn ratchet_limit(&mut self, direction: TradeDirection) {
        match direction {
            TradeDirection::Long => self.setting.long_limit_price += self.setting.grid_size,
            TradeDirection::Short => self.setting.short_limit_price -= self.setting.grid_size,
        }
    }

    #[must_use]
    pub fn setting(&self) -> &BotSetting {
        &self.setting
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    #[must_use]
    pub fn margin_balance(&self) -> Decimal {
        self.margin_balance
    }

    /// Most recent request for the direction, settled or not.
    #[must_use]
    pub fn last_request(&self, direction: TradeDirection) -> Option<&PositionRequest> {
        self.requests.get(&direction).and_then(|history| history.last())
    }

    /// The unexecuted request occupying the direction's pending slot.
    #[must_use]
    pub fn pending_request(&self, direction: TradeDirection) -> Option<&PositionRequest> {
        self.last_request(direction).filter(|request| !request.executed)
    }

    #[must_use]
    pub fn position_record(&self, index: usize) -> Option<&PositionRecord> {
        self.records.get(index)
    }

    #[must_use]
    pub fn position_records(&self) -> &[PositionRecord] {
        &self.records
    }

    /// Open (not yet fully closed) record for the direction, if any.
    #[must_use]
    pub fn open_position(&self, direction: TradeDirection) -> Option<&PositionRecord> {
        self.records
            .iter()
            .rev()
            .find(|record| record.direction == direction && record.is_open())
    }

    /// Live venue view of the direction's position.
    ///
    /// # Errors
    /// `Venue` if the query fails.
    pub async fn current_position(
        &self,
        direction: TradeDirection,
    ) -> BotResult<VenuePosition> {
        Ok(self
            .venue
            .current_position(&self.account, &self.setting.instrument, direction)
            .await?)
    }
}
