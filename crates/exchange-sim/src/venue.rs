use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use grid_trade_core::{
    DecreaseParams, ExchangeVenue, IncreaseParams, Instrument, PriceOracle, RequestId,
    TradeDirection, VenuePosition,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type PositionKey = (String, Instrument, TradeDirection);

/// Venue that fills every submission immediately at the oracle price.
///
/// Stands in for the live venue together with its keeper network: a
/// submission is applied in the same call, so a direct `submit_*` from a
/// test doubles as keeper fulfillment. Makes zero network calls.
pub struct SimulatedVenue {
    oracle: Arc<dyn PriceOracle>,
    positions: RwLock<HashMap<PositionKey, VenuePosition>>,
    next_request: AtomicU64,
}

impl SimulatedVenue {
    #[must_use]
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            oracle,
            positions: RwLock::new(HashMap::new()),
            next_request: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(format!("sim-{}", self.next_request.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl ExchangeVenue for SimulatedVenue {
    async fn submit_increase(&self, params: IncreaseParams) -> Result<RequestId> {
        if params.size_delta <= Decimal::ZERO {
            bail!("increase size must be positive");
        }
        let quote = self.oracle.latest_price(&params.instrument).await?;
        let mut positions = self.positions.write().await;
        let key = (params.account.clone(), params.instrument.clone(), params.direction);
        let position = positions.entry(key).or_default();

        // Size-weighted average entry across successive increases.
        let total = position.size + params.size_delta;
        position.avg_entry_price = if position.size.is_zero() {
            quote.price
        } else {
            (position.avg_entry_price * position.size + quote.price * params.size_delta) / total
        };
        position.size = total;
        position.collateral += params.collateral_delta;
        position.last_update = Some(Utc::now());

        let request_id = self.next_request_id();
        tracing::debug!(
            "sim venue filled increase {} for {} {} {} @ {}",
            request_id.0,
            params.account,
            params.direction,
            params.instrument,
            quote.price
        );
        Ok(request_id)
    }

    async fn submit_decrease(&self, params: DecreaseParams) -> Result<RequestId> {
        if params.size_delta <= Decimal::ZERO {
            bail!("decrease size must be positive");
        }
        let quote = self.oracle.latest_price(&params.instrument).await?;
        let mut positions = self.positions.write().await;
        let key = (params.account.clone(), params.instrument.clone(), params.direction);
        let Some(position) = positions.get_mut(&key) else {
            bail!("no open position for {} {}", params.account, params.instrument);
        };
        if params.size_delta > position.size {
            bail!(
                "decrease exceeds open size: {} > {}",
                params.size_delta,
                position.size
            );
        }

        // Realized PnL on the closed portion; short positions mirror the move.
        let entry = position.avg_entry_price;
        if !entry.is_zero() {
            let move_pct = (quote.price - entry) / entry;
            let pnl = match params.direction {
                TradeDirection::Long => params.size_delta * move_pct,
                TradeDirection::Short => -(params.size_delta * move_pct),
            };
            position.realized_pnl += pnl;
        }
        position.size -= params.size_delta;
        position.collateral -= params.collateral_delta.min(position.collateral);
        if position.size.is_zero() {
            position.avg_entry_price = Decimal::ZERO;
        }
        position.last_update = Some(Utc::now());

        let request_id = self.next_request_id();
        tracing::debug!(
            "sim venue filled decrease {} for {} {} {} @ {}",
            request_id.0,
            params.account,
            params.direction,
            params.instrument,
            quote.price
        );
        Ok(request_id)
    }

    async fn current_position(
        &self,
        account: &str,
        instrument: &Instrument,
        direction: TradeDirection,
    ) -> Result<VenuePosition> {
        let key = (account.to_string(), instrument.clone(), direction);
        Ok(self
            .positions
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn swap_to_margin(
        &self,
        instrument: &Instrument,
        amount_in: Decimal,
    ) -> Result<Decimal> {
        if amount_in <= Decimal::ZERO {
            bail!("swap amount must be positive");
        }
        let quote = self.oracle.latest_price(instrument).await?;
        if quote.price <= Decimal::ZERO {
            bail!("no usable price for {}", instrument);
        }
        Ok(amount_in / quote.price)
    }
}
