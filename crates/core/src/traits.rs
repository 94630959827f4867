use crate::types::{Instrument, PriceQuote, RequestId, TradeDirection};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reference price source for an instrument's index asset.
///
/// Callers fetch a fresh quote for every limit comparison and never cache it
/// across calls.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn latest_price(&self, instrument: &Instrument) -> Result<PriceQuote>;
}

#[derive(Debug, Clone)]
pub struct IncreaseParams {
    pub account: String,
    pub instrument: Instrument,
    pub direction: TradeDirection,
    pub collateral_delta: Decimal,
    pub size_delta: Decimal,
    pub acceptable_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct DecreaseParams {
    pub account: String,
    pub instrument: Instrument,
    pub direction: TradeDirection,
    pub collateral_delta: Decimal,
    pub size_delta: Decimal,
    pub acceptable_price: Decimal,
}

/// Venue-side view of one (account, instrument, direction) position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub size: Decimal,
    pub collateral: Decimal,
    pub avg_entry_price: Decimal,
    pub last_update: Option<DateTime<Utc>>,
    pub realized_pnl: Decimal,
}

/// Settlement backend for leveraged position requests.
///
/// Submissions may be fulfilled asynchronously by an independent keeper;
/// callers detect that through `current_position` and must tolerate an
/// already-applied result.
#[async_trait]
pub trait ExchangeVenue: Send + Sync {
    async fn submit_increase(&self, params: IncreaseParams) -> Result<RequestId>;

    async fn submit_decrease(&self, params: DecreaseParams) -> Result<RequestId>;

    async fn current_position(
        &self,
        account: &str,
        instrument: &Instrument,
        direction: TradeDirection,
    ) -> Result<VenuePosition>;

    /// Exchanges a collateral-asset amount for the instrument's index asset
    /// at the current price. Long positions are margined in the index asset.
    async fn swap_to_margin(&self, instrument: &Instrument, amount_in: Decimal)
        -> Result<Decimal>;
}
