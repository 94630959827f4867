use grid_trade_core::{InstanceId, Instrument, TradeDirection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotEvent {
    /// New instance registered (still inactive).
    BotInitialized {
        instance_id: InstanceId,
        owner: String,
    },

    /// Instance activated with its initial symmetric grid.
    BotActivated {
        instance_id: InstanceId,
        instrument: Instrument,
        long_limit_price: Decimal,
        short_limit_price: Decimal,
    },

    /// Price feed mapping changed for an index asset.
    PriceFeedUpdated { asset: String },

    /// A dispatched trigger opened a position request.
    RequestCreated {
        instance_id: InstanceId,
        direction: TradeDirection,
        is_increase: bool,
        collateral_delta: Decimal,
        size_delta: Decimal,
        limit_trigger_price: Decimal,
    },
}
