use crate::types::{InstanceId, Instrument, TradeDirection};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Grid configuration and limit state of one trading instance.
///
/// Both limit prices stay zero until activation computes the initial
/// symmetric grid; afterwards they only move by the trigger ratchet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSetting {
    pub owner: String,
    pub instrument: Instrument,
    pub leverage: u32,
    pub grid_size: Decimal,
    pub trading_size: Decimal,
    pub long_limit_price: Decimal,
    pub short_limit_price: Decimal,
    pub is_activated: bool,
    pub instance_id: InstanceId,
}

impl BotSetting {
    /// Distance between the two limits; `2 * grid_size` right after
    /// activation.
    #[must_use]
    pub fn limit_spread(&self) -> Decimal {
        self.long_limit_price - self.short_limit_price
    }
}

/// A position change waiting for settlement.
///
/// At most one unexecuted request exists per (instance, direction). Requests
/// are appended to the instance's history and never deleted; settlement only
/// flips `executed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRequest {
    pub direction: TradeDirection,
    pub is_increase: bool,
    pub collateral_delta: Decimal,
    pub size_delta: Decimal,
    /// The grid level whose crossing caused the request, not the live price
    /// at dispatch time.
    pub limit_trigger_price: Decimal,
    pub created_at: DateTime<Utc>,
    /// Earliest time any caller may force execution when the keeper has not
    /// settled the request on its own.
    pub deadline: DateTime<Utc>,
    pub executed: bool,
}

impl PositionRequest {
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Settled position history entry.
///
/// Appended when an increase settles; a decrease settlement writes the exit
/// side and reduces `size`. Otherwise immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub instrument: Instrument,
    pub direction: TradeDirection,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub size: Decimal,
    pub collateral: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PositionRecord {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn limit_spread_is_twice_the_grid_after_activation() {
        let setting = BotSetting {
            owner: "owner".to_string(),
            instrument: Instrument::new("USDC", "WBTC"),
            leverage: 10,
            grid_size: dec!(100),
            trading_size: dec!(10),
            long_limit_price: dec!(1100),
            short_limit_price: dec!(900),
            is_activated: true,
            instance_id: InstanceId(1),
        };
        assert_eq!(setting.limit_spread(), setting.grid_size * dec!(2));
    }

    #[test]
    fn request_is_due_only_at_or_after_deadline() {
        let created = Utc::now();
        let request = PositionRequest {
            direction: TradeDirection::Long,
            is_increase: true,
            collateral_delta: dec!(10),
            size_delta: dec!(100),
            limit_trigger_price: dec!(1100),
            created_at: created,
            deadline: created + Duration::seconds(180),
            executed: false,
        };
        assert!(!request.is_due(created + Duration::seconds(179)));
        assert!(request.is_due(created + Duration::seconds(180)));
    }

    #[test]
    fn request_round_trips_through_serde() {
        let created = Utc::now();
        let request = PositionRequest {
            direction: TradeDirection::Short,
            is_increase: false,
            collateral_delta: dec!(10),
            size_delta: dec!(100),
            limit_trigger_price: dec!(900),
            created_at: created,
            deadline: created + Duration::seconds(180),
            executed: true,
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: PositionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.direction, TradeDirection::Short);
        assert_eq!(back.limit_trigger_price, request.limit_trigger_price);
        assert!(back.executed);
    }

    #[test]
    fn record_is_open_until_closed_at_is_set() {
        let mut record = PositionRecord {
            instrument: Instrument::new("USDC", "WBTC"),
            direction: TradeDirection::Long,
            entry_price: dec!(1100),
            exit_price: None,
            size: dec!(100),
            collateral: dec!(10),
            opened_at: Utc::now(),
            closed_at: None,
        };
        assert!(record.is_open());
        record.closed_at = Some(Utc::now());
        assert!(!record.is_open());
    }
}
