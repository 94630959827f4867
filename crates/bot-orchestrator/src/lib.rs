pub mod events;
mod feeds;
pub mod manager;
pub mod router;
pub mod trade_helper;

pub use events::BotEvent;
pub use manager::{BotManager, DispatchOutcome, TriggerSelection};
pub use router::{BotKey, Router};
pub use trade_helper::{InstanceTemplate, TradeHelper};
