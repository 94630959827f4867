pub mod config;
pub mod config_loader;
pub mod error;
pub mod position;
pub mod traits;
pub mod types;

pub use config::{AppConfig, SettingsStore, TradingConfig, VenueEndpoints};
pub use config_loader::ConfigLoader;
pub use error::{BotError, BotResult};
pub use position::{BotSetting, PositionRecord, PositionRequest};
pub use traits::{DecreaseParams, ExchangeVenue, IncreaseParams, PriceOracle, VenuePosition};
pub use types::{InstanceId, Instrument, PriceQuote, RequestId, TradeDirection};
