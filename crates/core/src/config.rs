use crate::error::{BotError, BotResult};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Endpoint identities of the venue the fleet trades against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueEndpoints {
    pub router: String,
    pub position_router: String,
    pub vault: String,
}

/// Write-once store for the venue endpoint identities.
///
/// Initialized exactly once, read-only afterwards. Registries resolve it at
/// construction time.
#[derive(Debug, Default)]
pub struct SettingsStore {
    endpoints: OnceLock<VenueEndpoints>,
}

impl SettingsStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            endpoints: OnceLock::new(),
        }
    }

    /// # Errors
    /// Returns `BotError::State` if the store was already initialized.
    pub fn initialize(&self, endpoints: VenueEndpoints) -> BotResult<()> {
        self.endpoints
            .set(endpoints)
            .map_err(|_| BotError::State("settings already initialized".to_string()))
    }

    /// # Errors
    /// Returns `BotError::State` if the store has not been initialized yet.
    pub fn get(&self) -> BotResult<&VenueEndpoints> {
        self.endpoints
            .get()
            .ok_or_else(|| BotError::State("settings not initialized".to_string()))
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.endpoints.get().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub venue: VenueEndpoints,
    pub trading: TradingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Seconds after which a pending request may be settled by any caller.
    pub execution_delay_secs: i64,
    /// Pause between fleet trigger scans.
    pub scan_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venue: VenueEndpoints {
                router: "0xaBBc5F99639c9B6bCb58544ddf04EFA6802F4064".to_string(),
                position_router: "0xb87a436B93fFE9D75c5cFA7bAcFff96430b09868".to_string(),
                vault: "0x489ee077994B6658eAfA855C308275EAd8097C4A".to_string(),
            },
            trading: TradingConfig {
                execution_delay_secs: 180,
                scan_interval_secs: 15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> VenueEndpoints {
        VenueEndpoints {
            router: "router".to_string(),
            position_router: "position-router".to_string(),
            vault: "vault".to_string(),
        }
    }

    #[test]
    fn store_initializes_exactly_once() {
        let store = SettingsStore::new();
        assert!(!store.is_initialized());

        store.initialize(endpoints()).unwrap();
        assert!(store.is_initialized());
        assert_eq!(store.get().unwrap(), &endpoints());

        let second = store.initialize(endpoints());
        assert!(matches!(second, Err(BotError::State(_))));
    }

    #[test]
    fn store_read_before_init_fails() {
        let store = SettingsStore::new();
        assert!(matches!(store.get(), Err(BotError::State(_))));
    }

    #[test]
    fn default_config_keeps_observed_settlement_delay() {
        let config = AppConfig::default();
        assert_eq!(config.trading.execution_delay_secs, 180);
    }
}
