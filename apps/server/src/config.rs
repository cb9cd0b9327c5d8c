//! Application configuration.

use notifier_core::Address;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://order_notifier.db";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Chat registered at startup in single-user mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedUser {
    pub chat_id: String,
    pub wallet_address: Address,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub predict_api_key: String,
    pub poll_interval: Duration,
    pub testnet: bool,
    pub database_url: String,
    pub seed_user: Option<SeedUser>,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let predict_api_key = required("PREDICT_API_KEY")?;

        let poll_interval = match get("POLL_INTERVAL") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "POLL_INTERVAL",
                        value,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        };

        let testnet = match get("TESTNET") {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(ConfigError::Invalid { key: "TESTNET", value }),
            },
            None => false,
        };

        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let seed_user = match (get("NOTIFY_CHAT_ID"), get("WALLET_ADDRESS")) {
            (Some(chat_id), Some(wallet)) => {
                let wallet_address = Address::parse(&wallet).map_err(|_| ConfigError::Invalid {
                    key: "WALLET_ADDRESS",
                    value: wallet.clone(),
                })?;
                Some(SeedUser {
                    chat_id,
                    wallet_address,
                })
            }
            _ => None,
        };

        Ok(Self {
            telegram_bot_token,
            predict_api_key,
            poll_interval,
            testnet,
            database_url,
            seed_user,
        })
    }
}
