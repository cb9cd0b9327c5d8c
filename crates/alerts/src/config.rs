//! User registration and store configuration types.

use chrono::{DateTime, Utc};
use notifier_core::Address;
use serde::{Deserialize, Serialize};

/// A chat registered to receive notifications for a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegistration {
    /// Telegram chat ID (primary key)
    pub chat_id: String,
    /// Signer address whose activity is watched
    pub wallet_address: Address,
    /// Telegram username at registration time, if any
    pub username: Option<String>,
    pub registered_at: DateTime<Utc>,
    /// Whether notifications are delivered
    pub active: bool,
}

/// Kind of identifier tracked in a per-user seen set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeenKind {
    /// Fill transaction hashes.
    Fill,
    /// Open-order hashes.
    Order,
}

impl SeenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SeenKind::Fill => "fill",
            SeenKind::Order => "order",
        }
    }
}

/// Caps on per-user dedup state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum entries per seen set; oldest are evicted first.
    pub seen_cap: u32,
    /// Maximum price-alert cooldown entries; least recently alerted are evicted.
    pub price_alert_cap: u32,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            seen_cap: 500,
            price_alert_cap: 100,
        }
    }
}
