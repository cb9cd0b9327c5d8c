//! Telegram notifications for predict.fun trading activity.
//!
//! This crate provides:
//! - SQLite-based user registrations and dedup state
//! - Telegram bot integration for notifications and commands
//! - Notification formatting and the polling notifier

pub mod commands;
pub mod config;
pub mod db;
pub mod format;
pub mod notifier;
pub mod telegram;

#[cfg(test)]
mod testing;

pub use commands::{Command, CommandProcessor};
pub use config::{SeenKind, StoreLimits, UserRegistration};
pub use db::{Database, DbError};
pub use format::explorer_tx_base;
pub use notifier::{CycleSummary, Notifier, NotifierConfig, NotifierError};
pub use telegram::{Messenger, TelegramBot, TelegramError};
