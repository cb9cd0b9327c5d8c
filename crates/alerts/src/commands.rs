//! Slash-command handling for inbound chat messages.

use crate::config::SeenKind;
use crate::db::{Database, DbError};
use crate::format::format_order_line;
use crate::telegram::Messenger;
use notifier_core::Address;
use notifier_venue::{MarketCache, VenueClient};
use std::sync::Arc;
use tracing::{error, info};

/// Maximum number of orders listed by `/orders`.
pub const MAX_LISTED_ORDERS: usize = 20;

/// Page size requested from the venue for `/orders`.
const OPEN_ORDERS_PAGE: u32 = 50;

/// Parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/register <address>`; the argument is the raw remainder of the message.
    Register(String),
    Status,
    Orders,
    Stop,
    Unknown(String),
}

impl Command {
    /// Parse a chat message. Returns `None` for text that is not a command.
    ///
    /// The command word is case-insensitive and may carry an `@botname`
    /// suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let (word, args) = match text.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (text, ""),
        };
        let word = word.to_lowercase();
        let name = word.split('@').next().unwrap_or_default();

        Some(match name {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/register" => Command::Register(args.to_string()),
            "/status" => Command::Status,
            "/orders" => Command::Orders,
            "/stop" => Command::Stop,
            other => Command::Unknown(other.to_string()),
        })
    }
}

const WELCOME: &str = "👋 <b>Welcome to Predict.fun Order Notifier!</b>

I'll send you real-time notifications for your predict.fun trading activity.

<b>How to use:</b>

1️⃣ <b>Find your Predict portfolio address:</b>
   • Go to <a href=\"https://predict.fun\">predict.fun</a>
   • Click on your portfolio (top-right corner)
   • Copy the address shown below your username

2️⃣ <b>Register with the bot:</b>
   <code>/register 0xYourPortfolioAddress</code>

3️⃣ That's it! You'll receive notifications for:
   • 📝 New orders placed
   • ✅ Orders filled
   • 🔔 Price within 10% of your limit orders

<b>Commands:</b>
• /status - Check your registration
• /orders - View your open orders
• /stop - Unregister and stop notifications
• /help - Show this message";

const REGISTER_USAGE: &str = "❌ Please provide your Predict portfolio address.\n\n\
    <b>Usage:</b> <code>/register 0xYourPortfolioAddress</code>\n\n\
    <b>How to find it:</b>\n\
    1. Go to predict.fun\n\
    2. Click your portfolio (top-right)\n\
    3. Copy the address below your username";

const INVALID_ADDRESS: &str = "❌ Invalid address format.\n\n\
    The address should:\n\
    • Start with <code>0x</code>\n\
    • Be followed by 40 hexadecimal characters\n\n\
    <b>Example:</b> <code>0x1234567890abcdef1234567890abcdef12345678</code>";

const NOT_REGISTERED: &str = "❌ You're not registered yet.\n\n\
    Use <code>/register 0xYourPortfolioAddress</code> to start receiving notifications.";

const UNKNOWN_COMMAND: &str = "❓ Unknown command. Use /help to see available commands.";

const STORAGE_ERROR: &str = "⚠️ Something went wrong on our side. Please try again later.";

/// Executes commands against the user store and venue.
pub struct CommandProcessor {
    db: Database,
    venue: Arc<dyn VenueClient>,
    markets: Arc<MarketCache>,
    messenger: Arc<dyn Messenger>,
}

impl CommandProcessor {
    pub fn new(
        db: Database,
        venue: Arc<dyn VenueClient>,
        markets: Arc<MarketCache>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            db,
            venue,
            markets,
            messenger,
        }
    }

    /// Handle one inbound text message. Non-command text is ignored.
    pub async fn handle(&self, chat_id: &str, username: Option<&str>, text: &str) {
        let Some(command) = Command::parse(text) else {
            return;
        };
        info!(chat_id, command = ?command, "Command received");

        let result = match command {
            Command::Start | Command::Help => {
                self.reply(chat_id, WELCOME).await;
                Ok(())
            }
            Command::Register(args) => self.register(chat_id, username, &args).await,
            Command::Status => self.status(chat_id).await,
            Command::Orders => self.orders(chat_id).await,
            Command::Stop => self.stop(chat_id).await,
            Command::Unknown(_) => {
                self.reply(chat_id, UNKNOWN_COMMAND).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(chat_id, error = %e, "Command failed");
            self.reply(chat_id, STORAGE_ERROR).await;
        }
    }

    async fn reply(&self, chat_id: &str, text: &str) {
        self.messenger.send(chat_id, text).await;
    }

    async fn register(
        &self,
        chat_id: &str,
        username: Option<&str>,
        args: &str,
    ) -> Result<(), DbError> {
        let Some(raw) = args.split_whitespace().next() else {
            self.reply(chat_id, REGISTER_USAGE).await;
            return Ok(());
        };

        let address = match Address::parse(raw) {
            Ok(address) => address,
            Err(e) => {
                info!(chat_id, error = %e, "Rejected registration");
                self.reply(chat_id, INVALID_ADDRESS).await;
                return Ok(());
            }
        };

        self.db.register(chat_id, &address, username).await?;
        info!(chat_id, wallet = %address.short(), "Registered user");

        let text = format!(
            "✅ <b>Successfully registered!</b>\n\n\
             📍 Portfolio: <code>{}</code>\n\n\
             You'll now receive notifications for orders placed, filled, \
             and prices approaching your limit orders on predict.fun.\n\n\
             Use /stop to unregister.",
            address.short()
        );
        self.reply(chat_id, &text).await;
        Ok(())
    }

    async fn status(&self, chat_id: &str) -> Result<(), DbError> {
        let Some(user) = self.db.get_user(chat_id).await? else {
            self.reply(chat_id, NOT_REGISTERED).await;
            return Ok(());
        };

        let tracked = self.db.seen_count(chat_id, SeenKind::Fill).await?;
        let text = format!(
            "📊 <b>Your Status</b>\n\n\
             📍 Portfolio: <code>{}</code>\n\
             📅 Registered: {}\n\
             📬 Orders tracked: {}\n\
             {}\n\n\
             Use /stop to unregister.",
            user.wallet_address.short(),
            user.registered_at.format("%Y-%m-%d"),
            tracked,
            if user.active {
                "✅ Status: Active"
            } else {
                "⏸ Status: Paused"
            },
        );
        self.reply(chat_id, &text).await;
        Ok(())
    }

    async fn orders(&self, chat_id: &str) -> Result<(), DbError> {
        let Some(user) = self.db.get_user(chat_id).await? else {
            self.reply(chat_id, NOT_REGISTERED).await;
            return Ok(());
        };

        self.reply(chat_id, "🔍 Fetching your open orders...").await;

        let response = self
            .venue
            .open_orders(&user.wallet_address, OPEN_ORDERS_PAGE)
            .await;
        let Some(orders) = response.into_data() else {
            self.reply(chat_id, "⚠️ Error fetching orders. Please try again.")
                .await;
            return Ok(());
        };

        if orders.is_empty() {
            self.reply(chat_id, "📭 You have no open orders.").await;
            return Ok(());
        }

        let mut lines = Vec::with_capacity(orders.len().min(MAX_LISTED_ORDERS));
        for order in orders.iter().take(MAX_LISTED_ORDERS) {
            let market = match order.market_id {
                Some(id) => self.markets.get(id).await,
                None => None,
            };
            lines.push(format_order_line(order, market.as_ref()));
        }

        let mut text = format!(
            "📋 <b>Your Open Orders ({})</b>\n\n{}",
            orders.len(),
            lines.join("\n\n")
        );
        if orders.len() > MAX_LISTED_ORDERS {
            text.push_str(&format!(
                "\n\n<i>...and {} more</i>",
                orders.len() - MAX_LISTED_ORDERS
            ));
        }

        self.reply(chat_id, &text).await;
        Ok(())
    }

    async fn stop(&self, chat_id: &str) -> Result<(), DbError> {
        if !self.db.unregister(chat_id).await? {
            self.reply(chat_id, "ℹ️ You're not registered.").await;
            return Ok(());
        }

        info!(chat_id, "Unregistered user");
        self.reply(
            chat_id,
            "👋 <b>Unregistered successfully!</b>\n\n\
             You won't receive any more notifications.\n\n\
             Use /register to sign up again anytime.",
        )
        .await;
        Ok(())
    }
}
