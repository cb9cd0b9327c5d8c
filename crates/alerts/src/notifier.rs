//! Polling loop that turns venue activity into chat notifications.

use crate::config::{SeenKind, UserRegistration};
use crate::db::{Database, DbError};
use crate::format::{
    explorer_tx_base, fallback_message, format_fill, format_order_placed, format_price_alert,
    NotificationKind,
};
use crate::telegram::Messenger;
use chrono::Utc;
use notifier_core::AlertBand;
use notifier_venue::{MarketCache, OpenOrder, VenueClient};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

/// Configuration for the notifier.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Sleep between polling cycles.
    pub poll_interval: Duration,
    /// Pause between venue calls and after each sent notification.
    pub call_delay: Duration,
    /// Minimum time between two price alerts for the same order.
    pub price_alert_cooldown: Duration,
    pub alert_band: AlertBand,
    /// Page sizes requested from the venue.
    pub fills_first: u32,
    pub orders_first: u32,
    pub init_first: u32,
    /// Transaction link prefix for fill notifications.
    pub explorer_base: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            call_delay: Duration::from_millis(500),
            price_alert_cooldown: Duration::from_secs(3600),
            alert_band: AlertBand::default(),
            fills_first: 20,
            orders_first: 50,
            init_first: 50,
            explorer_base: explorer_tx_base(false).to_string(),
        }
    }
}

/// Counters for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub users: u32,
    pub fills: u32,
    pub placed: u32,
    pub price_alerts: u32,
}

impl CycleSummary {
    pub fn notifications(&self) -> u32 {
        self.fills + self.placed + self.price_alerts
    }
}

/// Polls the venue for every active user and sends notifications.
pub struct Notifier {
    db: Database,
    venue: Arc<dyn VenueClient>,
    markets: Arc<MarketCache>,
    messenger: Arc<dyn Messenger>,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(
        db: Database,
        venue: Arc<dyn VenueClient>,
        markets: Arc<MarketCache>,
        messenger: Arc<dyn Messenger>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            db,
            venue,
            markets,
            messenger,
            config,
        }
    }

    async fn pause(&self) {
        if !self.config.call_delay.is_zero() {
            tokio::time::sleep(self.config.call_delay).await;
        }
    }

    /// Mark every existing fill and open order of all active users as seen,
    /// without notifying. Returns the number of newly recorded identifiers.
    pub async fn initialize(&self) -> Result<u32, NotifierError> {
        let users = self.db.active_users().await?;
        let mut marked = 0u32;

        for user in &users {
            match self.initialize_user(user).await {
                Ok(n) => marked += n,
                Err(e) => error!(chat_id = user.chat_id, error = %e, "Failed to initialize user"),
            }
        }

        info!(users = users.len(), marked, "Initialized existing activity");
        Ok(marked)
    }

    async fn initialize_user(&self, user: &UserRegistration) -> Result<u32, NotifierError> {
        let mut marked = 0u32;
        let first = self.config.init_first;

        if let Some(fills) = self
            .venue
            .order_matches(&user.wallet_address, first)
            .await
            .into_data()
        {
            for fill in &fills {
                if let Some(tx) = fill.transaction_hash.as_deref().filter(|h| !h.is_empty()) {
                    if self.db.add_seen(&user.chat_id, SeenKind::Fill, tx).await? {
                        marked += 1;
                    }
                }
            }
        }
        self.pause().await;

        if let Some(orders) = self
            .venue
            .open_orders(&user.wallet_address, first)
            .await
            .into_data()
        {
            for order in &orders {
                if let Some(hash) = order.hash() {
                    if self.db.add_seen(&user.chat_id, SeenKind::Order, hash).await? {
                        marked += 1;
                    }
                }
            }
        }
        self.pause().await;

        Ok(marked)
    }

    /// Record an identifier as seen. Returns whether it is new. A storage
    /// failure while recording is logged and the item is still treated as new.
    async fn claim(&self, chat_id: &str, kind: SeenKind, id: &str) -> Result<bool, NotifierError> {
        if self.db.has_seen(chat_id, kind, id).await? {
            return Ok(false);
        }
        match self.db.add_seen(chat_id, kind, id).await {
            Ok(recorded) => Ok(recorded),
            Err(e) => {
                warn!(chat_id, kind = kind.as_str(), id, error = %e, "Failed to record seen item");
                Ok(true)
            }
        }
    }

    async fn notify(&self, chat_id: &str, text: &str) -> bool {
        let sent = self.messenger.send(chat_id, text).await;
        self.pause().await;
        sent
    }

    /// Notify about fills not seen before. Returns the number of messages sent.
    pub async fn check_fills(&self, user: &UserRegistration) -> Result<u32, NotifierError> {
        let Some(fills) = self
            .venue
            .order_matches(&user.wallet_address, self.config.fills_first)
            .await
            .into_data()
        else {
            return Ok(0);
        };

        let mut sent = 0u32;
        for fill in &fills {
            let Some(tx) = fill.transaction_hash.as_deref().filter(|h| !h.is_empty()) else {
                continue;
            };
            if !self.claim(&user.chat_id, SeenKind::Fill, tx).await? {
                continue;
            }

            let text = format_fill(fill, &self.config.explorer_base).unwrap_or_else(|e| {
                warn!(chat_id = user.chat_id, tx, error = %e, "Malformed fill payload");
                fallback_message(NotificationKind::OrderFilled)
            });
            if self.notify(&user.chat_id, &text).await {
                info!(chat_id = user.chat_id, tx, "Fill notification sent");
                sent += 1;
            }
        }

        Ok(sent)
    }

    /// Notify about open orders not seen before.
    pub async fn check_new_orders(
        &self,
        user: &UserRegistration,
        orders: &[OpenOrder],
    ) -> Result<u32, NotifierError> {
        let mut sent = 0u32;

        for order in orders {
            let Some(hash) = order.hash() else {
                continue;
            };
            if !self.claim(&user.chat_id, SeenKind::Order, hash).await? {
                continue;
            }

            let market = match order.market_id {
                Some(id) => self.markets.get(id).await,
                None => None,
            };
            let text = format_order_placed(order, market.as_ref()).unwrap_or_else(|e| {
                warn!(chat_id = user.chat_id, hash, error = %e, "Malformed order payload");
                fallback_message(NotificationKind::OrderPlaced)
            });
            if self.notify(&user.chat_id, &text).await {
                info!(chat_id = user.chat_id, hash, "Order placed notification sent");
                sent += 1;
            }
        }

        Ok(sent)
    }

    /// Alert when the best opposing price comes within the alert band of a
    /// limit order. Each order alerts at most once per cooldown.
    pub async fn check_price_alerts(
        &self,
        user: &UserRegistration,
        orders: &[OpenOrder],
    ) -> Result<u32, NotifierError> {
        let mut sent = 0u32;

        for order in orders.iter().filter(|o| o.is_limit()) {
            let (Some(hash), Some(market_id)) = (order.hash(), order.market_id) else {
                continue;
            };

            let now = Utc::now();
            if !self
                .db
                .can_send_price_alert(&user.chat_id, hash, self.config.price_alert_cooldown, now)
                .await?
            {
                continue;
            }

            let limit_price = match order.limit_price() {
                Ok(Some(price)) if price > 0.0 => price,
                Ok(_) => continue,
                Err(e) => {
                    debug!(chat_id = user.chat_id, hash, error = %e, "Skipping order without price");
                    continue;
                }
            };

            let side = order.side();
            let Some(book) = self.venue.orderbook(market_id).await.into_data() else {
                continue;
            };
            let Some(current) = book.best_opposing_price(side) else {
                continue;
            };
            let Some(distance) = self.config.alert_band.check(side, limit_price, current) else {
                continue;
            };

            let market = self.markets.get(market_id).await;
            let text = format_price_alert(order, market.as_ref(), current, limit_price, distance)
                .unwrap_or_else(|e| {
                    warn!(chat_id = user.chat_id, hash, error = %e, "Malformed order payload");
                    fallback_message(NotificationKind::PriceAlert)
                });

            if self.notify(&user.chat_id, &text).await {
                info!(
                    chat_id = user.chat_id,
                    hash,
                    limit_price,
                    current,
                    distance,
                    "Price alert sent"
                );
                sent += 1;
            }
            self.db.record_price_alert(&user.chat_id, hash, now).await?;
        }

        Ok(sent)
    }

    async fn check_user(
        &self,
        user: &UserRegistration,
        summary: &mut CycleSummary,
    ) -> Result<(), NotifierError> {
        summary.fills += self.check_fills(user).await?;
        self.pause().await;

        // One fetch serves both the new-order and price checks.
        let orders = self
            .venue
            .open_orders(&user.wallet_address, self.config.orders_first)
            .await
            .into_data();
        if let Some(orders) = orders {
            summary.placed += self.check_new_orders(user, &orders).await?;
            self.pause().await;
            summary.price_alerts += self.check_price_alerts(user, &orders).await?;
        }
        self.pause().await;

        Ok(())
    }

    /// Run one pass over all active users. Stops early when `shutdown` is set.
    pub async fn poll_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let users = match self.db.active_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "Failed to load users");
                return summary;
            }
        };

        for user in &users {
            if *shutdown.borrow() {
                break;
            }
            summary.users += 1;
            if let Err(e) = self.check_user(user, &mut summary).await {
                error!(chat_id = user.chat_id, error = %e, "Failed to check user");
            }
        }

        summary
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs_f64(),
            "Notifier started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let summary = self.poll_cycle(&shutdown).await;
            debug!(
                users = summary.users,
                fills = summary.fills,
                placed = summary.placed,
                price_alerts = summary.price_alerts,
                "Poll cycle complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        info!("Notifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{buy_order, fill, MockVenue, RecordingMessenger};
    use notifier_core::Address;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const CHAT: &str = "42";

    struct Harness {
        db: Database,
        venue: Arc<MockVenue>,
        messenger: Arc<RecordingMessenger>,
        notifier: Arc<Notifier>,
        shutdown: watch::Receiver<bool>,
        stop: watch::Sender<bool>,
    }

    async fn harness() -> Harness {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let wallet = Address::parse("0x1111111111111111111111111111111111111111").unwrap();
        db.register(CHAT, &wallet, None).await.unwrap();

        let venue = Arc::new(MockVenue::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let markets = Arc::new(MarketCache::new(venue.clone()));
        let config = NotifierConfig {
            call_delay: Duration::ZERO,
            ..NotifierConfig::default()
        };
        let notifier = Arc::new(Notifier::new(
            db.clone(),
            venue.clone(),
            markets,
            messenger.clone(),
            config,
        ));
        let (tx, shutdown) = watch::channel(false);

        Harness {
            db,
            venue,
            messenger,
            notifier,
            shutdown,
            stop: tx,
        }
    }

    #[test]
    fn test_notifier_config_default() {
        let config = NotifierConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.call_delay, Duration::from_millis(500));
        assert_eq!(config.price_alert_cooldown, Duration::from_secs(3600));
        assert_eq!(config.fills_first, 20);
        assert_eq!(config.explorer_base, "https://bscscan.com/tx/");
    }

    #[tokio::test]
    async fn test_no_matches_no_notification() {
        let h = harness().await;
        let summary = h.notifier.poll_cycle(&h.shutdown).await;

        assert_eq!(summary.users, 1);
        assert_eq!(summary.notifications(), 0);
        assert!(h.messenger.messages().is_empty());
    }

    #[tokio::test]
    async fn test_fill_notified_once() {
        let h = harness().await;
        h.venue.set_matches(vec![fill("0xaaa"), fill("0xbbb")]);

        let first = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(first.fills, 2);
        let texts = h.messenger.texts_for(CHAT);
        assert!(texts[0].contains("Order Filled!"));
        assert!(texts[0].contains("https://bscscan.com/tx/0xaaa"));

        let second = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(second.fills, 0);
        assert_eq!(h.messenger.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_fill_without_hash_skipped() {
        let h = harness().await;
        let mut no_hash = fill("");
        no_hash["transactionHash"] = serde_json::Value::Null;
        h.venue.set_matches(vec![no_hash]);

        let summary = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(summary.fills, 0);
    }

    #[tokio::test]
    async fn test_malformed_fill_sends_fallback() {
        let h = harness().await;
        let mut bad = fill("0xbad");
        bad["amountFilled"] = serde_json::json!("not-a-number");
        h.venue.set_matches(vec![bad]);

        h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(
            h.messenger.last_for(CHAT),
            Some(fallback_message(NotificationKind::OrderFilled))
        );
        assert!(h.db.has_seen(CHAT, SeenKind::Fill, "0xbad").await.unwrap());
    }

    #[tokio::test]
    async fn test_initialize_marks_seen_without_notifying() {
        let h = harness().await;
        h.venue.set_matches(vec![fill("0xaaa")]);
        h.venue.set_orders(vec![buy_order("0xorder", 1)]);

        let marked = h.notifier.initialize().await.unwrap();
        assert_eq!(marked, 2);
        assert!(h.messenger.messages().is_empty());

        let summary = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(summary.fills, 0);
        assert_eq!(summary.placed, 0);
    }

    #[tokio::test]
    async fn test_new_order_notified_once() {
        let h = harness().await;
        h.venue.set_orders(vec![buy_order("0xorder", 3)]);
        h.venue.set_market(3, "Election winner");

        let first = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(first.placed, 1);
        let text = h.messenger.last_for(CHAT).unwrap();
        assert!(text.contains("Order Placed!"));
        assert!(text.contains("Election winner"));

        let second = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(second.placed, 0);
    }

    #[tokio::test]
    async fn test_price_alert_fires_once_within_cooldown() {
        let h = harness().await;
        h.venue.set_orders(vec![buy_order("0xorder", 7)]);
        h.venue
            .set_book(7, serde_json::json!({"bids": [], "asks": [["0.52", "100"]]}));
        h.notifier.initialize().await.unwrap();

        let first = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(first.price_alerts, 1);
        let text = h.messenger.last_for(CHAT).unwrap();
        assert!(text.contains("Price Alert!"));
        assert!(text.contains("<b>4.0%</b>"));

        let second = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(second.price_alerts, 0);
        assert_eq!(h.messenger.messages().len(), 1);
        // Cooldown is checked before the order book is fetched
        assert_eq!(h.venue.orderbook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_price_outside_band_no_alert() {
        let h = harness().await;
        h.venue.set_orders(vec![buy_order("0xorder", 7)]);
        h.venue
            .set_book(7, serde_json::json!({"bids": [], "asks": [["0.60", "100"]]}));
        h.notifier.initialize().await.unwrap();

        let summary = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(summary.price_alerts, 0);
        assert_eq!(h.db.price_alert_count(CHAT).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_limit_orders_skip_price_check() {
        let h = harness().await;
        let mut order = buy_order("0xmarket", 7);
        order["strategy"] = serde_json::json!("MARKET");
        h.venue.set_orders(vec![order]);
        h.venue
            .set_book(7, serde_json::json!({"bids": [], "asks": [["0.52", "100"]]}));
        h.notifier.initialize().await.unwrap();

        h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(h.venue.orderbook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_venue_failure_is_noop() {
        let h = harness().await;
        h.venue.set_matches(vec![fill("0xaaa")]);
        h.venue.set_failing(true);

        let summary = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(summary.users, 1);
        assert_eq!(summary.notifications(), 0);
        assert_eq!(h.db.seen_count(CHAT, SeenKind::Fill).await.unwrap(), 0);

        // Recovers on the next cycle
        h.venue.set_failing(false);
        let summary = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(summary.fills, 1);
    }

    #[tokio::test]
    async fn test_shutdown_skips_users() {
        let h = harness().await;
        h.venue.set_matches(vec![fill("0xaaa")]);
        h.stop.send(true).unwrap();

        let summary = h.notifier.poll_cycle(&h.shutdown).await;
        assert_eq!(summary, CycleSummary::default());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness().await;
        let handle = tokio::spawn(Arc::clone(&h.notifier).run(h.shutdown.clone()));
        h.stop.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
