//! SQLite store for user registrations and notification dedup state.

use crate::config::{SeenKind, StoreLimits, UserRegistration};
use chrono::{DateTime, Utc};
use notifier_core::{Address, AddressError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Stored wallet address for chat {chat_id} is invalid: {source}")]
    InvalidAddress {
        chat_id: String,
        source: AddressError,
    },
}

type UserRow = (String, String, Option<String>, DateTime<Utc>, bool);

/// Database connection for the notifier.
///
/// The pool holds a single connection, so every statement and transaction is
/// serialized through one writer even when the poller and the command handler
/// use the store concurrently.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    limits: StoreLimits,
}

impl Database {
    /// Connect to SQLite database at the given path.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with_limits(database_url, StoreLimits::default()).await
    }

    pub async fn connect_with_limits(
        database_url: &str,
        limits: StoreLimits,
    ) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Keep the connection alive forever; an in-memory database lives only
        // as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool, limits };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                chat_id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                username TEXT,
                registered_at TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // seq gives insertion order for oldest-first eviction
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_items (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                item_id TEXT NOT NULL,
                UNIQUE(chat_id, kind, item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_seen_items_order
            ON seen_items(chat_id, kind, seq)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_alerts (
                chat_id TEXT NOT NULL,
                order_hash TEXT NOT NULL,
                alerted_at_ms INTEGER NOT NULL,
                PRIMARY KEY (chat_id, order_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn user_from_row(row: UserRow) -> Result<UserRegistration, DbError> {
        let (chat_id, wallet, username, registered_at, active) = row;
        let wallet_address = Address::parse(&wallet).map_err(|source| DbError::InvalidAddress {
            chat_id: chat_id.clone(),
            source,
        })?;
        Ok(UserRegistration {
            chat_id,
            wallet_address,
            username,
            registered_at,
            active,
        })
    }

    /// Register a chat, overwriting any previous registration and resetting
    /// its dedup state.
    pub async fn register(
        &self,
        chat_id: &str,
        wallet_address: &Address,
        username: Option<&str>,
    ) -> Result<UserRegistration, DbError> {
        let registered_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM seen_items WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM price_alerts WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO users (chat_id, wallet_address, username, registered_at, active)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(chat_id) DO UPDATE SET
                wallet_address = excluded.wallet_address,
                username = excluded.username,
                registered_at = excluded.registered_at,
                active = 1
            "#,
        )
        .bind(chat_id)
        .bind(wallet_address.as_str())
        .bind(username)
        .bind(registered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(UserRegistration {
            chat_id: chat_id.to_string(),
            wallet_address: wallet_address.clone(),
            username: username.map(str::to_string),
            registered_at,
            active: true,
        })
    }

    /// Remove a registration and all of its state. Returns false if the chat
    /// was not registered.
    pub async fn unregister(&self, chat_id: &str) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM seen_items WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM price_alerts WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM users WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    pub async fn get_user(&self, chat_id: &str) -> Result<Option<UserRegistration>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT chat_id, wallet_address, username, registered_at, active FROM users WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::user_from_row).transpose()
    }

    /// All users with notifications enabled, oldest registration first.
    pub async fn active_users(&self) -> Result<Vec<UserRegistration>, DbError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT chat_id, wallet_address, username, registered_at, active FROM users WHERE active = 1 ORDER BY registered_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::user_from_row).collect()
    }

    pub async fn has_seen(
        &self,
        chat_id: &str,
        kind: SeenKind,
        item_id: &str,
    ) -> Result<bool, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM seen_items WHERE chat_id = ? AND kind = ? AND item_id = ?",
        )
        .bind(chat_id)
        .bind(kind.as_str())
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Record an identifier as seen. Idempotent; only applies to registered
    /// chats. Evicts the oldest entries beyond the cap. Returns true when the
    /// identifier was newly recorded.
    pub async fn add_seen(
        &self,
        chat_id: &str,
        kind: SeenKind,
        item_id: &str,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO seen_items (chat_id, kind, item_id)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM users WHERE chat_id = ?)
            "#,
        )
        .bind(chat_id)
        .bind(kind.as_str())
        .bind(item_id)
        .bind(chat_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            sqlx::query(
                r#"
                DELETE FROM seen_items
                WHERE chat_id = ? AND kind = ? AND seq NOT IN (
                    SELECT seq FROM seen_items
                    WHERE chat_id = ? AND kind = ?
                    ORDER BY seq DESC
                    LIMIT ?
                )
                "#,
            )
            .bind(chat_id)
            .bind(kind.as_str())
            .bind(chat_id)
            .bind(kind.as_str())
            .bind(i64::from(self.limits.seen_cap))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn seen_count(&self, chat_id: &str, kind: SeenKind) -> Result<u64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM seen_items WHERE chat_id = ? AND kind = ?",
        )
        .bind(chat_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    /// Seen identifiers, oldest first.
    pub async fn seen_items(&self, chat_id: &str, kind: SeenKind) -> Result<Vec<String>, DbError> {
        let items = sqlx::query_scalar::<_, String>(
            "SELECT item_id FROM seen_items WHERE chat_id = ? AND kind = ? ORDER BY seq",
        )
        .bind(chat_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Whether a price alert for this order may fire: the chat must be
    /// registered and the last alert must be older than `cooldown`.
    pub async fn can_send_price_alert(
        &self,
        chat_id: &str,
        order_hash: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let row = sqlx::query_as::<_, (Option<i64>,)>(
            r#"
            SELECT (SELECT alerted_at_ms FROM price_alerts WHERE chat_id = u.chat_id AND order_hash = ?)
            FROM users u WHERE u.chat_id = ?
            "#,
        )
        .bind(order_hash)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => false,
            Some((None,)) => true,
            Some((Some(last_ms),)) => {
                let elapsed_ms = now.timestamp_millis() - last_ms;
                elapsed_ms > cooldown.as_millis() as i64
            }
        })
    }

    /// Record that a price alert was sent. Keeps only the most recent entries
    /// per chat, up to the configured cap.
    pub async fn record_price_alert(
        &self,
        chat_id: &str,
        order_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO price_alerts (chat_id, order_hash, alerted_at_ms)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM users WHERE chat_id = ?)
            ON CONFLICT(chat_id, order_hash) DO UPDATE SET alerted_at_ms = excluded.alerted_at_ms
            "#,
        )
        .bind(chat_id)
        .bind(order_hash)
        .bind(now.timestamp_millis())
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM price_alerts
            WHERE chat_id = ? AND order_hash NOT IN (
                SELECT order_hash FROM price_alerts
                WHERE chat_id = ?
                ORDER BY alerted_at_ms DESC
                LIMIT ?
            )
            "#,
        )
        .bind(chat_id)
        .bind(chat_id)
        .bind(i64::from(self.limits.price_alert_cap))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn price_alert_count(&self, chat_id: &str) -> Result<u64, DbError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM price_alerts WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    /// Close the pool, flushing pending writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WALLET: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";

    fn wallet() -> Address {
        Address::parse(WALLET).unwrap()
    }

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_register_stores_lowercase() {
        let db = memory_db().await;
        db.register("123456", &wallet(), Some("alice")).await.unwrap();

        let user = db.get_user("123456").await.unwrap().unwrap();
        assert_eq!(
            user.wallet_address.as_str(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert!(user.active);
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let db = memory_db().await;
        assert!(db.get_user("nobody").await.unwrap().is_none());
        assert!(!db.unregister("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_register_overwrites_and_resets_state() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();
        db.add_seen("1", SeenKind::Fill, "0xtx").await.unwrap();
        db.add_seen("1", SeenKind::Order, "0xorder").await.unwrap();
        db.record_price_alert("1", "0xorder", Utc::now()).await.unwrap();

        let other = Address::parse("0x1111111111111111111111111111111111111111").unwrap();
        db.register("1", &other, None).await.unwrap();

        let user = db.get_user("1").await.unwrap().unwrap();
        assert_eq!(user.wallet_address, other);
        assert!(!db.has_seen("1", SeenKind::Fill, "0xtx").await.unwrap());
        assert!(!db.has_seen("1", SeenKind::Order, "0xorder").await.unwrap());
        assert_eq!(db.price_alert_count("1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_everything() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();
        db.add_seen("1", SeenKind::Fill, "0xtx").await.unwrap();

        assert!(db.unregister("1").await.unwrap());
        assert!(db.get_user("1").await.unwrap().is_none());
        assert_eq!(db.seen_count("1", SeenKind::Fill).await.unwrap(), 0);
        assert!(db.active_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seen_is_idempotent() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();

        assert!(db.add_seen("1", SeenKind::Fill, "0xtx").await.unwrap());
        assert!(!db.add_seen("1", SeenKind::Fill, "0xtx").await.unwrap());
        assert!(db.has_seen("1", SeenKind::Fill, "0xtx").await.unwrap());
        // Kinds are tracked separately
        assert!(!db.has_seen("1", SeenKind::Order, "0xtx").await.unwrap());
        assert_eq!(db.seen_count("1", SeenKind::Fill).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seen_requires_registration() {
        let db = memory_db().await;
        assert!(!db.add_seen("ghost", SeenKind::Fill, "0xtx").await.unwrap());
        assert!(!db.has_seen("ghost", SeenKind::Fill, "0xtx").await.unwrap());
    }

    #[tokio::test]
    async fn test_seen_cap_evicts_oldest() {
        let db = Database::connect_with_limits(
            "sqlite::memory:",
            StoreLimits {
                seen_cap: 3,
                price_alert_cap: 100,
            },
        )
        .await
        .unwrap();
        db.register("1", &wallet(), None).await.unwrap();

        for i in 0..5 {
            db.add_seen("1", SeenKind::Fill, &format!("tx{}", i))
                .await
                .unwrap();
        }

        assert_eq!(
            db.seen_items("1", SeenKind::Fill).await.unwrap(),
            vec!["tx2", "tx3", "tx4"]
        );
        assert!(!db.has_seen("1", SeenKind::Fill, "tx0").await.unwrap());
    }

    #[tokio::test]
    async fn test_seen_default_cap() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();

        for i in 0..520 {
            db.add_seen("1", SeenKind::Order, &format!("order{}", i))
                .await
                .unwrap();
        }

        assert_eq!(db.seen_count("1", SeenKind::Order).await.unwrap(), 500);
        assert!(!db.has_seen("1", SeenKind::Order, "order19").await.unwrap());
        assert!(db.has_seen("1", SeenKind::Order, "order20").await.unwrap());
        assert!(db.has_seen("1", SeenKind::Order, "order519").await.unwrap());
    }

    #[tokio::test]
    async fn test_price_alert_cooldown() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();
        let cooldown = Duration::from_secs(3600);
        let t0 = Utc::now();

        assert!(db.can_send_price_alert("1", "0xo", cooldown, t0).await.unwrap());
        db.record_price_alert("1", "0xo", t0).await.unwrap();

        let soon = t0 + chrono::Duration::seconds(1800);
        assert!(!db.can_send_price_alert("1", "0xo", cooldown, soon).await.unwrap());

        let later = t0 + chrono::Duration::seconds(3601);
        assert!(db.can_send_price_alert("1", "0xo", cooldown, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_price_alert_unregistered() {
        let db = memory_db().await;
        let cooldown = Duration::from_secs(3600);
        assert!(!db
            .can_send_price_alert("ghost", "0xo", cooldown, Utc::now())
            .await
            .unwrap());
        db.record_price_alert("ghost", "0xo", Utc::now()).await.unwrap();
        assert_eq!(db.price_alert_count("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_price_alert_cap_keeps_most_recent() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();
        let t0 = Utc::now();

        for i in 0..105 {
            let at = t0 + chrono::Duration::seconds(i);
            db.record_price_alert("1", &format!("order{}", i), at)
                .await
                .unwrap();
        }

        assert_eq!(db.price_alert_count("1").await.unwrap(), 100);
        let cooldown = Duration::from_secs(3600);
        // Evicted entries no longer suppress alerts
        assert!(db
            .can_send_price_alert("1", "order0", cooldown, t0)
            .await
            .unwrap());
        assert!(!db
            .can_send_price_alert("1", "order104", cooldown, t0)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_active_users() {
        let db = memory_db().await;
        db.register("1", &wallet(), None).await.unwrap();
        db.register("2", &wallet(), Some("bob")).await.unwrap();

        let users = db.active_users().await.unwrap();
        let ids: Vec<_> = users.iter().map(|u| u.chat_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"1"));
        assert!(ids.contains(&"2"));
    }
}
