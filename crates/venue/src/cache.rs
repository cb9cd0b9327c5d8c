//! Time-bounded market metadata cache.

use crate::client::VenueClient;
use crate::types::Market;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Caches successful market lookups for a fixed time-to-live.
///
/// Entries are only replaced once they expire; failed lookups are not cached.
pub struct MarketCache {
    client: Arc<dyn VenueClient>,
    ttl: Duration,
    entries: DashMap<u64, (Market, Instant)>,
}

impl MarketCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(client: Arc<dyn VenueClient>) -> Self {
        Self::with_ttl(client, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(client: Arc<dyn VenueClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Market metadata, from cache when fresh, otherwise from the venue.
    pub async fn get(&self, market_id: u64) -> Option<Market> {
        if let Some(entry) = self.entries.get(&market_id) {
            let (market, fetched_at) = entry.value();
            if fetched_at.elapsed() < self.ttl {
                return Some(market.clone());
            }
        }

        let market = self.client.market(market_id).await.into_data()?;
        debug!(market_id, "Cached market metadata");
        self.entries
            .insert(market_id, (market.clone(), Instant::now()));
        Some(market)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
