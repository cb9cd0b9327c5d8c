//! Read-only client for the prediction-market venue.
//!
//! - `client` - REST operations behind the [`VenueClient`] trait
//! - `types` - response envelope and payload types
//! - `cache` - TTL cache for market metadata

pub mod cache;
pub mod client;
pub mod error;
pub mod types;

pub use cache::MarketCache;
pub use client::{PredictClient, VenueClient, VenueConfig};
pub use error::VenueError;
pub use types::*;
