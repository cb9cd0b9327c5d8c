//! In-memory venue and messenger doubles for tests.

use crate::telegram::Messenger;
use async_trait::async_trait;
use notifier_core::Address;
use notifier_venue::{ApiResponse, Market, OpenOrder, Orderbook, OrderMatch, VenueClient};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockVenue {
    matches: Mutex<Vec<OrderMatch>>,
    orders: Mutex<Vec<OpenOrder>>,
    markets: Mutex<HashMap<u64, Market>>,
    books: Mutex<HashMap<u64, Orderbook>>,
    failing: AtomicBool,
    pub market_calls: AtomicU32,
    pub orderbook_calls: AtomicU32,
}

impl MockVenue {
    pub fn set_matches(&self, matches: Vec<serde_json::Value>) {
        *self.matches.lock().unwrap() = matches
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
    }

    pub fn set_orders(&self, orders: Vec<serde_json::Value>) {
        *self.orders.lock().unwrap() = orders
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
    }

    pub fn set_market(&self, market_id: u64, title: &str) {
        self.markets.lock().unwrap().insert(
            market_id,
            Market {
                title: Some(title.to_string()),
                question: None,
            },
        );
    }

    pub fn set_book(&self, market_id: u64, book: serde_json::Value) {
        self.books
            .lock()
            .unwrap()
            .insert(market_id, serde_json::from_value(book).unwrap());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn order_matches(&self, _: &Address, first: u32) -> ApiResponse<Vec<OrderMatch>> {
        if self.failing() {
            return ApiResponse::unsuccessful();
        }
        let matches = self.matches.lock().unwrap();
        ApiResponse::ok(matches.iter().take(first as usize).cloned().collect())
    }

    async fn open_orders(&self, _: &Address, first: u32) -> ApiResponse<Vec<OpenOrder>> {
        if self.failing() {
            return ApiResponse::unsuccessful();
        }
        let orders = self.orders.lock().unwrap();
        ApiResponse::ok(orders.iter().take(first as usize).cloned().collect())
    }

    async fn market(&self, market_id: u64) -> ApiResponse<Market> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        match self.markets.lock().unwrap().get(&market_id) {
            Some(m) if !self.failing() => ApiResponse::ok(m.clone()),
            _ => ApiResponse::unsuccessful(),
        }
    }

    async fn orderbook(&self, market_id: u64) -> ApiResponse<Orderbook> {
        self.orderbook_calls.fetch_add(1, Ordering::SeqCst);
        match self.books.lock().unwrap().get(&market_id) {
            Some(b) if !self.failing() => ApiResponse::ok(b.clone()),
            _ => ApiResponse::unsuccessful(),
        }
    }
}

/// Messenger that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMessenger {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn last_for(&self, chat_id: &str) -> Option<String> {
        self.texts_for(chat_id).pop()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat_id: &str, text: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        true
    }
}

pub fn fill(tx_hash: &str) -> serde_json::Value {
    serde_json::json!({
        "market": {"title": "Test market"},
        "taker": {"quoteType": "Bid", "outcome": {"name": "Yes"}},
        "amountFilled": "10000000000000000000",
        "priceExecuted": "500000000000000000",
        "transactionHash": tx_hash,
        "executedAt": "2025-01-01T00:00:00Z"
    })
}

/// BUY limit order at 0.50 for 100 shares.
pub fn buy_order(hash: &str, market_id: u64) -> serde_json::Value {
    serde_json::json!({
        "order": {
            "hash": hash,
            "side": 0,
            "makerAmount": "50000000000000000000",
            "takerAmount": "100000000000000000000"
        },
        "marketId": market_id,
        "amount": "100000000000000000000",
        "amountFilled": "0",
        "strategy": "LIMIT"
    })
}
