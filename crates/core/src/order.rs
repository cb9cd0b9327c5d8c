//! Order side and limit-price arithmetic.

use crate::WeiAmount;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Venue side code: 0 is BUY, every other value is SELL.
    pub fn from_code(code: u64) -> Self {
        if code == 0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Side of a fill from its taker quote type ("Bid" buys).
    pub fn from_quote_type(quote_type: &str) -> Self {
        if quote_type == "Bid" {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Side::Buy => "🟢",
            Side::Sell => "🔴",
        }
    }
}

/// Price implied by an order's maker/taker amounts.
///
/// A BUY gives collateral (maker) for shares (taker), so the price is
/// maker/taker. A SELL gives shares for collateral: taker/maker.
/// Returns `None` when the denominator is zero.
pub fn implied_price(side: Side, maker: WeiAmount, taker: WeiAmount) -> Option<f64> {
    match side {
        Side::Buy => maker.ratio(taker),
        Side::Sell => taker.ratio(maker),
    }
}

/// Signed distance, in percent of the limit price, between the best opposing
/// price and the limit price. Positive means the market has not yet crossed
/// the limit.
pub fn distance_pct(side: Side, limit_price: f64, current_price: f64) -> f64 {
    match side {
        Side::Buy => (current_price - limit_price) / limit_price * 100.0,
        Side::Sell => (limit_price - current_price) / limit_price * 100.0,
    }
}

/// Band on the favorable side of a limit price inside which a price alert fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertBand {
    /// Maximum distance in percent.
    pub max_distance_pct: f64,
}

impl Default for AlertBand {
    fn default() -> Self {
        Self {
            max_distance_pct: 10.0,
        }
    }
}

impl AlertBand {
    pub fn new(max_distance_pct: f64) -> Self {
        Self { max_distance_pct }
    }

    /// Distance in percent if the current price lies within the band,
    /// `None` otherwise (or when either price is not positive).
    pub fn check(&self, side: Side, limit_price: f64, current_price: f64) -> Option<f64> {
        if limit_price <= 0.0 || current_price <= 0.0 {
            return None;
        }
        let distance = distance_pct(side, limit_price, current_price);
        (0.0..=self.max_distance_pct)
            .contains(&distance)
            .then_some(distance)
    }
}
