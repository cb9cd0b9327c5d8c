//! Venue REST payload types.
//!
//! Every endpoint wraps its payload in `{"success": bool, "data": ...}`.
//! Fields are optional on purpose: a missing field should only break the
//! notification that needs it, not the whole poll.

use notifier_core::{implied_price, AmountError, Side, WeiAmount};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Response envelope shared by all venue endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Sentinel returned when a request failed at the transport or HTTP level.
    pub fn unsuccessful() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Payload, only if the call was successful.
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}

/// A numeric field that may arrive as a JSON string or number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    /// Interpret as a fixed-point amount (scaled by 10^18).
    pub fn as_wei(&self) -> Result<WeiAmount, AmountError> {
        match self {
            Scalar::Text(s) => s.parse(),
            Scalar::Number(n) => n.to_string().parse(),
        }
    }

    /// Interpret as a price level.
    ///
    /// Long integers are fixed-point and scaled down by 10^18. Decimals and
    /// short integers such as `1` are already in price units.
    pub fn as_price(&self) -> Option<f64> {
        let text = match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) => n.to_string(),
        };
        let is_fixed_point = text.len() >= FIXED_POINT_MIN_DIGITS
            && text.bytes().all(|b| b.is_ascii_digit());
        if is_fixed_point {
            text.parse::<WeiAmount>().ok().map(WeiAmount::to_f64)
        } else {
            text.parse::<f64>().ok().filter(|v| v.is_finite())
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Integers with at least this many digits are read as 10^18 fixed-point
/// prices; anything of at least 10^-9 in wei has this many.
const FIXED_POINT_MIN_DIGITS: usize = 10;

/// Decode an optional integer that may arrive as a number or a numeric
/// string. Anything else (null, negative, text, objects) becomes `None`
/// instead of failing the surrounding payload.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_amount(field: &Option<Scalar>) -> Result<WeiAmount, AmountError> {
    field.as_ref().ok_or(AmountError::Empty)?.as_wei()
}

/// Titled reference to a market, as embedded in match payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketRef {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outcome {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTaker {
    pub quote_type: Option<String>,
    pub outcome: Option<Outcome>,
}

/// An order match (fill) event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMatch {
    pub market: Option<MarketRef>,
    pub taker: Option<MatchTaker>,
    pub amount_filled: Option<Scalar>,
    pub price_executed: Option<Scalar>,
    pub transaction_hash: Option<String>,
    pub executed_at: Option<Scalar>,
}

impl OrderMatch {
    pub fn side(&self) -> Side {
        let quote_type = self
            .taker
            .as_ref()
            .and_then(|t| t.quote_type.as_deref())
            .unwrap_or_default();
        Side::from_quote_type(quote_type)
    }

    pub fn market_title(&self) -> Option<&str> {
        self.market.as_ref().and_then(|m| m.title.as_deref())
    }

    pub fn outcome_name(&self) -> Option<&str> {
        self.taker
            .as_ref()
            .and_then(|t| t.outcome.as_ref())
            .and_then(|o| o.name.as_deref())
    }

    pub fn shares(&self) -> Result<WeiAmount, AmountError> {
        parse_amount(&self.amount_filled)
    }

    pub fn price(&self) -> Result<WeiAmount, AmountError> {
        parse_amount(&self.price_executed)
    }
}

/// The signed order embedded in an open-order record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub hash: Option<String>,
    /// Venue side code; see [`OpenOrder::side`].
    #[serde(default, deserialize_with = "lenient_u64")]
    pub side: Option<u64>,
    pub maker_amount: Option<Scalar>,
    pub taker_amount: Option<Scalar>,
}

/// An open order belonging to a signer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    #[serde(default)]
    pub order: SignedOrder,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub market_id: Option<u64>,
    pub amount: Option<Scalar>,
    pub amount_filled: Option<Scalar>,
    pub strategy: Option<String>,
}

impl OpenOrder {
    pub const LIMIT: &'static str = "LIMIT";

    pub fn hash(&self) -> Option<&str> {
        self.order.hash.as_deref().filter(|h| !h.is_empty())
    }

    /// Side code 0 is BUY; any other or missing code is SELL.
    pub fn side(&self) -> Side {
        self.order.side.map_or(Side::Sell, Side::from_code)
    }

    /// Strategy for display; the venue omits it for plain limit orders.
    pub fn strategy(&self) -> &str {
        self.strategy.as_deref().unwrap_or(Self::LIMIT)
    }

    /// Only orders that explicitly carry the LIMIT strategy qualify for price alerts.
    pub fn is_limit(&self) -> bool {
        self.strategy.as_deref() == Some(Self::LIMIT)
    }

    pub fn shares(&self) -> Result<WeiAmount, AmountError> {
        parse_amount(&self.amount)
    }

    pub fn filled(&self) -> Result<WeiAmount, AmountError> {
        match &self.amount_filled {
            Some(v) => v.as_wei(),
            None => Ok(WeiAmount::ZERO),
        }
    }

    /// Remaining (unfilled) shares in human units.
    pub fn remaining(&self) -> Result<f64, AmountError> {
        Ok(self.shares()?.to_f64() - self.filled()?.to_f64())
    }

    /// Limit price implied by maker/taker amounts; `Ok(None)` when undefined.
    pub fn limit_price(&self) -> Result<Option<f64>, AmountError> {
        let maker = parse_amount(&self.order.maker_amount)?;
        let taker = parse_amount(&self.order.taker_amount)?;
        Ok(implied_price(self.side(), maker, taker))
    }
}

/// Market metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub title: Option<String>,
    pub question: Option<String>,
}

impl Market {
    /// Display title, falling back to the market question.
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.question.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Market orderbook: `[price, size, ...]` levels, best first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Orderbook {
    #[serde(default)]
    pub bids: Vec<Vec<Scalar>>,
    #[serde(default)]
    pub asks: Vec<Vec<Scalar>>,
}

impl Orderbook {
    /// Best price on the side an order of `side` would trade against:
    /// best ask for a BUY, best bid for a SELL.
    pub fn best_opposing_price(&self, side: Side) -> Option<f64> {
        let levels = match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        };
        levels
            .first()
            .and_then(|level| level.first())
            .and_then(Scalar::as_price)
            .filter(|p| *p > 0.0)
    }
}
