//! Notification message formatting.
//!
//! Formatters return `Err` on malformed payloads; callers substitute
//! [`fallback_message`] so the event is still reported.

use notifier_core::{AmountError, Side};
use notifier_venue::{Market, OpenOrder, OrderMatch};
use teloxide::utils::html::escape;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid {field}: {source}")]
    Amount {
        field: &'static str,
        source: AmountError,
    },
}

fn amount<T>(field: &'static str, value: Result<T, AmountError>) -> Result<T, FormatError> {
    value.map_err(|source| FormatError::Amount { field, source })
}

/// Kind of notification, used to pick a fallback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderFilled,
    OrderPlaced,
    PriceAlert,
}

/// Generic message sent when a payload could not be formatted.
pub fn fallback_message(kind: NotificationKind) -> String {
    let what = match kind {
        NotificationKind::OrderFilled => "One of your orders was filled",
        NotificationKind::OrderPlaced => "A new order was placed",
        NotificationKind::PriceAlert => "The market moved close to one of your limit orders",
    };
    format!(
        "⚠️ {}, but the details could not be formatted.\nCheck predict.fun for details.",
        what
    )
}

/// Block explorer base for transaction links.
pub fn explorer_tx_base(testnet: bool) -> &'static str {
    if testnet {
        "https://testnet.bscscan.com/tx/"
    } else {
        "https://bscscan.com/tx/"
    }
}

fn market_title(market: Option<&Market>) -> String {
    escape(
        market
            .and_then(Market::display_title)
            .unwrap_or("Unknown Market"),
    )
}

/// Format an order-filled notification.
pub fn format_fill(fill: &OrderMatch, explorer_base: &str) -> Result<String, FormatError> {
    let shares = amount("amountFilled", fill.shares())?.to_f64();
    let price = amount("priceExecuted", fill.price())?.to_f64();
    let value = shares * price;
    let side = fill.side();

    let title = escape(fill.market_title().unwrap_or("Unknown Market"));
    let outcome = escape(fill.outcome_name().unwrap_or("Unknown"));
    let tx_hash = escape(fill.transaction_hash.as_deref().unwrap_or_default());
    let executed_at = fill
        .executed_at
        .as_ref()
        .map(|t| escape(&t.to_string()))
        .unwrap_or_default();

    Ok(format!(
        "{emoji} <b>Order Filled!</b>\n\n\
         📊 <b>Market:</b> {title}\n\
         🎯 <b>Outcome:</b> {outcome}\n\
         💹 <b>Action:</b> {action}\n\n\
         📈 <b>Details:</b>\n\
         • Shares: {shares:.4}\n\
         • Price: {price:.4} USDT\n\
         • Value: ~{value:.2} USDT\n\n\
         🔗 <a href=\"{explorer_base}{tx_hash}\">View Transaction</a>\n\
         ⏰ {executed_at}",
        emoji = side.emoji(),
        action = side.as_str(),
    ))
}

/// Format a new-order notification.
pub fn format_order_placed(order: &OpenOrder, market: Option<&Market>) -> Result<String, FormatError> {
    let shares = amount("amount", order.shares())?.to_f64();
    let price = amount("makerAmount/takerAmount", order.limit_price())?.unwrap_or(0.0);
    let value = shares * price;

    Ok(format!(
        "📝 <b>Order Placed!</b>\n\n\
         📊 <b>Market:</b> {title}\n\
         💹 <b>Action:</b> {action} ({strategy})\n\n\
         📈 <b>Details:</b>\n\
         • Shares: {shares:.4}\n\
         • Price: {price:.4} USDT\n\
         • Value: ~{value:.2} USDT",
        title = market_title(market),
        action = order.side().as_str(),
        strategy = escape(order.strategy()),
    ))
}

/// Format a price-alert notification. Alerts only fire while the market is
/// on the unfilled side of the limit, so the price is always approaching it.
pub fn format_price_alert(
    order: &OpenOrder,
    market: Option<&Market>,
    current_price: f64,
    order_price: f64,
    distance_pct: f64,
) -> Result<String, FormatError> {
    let shares = amount("amount", order.shares())?.to_f64();
    let side = order.side();

    Ok(format!(
        "🔔 <b>Price Alert!</b>\n\n\
         Market price is approaching your limit order, now within <b>{distance:.1}%</b>!\n\n\
         📊 <b>Market:</b> {title}\n\
         💹 <b>Your {action} Order:</b>\n\
         • Order Price: {order_price:.4} USDT\n\
         • Current Price: {current_price:.4} USDT\n\
         • Shares: {shares:.4}\n\n\
         Your order may fill soon! 🎯",
        distance = distance_pct.abs(),
        title = market_title(market),
        action = side.as_str(),
    ))
}

/// One line of the `/orders` listing.
pub fn format_order_line(order: &OpenOrder, market: Option<&Market>) -> String {
    let side = order.side();
    let (remaining, price) = match (order.remaining(), order.limit_price()) {
        (Ok(remaining), Ok(price)) => (remaining, price.unwrap_or(0.0)),
        _ => (0.0, 0.0),
    };
    let title: String = match market.and_then(Market::display_title) {
        Some(t) => t.chars().take(35).collect(),
        None => match order.market_id {
            Some(id) => format!("Market {}", id),
            None => "Unknown Market".to_string(),
        },
    };
    let side_label = match side {
        Side::Buy => "🟢 BUY",
        Side::Sell => "🔴 SELL",
    };

    format!(
        "{} | {:.2} @ {:.3}\n   <i>{}...</i>",
        side_label,
        remaining,
        price,
        escape(&title)
    )
}
