//! Decodes and validates the `order` sub-object of an `add` command into
//! an admitted `orderbook::Order`.
//!
//! `arrival_ts` is left at 0 here — the `Book` assigns the real value
//! under its per-symbol guard once the order reaches `BookManager`.

use orderbook::{Order, OrderId, OrderKind, Side, TICK_SCALE};
use serde::Deserialize;
use uuid::Uuid;

/// The wire shape of the `"order"` field on an `add` command.
#[derive(Debug, Deserialize)]
pub struct WireOrder {
    pub ticker: String,
    pub side: String,
    pub quantity: i64,
    pub user_id: String,
    pub order_type: String,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Error: ticker must not be empty.")]
    EmptyTicker,
    #[error("Error: side must be \"buy\" or \"sell\".")]
    InvalidSide,
    #[error("Error: order_type must be \"limit\" or \"market\".")]
    InvalidOrderType,
    #[error("Error: quantity must be a positive integer.")]
    NonPositiveQuantity,
    #[error("Error: user_id must not be empty.")]
    EmptyUserId,
    #[error("Error: price is required for limit orders and must be a positive number.")]
    InvalidPrice,
}

/// Validates `wire` per the Admission rules and converts it into an
/// `Order` ready for `BookManager::add_order`. The wire's decimal `price`
/// is rounded to the nearest tick at `TICK_SCALE`; a market order's price
/// is always discarded, even if the client sent one (I2).
pub fn admit(wire: WireOrder) -> Result<Order, AdmissionError> {
    if wire.ticker.trim().is_empty() {
        return Err(AdmissionError::EmptyTicker);
    }
    let side = match wire.side.as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        _ => return Err(AdmissionError::InvalidSide),
    };
    let kind = match wire.order_type.as_str() {
        "limit" => OrderKind::Limit,
        "market" => OrderKind::Market,
        _ => return Err(AdmissionError::InvalidOrderType),
    };
    if wire.quantity <= 0 {
        return Err(AdmissionError::NonPositiveQuantity);
    }
    if wire.user_id.trim().is_empty() {
        return Err(AdmissionError::EmptyUserId);
    }

    let price_ticks = match kind {
        OrderKind::Limit => {
            let price = wire.price.ok_or(AdmissionError::InvalidPrice)?;
            if !(price > 0.0) {
                return Err(AdmissionError::InvalidPrice);
            }
            Some((price * TICK_SCALE).round() as i64)
        }
        OrderKind::Market => None,
    };

    Ok(Order {
        id: OrderId(Uuid::new_v4().as_u128()),
        symbol: wire.ticker,
        side,
        kind,
        price_ticks,
        qty: wire.quantity,
        user_id: wire.user_id,
        arrival_ts: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_limit() -> WireOrder {
        WireOrder {
            ticker: "AAPL".into(),
            side: "buy".into(),
            quantity: 10,
            user_id: "u1".into(),
            order_type: "limit".into(),
            price: Some(100.25),
        }
    }

    #[test]
    fn admits_a_valid_limit_order() {
        let order = admit(valid_limit()).unwrap();
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.kind, OrderKind::Limit);
        assert_eq!(order.price_ticks, Some(10_025));
        assert_eq!(order.qty, 10);
    }

    #[test]
    fn market_order_discards_any_supplied_price() {
        let wire = WireOrder {
            order_type: "market".into(),
            price: Some(999.0),
            ..valid_limit()
        };
        let order = admit(wire).unwrap();
        assert_eq!(order.kind, OrderKind::Market);
        assert_eq!(order.price_ticks, None);
    }

    #[test]
    fn rejects_empty_ticker() {
        let wire = WireOrder { ticker: "".into(), ..valid_limit() };
        assert_eq!(admit(wire).unwrap_err(), AdmissionError::EmptyTicker);
    }

    #[test]
    fn rejects_unknown_side() {
        let wire = WireOrder { side: "long".into(), ..valid_limit() };
        assert_eq!(admit(wire).unwrap_err(), AdmissionError::InvalidSide);
    }

    #[test]
    fn rejects_zero_quantity() {
        let wire = WireOrder { quantity: 0, ..valid_limit() };
        assert_eq!(admit(wire).unwrap_err(), AdmissionError::NonPositiveQuantity);
    }

    #[test]
    fn rejects_limit_order_missing_price() {
        let wire = WireOrder { price: None, ..valid_limit() };
        assert_eq!(admit(wire).unwrap_err(), AdmissionError::InvalidPrice);
    }

    #[test]
    fn rejects_limit_order_with_non_positive_price() {
        let wire = WireOrder { price: Some(0.0), ..valid_limit() };
        assert_eq!(admit(wire).unwrap_err(), AdmissionError::InvalidPrice);
    }
}
