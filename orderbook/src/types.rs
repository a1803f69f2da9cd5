use serde::{Deserialize, Serialize};

/// Which side an order was submitted for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Whether an order is willing to rest (Limit) or must execute now-or-discard (Market).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u128);

/// An admitted order. `arrival_ts` is left at 0 by Admission; the `Book`
/// assigns the real value under its per-symbol guard (I3, OQ4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String, // no lifetimes for now
    pub side: Side,
    pub kind: OrderKind,
    /// Integer price ticks. `Some` iff `kind == Limit` (I2).
    pub price_ticks: Option<i64>,
    pub qty: i64, // integer lots
    pub user_id: String,
    pub arrival_ts: u128, // event time in ns
}

impl Order {
    pub fn is_resting_eligible(&self) -> bool {
        matches!(self.kind, OrderKind::Limit)
    }
}

/// A single fill produced by a match step. Never retained by the `Book`;
/// emitted, logged, and broadcast by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReport {
    pub symbol: String,
    pub price_ticks: i64,
    pub qty: i64,
    pub ts_ns: u128,
    pub buyer_user_id: String,
    pub seller_user_id: String,
    pub taker_user_id: String,
}

/// Fixed-point scale used to convert wire prices (decimal) to integer ticks.
pub const TICK_SCALE: f64 = 100.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_kind_gates_resting_eligibility() {
        let limit = Order {
            id: OrderId(1),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            price_ticks: Some(10_000),
            qty: 10,
            user_id: "u1".into(),
            arrival_ts: 0,
        };
        let market = Order {
            kind: OrderKind::Market,
            price_ticks: None,
            ..limit.clone()
        };

        assert!(limit.is_resting_eligible());
        assert!(!market.is_resting_eligible());
    }
}
