//! Per-symbol matching engine: price-time priority book plus both
//! matching algorithms (marketable sweep and resting-limit cross).

use crate::price_levels::PriceLevels;
use crate::types::{Order, OrderKind, Side, TradeReport};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single resting order as exposed by `Book::snapshot` (B's read view).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RestingOrderView {
    pub id: crate::types::OrderId,
    pub price_ticks: i64,
    pub qty: i64,
    pub user_id: String,
    pub side: Side,
    pub kind: OrderKind,
    pub arrival_ts: u128,
}

/// A consistent copy of both sides of a `Book` at the moment of the call.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<RestingOrderView>,
    pub asks: Vec<RestingOrderView>,
}

/// Central limit order book with separate bid/ask sides, one per symbol.
///
/// Uses price-time priority: better prices match first, then earliest
/// arrival. Not thread-safe on its own — `BookManager` wraps each `Book` in
/// a guard so the whole `add`/`snapshot` critical section is serialized
/// per symbol (B5).
pub struct Book {
    pub symbol: String,
    pub bids: PriceLevels,
    pub asks: PriceLevels,
    /// Last arrival_ts handed out, so two admissions landing in the same
    /// clock tick still get strictly increasing timestamps (OQ4).
    last_ts_ns: u128,
}

impl Book {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLevels::new(Side::Buy),
            asks: PriceLevels::new(Side::Sell),
            last_ts_ns: 0,
        }
    }

    /// Submits an order, returns any trades it produced.
    ///
    /// Assigns `arrival_ts` (step 1 of spec §4.2), then dispatches by kind:
    /// `Market` orders sweep the opposite side and never rest (B4); `Limit`
    /// orders join their own side first, then the book is matched down
    /// until no cross remains.
    pub fn add(&mut self, mut order: Order) -> Vec<TradeReport> {
        order.arrival_ts = self.next_arrival_ts();
        match order.kind {
            OrderKind::Market => self.match_market(order),
            OrderKind::Limit => self.submit_limit(order),
        }
    }

    fn next_arrival_ts(&mut self) -> u128 {
        let now = now_ns();
        let ts = if now > self.last_ts_ns { now } else { self.last_ts_ns + 1 };
        self.last_ts_ns = ts;
        ts
    }

    /// Sweeps the opposite side for a marketable order. Any quantity left
    /// once the opposite side is exhausted is discarded, never rested (B4).
    fn match_market(&mut self, mut taker: Order) -> Vec<TradeReport> {
        let mut trades = Vec::new();
        let opp = match taker.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        while taker.qty > 0 {
            let Some(mut maker) = opp.pop_best() else {
                break;
            };

            let fill = taker.qty.min(maker.qty);
            taker.qty -= fill;
            maker.qty -= fill;

            // Trade at the resting (maker) order's price, never the
            // aggressor's — a marketable order has no price of its own.
            let price_ticks = maker.price_ticks.expect("resting order carries a price");
            let (buyer_user_id, seller_user_id) = match taker.side {
                Side::Buy => (taker.user_id.clone(), maker.user_id.clone()),
                Side::Sell => (maker.user_id.clone(), taker.user_id.clone()),
            };

            trades.push(TradeReport {
                symbol: taker.symbol.clone(),
                price_ticks,
                qty: fill,
                ts_ns: taker.arrival_ts,
                buyer_user_id,
                seller_user_id,
                taker_user_id: taker.user_id.clone(),
            });

            if maker.qty > 0 {
                opp.push_front(maker);
            }
        }

        if taker.qty > 0 {
            tracing::info!(
                symbol = %taker.symbol,
                discarded_qty = taker.qty,
                "market order exhausted opposite liquidity, remainder discarded"
            );
        }

        trades
    }

    /// Appends a limit order to its own side, then matches the book down.
    fn submit_limit(&mut self, order: Order) -> Vec<TradeReport> {
        debug_assert!(order.is_resting_eligible(), "only limit orders are ever pushed onto a side");
        let own = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        own.push(order);
        self.match_limit()
    }

    /// Drains crosses between the best bid and best ask.
    ///
    /// Pinned to source parity (OQ2): the trade always executes at the
    /// resting ask's price, even on the (rare) path where the arriving
    /// order is a sell that crosses an older resting bid. The taker is
    /// whichever side has the later `arrival_ts`.
    fn match_limit(&mut self) -> Vec<TradeReport> {
        let mut trades = Vec::new();

        loop {
            let (Some(bid_px), Some(ask_px)) = (self.bids.best_price(), self.asks.best_price())
            else {
                break;
            };
            if bid_px < ask_px {
                break;
            }

            let mut bid = self.bids.pop_best().expect("best_price implies an order exists");
            let mut ask = self.asks.pop_best().expect("best_price implies an order exists");

            let fill = bid.qty.min(ask.qty);
            let trade_price = ask.price_ticks.expect("resting ask carries a price");
            let taker_user_id = if bid.arrival_ts > ask.arrival_ts {
                bid.user_id.clone()
            } else {
                ask.user_id.clone()
            };
            let ts_ns = bid.arrival_ts.max(ask.arrival_ts);

            bid.qty -= fill;
            ask.qty -= fill;

            trades.push(TradeReport {
                symbol: bid.symbol.clone(),
                price_ticks: trade_price,
                qty: fill,
                ts_ns,
                buyer_user_id: bid.user_id.clone(),
                seller_user_id: ask.user_id.clone(),
                taker_user_id,
            });

            if bid.qty > 0 {
                self.bids.push_front(bid);
            }
            if ask.qty > 0 {
                self.asks.push_front(ask);
            }
        }

        trades
    }

    pub fn best_bid(&self) -> Option<i64> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<i64> {
        self.asks.best_price()
    }

    /// True if either side has a resting order — the test BookManager uses
    /// to decide `list_active_symbols` membership.
    pub fn is_active(&self) -> bool {
        !self.bids.is_empty() || !self.asks.is_empty()
    }

    pub fn snapshot(&self) -> BookSnapshot {
        let view = |o: &Order| RestingOrderView {
            id: o.id,
            price_ticks: o.price_ticks.expect("resting order carries a price"),
            qty: o.qty,
            user_id: o.user_id.clone(),
            side: o.side,
            kind: o.kind,
            arrival_ts: o.arrival_ts,
        };
        BookSnapshot {
            bids: self.bids.iter_orders_best_first().map(view).collect(),
            asks: self.asks.iter_orders_best_first().map(view).collect(),
        }
    }
}

fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos()
}
