//! Multiplexes `Book`s by symbol, serializing operations per symbol while
//! letting distinct symbols match fully in parallel.

use std::future::Future;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::book::{Book, BookSnapshot};
use crate::types::{Order, TradeReport};

/// Owned manager value — no process-wide global. One per running engine.
pub struct BookManager {
    books: DashMap<String, RwLock<Book>>,
}

impl Default for BookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BookManager {
    pub fn new() -> Self {
        Self { books: DashMap::new() }
    }

    /// Resolves the `Book` for `order.symbol`, creating it on first
    /// reference, then runs `add` under that symbol's guard. Distinct
    /// symbols never block each other; `DashMap::entry` keeps the
    /// check-or-insert step itself a short, atomic critical section so no
    /// reader ever observes a half-initialized `Book`.
    pub async fn add_order(&self, order: Order) -> Vec<TradeReport> {
        let (trades, ()) = self.add_order_with(order, |_| async {}).await;
        trades
    }

    /// Same as `add_order`, but runs `after_match` to completion — given an
    /// owned copy of whatever trades resulted — before releasing the
    /// symbol's write guard. This is the hook callers use to persist and
    /// broadcast a match batch as part of the same per-symbol critical
    /// section as the match itself, so two `add_order_with` calls racing on
    /// the same symbol can never have their persist/broadcast pairs
    /// interleave out of match order (spec's per-symbol serialization
    /// guarantee covers durability appends and broadcasts, not just the
    /// match step).
    pub async fn add_order_with<F, Fut, T>(&self, order: Order, after_match: F) -> (Vec<TradeReport>, T)
    where
        F: FnOnce(Vec<TradeReport>) -> Fut,
        Fut: Future<Output = T>,
    {
        let symbol = order.symbol.clone();
        let lock = self.book_for(&symbol);
        let mut book = lock.write().await;
        let trades = book.add(order);
        let result = after_match(trades.clone()).await;
        (trades, result)
    }

    /// Resolves/creates the `Book` for `symbol` and returns its snapshot.
    pub async fn snapshot(&self, symbol: &str) -> BookSnapshot {
        let lock = self.book_for(symbol);
        let book = lock.read().await;
        book.snapshot()
    }

    /// Every symbol whose `Book` has at least one resting bid or ask.
    /// Empty books stay mapped but are omitted here.
    pub async fn list_active_symbols(&self) -> Vec<String> {
        let mut active = Vec::new();
        for entry in self.books.iter() {
            if entry.value().read().await.is_active() {
                active.push(entry.key().clone());
            }
        }
        active
    }

    fn book_for(&self, symbol: &str) -> dashmap::mapref::one::Ref<'_, String, RwLock<Book>> {
        // Short, atomic check-or-insert: `entry` only inserts if absent, and
        // the `Book` is fully constructed before it's visible to any
        // reader, so no one ever observes a half-initialized book.
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| RwLock::new(Book::new(symbol)));
        self.books.get(symbol).expect("just inserted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderId, OrderKind, Side};

    fn order(id: u128, symbol: &str, side: Side, kind: OrderKind, price: Option<i64>, qty: i64, user: &str) -> Order {
        Order {
            id: OrderId(id),
            symbol: symbol.to_string(),
            side,
            kind,
            price_ticks: price,
            qty,
            user_id: user.into(),
            arrival_ts: 0,
        }
    }

    #[tokio::test]
    async fn lazily_creates_books_and_lists_only_active_symbols() {
        let mgr = BookManager::new();
        assert!(mgr.list_active_symbols().await.is_empty());

        mgr.add_order(order(1, "Z", Side::Buy, OrderKind::Limit, Some(100), 5, "u1"))
            .await;
        // touch "Y" via a snapshot only, never adding an order
        let _ = mgr.snapshot("Y").await;

        let active = mgr.list_active_symbols().await;
        assert_eq!(active, vec!["Z".to_string()]);
    }

    // S6: a symbol fully matched back to empty drops out of the active list.
    #[tokio::test]
    async fn fully_matched_symbol_disappears_from_active_list() {
        let mgr = BookManager::new();
        mgr.add_order(order(1, "X", Side::Buy, OrderKind::Limit, Some(100), 5, "u1"))
            .await;
        mgr.add_order(order(2, "X", Side::Sell, OrderKind::Limit, Some(100), 5, "u2"))
            .await;
        mgr.add_order(order(3, "Z", Side::Buy, OrderKind::Limit, Some(100), 5, "u3"))
            .await;

        let mut active = mgr.list_active_symbols().await;
        active.sort();
        assert_eq!(active, vec!["Z".to_string()]);
    }

    #[tokio::test]
    async fn cross_symbol_orders_do_not_interfere() {
        let mgr = BookManager::new();
        mgr.add_order(order(1, "AAPL", Side::Buy, OrderKind::Limit, Some(100), 5, "a"))
            .await;
        mgr.add_order(order(2, "TSLA", Side::Buy, OrderKind::Limit, Some(200), 5, "b"))
            .await;

        let aapl = mgr.snapshot("AAPL").await;
        let tsla = mgr.snapshot("TSLA").await;
        assert_eq!(aapl.bids.len(), 1);
        assert_eq!(tsla.bids.len(), 1);
        assert_eq!(aapl.bids[0].price_ticks, 100);
        assert_eq!(tsla.bids[0].price_ticks, 200);
    }

    // The write guard must stay held across `after_match`, not just the
    // match itself — otherwise a second `add_order_with` on the same
    // symbol could run its own `after_match` before the first one's
    // finishes, reordering persist/broadcast pairs relative to the matches
    // that produced them.
    #[tokio::test]
    async fn add_order_with_holds_the_guard_across_after_match() {
        use std::sync::{Arc, Mutex};

        let mgr = Arc::new(BookManager::new());
        let events = Arc::new(Mutex::new(Vec::new()));

        let mgr1 = mgr.clone();
        let events1 = events.clone();
        let first = tokio::spawn(async move {
            mgr1.add_order_with(order(1, "Z", Side::Buy, OrderKind::Limit, Some(100), 5, "u1"), move |_trades| {
                let events = events1.clone();
                async move {
                    events.lock().unwrap().push("first:start");
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    events.lock().unwrap().push("first:end");
                }
            })
            .await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mgr2 = mgr.clone();
        let events2 = events.clone();
        let second = tokio::spawn(async move {
            mgr2.add_order_with(order(2, "Z", Side::Sell, OrderKind::Limit, Some(100), 5, "u2"), move |_trades| {
                let events = events2.clone();
                async move {
                    events.lock().unwrap().push("second:start");
                }
            })
            .await;
        });

        first.await.unwrap();
        second.await.unwrap();

        let seen = events.lock().unwrap().clone();
        assert_eq!(seen, vec!["first:start", "first:end", "second:start"]);
    }
}
