use crate::types::{Order, Side};
use std::collections::{BTreeMap, VecDeque};

// Structured price levels, FIFO tracking with BTreeMap.
// side determines which end of the map is the best:
// - Sell (asks): lowest price is best (front of map)
// - Buy (bids): highest price is best (back of map)
pub struct PriceLevels {
    /// Buy or sell side?
    side: Side,
    /// price ticks (i64) mapped to orders at the price, queued FIFO
    levels: BTreeMap<i64, VecDeque<Order>>,
}

impl PriceLevels {
    /// Creates empty price levels for given side
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Adds an order to the back of its price level, keeping FIFO intact.
    /// Creates the price level if it does not exist yet.
    pub fn push(&mut self, order: Order) {
        self.levels
            .entry(order.price_ticks.expect("resting order must carry a price"))
            .or_default()
            .push_back(order);
    }

    /// Restores a partially filled maker to the front of its level's queue,
    /// preserving its original time priority over orders that arrived later.
    pub fn push_front(&mut self, order: Order) {
        self.levels
            .entry(order.price_ticks.expect("resting order must carry a price"))
            .or_default()
            .push_front(order);
    }

    /// Returns all price levels with their orders
    pub fn get_price_levels(&self) -> &BTreeMap<i64, VecDeque<Order>> {
        &self.levels
    }

    /// Returns the best price for the side without removing anything.
    /// For asks: the lowest price (first in the BTree).
    /// For bids: the highest price (last in the BTree).
    /// Returns None if no price levels currently exist.
    pub fn best_price(&self) -> Option<i64> {
        match self.side {
            Side::Sell => self.levels.first_key_value().map(|(px, _)| *px),
            Side::Buy => self.levels.last_key_value().map(|(px, _)| *px),
        }
    }

    /// Returns how many orders are waiting at the best price level.
    pub fn best_level_size(&self) -> usize {
        match self.best_price() {
            Some(px) => self.levels.get(&px).map(|q| q.len()).unwrap_or(0),
            None => 0,
        }
    }

    /// Removes and returns the front order at the best price level.
    /// Cleans up the level when its queue is emptied.
    pub fn pop_best(&mut self) -> Option<Order> {
        let px = self.best_price()?;
        let q = self.levels.get_mut(&px)?;
        let order = q.pop_front();
        if q.is_empty() {
            self.levels.remove(&px);
        }
        order
    }

    /// Iterates (price, total quantity at price) best price first.
    pub fn iter_levels_best_first(&self) -> Box<dyn Iterator<Item = (i64, i64)> + '_> {
        let sums = self
            .levels
            .iter()
            .map(|(px, q)| (*px, q.iter().map(|o| o.qty).sum()));
        match self.side {
            Side::Sell => Box::new(sums),
            Side::Buy => Box::new(sums.collect::<Vec<_>>().into_iter().rev()),
        }
    }

    /// Iterates every resting order on this side, best price first, FIFO within a level.
    pub fn iter_orders_best_first(&self) -> Box<dyn Iterator<Item = &Order> + '_> {
        let levels: Box<dyn Iterator<Item = &VecDeque<Order>>> = match self.side {
            Side::Sell => Box::new(self.levels.values()),
            Side::Buy => Box::new(self.levels.values().rev()),
        };
        Box::new(levels.flat_map(|q| q.iter()))
    }

    /// Total resting quantity across all levels on this side.
    pub fn total_len(&self) -> i64 {
        self.levels.values().flat_map(|q| q.iter()).map(|o| o.qty).sum()
    }

    /// True if this side has no resting orders.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
