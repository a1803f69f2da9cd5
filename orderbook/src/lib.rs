//! Multi-symbol limit order book matching engine core.
//!
//! - Price-time priority matching for resting limit orders
//! - Marketable (immediate) orders that sweep the book and never rest
//! - Partial fills, per-symbol serialization via `BookManager`
//! - A durable, append-only `TradeLog` for every cleared trade

pub mod types;
pub use types::{Order, OrderId, OrderKind, Side, TradeReport, TICK_SCALE};

pub mod price_levels;
pub use price_levels::PriceLevels;

pub mod book;
pub use book::{Book, BookSnapshot, RestingOrderView};

pub mod manager;
pub use manager::BookManager;

pub mod trade_log;
pub use trade_log::{ClearedTradeRow, TradeLog, TradeLogError};
