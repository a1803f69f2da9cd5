//! The per-session framed command loop: decode, dispatch, reply.
//!
//! Replaces the teacher's REST handlers and ping/pong streaming sockets
//! with the single `/ws` command protocol from the spec: one JSON object
//! per message, `command` ∈ {"add", "check", "list_tickers"}.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{sink::SinkExt, stream::StreamExt};
use orderbook::{ClearedTradeRow, OrderKind, Side, TradeReport, TICK_SCALE};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::admission::{self, WireOrder};
use crate::broker::{SessionBroker, SessionId};
use crate::AppState;

/// Framing-level failures a session can hit before a command ever reaches
/// Admission or a `Book` — the error kinds of spec §7 that belong to the
/// protocol layer itself rather than to `AdmissionError` or `TradeLogError`.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Error: Invalid JSON format.")]
    MalformedFrame,
    #[error("Error: Missing command.")]
    MissingCommand,
    #[error("Error: Invalid command.")]
    UnknownCommand,
    #[error("Error: Missing order.")]
    MissingOrder,
    #[error("Error: Missing order field.")]
    InvalidOrderShape,
    #[error("Error: Missing ticker.")]
    MissingTicker,
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Drives one session's lifetime: attaches to the broker, then
/// concurrently pumps inbound commands and outbound broker messages
/// until the socket closes or errors, detaching on the way out.
async fn handle_session(socket: WebSocket, state: AppState) {
    let (session_id, mut outbox) = state.broker.attach().await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_command(&text, &state, session_id).await {
                            if sender.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong: no command framing, ignored
                    Some(Err(err)) => {
                        warn!(error = %err, session_id, "websocket receive error");
                        break;
                    }
                }
            }
            outbound = outbox.recv() => {
                match outbound {
                    Some(message) => {
                        if sender.send(Message::Text(message)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.broker.detach(session_id).await;
    info!(session_id, "session detached");
}

/// Parses one framed command and dispatches it. Returns the unicast
/// reply to send back on this session's own channel, or `None` when the
/// command's reply is a broadcast already sent on every session
/// (including this one) instead.
async fn handle_command(text: &str, state: &AppState, session_id: SessionId) -> Option<String> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Some(ProtocolError::MalformedFrame.to_string()),
    };

    let Some(command) = value.get("command").and_then(Value::as_str) else {
        return Some(ProtocolError::MissingCommand.to_string());
    };

    match command {
        "add" => handle_add(value, state).await,
        "check" => Some(handle_check(value, state).await),
        "list_tickers" => Some(handle_list_tickers(state).await),
        _ => {
            warn!(session_id, command, "unknown command");
            Some(ProtocolError::UnknownCommand.to_string())
        }
    }
}

async fn handle_add(value: Value, state: &AppState) -> Option<String> {
    let Some(order_field) = value.get("order") else {
        return Some(ProtocolError::MissingOrder.to_string());
    };

    let wire: WireOrder = match serde_json::from_value(order_field.clone()) {
        Ok(w) => w,
        Err(_) => return Some(ProtocolError::InvalidOrderShape.to_string()),
    };

    let order = match admission::admit(wire) {
        Ok(order) => order,
        Err(err) => return Some(err.to_string()),
    };

    let kind = order.kind;
    let side = order.side;
    let symbol = order.symbol.clone();
    let symbol_for_log = symbol.clone();
    let trade_log = state.trade_log.clone();
    let broker = state.broker.clone();

    // `after_match` runs under the same per-symbol write guard that
    // produced `trades`, so two sessions racing `add` on this symbol can
    // never have their persist+broadcast pairs land out of match order
    // (spec §5's per-symbol serialization covers the whole batch, not
    // just the match step).
    let (trades, persist_result) = state
        .books
        .add_order_with(order, move |trades| persist_and_broadcast(trade_log, broker, symbol, kind, side, trades))
        .await;

    if trades.is_empty() {
        return Some("Order added to the order book.".to_string());
    }

    info!(symbol = %symbol_for_log, fills = trades.len(), "order matched");

    if let Err(err) = persist_result {
        return Some(format!("Error: trade durability failure: {err}"));
    }
    None
}

/// Persists every fill in a match batch, then broadcasts it — in that
/// order, still under the `Book`'s write guard — regardless of whether any
/// individual persist failed. A durability failure is logged and its error
/// threaded back to `handle_add`, which reports it on the originating
/// session in addition to the broadcast (spec §7's `DurabilityFailure`:
/// "logged and reported; does NOT roll back the in-memory fill").
async fn persist_and_broadcast(
    trade_log: orderbook::TradeLog,
    broker: SessionBroker,
    symbol: String,
    kind: OrderKind,
    incoming_side: Side,
    trades: Vec<TradeReport>,
) -> Result<(), orderbook::TradeLogError> {
    if trades.is_empty() {
        return Ok(());
    }

    let mut persist_result = Ok(());
    for trade in &trades {
        if let Err(err) = persist_trade(&trade_log, &symbol, kind, incoming_side, trade).await {
            warn!(error = %err, ticker = %symbol, "durability append failed");
            persist_result = Err(err);
        }
    }

    let payload = json!({
        "matched_orders": trades.iter().map(WireTrade::from_report).collect::<Vec<_>>(),
    });
    broker.broadcast(payload.to_string()).await;

    persist_result
}

/// Persists one fill per OQ1: `order_type` is the hardcoded string `"buy"`
/// for a limit-vs-limit cross, or the admitted order's own side for a
/// marketable fill (it is always the taker in that case). `filler_user_id`
/// is the buyer for a limit cross (matching the source's literal
/// `best_buy.user_id`) or the taker for a marketable fill; `filled_user_id`
/// is the counterpart.
async fn persist_trade(
    trade_log: &orderbook::TradeLog,
    symbol: &str,
    kind: OrderKind,
    incoming_side: Side,
    trade: &TradeReport,
) -> Result<(), orderbook::TradeLogError> {
    let (order_type, filler_user_id, filled_user_id) = trade_log_fields(kind, incoming_side, trade);

    let row = ClearedTradeRow {
        ticker: symbol.to_string(),
        order_type,
        price: trade.price_ticks as f64 / TICK_SCALE,
        quantity: trade.qty,
        filler_user_id,
        filled_user_id,
    };

    trade_log.append(row).await?;
    Ok(())
}

/// Derives `(order_type, filler_user_id, filled_user_id)` for a fill, per
/// OQ1: a limit-vs-limit cross hardcodes `"buy"` with the buyer as filler
/// (the source's literal `best_buy.user_id`); a marketable fill uses the
/// incoming order's own side, with the taker as filler.
fn trade_log_fields(kind: OrderKind, incoming_side: Side, trade: &TradeReport) -> (String, String, String) {
    match kind {
        OrderKind::Limit => (
            "buy".to_string(),
            trade.buyer_user_id.clone(),
            trade.seller_user_id.clone(),
        ),
        OrderKind::Market => {
            let order_type = match incoming_side {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
            .to_string();
            let taker_is_buyer = trade.taker_user_id == trade.buyer_user_id;
            let filled_user_id = if taker_is_buyer {
                trade.seller_user_id.clone()
            } else {
                trade.buyer_user_id.clone()
            };
            (order_type, trade.taker_user_id.clone(), filled_user_id)
        }
    }
}

async fn handle_check(value: Value, state: &AppState) -> String {
    let Some(ticker) = value.get("ticker").and_then(Value::as_str) else {
        return ProtocolError::MissingTicker.to_string();
    };

    let snapshot = state.books.snapshot(ticker).await;
    let view = |o: &orderbook::RestingOrderView| WireRestingOrder {
        ticker: ticker.to_string(),
        side: o.side,
        quantity: o.qty,
        user_id: o.user_id.clone(),
        order_type: o.kind,
        price: o.price_ticks as f64 / TICK_SCALE,
        timestamp: o.arrival_ts,
    };

    let reply = json!({
        "buy": snapshot.bids.iter().map(view).collect::<Vec<_>>(),
        "sell": snapshot.asks.iter().map(view).collect::<Vec<_>>(),
    });
    reply.to_string()
}

async fn handle_list_tickers(state: &AppState) -> String {
    let tickers = state.books.list_active_symbols().await;
    json!({ "tickers": tickers }).to_string()
}

/// Wire shape of a trade fill, independent of whether it arose from a
/// marketable sweep or a limit-vs-limit cross — a uniform shape per the
/// canonical `TradeReport` fields, rather than the source's divergent
/// per-path dict shapes.
#[derive(Serialize)]
struct WireTrade {
    ticker: String,
    price: f64,
    quantity: i64,
    timestamp: u128,
    buyer_user_id: String,
    seller_user_id: String,
    taker_user_id: String,
}

impl WireTrade {
    fn from_report(t: &TradeReport) -> Self {
        Self {
            ticker: t.symbol.clone(),
            price: t.price_ticks as f64 / TICK_SCALE,
            quantity: t.qty,
            timestamp: t.ts_ns,
            buyer_user_id: t.buyer_user_id.clone(),
            seller_user_id: t.seller_user_id.clone(),
            taker_user_id: t.taker_user_id.clone(),
        }
    }
}

#[derive(Serialize)]
struct WireRestingOrder {
    ticker: String,
    side: Side,
    quantity: i64,
    user_id: String,
    order_type: OrderKind,
    price: f64,
    timestamp: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn trade(buyer: &str, seller: &str, taker: &str) -> TradeReport {
        TradeReport {
            symbol: "AAPL".into(),
            price_ticks: 10_000,
            qty: 4,
            ts_ns: 1,
            buyer_user_id: buyer.into(),
            seller_user_id: seller.into(),
            taker_user_id: taker.into(),
        }
    }

    #[test]
    fn wire_trade_converts_ticks_back_to_decimal_price() {
        let wire = WireTrade::from_report(&trade("u1", "u2", "u2"));
        assert_eq!(wire.price, 100.0);
        assert_eq!(wire.quantity, 4);
    }

    // OQ1: limit-vs-limit always hardcodes "buy" with the buyer as filler,
    // regardless of which side actually arrived last and crossed.
    #[test]
    fn limit_cross_hardcodes_buy_and_buyer_as_filler() {
        let t = trade("buyer", "seller", "seller");
        let (order_type, filler, filled) = trade_log_fields(OrderKind::Limit, Side::Sell, &t);
        assert_eq!(order_type, "buy");
        assert_eq!(filler, "buyer");
        assert_eq!(filled, "seller");
    }

    #[test]
    fn market_buy_uses_taker_side_and_taker_as_filler() {
        let t = trade("taker", "maker", "taker");
        let (order_type, filler, filled) = trade_log_fields(OrderKind::Market, Side::Buy, &t);
        assert_eq!(order_type, "buy");
        assert_eq!(filler, "taker");
        assert_eq!(filled, "maker");
    }

    #[test]
    fn market_sell_uses_taker_side_and_taker_as_filler() {
        let t = trade("maker", "taker", "taker");
        let (order_type, filler, filled) = trade_log_fields(OrderKind::Market, Side::Sell, &t);
        assert_eq!(order_type, "sell");
        assert_eq!(filler, "taker");
        assert_eq!(filled, "maker");
    }

    #[tokio::test]
    async fn handle_add_with_no_cross_replies_with_rest_confirmation() {
        let state = test_state();
        let command = json!({
            "command": "add",
            "order": {
                "ticker": "AAPL",
                "side": "buy",
                "quantity": 10,
                "user_id": "u1",
                "order_type": "limit",
                "price": 100.0,
            }
        });
        let reply = handle_add(command, &state).await;
        assert_eq!(reply, Some("Order added to the order book.".to_string()));
    }

    #[tokio::test]
    async fn handle_add_missing_order_field_is_a_local_error() {
        let state = test_state();
        let reply = handle_add(json!({"command": "add"}), &state).await;
        assert_eq!(reply, Some("Error: Missing order.".to_string()));
    }

    #[tokio::test]
    async fn handle_list_tickers_hides_empty_books() {
        let state = test_state();
        state.books.add_order(test_order("Z", Side::Buy, 100, 5, "u1")).await;
        let _ = state.books.snapshot("Y").await;

        let reply = handle_list_tickers(&state).await;
        assert_eq!(reply, json!({"tickers": ["Z"]}).to_string());
    }

    // A closed TradeLog fails every append; handle_add must still broadcast
    // the match (spec §7: "does NOT roll back the in-memory fill") and also
    // report the durability failure back on the originating session.
    #[tokio::test]
    async fn handle_add_reports_durability_failure_and_still_broadcasts() {
        let mut state = test_state();
        state.trade_log = orderbook::TradeLog::closed();

        let (_session_id, mut outbox) = state.broker.attach().await;

        let resting = json!({
            "command": "add",
            "order": {"ticker": "AAPL", "side": "buy", "quantity": 10, "user_id": "u1", "order_type": "limit", "price": 100.0},
        });
        assert_eq!(handle_add(resting, &state).await, Some("Order added to the order book.".to_string()));

        let crossing = json!({
            "command": "add",
            "order": {"ticker": "AAPL", "side": "sell", "quantity": 4, "user_id": "u2", "order_type": "limit", "price": 90.0},
        });
        let reply = handle_add(crossing, &state).await;
        assert_eq!(
            reply,
            Some("Error: trade durability failure: trade log writer thread is gone".to_string())
        );

        let broadcast = outbox.recv().await.unwrap();
        assert!(broadcast.contains("matched_orders"), "broadcast must still happen on durability failure");
    }

    fn test_state() -> AppState {
        AppState {
            books: Arc::new(orderbook::BookManager::new()),
            trade_log: orderbook::TradeLog::open_in_memory().unwrap(),
            broker: crate::broker::SessionBroker::new(),
        }
    }

    fn test_order(ticker: &str, side: Side, price: i64, qty: i64, user: &str) -> orderbook::Order {
        orderbook::Order {
            id: orderbook::OrderId(1),
            symbol: ticker.to_string(),
            side,
            kind: OrderKind::Limit,
            price_ticks: Some(price),
            qty,
            user_id: user.to_string(),
            arrival_ts: 0,
        }
    }
}
