//! Append-only durable store of cleared trades.
//!
//! Follows spec §9's preferred design over the source's "fresh connection
//! per insert": one dedicated writer thread owns the `rusqlite::Connection`
//! and drains a bounded queue. `append` still only returns once the row has
//! actually landed — callers `.await` an ack — so the "appended before
//! `Book::add` returns" contract (spec §4.4) holds without holding any
//! per-symbol guard across the write.

use std::path::Path;
use std::thread::JoinHandle;

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS cleared_trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL,
        order_type TEXT NOT NULL,
        price REAL NOT NULL,
        quantity INTEGER NOT NULL,
        cleared_at TEXT NOT NULL,
        filler_user_id TEXT NOT NULL,
        filled_user_id TEXT NOT NULL
    )
";

const INSERT_SQL: &str = "
    INSERT INTO cleared_trades
        (ticker, order_type, price, quantity, cleared_at, filler_user_id, filled_user_id)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";

#[derive(thiserror::Error, Debug)]
pub enum TradeLogError {
    #[error("durability append failed: {0}")]
    Append(#[from] rusqlite::Error),
    #[error("trade log writer thread is gone")]
    WriterGone,
}

/// One cleared-trades row, matching the schema of spec §6 exactly.
#[derive(Clone, Debug)]
pub struct ClearedTradeRow {
    pub ticker: String,
    /// OQ1: the taker's side string for market-vs-limit fills, the
    /// hardcoded string "buy" for limit-vs-limit crosses.
    pub order_type: String,
    pub price: f64,
    pub quantity: i64,
    pub filler_user_id: String,
    pub filled_user_id: String,
}

struct WriteRequest {
    row: ClearedTradeRow,
    ack: oneshot::Sender<Result<i64, TradeLogError>>,
}

/// Handle to the durable trade log. Cheap to clone; all clones share the
/// same writer thread and queue.
#[derive(Clone)]
pub struct TradeLog {
    tx: mpsc::Sender<WriteRequest>,
}

impl TradeLog {
    /// Opens (creating if needed) the sqlite file at `db_path` and starts
    /// its dedicated writer thread.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, TradeLogError> {
        let conn = Connection::open(db_path.as_ref())?;
        conn.execute(CREATE_TABLE_SQL, [])?;

        let (tx, rx) = mpsc::channel::<WriteRequest>(1024);
        spawn_writer(conn, rx);

        Ok(Self { tx })
    }

    /// In-memory trade log, used by tests that don't want a file on disk.
    pub fn open_in_memory() -> Result<Self, TradeLogError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(CREATE_TABLE_SQL, [])?;

        let (tx, rx) = mpsc::channel::<WriteRequest>(1024);
        spawn_writer(conn, rx);

        Ok(Self { tx })
    }

    /// A trade log whose writer is already gone. Exercises durability-
    /// failure handling in callers without needing to crash a live writer
    /// thread mid-test.
    pub fn closed() -> Self {
        let (tx, _rx) = mpsc::channel::<WriteRequest>(1);
        Self { tx }
    }

    /// Appends one cleared trade and waits for it to actually land.
    pub async fn append(&self, row: ClearedTradeRow) -> Result<i64, TradeLogError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriteRequest { row, ack: ack_tx })
            .await
            .map_err(|_| TradeLogError::WriterGone)?;
        ack_rx.await.map_err(|_| TradeLogError::WriterGone)?
    }
}

fn spawn_writer(conn: Connection, mut rx: mpsc::Receiver<WriteRequest>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Some(req) = rx.blocking_recv() {
            let result = insert_row(&conn, &req.row);
            if let Err(err) = &result {
                tracing::error!(error = %err, ticker = %req.row.ticker, "trade log append failed");
            }
            let _ = req.ack.send(result);
        }
        tracing::info!("trade log writer thread shutting down, channel closed");
    })
}

fn insert_row(conn: &Connection, row: &ClearedTradeRow) -> Result<i64, TradeLogError> {
    conn.execute(
        INSERT_SQL,
        rusqlite::params![
            row.ticker,
            row.order_type,
            row.price,
            row.quantity,
            cleared_at_now(),
            row.filler_user_id,
            row.filled_user_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn cleared_at_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
