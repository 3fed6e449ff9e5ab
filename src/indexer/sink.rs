//! SQLite sink for the replay indexer.
//!
//! Two append-only tables map a send identifier to its inbound
//! (`finalized`) and outbound (`mined`) transaction hashes. Schema creation
//! is idempotent; inserts are insert-or-ignore so a replay over an
//! overlapping history is safe, with each skipped duplicate logged.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::{EventVisitor, TxEvent};
use crate::error::SinkError;

pub const ATTR_SEND_HASH: &str = "send_hash";
pub const ATTR_IN_TX_HASH: &str = "in_tx_hash";
pub const ATTR_OUT_TX_HASH: &str = "out_tx_hash";

pub struct EventSink {
    pool: SqlitePool,
}

impl EventSink {
    /// Open (creating if missing) the sink database at `path`.
    pub async fn connect(path: &str) -> Result<Self, SinkError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// In-memory sink, used by tests.
    pub async fn in_memory() -> Result<Self, SinkError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create both tables if they do not exist.
    pub async fn init_schema(&self) -> Result<(), SinkError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS finalized (
                send_hash TEXT PRIMARY KEY,
                in_tx_hash TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS mined (
                send_hash TEXT PRIMARY KEY,
                out_tx_hash TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop and recreate both tables. Used by the rebuild CLI.
    pub async fn rebuild_schema(&self) -> Result<(), SinkError> {
        sqlx::query("DROP TABLE IF EXISTS finalized")
            .execute(&self.pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS mined")
            .execute(&self.pool)
            .await?;
        self.init_schema().await
    }

    /// Insert a finalized-send row. Returns false when the send hash was
    /// already present (first writer wins).
    pub async fn record_finalized(
        &self,
        send_hash: &str,
        in_tx_hash: &str,
    ) -> Result<bool, SinkError> {
        let result = sqlx::query(
            "INSERT INTO finalized (send_hash, in_tx_hash) VALUES (?, ?)
             ON CONFLICT(send_hash) DO NOTHING",
        )
        .bind(send_hash)
        .bind(in_tx_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a mined-send row. Returns false when the send hash was
    /// already present.
    pub async fn record_mined(
        &self,
        send_hash: &str,
        out_tx_hash: &str,
    ) -> Result<bool, SinkError> {
        let result = sqlx::query(
            "INSERT INTO mined (send_hash, out_tx_hash) VALUES (?, ?)
             ON CONFLICT(send_hash) DO NOTHING",
        )
        .bind(send_hash)
        .bind(out_tx_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn finalized_in_tx(&self, send_hash: &str) -> Result<Option<String>, SinkError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT in_tx_hash FROM finalized WHERE send_hash = ?")
                .bind(send_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn mined_out_tx(&self, send_hash: &str) -> Result<Option<String>, SinkError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT out_tx_hash FROM mined WHERE send_hash = ?")
                .bind(send_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn finalized_count(&self) -> Result<u64, SinkError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM finalized")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn mined_count(&self) -> Result<u64, SinkError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mined")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn required<'e>(event: &'e TxEvent, key: &str) -> Result<&'e str, SinkError> {
    event
        .attribute(key)
        .ok_or_else(|| SinkError::MissingAttribute {
            tx_hash: event.tx_hash.clone(),
            attribute: key.to_string(),
        })
}

/// Writes `SendFinalized` events into the finalized table.
pub struct FinalizedVisitor<'a> {
    pub sink: &'a EventSink,
}

#[async_trait]
impl EventVisitor for FinalizedVisitor<'_> {
    async fn visit(&mut self, event: &TxEvent) -> Result<(), SinkError> {
        let send_hash = required(event, ATTR_SEND_HASH)?;
        let in_tx_hash = event.attribute(ATTR_IN_TX_HASH).unwrap_or(&event.tx_hash);
        if self.sink.record_finalized(send_hash, in_tx_hash).await? {
            crate::metrics::record_indexed_event("finalized");
            debug!(send_hash = %send_hash, in_tx_hash = %in_tx_hash, "Indexed finalized send");
        } else {
            warn!(send_hash = %send_hash, "Duplicate finalized send, skipped");
        }
        Ok(())
    }
}

/// Writes `SendMined` events into the mined table.
pub struct MinedVisitor<'a> {
    pub sink: &'a EventSink,
}

#[async_trait]
impl EventVisitor for MinedVisitor<'_> {
    async fn visit(&mut self, event: &TxEvent) -> Result<(), SinkError> {
        let send_hash = required(event, ATTR_SEND_HASH)?;
        let out_tx_hash = required(event, ATTR_OUT_TX_HASH)?;
        if self.sink.record_mined(send_hash, out_tx_hash).await? {
            crate::metrics::record_indexed_event("mined");
            debug!(send_hash = %send_hash, out_tx_hash = %out_tx_hash, "Indexed mined send");
        } else {
            warn!(send_hash = %send_hash, "Duplicate mined send, skipped");
        }
        Ok(())
    }
}
