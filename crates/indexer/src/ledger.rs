//! SQLite ledger of processed logs, the resume cursor and pending
//! commitment timers
//!
//! Survives restarts so redelivered logs are dropped and due commitment
//! phases are restored.

use alloy_primitives::Address;
use raffle_sync_contracts::LogMeta;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::error::IndexerResult;
use crate::pipeline::Phase;

/// A commitment phase waiting on its timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledCommitment {
    pub giveaway: Address,
    pub phase: Phase,
    pub due_ms: u64,
}

pub struct Ledger {
    pool: Pool<Sqlite>,
}

impl Ledger {
    pub async fn new(database_url: &str) -> IndexerResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Private in-memory database. A single connection that never expires,
    /// since each connection would otherwise see its own empty database.
    pub async fn in_memory() -> IndexerResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    async fn run_migrations(&self) -> IndexerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_events (
                tx_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                block_number INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                processed_at INTEGER NOT NULL DEFAULT (unixepoch()),
                PRIMARY KEY (tx_hash, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_cursor (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                block_number INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS commitment_schedule (
                giveaway TEXT PRIMARY KEY,
                phase TEXT NOT NULL,
                due_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Claim a log for handling. Returns `false` if it was claimed before.
    /// The claim stays pending until [`Ledger::complete_event`].
    pub async fn record_event(&self, meta: &LogMeta) -> IndexerResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO processed_events (tx_hash, log_index, block_number)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(format!("{:?}", meta.transaction_hash))
        .bind(meta.log_index as i64)
        .bind(meta.block_number as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// The handler for a claimed log has returned.
    pub async fn complete_event(&self, meta: &LogMeta) -> IndexerResult<()> {
        sqlx::query("UPDATE processed_events SET completed = 1 WHERE tx_hash = ? AND log_index = ?")
            .bind(format!("{:?}", meta.transaction_hash))
            .bind(meta.log_index as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Block to resume from at start-up.
    ///
    /// Claims left pending by an earlier run are released so their logs are
    /// handled again when redelivered, and the resume point moves back to the
    /// lowest of them.
    pub async fn resume_block(&self, start_block: u64) -> IndexerResult<u64> {
        let (pending,): (Option<i64>,) = sqlx::query_as(
            "SELECT MIN(block_number) FROM processed_events WHERE completed = 0",
        )
        .fetch_one(&self.pool)
        .await?;

        let resume = match pending {
            Some(block) => {
                let released = sqlx::query("DELETE FROM processed_events WHERE completed = 0")
                    .execute(&self.pool)
                    .await?
                    .rows_affected();
                tracing::info!(
                    "Released {} unfinished events, replaying from block {}",
                    released,
                    block
                );
                block as u64
            }
            None => self.cursor().await?.unwrap_or(start_block),
        };
        Ok(resume.max(start_block))
    }

    /// Highest block dispatched so far
    pub async fn cursor(&self) -> IndexerResult<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT block_number FROM sync_cursor WHERE id = 0")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(block,)| block as u64))
    }

    /// Move the cursor forward; it never moves back.
    pub async fn advance_cursor(&self, block: u64) -> IndexerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursor (id, block_number) VALUES (0, ?)
            ON CONFLICT(id) DO UPDATE SET
                block_number = MAX(sync_cursor.block_number, excluded.block_number)
            "#,
        )
        .bind(block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_schedule(&self, entry: &ScheduledCommitment) -> IndexerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commitment_schedule (giveaway, phase, due_ms) VALUES (?, ?, ?)
            ON CONFLICT(giveaway) DO UPDATE SET
                phase = excluded.phase,
                due_ms = excluded.due_ms
            "#,
        )
        .bind(format!("{:?}", entry.giveaway))
        .bind(entry.phase.as_str())
        .bind(entry.due_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_schedule(&self, giveaway: Address) -> IndexerResult<()> {
        sqlx::query("DELETE FROM commitment_schedule WHERE giveaway = ?")
            .bind(format!("{:?}", giveaway))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn schedules(&self) -> IndexerResult<Vec<ScheduledCommitment>> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT giveaway, phase, due_ms FROM commitment_schedule")
                .fetch_all(&self.pool)
                .await?;

        let mut result = Vec::with_capacity(rows.len());
        for (giveaway, phase, due_ms) in rows {
            match (giveaway.parse(), phase.parse()) {
                (Ok(giveaway), Ok(phase)) => result.push(ScheduledCommitment {
                    giveaway,
                    phase,
                    due_ms: due_ms as u64,
                }),
                _ => tracing::warn!("Skipping malformed schedule row for {}", giveaway),
            }
        }
        Ok(result)
    }
}
