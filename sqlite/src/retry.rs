//! Retry-on-lock execution.
//!
//! Every database-mutating statement the engine issues goes through
//! [`RetryPolicy::run`]: when SQLite reports `SQLITE_BUSY` or
//! `SQLITE_LOCKED` the statement is retried immediately until it succeeds
//! or the timeout elapses. Any other error is returned at once.

use std::time::{Duration, Instant};

use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Batch, Connection, Params};
use schema_tick_core::DEFAULT_RETRY_TIMEOUT_SECS;
use tracing::{debug, warn};

use crate::error::{Result, SqliteError, is_locked_error};

/// Bounded spin-retry for transiently locked databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_RETRY_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `op` until it succeeds, fails with a non-lock error, or the
    /// timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::Timeout`] once a lock persists past the
    /// timeout, or the first non-lock error unchanged.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> rusqlite::Result<T>,
    {
        let start = Instant::now();
        let mut attempts = 0u64;
        loop {
            match op() {
                Ok(value) => {
                    if attempts > 0 {
                        debug!(attempts, elapsed = ?start.elapsed(), "statement succeeded after lock retries");
                    }
                    return Ok(value);
                }
                Err(err) if is_locked_error(&err) => {
                    attempts += 1;
                    let elapsed = start.elapsed();
                    if elapsed >= self.timeout {
                        warn!(attempts, ?elapsed, "giving up on locked database");
                        return Err(SqliteError::Timeout {
                            elapsed,
                            timeout: self.timeout,
                            last_error: err,
                        });
                    }
                    if attempts == 1 {
                        debug!("database locked, retrying");
                    }
                    std::hint::spin_loop();
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Executes one statement with retry, returning the affected row count.
    pub fn execute<P: Params + Clone>(&self, conn: &Connection, sql: &str, params: P) -> Result<usize> {
        debug!(sql, "execute");
        self.run(|| conn.execute(sql, params.clone()))
    }

    /// Executes a parameterless statement batch, retrying each statement
    /// on its own so a lock never re-runs the statements before it.
    pub fn execute_batch(&self, conn: &Connection, sql: &str) -> Result<()> {
        debug!(sql, "execute batch");
        let mut batch = Batch::new(conn, sql);
        while let Some(mut stmt) = batch.next()? {
            self.run(|| {
                let mut rows = stmt.raw_query();
                while rows.next()?.is_some() {}
                Ok(())
            })?;
        }
        Ok(())
    }
}
