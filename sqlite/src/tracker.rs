//! Process-wide tracking of open connections.
//!
//! Every connection opened through [`Database`] is registered under a random
//! id together with its interrupt handle, so [`interrupt_all`] can abort
//! in-flight statements on connections the caller no longer holds a
//! reference to (for example at test teardown). Handles unregister
//! themselves when dropped.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SqliteError};

static OPEN_CONNECTIONS: LazyLock<Mutex<HashMap<Uuid, InterruptHandle>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Entry point for opening tracked connections.
pub struct Database;

impl Database {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::OpenFailed`] if SQLite rejects the path.
    pub fn open(path: impl AsRef<Path>) -> Result<TrackedConnection> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| SqliteError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(TrackedConnection::new(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<TrackedConnection> {
        let conn = Connection::open_in_memory().map_err(|source| SqliteError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(TrackedConnection::new(conn))
    }
}

/// A connection registered in the process-wide tracker.
#[derive(Debug)]
pub struct TrackedConnection {
    id: Uuid,
    conn: Connection,
}

impl TrackedConnection {
    /// Registers an already-open connection.
    pub fn new(conn: Connection) -> Self {
        let id = Uuid::new_v4();
        OPEN_CONNECTIONS.lock().insert(id, conn.get_interrupt_handle());
        debug!(%id, "connection opened");
        Self { id, conn }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns a mutable reference for transaction composition.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Deref for TrackedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for TrackedConnection {
    fn drop(&mut self) {
        OPEN_CONNECTIONS.lock().remove(&self.id);
        debug!(id = %self.id, "connection closed");
    }
}

/// Number of tracked connections currently open.
pub fn open_count() -> usize {
    OPEN_CONNECTIONS.lock().len()
}

/// Returns `true` if the connection with `id` is still open.
pub fn is_open(id: Uuid) -> bool {
    OPEN_CONNECTIONS.lock().contains_key(&id)
}

/// Interrupts any statement running on any tracked connection.
///
/// Returns the number of connections signalled. An interrupted statement
/// fails with `SQLITE_INTERRUPT`, which is not retried.
pub fn interrupt_all() -> usize {
    let open = OPEN_CONNECTIONS.lock();
    for handle in open.values() {
        handle.interrupt();
    }
    open.len()
}
