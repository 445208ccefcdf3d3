//! SQLite database layer for run persistence.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::DealflowError;

/// Thread-safe handle to the SQLite database.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, DealflowError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| DealflowError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| DealflowError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DealflowError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DealflowError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| DealflowError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DealflowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DealflowError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| DealflowError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, DealflowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| DealflowError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    ///
    /// Timestamps are stored as RFC 3339 text. Status columns are CHECK
    /// constrained to the values of `RunStatus` / `StepStatus` / `MessageRole`.
    fn initialize_tables(&self) -> Result<(), DealflowError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS deals (
                    id              TEXT PRIMARY KEY,
                    deal_type       TEXT CHECK (deal_type IN ('buyer_ma', 'seller_ma', 'ipo')),
                    company_name    TEXT,
                    industry        TEXT,
                    deal_size       TEXT,
                    status          TEXT NOT NULL DEFAULT 'active'
                                    CHECK (status IN ('active', 'closed')),
                    metadata        TEXT NOT NULL DEFAULT '{}',
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workflows (
                    id              TEXT PRIMARY KEY,
                    user_query      TEXT NOT NULL,
                    workflow_type   TEXT CHECK (workflow_type IN ('buyer_ma', 'seller_ma', 'ipo')),
                    status          TEXT NOT NULL DEFAULT 'pending'
                                    CHECK (status IN ('pending', 'routing', 'executing',
                                                      'completed', 'failed', 'cancelled')),
                    rationale       TEXT,
                    confidence      TEXT CHECK (confidence IN ('high', 'low')),
                    deal_id         TEXT REFERENCES deals(id),
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_workflows_created ON workflows(created_at);

                CREATE TABLE IF NOT EXISTS workflow_results (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id),
                    agent_name      TEXT NOT NULL,
                    sequence_index  INTEGER NOT NULL,
                    status          TEXT NOT NULL
                                    CHECK (status IN ('pending', 'in_progress', 'success', 'failed')),
                    result_data     TEXT NOT NULL DEFAULT '{}',
                    execution_ms    INTEGER NOT NULL DEFAULT 0,
                    attempts        INTEGER NOT NULL DEFAULT 1,
                    created_at      TEXT NOT NULL,
                    UNIQUE (workflow_id, sequence_index),
                    UNIQUE (workflow_id, agent_name)
                );
                CREATE INDEX IF NOT EXISTS idx_results_workflow ON workflow_results(workflow_id);

                CREATE TABLE IF NOT EXISTS messages (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id),
                    role            TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                    content         TEXT NOT NULL,
                    timestamp       TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_workflow ON messages(workflow_id);
                ",
            )
        })
    }
}
