//! Safe wrapper around a `SQLite` transaction.

use crate::connection::Connection;
use crate::error::DbResult;
use crate::reader::Row;
use crate::statement::Statement;
use crate::value::Value;

/// Transaction locking behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionBehavior {
    /// `BEGIN DEFERRED` (the default). Locks are taken on first use.
    #[default]
    Deferred,
    /// `BEGIN IMMEDIATE`. Acquires a RESERVED lock immediately.
    Immediate,
    /// `BEGIN EXCLUSIVE`. Prevents other connections from reading.
    Exclusive,
}

impl TransactionBehavior {
    const fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED",
            Self::Immediate => "BEGIN IMMEDIATE",
            Self::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// An open database transaction.
///
/// Automatically rolls back on drop unless explicitly committed. `commit`
/// and `rollback` consume the transaction, so it can only end once.
#[derive(Debug)]
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    finished: bool,
}

impl<'conn> Transaction<'conn> {
    /// Begins a new transaction on `conn`.
    pub(crate) fn begin(conn: &'conn Connection, behavior: TransactionBehavior) -> DbResult<Self> {
        conn.execute_batch(behavior.begin_sql())?;
        log::trace!("{} transaction started", behavior.begin_sql());
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns the engine's error from `COMMIT` (e.g. [`DbError::Busy`]);
    /// the transaction is then rolled back.
    ///
    /// [`DbError::Busy`]: crate::DbError::Busy
    pub fn commit(mut self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns the engine's error from `ROLLBACK`.
    pub fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")
    }

    /// The connection this transaction runs on.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        self.conn
    }

    // ── Delegated Connection methods ────────────────────────────────────

    /// See [`Connection::execute_batch`].
    ///
    /// # Errors
    ///
    /// See [`Connection::execute_batch`].
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)
    }

    /// See [`Connection::execute`].
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`].
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.conn.execute(sql, params)
    }

    /// See [`Connection::prepare`].
    ///
    /// # Errors
    ///
    /// See [`Connection::prepare`].
    pub fn prepare(&self, sql: &str) -> DbResult<Statement> {
        self.conn.prepare(sql)
    }

    /// See [`Connection::query_row`].
    ///
    /// # Errors
    ///
    /// See [`Connection::query_row`].
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Row<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        self.conn.query_row(sql, params, mapper)
    }

    /// See [`Connection::query_row_optional`].
    ///
    /// # Errors
    ///
    /// See [`Connection::query_row_optional`].
    pub fn query_row_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Row<'_>) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        self.conn.query_row_optional(sql, params, mapper)
    }

    /// See [`Connection::last_insert_rowid`].
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// See [`Connection::changes`].
    #[must_use]
    pub fn changes(&self) -> usize {
        self.conn.changes()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Best-effort rollback.
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("rollback on drop failed: {err}");
            }
        }
    }
}
