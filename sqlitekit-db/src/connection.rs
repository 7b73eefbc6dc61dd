//! Safe wrapper around a `SQLite` database connection.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawDb`] which encapsulates the raw pointers and C type conversions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backup::Backup;
use crate::config::OpenOptions;
use crate::error::{DbError, DbResult};
use crate::ffi::{ProfileFn, RawDb};
use crate::mutex::DbMutex;
use crate::reader::Row;
use crate::statement::Statement;
use crate::transaction::{Transaction, TransactionBehavior};
use crate::value::Value;

/// A `SQLite` database connection.
///
/// Cloning is cheap and shares the same native connection. The connection is
/// closed once the last clone and every [`Statement`], [`Backup`] and
/// [`DbMutex`] created from it have been dropped.
///
/// Connections are opened in the engine's serialized threading mode, so a
/// `Connection` can be shared between threads. Use [`mutex`](Self::mutex)
/// to make multi-statement sequences atomic with respect to other threads.
#[derive(Clone)]
pub struct Connection {
    db: Arc<RawDb>,
}

impl Connection {
    /// Opens (or creates) a database at `path` for reading and writing with
    /// the default ten-minute busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with(path, &OpenOptions::default())
    }

    /// Opens a database with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the flags or the file cannot be
    /// opened (e.g. a missing file opened read-only).
    pub fn open_with(path: impl AsRef<Path>, options: &OpenOptions) -> DbResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let db = RawDb::open(&path_str, options.mode.bits(), options.vfs.as_deref())?;
        let conn = Self { db: Arc::new(db) };
        conn.set_busy_timeout(options.busy_timeout())?;
        if options.profile {
            conn.log_profile()?;
        }
        log::debug!(
            "opened database {path_str} (flags {:#x}, busy timeout {}ms)",
            options.mode.bits(),
            options.busy_timeout_ms
        );
        Ok(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate the database.
    pub fn memory() -> DbResult<Self> {
        Self::open(":memory:")
    }

    /// Opens a private in-memory database whose text encoding is UTF-16.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate the database.
    pub fn wide_memory() -> DbResult<Self> {
        let conn = Self::memory()?;
        conn.execute_batch("PRAGMA encoding = 'UTF-16'")?;
        Ok(conn)
    }

    pub(crate) const fn raw(&self) -> &Arc<RawDb> {
        &self.db
    }

    /// Sets how long to wait on a locked database. Zero disables waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the call.
    pub fn set_busy_timeout(&self, timeout: Duration) -> DbResult<()> {
        let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.db.busy_timeout(ms)
    }

    /// Calls `callback` with the SQL text and run time of every statement
    /// that finishes on this connection. Replaces any previous callback.
    ///
    /// The callback runs while the engine holds the connection mutex. A
    /// panic in it is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the hook.
    pub fn profile<F>(&self, callback: F) -> DbResult<()>
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        let profiler: Arc<ProfileFn> = Arc::new(callback);
        self.db.set_profiler(Some(profiler))
    }

    /// Profiles every statement to the `log` facade at trace level.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the hook.
    pub fn log_profile(&self) -> DbResult<()> {
        self.profile(|sql, elapsed| log::trace!("{sql} ran in {elapsed:?}"))
    }

    /// Removes the profile callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the call.
    pub fn clear_profile(&self) -> DbResult<()> {
        self.db.set_profiler(None)
    }

    // ── execute_batch ───────────────────────────────────────────────────

    /// Executes one or more SQL statements separated by semicolons.
    ///
    /// No result rows are returned. Suitable for DDL, PRAGMAs, and
    /// multi-statement scripts.
    ///
    /// # Errors
    ///
    /// Returns the first statement's error.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.db.exec(sql)
    }

    /// Executes `sql`, calling `callback(values, names)` for every result
    /// row. Columns are rendered as text; NULL is passed as `""`. Returning
    /// `false` from `callback` stops execution early without an error.
    ///
    /// # Errors
    ///
    /// Returns the first statement's error.
    pub fn execute_callback<F>(&self, sql: &str, callback: F) -> DbResult<()>
    where
        F: FnMut(&[&str], &[&str]) -> bool,
    {
        self.db.exec_with(sql, callback)
    }

    // ── prepare / execute ───────────────────────────────────────────────

    /// Prepares a single SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Compile`] for invalid SQL.
    pub fn prepare(&self, sql: &str) -> DbResult<Statement> {
        Statement::new(self, sql)
    }

    /// Prepares and executes a single SQL statement with the given parameters.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns compile, binding and execution errors.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_all(params)?;
        stmt.execute_update()
    }

    // ── query_row ───────────────────────────────────────────────────────

    /// Prepares and executes a statement, mapping exactly one result row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NoRow`] if no row is returned.
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Row<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        self.query_row_optional(sql, params, mapper)?
            .ok_or(DbError::NoRow)
    }

    /// Like [`query_row`](Self::query_row) but returns `Ok(None)` when no row
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns compile, binding and execution errors.
    pub fn query_row_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Row<'_>) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_all(params)?;
        let mut rows = stmt.execute()?;
        match rows.next()? {
            Some(row) => mapper(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Prepares a statement and collects all matching rows.
    ///
    /// # Errors
    ///
    /// Returns the first error from the statement or from `mapper`.
    pub fn query_map<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnMut(&Row<'_>) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_all(params)?;
        stmt.execute()?.mapped(mapper)
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Begins a deferred transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    pub fn transaction(&self) -> DbResult<Transaction<'_>> {
        self.transaction_with(TransactionBehavior::Deferred)
    }

    /// Begins an immediate transaction (acquires a RESERVED lock right away).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Busy`] if another connection holds the write lock.
    pub fn transaction_immediate(&self) -> DbResult<Transaction<'_>> {
        self.transaction_with(TransactionBehavior::Immediate)
    }

    /// Begins an exclusive transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Busy`] if another connection holds a lock.
    pub fn transaction_exclusive(&self) -> DbResult<Transaction<'_>> {
        self.transaction_with(TransactionBehavior::Exclusive)
    }

    /// Begins a transaction with the given behavior.
    ///
    /// # Errors
    ///
    /// Returns the engine's error from `BEGIN`.
    pub fn transaction_with(&self, behavior: TransactionBehavior) -> DbResult<Transaction<'_>> {
        Transaction::begin(self, behavior)
    }

    // ── Mutex / backup ──────────────────────────────────────────────────

    /// The connection's mutex.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Misuse`] if the engine provides no mutex for this
    /// connection.
    pub fn mutex(&self) -> DbResult<DbMutex> {
        DbMutex::new(self)
    }

    /// Copies this database's `main` schema over `destination` in one pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot start or a step fails.
    pub fn backup_to(&self, destination: &Self) -> DbResult<()> {
        let mut backup = Backup::new(self, destination)?;
        backup.step_all()?;
        backup.finish()
    }

    /// Writes a copy of this database to the file at `path`, replacing its
    /// contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the copy fails.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> DbResult<()> {
        let destination = Self::open(path)?;
        self.backup_to(&destination)
    }

    // ── Status ──────────────────────────────────────────────────────────

    /// Returns the rowid of the most recent successful INSERT.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.db.last_insert_rowid()
    }

    /// Returns the number of rows changed by the most recent statement.
    #[must_use]
    pub fn changes(&self) -> usize {
        usize::try_from(self.db.changes()).unwrap_or(0)
    }

    /// Returns the number of rows changed since the connection was opened.
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        u64::try_from(self.db.total_changes()).unwrap_or(0)
    }

    /// Returns `true` unless a transaction is open.
    #[must_use]
    pub fn is_autocommit(&self) -> bool {
        self.db.is_autocommit()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
