//! Safe wrapper around a `SQLite` prepared statement.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawStmt`] which encapsulates the raw pointers and C type conversions.

use std::fmt;

use crate::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::ffi::{self, RawStmt};
use crate::reader::{ColumnIndex, Reader, Rows};
use crate::value::Value;

/// Position of the statement's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Freshly prepared or reset; the next step starts execution.
    Idle,
    /// Positioned on a result row.
    Row,
    /// Exhausted (or failed). Stepping again returns `false` until reset.
    Done,
}

/// A prepared `SQLite` statement.
///
/// Created via [`Connection::prepare`] or [`Statement::new`]. Holds a
/// reference to its connection, so the connection stays open while the
/// statement is alive. Finalized when dropped or by [`finalize`](Self::finalize).
///
/// Column names are captured at prepare time. Columns can be read directly
/// from the statement (it implements [`Reader`]) once [`next_row`](Self::next_row)
/// has returned `true`.
pub struct Statement {
    raw: Option<RawStmt>,
    cursor: Cursor,
    columns: Vec<String>,
}

impl Statement {
    /// Compiles `sql` on `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Compile`] for malformed SQL or unknown tables and
    /// functions (including user functions called with the wrong number of
    /// arguments).
    pub fn new(conn: &Connection, sql: &str) -> DbResult<Self> {
        let raw = conn.raw().prepare(sql)?;
        let columns = (0..raw.column_count()).map(|i| raw.column_name(i)).collect();
        log::trace!("prepared statement: {sql}");
        Ok(Self {
            raw: Some(raw),
            cursor: Cursor::Idle,
            columns,
        })
    }

    fn raw(&self) -> DbResult<&RawStmt> {
        self.raw
            .as_ref()
            .ok_or_else(|| DbError::Misuse("statement has been finalized".into()))
    }

    fn range_error(parameter: impl fmt::Display) -> DbError {
        DbError::binding(parameter, ffi::SQLITE_RANGE, ffi::errstr(ffi::SQLITE_RANGE))
    }

    // ── Metadata ────────────────────────────────────────────────────────

    /// Returns `true` once the statement has been finalized.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.raw.is_none()
    }

    /// The SQL text the statement was compiled from.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Misuse`] if the statement has been finalized.
    pub fn sql(&self) -> DbResult<String> {
        Ok(self.raw()?.sql())
    }

    /// Returns `true` if the statement makes no direct changes to the
    /// database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Misuse`] if the statement has been finalized.
    pub fn is_readonly(&self) -> DbResult<bool> {
        Ok(self.raw()?.is_readonly())
    }

    /// Number of parameters (the largest parameter index).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Misuse`] if the statement has been finalized.
    pub fn parameter_count(&self) -> DbResult<usize> {
        Ok(self.raw()?.bind_parameter_count())
    }

    /// Number of result columns, 0 once finalized.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Result column names, in order. Empty once finalized.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Name of the column at zero-based `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ColumnOutOfRange`] for an invalid index and
    /// [`DbError::Misuse`] if the statement has been finalized.
    pub fn column_name(&self, index: usize) -> DbResult<&str> {
        self.raw()?;
        self.columns
            .get(index)
            .map(String::as_str)
            .ok_or(DbError::ColumnOutOfRange {
                index,
                count: self.columns.len(),
            })
    }

    /// Zero-based index of the first column called `name` (exact match).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownColumn`] if no column has that name and
    /// [`DbError::Misuse`] if the statement has been finalized.
    pub fn column_index(&self, name: &str) -> DbResult<usize> {
        self.raw()?;
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::UnknownColumn(name.to_string()))
    }

    // ── Binding ─────────────────────────────────────────────────────────

    /// Binds `value` to the parameter at 1-based `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Binding`] for an out-of-range index and
    /// [`DbError::Misuse`] if the statement is mid-execution (reset first).
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> DbResult<()> {
        let raw = self.raw()?;
        let i = i32::try_from(index).map_err(|_| Self::range_error(index))?;
        raw.bind_value(i, &value.into())
    }

    /// Binds `value` to the named parameter. The name includes its prefix,
    /// e.g. `":id"`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Binding`] if no parameter has that name.
    pub fn bind_by_name(&mut self, name: &str, value: impl Into<Value>) -> DbResult<()> {
        let raw = self.raw()?;
        let index = raw
            .bind_parameter_index(name)
            .ok_or_else(|| Self::range_error(name))?;
        raw.bind_value(index, &value.into())
    }

    /// Binds `values` to parameters `1..=values.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Binding`] if more values are supplied than the
    /// statement has parameters.
    pub fn bind_all(&mut self, values: &[Value]) -> DbResult<()> {
        let raw = self.raw()?;
        let count = raw.bind_parameter_count();
        if values.len() > count {
            return Err(DbError::binding(
                count + 1,
                ffi::SQLITE_RANGE,
                format!("{} values supplied for {count} parameters", values.len()),
            ));
        }
        for (i, value) in values.iter().enumerate() {
            let index = i32::try_from(i + 1).map_err(|_| Self::range_error(i + 1))?;
            raw.bind_value(index, value)?;
        }
        Ok(())
    }

    /// Binds UTF-16 text to the parameter at 1-based `index`.
    ///
    /// # Errors
    ///
    /// Same as [`bind`](Self::bind).
    pub fn bind_wide_text(&mut self, index: usize, text: &[u16]) -> DbResult<()> {
        let raw = self.raw()?;
        let i = i32::try_from(index).map_err(|_| Self::range_error(index))?;
        raw.bind_text16(i, text)
    }

    /// Resets every parameter to NULL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Misuse`] if the statement has been finalized.
    pub fn clear_bindings(&mut self) -> DbResult<()> {
        self.raw()?.clear_bindings()
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Rewinds the statement so it can be executed again. Bindings are kept.
    ///
    /// # Errors
    ///
    /// Reports the error of a failed previous step (the statement is rewound
    /// regardless).
    pub fn reset(&mut self) -> DbResult<()> {
        let result = self.raw()?.reset();
        self.cursor = Cursor::Idle;
        result
    }

    /// Rewinds the statement and replaces all bindings with `values`.
    ///
    /// # Errors
    ///
    /// See [`reset`](Self::reset) and [`bind_all`](Self::bind_all).
    pub fn reset_with(&mut self, values: &[Value]) -> DbResult<()> {
        self.reset()?;
        self.clear_bindings()?;
        self.bind_all(values)
    }

    /// Rewinds if a previous execution left the cursor elsewhere. A stale
    /// error from that execution has already been reported by its step.
    fn rewind(&mut self) -> DbResult<()> {
        let raw = self.raw()?;
        if self.cursor != Cursor::Idle {
            if let Err(err) = raw.reset() {
                log::debug!("discarding error from previous execution: {err}");
            }
            self.cursor = Cursor::Idle;
        }
        Ok(())
    }

    /// Advances to the next result row. Returns `false` once the result set
    /// is exhausted; further calls keep returning `false` until the statement
    /// is reset.
    ///
    /// # Errors
    ///
    /// Returns the engine's error (e.g. a constraint violation, or
    /// [`DbError::Busy`]) and leaves the cursor exhausted.
    pub fn next_row(&mut self) -> DbResult<bool> {
        let raw = self.raw()?;
        if self.cursor == Cursor::Done {
            return Ok(false);
        }
        match raw.step() {
            Ok(true) => {
                self.cursor = Cursor::Row;
                Ok(true)
            }
            Ok(false) => {
                self.cursor = Cursor::Done;
                Ok(false)
            }
            Err(err) => {
                self.cursor = Cursor::Done;
                Err(err)
            }
        }
    }

    /// Runs the statement from the start and positions a cursor before the
    /// first row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Misuse`] if the statement has been finalized.
    pub fn execute(&mut self) -> DbResult<Rows<'_>> {
        self.rewind()?;
        Ok(Rows::new(self))
    }

    /// Runs the statement to completion and returns the number of rows
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns the first error reported while stepping.
    pub fn execute_update(&mut self) -> DbResult<usize> {
        self.rewind()?;
        let changes = self.raw()?.run_to_end();
        self.cursor = Cursor::Done;
        Ok(usize::try_from(changes?).unwrap_or(0))
    }

    /// Releases the compiled statement. Idempotent; any later operation
    /// fails with [`DbError::Misuse`].
    ///
    /// # Errors
    ///
    /// Reports the error of a failed previous step.
    pub fn finalize(&mut self) -> DbResult<()> {
        self.cursor = Cursor::Idle;
        self.columns.clear();
        self.raw.take().map_or(Ok(()), RawStmt::finalize)
    }

    /// Snapshots a column of the current row.
    pub(crate) fn read_value(&self, column: &impl ColumnIndex) -> DbResult<Value> {
        let raw = self.raw()?;
        let index = column.resolve(self)?;
        if self.cursor != Cursor::Row {
            return Err(DbError::NoRow);
        }
        Ok(raw.column_value(index))
    }
}

impl Reader for Statement {
    fn statement(&self) -> &Statement {
        self
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("columns", &self.columns)
            .field("cursor", &self.cursor)
            .field("finalized", &self.raw.is_none())
            .finish()
    }
}
