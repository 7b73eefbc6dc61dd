//! Database error types for the safe `SQLite` wrapper.

use std::fmt;

use thiserror::Error;

use crate::ffi;

/// Extended result code returned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbErrorCode(pub i32);

impl DbErrorCode {
    /// The primary result code (the low byte of the extended code).
    #[must_use]
    pub const fn primary(self) -> i32 {
        self.0 & 0xff
    }

    /// Returns `true` for `SQLITE_BUSY` and `SQLITE_LOCKED` and their
    /// extended forms.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self.primary(), ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED)
    }
}

impl fmt::Display for DbErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned by database operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Query text could not be compiled.
    #[error("compile error ({code}): {message}")]
    Compile {
        /// Engine result code.
        code: DbErrorCode,
        /// Engine message.
        message: String,
    },

    /// A parameter could not be bound (bad index, name or count).
    #[error("binding error on parameter {parameter} ({code}): {message}")]
    Binding {
        /// 1-based index or name of the offending parameter.
        parameter: String,
        /// Engine result code.
        code: DbErrorCode,
        /// Engine message.
        message: String,
    },

    /// A column was read while the cursor was not positioned on a row.
    #[error("no current row")]
    NoRow,

    /// No result column has the requested name.
    #[error("no column was found with the name {0:?}")]
    UnknownColumn(String),

    /// Column index outside `[0, count)`.
    #[error("column index {index} out of range (column count {count})")]
    ColumnOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of result columns.
        count: usize,
    },

    /// The database is locked by another connection. Retrying may succeed.
    #[error("database busy ({code}): {message}")]
    Busy {
        /// Engine result code (`SQLITE_BUSY` or `SQLITE_LOCKED` family).
        code: DbErrorCode,
        /// Engine message.
        message: String,
    },

    /// Any other failure reported by the engine.
    #[error("sqlite error {code}: {message}")]
    Engine {
        /// Engine result code.
        code: DbErrorCode,
        /// Engine message.
        message: String,
    },

    /// The API was used incorrectly, e.g. a finalized statement was stepped.
    #[error("misuse: {0}")]
    Misuse(String),

    /// Error raised by a user-defined SQL function.
    #[error("function error: {0}")]
    Function(String),
}

impl DbError {
    /// Classifies an engine result code into the matching variant.
    pub(crate) fn from_code(code: i32, message: impl Into<String>) -> Self {
        let code = DbErrorCode(code);
        let message = message.into();
        if code.is_busy() {
            Self::Busy { code, message }
        } else if code.primary() == ffi::SQLITE_MISUSE {
            Self::Misuse(message)
        } else {
            Self::Engine { code, message }
        }
    }

    /// Like [`from_code`](Self::from_code), but non-busy failures are
    /// reported as [`DbError::Compile`].
    pub(crate) fn compile(code: i32, message: impl Into<String>) -> Self {
        match Self::from_code(code, message) {
            Self::Engine { code, message } => Self::Compile { code, message },
            other => other,
        }
    }

    /// Like [`from_code`](Self::from_code), but non-busy failures are
    /// reported as [`DbError::Binding`] on `parameter`.
    pub(crate) fn binding(
        parameter: impl fmt::Display,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        match Self::from_code(code, message) {
            Self::Engine { code, message } => Self::Binding {
                parameter: parameter.to_string(),
                code,
                message,
            },
            other => other,
        }
    }

    /// The engine result code, if this error came from the engine.
    #[must_use]
    pub const fn code(&self) -> Option<DbErrorCode> {
        match self {
            Self::Compile { code, .. }
            | Self::Binding { code, .. }
            | Self::Busy { code, .. }
            | Self::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if the operation may succeed when retried after a
    /// pause (lock contention).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
