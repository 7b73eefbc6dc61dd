//! Minimal safe `SQLite` wrapper backed by the bundled amalgamation.
//!
//! This crate provides a small, safe Rust API over the `SQLite` C FFI:
//!
//! * [`Connection`]: a shared handle to an open database.
//! * [`Statement`]: a compiled query with parameter binding; [`Rows`] and
//!   [`Row`] iterate its results.
//! * [`Reader`]: typed column access by index or by name.
//! * [`Value`]: an owned snapshot of one column, with the engine's coercion
//!   rules in [`coerce`].
//! * [`Backup`]: page-by-page online copy between two connections.
//! * [`DbMutex`]: the connection mutex, for making multi-statement sequences
//!   atomic across threads.
//! * [`Transaction`] and user-defined [`functions`].
//!
//! Consumer code uses only the safe types defined here and never touches raw
//! FFI directly. The `ffi` module is the **only** file that contains `unsafe`
//! code or C types.
//!
//! ```rust
//! use sqlitekit_db::{params, Connection, Reader};
//!
//! let conn = Connection::memory()?;
//! conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")?;
//! conn.execute("INSERT INTO t (id, name) VALUES (?1, ?2)", params![1, "one"])?;
//!
//! let mut stmt = conn.prepare("SELECT id, name FROM t")?;
//! let mut rows = stmt.execute()?;
//! while let Some(row) = rows.next()? {
//!     assert_eq!(row.get_int("id")?, 1);
//!     assert_eq!(row.get_text(1)?, "one");
//! }
//! # Ok::<(), sqlitekit_db::DbError>(())
//! ```

mod ffi;

mod backup;
pub mod coerce;
mod config;
mod connection;
pub mod error;
pub mod functions;
pub mod logger;
mod mutex;
mod reader;
mod statement;
mod transaction;
pub mod value;

pub use backup::{Backup, BackupProgress, BackupState};
pub use config::{OpenMode, OpenOptions, DEFAULT_BUSY_TIMEOUT};
pub use connection::Connection;
pub use error::{DbError, DbErrorCode, DbResult};
pub use functions::Aggregate;
pub use mutex::{DbMutex, DbMutexGuard};
pub use reader::{ColumnIndex, Reader, Row, Rows};
pub use statement::Statement;
pub use transaction::{Transaction, TransactionBehavior};
pub use value::{FromValue, Type, Value};
