//! User-defined SQL functions.
//!
//! Arguments arrive as owned [`Value`]s and results are returned as a
//! [`Value`]. An `Err` (or a panic) inside a function is reported to the
//! engine as an SQL error, which surfaces from the statement's step as
//! [`DbError::Engine`](crate::DbError::Engine).

use crate::connection::Connection;
use crate::error::DbResult;
use crate::value::Value;

/// Per-group state of an aggregate function.
///
/// A fresh `Default` instance is created for every group; `step` is called
/// once per input row and `finalize` once at the end. Empty groups skip
/// `step` and finalize the default state.
pub trait Aggregate: Default + Send + 'static {
    /// Accumulates one row.
    ///
    /// # Errors
    ///
    /// An error aborts the query with its message.
    fn step(&mut self, args: &[Value]) -> DbResult<()>;

    /// Produces the group's result.
    ///
    /// # Errors
    ///
    /// An error aborts the query with its message.
    fn finalize(self) -> DbResult<Value>;
}

impl Connection {
    /// Registers (or replaces) a scalar SQL function.
    ///
    /// `n_args` is the exact argument count, or `-1` for any. Calls with a
    /// different argument count fail when the statement is prepared.
    /// `deterministic` lets the planner factor out repeated calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the registration, e.g. an
    /// out-of-range `n_args`.
    pub fn create_scalar_function<F>(
        &self,
        name: &str,
        n_args: i32,
        deterministic: bool,
        function: F,
    ) -> DbResult<()>
    where
        F: Fn(&[Value]) -> DbResult<Value> + Send + Sync + 'static,
    {
        log::debug!("registering scalar function {name}/{n_args}");
        self.raw()
            .create_scalar_function(name, n_args, deterministic, function)
    }

    /// Registers (or replaces) an aggregate SQL function backed by `A`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the registration.
    pub fn create_aggregate_function<A: Aggregate>(
        &self,
        name: &str,
        n_args: i32,
        deterministic: bool,
    ) -> DbResult<()> {
        log::debug!("registering aggregate function {name}/{n_args}");
        self.raw()
            .create_aggregate_function::<A>(name, n_args, deterministic)
    }
}
