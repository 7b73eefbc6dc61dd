//! Typed column access over the current result row.
//!
//! [`Reader`] is implemented by [`Statement`], [`Rows`] and [`Row`]. Every
//! accessor takes a [`ColumnIndex`]: a zero-based `usize` or a column name.
//! The column is resolved first ([`DbError::UnknownColumn`] /
//! [`DbError::ColumnOutOfRange`]), then the cursor is checked
//! ([`DbError::NoRow`]). Reads never fail on a type mismatch; the value is
//! coerced (see [`crate::coerce`]).

use crate::error::{DbError, DbResult};
use crate::statement::Statement;
use crate::value::{FromValue, Type, Value};

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::Statement {}
    impl Sealed for super::Rows<'_> {}
    impl Sealed for super::Row<'_> {}
}

/// A way of naming a result column.
pub trait ColumnIndex {
    /// Resolves to a zero-based index into `stmt`'s result columns.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ColumnOutOfRange`] or [`DbError::UnknownColumn`].
    fn resolve(&self, stmt: &Statement) -> DbResult<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, stmt: &Statement) -> DbResult<usize> {
        let count = stmt.column_count();
        if *self < count {
            Ok(*self)
        } else {
            Err(DbError::ColumnOutOfRange {
                index: *self,
                count,
            })
        }
    }
}

impl ColumnIndex for str {
    fn resolve(&self, stmt: &Statement) -> DbResult<usize> {
        stmt.column_index(self)
    }
}

impl ColumnIndex for String {
    fn resolve(&self, stmt: &Statement) -> DbResult<usize> {
        stmt.column_index(self)
    }
}

impl<T: ColumnIndex + ?Sized> ColumnIndex for &T {
    fn resolve(&self, stmt: &Statement) -> DbResult<usize> {
        (**self).resolve(stmt)
    }
}

/// Column accessors for the current row.
///
/// This trait is sealed.
pub trait Reader: sealed::Sealed {
    #[doc(hidden)]
    fn statement(&self) -> &Statement;

    /// Number of result columns.
    fn column_count(&self) -> usize {
        self.statement().column_count()
    }

    /// Name of the column at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ColumnOutOfRange`].
    fn column_name(&self, index: usize) -> DbResult<&str> {
        self.statement().column_name(index)
    }

    /// Index of the first column called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownColumn`].
    fn column_index(&self, name: &str) -> DbResult<usize> {
        self.statement().column_index(name)
    }

    /// Owned snapshot of a column.
    ///
    /// # Errors
    ///
    /// See the [module documentation](self).
    fn get_value<I: ColumnIndex>(&self, column: I) -> DbResult<Value> {
        self.statement().read_value(&column)
    }

    /// Reads a column and converts it with [`FromValue`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get<T: FromValue, I: ColumnIndex>(&self, column: I) -> DbResult<T> {
        self.get_value(column).map(T::from_value)
    }

    /// Storage class of a column in the current row.
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_type<I: ColumnIndex>(&self, column: I) -> DbResult<Type> {
        self.get_value(column).map(|v| v.get_type())
    }

    /// Returns `true` if the column is SQL NULL.
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn is_null<I: ColumnIndex>(&self, column: I) -> DbResult<bool> {
        self.get_value(column).map(|v| v.is_null())
    }

    /// See [`Value::get_int`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_int<I: ColumnIndex>(&self, column: I) -> DbResult<i32> {
        self.get_value(column).map(|v| v.get_int())
    }

    /// See [`Value::get_int64`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_int64<I: ColumnIndex>(&self, column: I) -> DbResult<i64> {
        self.get_value(column).map(|v| v.get_int64())
    }

    /// See [`Value::get_uint`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_uint<I: ColumnIndex>(&self, column: I) -> DbResult<u32> {
        self.get_value(column).map(|v| v.get_uint())
    }

    /// See [`Value::get_double`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_double<I: ColumnIndex>(&self, column: I) -> DbResult<f64> {
        self.get_value(column).map(|v| v.get_double())
    }

    /// See [`Value::get_text`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_text<I: ColumnIndex>(&self, column: I) -> DbResult<String> {
        self.get(column)
    }

    /// See [`Value::get_wide_text`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_wide_text<I: ColumnIndex>(&self, column: I) -> DbResult<Vec<u16>> {
        self.get_value(column).map(|v| v.get_wide_text())
    }

    /// See [`Value::get_blob`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_blob<I: ColumnIndex>(&self, column: I) -> DbResult<Vec<u8>> {
        self.get(column)
    }

    /// See [`Value::get_bytes`].
    ///
    /// # Errors
    ///
    /// Same as [`get_value`](Self::get_value).
    fn get_bytes<I: ColumnIndex>(&self, column: I) -> DbResult<usize> {
        self.get_value(column).map(|v| v.get_bytes())
    }
}

/// Cursor over the rows of an executed [`Statement`].
///
/// Returned by [`Statement::execute`], positioned before the first row.
#[derive(Debug)]
pub struct Rows<'stmt> {
    stmt: &'stmt mut Statement,
}

impl<'stmt> Rows<'stmt> {
    pub(crate) fn new(stmt: &'stmt mut Statement) -> Self {
        Self { stmt }
    }

    /// Advances to the next row. See [`Statement::next_row`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn next_row(&mut self) -> DbResult<bool> {
        self.stmt.next_row()
    }

    /// Advances and returns a view of the new row, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> DbResult<Option<Row<'_>>> {
        if self.stmt.next_row()? {
            Ok(Some(Row { stmt: &*self.stmt }))
        } else {
            Ok(None)
        }
    }

    /// Maps every remaining row through `f`.
    ///
    /// # Errors
    ///
    /// Returns the first error from stepping or from `f`.
    pub fn mapped<T>(
        mut self,
        mut f: impl FnMut(&Row<'_>) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let mut results = Vec::new();
        while let Some(row) = self.next()? {
            results.push(f(&row)?);
        }
        Ok(results)
    }
}

impl Reader for Rows<'_> {
    fn statement(&self) -> &Statement {
        &*self.stmt
    }
}

/// View of the current row, valid until the cursor advances.
#[derive(Debug, Clone, Copy)]
pub struct Row<'stmt> {
    stmt: &'stmt Statement,
}

impl Reader for Row<'_> {
    fn statement(&self) -> &Statement {
        self.stmt
    }
}
