//! Row mapping traits and utilities

use crate::error::SqlResult;

/// Trait for types that can be built from a driver row type `R`.
///
/// ```ignore
/// struct User { id: i64, name: String }
///
/// impl FromRow<tokio_postgres::Row> for User {
///     fn from_row(row: &tokio_postgres::Row) -> SqlResult<Self> {
///         Ok(User {
///             id: row.try_get_column("id")?,
///             name: row.try_get_column("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow<R>: Sized {
    /// Convert a database row into Self
    fn from_row(row: &R) -> SqlResult<Self>;
}

/// Extension trait for Row to provide typed access
#[cfg(feature = "postgres")]
pub trait RowExt {
    /// Try to get a column value, returning SqlError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> SqlResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;
}

#[cfg(feature = "postgres")]
impl RowExt for tokio_postgres::Row {
    fn try_get_column<T>(&self, column: &str) -> SqlResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| crate::error::SqlError::decode(column, e.to_string()))
    }
}
