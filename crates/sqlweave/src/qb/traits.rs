//! Trait definitions for query builders.

use crate::client::Executor;
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::qb::expr::{self, Expr};
use crate::qb::writer::ComposedQuery;
use crate::row::FromRow;
use crate::value::Value;
use std::future::Future;
use std::time::Duration;

/// Base trait for all statement builders.
///
/// Provides rendering plus the terminal execution methods.
pub trait SqlQuery: Sync {
    /// Dialect this statement renders for.
    fn dialect(&self) -> Dialect;

    /// Render SQL text and parameters, or report the first build-time defect.
    fn build(&self) -> SqlResult<ComposedQuery>;

    /// Per-statement timeout, if one was set on the builder.
    fn deadline(&self) -> Option<Duration> {
        None
    }

    /// Debug helper: the rendered SQL text.
    fn to_sql(&self) -> SqlResult<String> {
        Ok(self.build()?.sql().to_string())
    }

    /// Render for a specific executor, rejecting a dialect mismatch.
    fn build_for<E: Executor>(&self, conn: &E) -> SqlResult<ComposedQuery> {
        if self.dialect() != conn.dialect() {
            return Err(SqlError::malformed(format!(
                "statement built for {} executed on a {} connection",
                self.dialect().name,
                conn.dialect().name
            )));
        }
        self.build()
    }

    /// Execute and return the affected row count.
    fn execute<E: Executor>(&self, conn: &E) -> impl Future<Output = SqlResult<u64>> + Send {
        async move {
            let query = self.build_for(conn)?;
            conn.execute(&query, self.deadline()).await
        }
    }

    /// Execute and return all rows.
    fn fetch_all<E: Executor>(
        &self,
        conn: &E,
    ) -> impl Future<Output = SqlResult<Vec<E::Row>>> + Send {
        async move {
            let query = self.build_for(conn)?;
            conn.query(&query, self.deadline()).await
        }
    }

    /// Execute and return the first row, if any.
    fn fetch_opt<E: Executor>(
        &self,
        conn: &E,
    ) -> impl Future<Output = SqlResult<Option<E::Row>>> + Send {
        async move { Ok(self.fetch_all(conn).await?.into_iter().next()) }
    }

    /// Execute and return the first row; zero rows is [`SqlError::NotFound`].
    fn fetch_one<E: Executor>(&self, conn: &E) -> impl Future<Output = SqlResult<E::Row>> + Send {
        async move {
            self.fetch_opt(conn)
                .await?
                .ok_or_else(|| SqlError::not_found("fetch_one() returned no rows"))
        }
    }

    /// Execute and map all rows to `T`.
    fn fetch_all_as<T, E>(&self, conn: &E) -> impl Future<Output = SqlResult<Vec<T>>> + Send
    where
        T: FromRow<E::Row> + Send,
        E: Executor,
    {
        async move {
            let rows = self.fetch_all(conn).await?;
            rows.iter().map(T::from_row).collect()
        }
    }

    /// Execute and map the first row to `T`, if any.
    fn fetch_opt_as<T, E>(&self, conn: &E) -> impl Future<Output = SqlResult<Option<T>>> + Send
    where
        T: FromRow<E::Row> + Send,
        E: Executor,
    {
        async move {
            let row = self.fetch_opt(conn).await?;
            row.as_ref().map(T::from_row).transpose()
        }
    }

    /// Execute and map exactly one row to `T`.
    fn fetch_one_as<T, E>(&self, conn: &E) -> impl Future<Output = SqlResult<T>> + Send
    where
        T: FromRow<E::Row> + Send,
        E: Executor,
    {
        async move {
            let row = self.fetch_one(conn).await?;
            T::from_row(&row)
        }
    }
}

/// WHERE-clause methods shared by SELECT, UPDATE and DELETE builders.
///
/// `and_where` appends to the root conjunction; `or_where` turns the current
/// condition into the left side of an OR.
pub trait Filter: Sized {
    /// Add a condition joined with AND.
    fn and_where(self, cond: impl Into<Expr>) -> Self;

    /// Rewrite the condition to `(existing) OR cond`.
    fn or_where(self, cond: impl Into<Expr>) -> Self;

    /// Add a raw `?`-placeholder condition joined with AND.
    fn where_raw<V: Into<Value>>(self, sql: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.and_where(expr::raw(sql, values))
    }

    /// Add a raw `?`-placeholder condition joined with OR.
    fn or_where_raw<V: Into<Value>>(self, sql: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.or_where(expr::raw(sql, values))
    }

    /// Add WHERE: column = value
    fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(expr::eq(column, value))
    }

    /// Add WHERE: column <> value
    fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(expr::ne(column, value))
    }

    /// Add WHERE: column > value
    fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(expr::gt(column, value))
    }

    /// Add WHERE: column >= value
    fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(expr::gte(column, value))
    }

    /// Add WHERE: column < value
    fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(expr::lt(column, value))
    }

    /// Add WHERE: column <= value
    fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(expr::lte(column, value))
    }

    /// Add WHERE: column IN (values)
    fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.and_where(expr::in_list(column, values))
    }

    /// Add WHERE: column NOT IN (values)
    fn not_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.and_where(expr::not_in(column, values))
    }

    /// Add WHERE: column LIKE '%value%' (matched literally)
    fn like(self, column: &str, value: &str) -> Self {
        self.and_where(expr::like(column, value))
    }

    /// Add WHERE: column BETWEEN low AND high
    fn between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.and_where(expr::between(column, low, high))
    }

    /// Add WHERE: column IS NULL
    fn is_null(self, column: &str) -> Self {
        self.and_where(expr::is_null(column))
    }

    /// Add WHERE: column IS NOT NULL
    fn is_not_null(self, column: &str) -> Self {
        self.and_where(expr::is_not_null(column))
    }

    /// Add an equality per `(column, value)` pair, rendered in sorted column order.
    fn filter_by<K: Into<String>, V: Into<Value>>(
        self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.and_where(expr::hash_eq(pairs))
    }
}
