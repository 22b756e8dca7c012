use super::Db;
use super::statement_cache::CachedStatement;
use crate::client::{Executor, with_timeout};
use crate::dialect::Dialect;
use crate::driver::Driver;
use crate::error::{SqlError, SqlResult};
use crate::qb::ComposedQuery;
use std::future::Future;
use std::time::Duration;

// ============================================================================
// Internal helpers
// ============================================================================

impl<D: Driver> Db<D> {
    fn effective_timeout(&self, timeout: Option<Duration>) -> Option<Duration> {
        timeout.or(self.inner.config.query_timeout)
    }

    #[cfg(not(feature = "tracing"))]
    fn emit_tracing_sql(&self, _query: &ComposedQuery) {}

    #[cfg(feature = "tracing")]
    fn emit_tracing_sql(&self, query: &ComposedQuery) {
        tracing::debug!(
            target: "sqlweave.sql",
            dialect = self.inner.dialect.name,
            param_count = query.params().len(),
            sql = %query.sql(),
            "executing statement"
        );
    }

    /// Cached handle for `sql`, preparing it on a miss.
    async fn prepared(&self, sql: &str) -> SqlResult<CachedStatement<D::Statement>> {
        let driver = &self.inner.driver;
        self.inner
            .cache
            .get_or_prepare(sql, || driver.prepare(sql))
            .await
    }

    /// Drop a stale cache entry and prepare `sql` again.
    async fn reprepare(
        &self,
        sql: &str,
        cause: &SqlError,
    ) -> SqlResult<CachedStatement<D::Statement>> {
        self.inner.cache.remove(sql);
        #[cfg(feature = "tracing")]
        tracing::warn!(
            target: "sqlweave.cache",
            error = %cause,
            sql = %sql,
            "prepared statement went stale, re-preparing"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = cause;
        self.prepared(sql).await
    }

    async fn query_rows(&self, query: &ComposedQuery) -> SqlResult<Vec<D::Row>> {
        let driver = &*self.inner.driver;
        let stmt = self.prepared(query.sql()).await?;
        match driver.query(&stmt, query.params()).await {
            Err(err) if driver.is_stale_statement(&err) => {
                drop(stmt);
                let stmt = self.reprepare(query.sql(), &err).await?;
                driver.query(&stmt, query.params()).await
            }
            result => result,
        }
    }

    async fn execute_stmt(&self, query: &ComposedQuery) -> SqlResult<u64> {
        let driver = &*self.inner.driver;
        let stmt = self.prepared(query.sql()).await?;
        match driver.execute(&stmt, query.params()).await {
            Err(err) if driver.is_stale_statement(&err) => {
                drop(stmt);
                let stmt = self.reprepare(query.sql(), &err).await?;
                driver.execute(&stmt, query.params()).await
            }
            result => result,
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

impl<D: Driver> Executor for Db<D> {
    type Row = D::Row;

    fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    fn query(
        &self,
        query: &ComposedQuery,
        timeout: Option<Duration>,
    ) -> impl Future<Output = SqlResult<Vec<D::Row>>> + Send {
        async move {
            self.emit_tracing_sql(query);
            with_timeout(self.effective_timeout(timeout), self.query_rows(query)).await
        }
    }

    fn execute(
        &self,
        query: &ComposedQuery,
        timeout: Option<Duration>,
    ) -> impl Future<Output = SqlResult<u64>> + Send {
        async move {
            self.emit_tracing_sql(query);
            with_timeout(self.effective_timeout(timeout), self.execute_stmt(query)).await
        }
    }
}
