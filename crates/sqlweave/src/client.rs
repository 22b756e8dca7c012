//! Executor trait shared by connections and transactions.

use crate::dialect::Dialect;
use crate::error::SqlResult;
use crate::qb::ComposedQuery;
use std::future::Future;
use std::time::Duration;

/// A trait that unifies database handles and transactions.
///
/// Builder terminal methods (`fetch_all`, `execute`, ...) accept any `Executor`, so the
/// same statement runs against a [`crate::Db`] or inside a [`crate::Transaction`].
pub trait Executor: Send + Sync {
    /// Row type produced by the underlying driver.
    type Row: Send;

    /// Dialect statements must be built for.
    fn dialect(&self) -> Dialect;

    /// Run a composed statement and return all rows.
    ///
    /// `timeout` overrides the executor's default deadline when set.
    fn query(
        &self,
        query: &ComposedQuery,
        timeout: Option<Duration>,
    ) -> impl Future<Output = SqlResult<Vec<Self::Row>>> + Send;

    /// Run a composed statement and return the affected row count.
    fn execute(
        &self,
        query: &ComposedQuery,
        timeout: Option<Duration>,
    ) -> impl Future<Output = SqlResult<u64>> + Send;
}

/// Await `future`, failing with [`crate::SqlError::Timeout`] after `limit`.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, future: F) -> SqlResult<T>
where
    F: Future<Output = SqlResult<T>> + Send,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| crate::error::SqlError::Timeout(limit))?,
        None => future.await,
    }
}
