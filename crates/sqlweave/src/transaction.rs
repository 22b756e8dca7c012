//! Transaction coordinator.
//!
//! A [`Transaction`] is a cheap, cloneable handle around one driver transaction.
//! Statements are serialized through an async mutex, and the handle moves through
//! `Active -> {Committed, RolledBack}` exactly once.
//!
//! Prefer [`crate::Db::transaction`], which commits on `Ok`, rolls back on `Err` or panic:
//!
//! ```ignore
//! let id = db
//!     .transaction(TxOptions::new(), |tx| async move {
//!         let qb = tx.builder();
//!         qb.update("accounts")
//!             .increment("balance", -100)
//!             .eq("id", 1)
//!             .execute(&tx)
//!             .await?;
//!         Ok(1)
//!     })
//!     .await?;
//! ```

use crate::client::{Executor, with_timeout};
use crate::dialect::Dialect;
use crate::driver::Driver;
use crate::error::{SqlError, SqlResult};
use crate::qb::{ComposedQuery, QueryBuilder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Observable transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Committed,
    RolledBack,
}

enum TxState<T> {
    Active(T),
    Committed,
    RolledBack,
}

impl<T> TxState<T> {
    fn status(&self) -> TxStatus {
        match self {
            TxState::Active(_) => TxStatus::Active,
            TxState::Committed => TxStatus::Committed,
            TxState::RolledBack => TxStatus::RolledBack,
        }
    }

    fn closed_error(&self) -> SqlError {
        match self {
            TxState::Committed => SqlError::TransactionClosed("committed"),
            _ => SqlError::TransactionClosed("rolled back"),
        }
    }
}

struct TxInner<D: Driver> {
    driver: Arc<D>,
    dialect: Dialect,
    query_timeout: Option<Duration>,
    state: Mutex<TxState<D::Transaction>>,
}

/// An open (or finished) database transaction.
pub struct Transaction<D: Driver> {
    inner: Arc<TxInner<D>>,
}

impl<D: Driver> Clone for Transaction<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> fmt::Debug for Transaction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("dialect", &self.inner.dialect.name)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Transaction<D> {
    pub(crate) fn new(
        driver: Arc<D>,
        dialect: Dialect,
        query_timeout: Option<Duration>,
        handle: D::Transaction,
    ) -> Self {
        Self {
            inner: Arc::new(TxInner {
                driver,
                dialect,
                query_timeout,
                state: Mutex::new(TxState::Active(handle)),
            }),
        }
    }

    /// Statement factory bound to this transaction's dialect.
    pub fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.inner.dialect)
    }

    pub async fn status(&self) -> TxStatus {
        self.inner.state.lock().await.status()
    }

    /// Commit the transaction.
    ///
    /// Fails with [`SqlError::TransactionClosed`] once the transaction has finished. If the
    /// driver rejects the commit the transaction is considered rolled back.
    pub async fn commit(&self) -> SqlResult<()> {
        let mut state = self.inner.state.lock().await;
        match std::mem::replace(&mut *state, TxState::RolledBack) {
            TxState::Active(handle) => {
                self.inner.driver.commit(handle).await?;
                *state = TxState::Committed;
                Ok(())
            }
            closed => {
                let err = closed.closed_error();
                *state = closed;
                Err(err)
            }
        }
    }

    /// Roll the transaction back. A no-op once the transaction has finished.
    pub async fn rollback(&self) -> SqlResult<()> {
        let mut state = self.inner.state.lock().await;
        match std::mem::replace(&mut *state, TxState::RolledBack) {
            TxState::Active(handle) => self.inner.driver.rollback(handle).await,
            closed => {
                *state = closed;
                Ok(())
            }
        }
    }

    /// Roll back, logging instead of returning a failure.
    pub(crate) async fn rollback_quietly(&self) {
        if let Err(err) = self.rollback().await {
            #[cfg(feature = "tracing")]
            tracing::warn!(target: "sqlweave.tx", error = %err, "rollback failed");
            #[cfg(not(feature = "tracing"))]
            let _ = err;
        }
    }
}

impl<D: Driver> Executor for Transaction<D> {
    type Row = D::Row;

    fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    fn query(
        &self,
        query: &ComposedQuery,
        timeout: Option<Duration>,
    ) -> impl std::future::Future<Output = SqlResult<Vec<D::Row>>> + Send {
        async move {
            let mut state = self.inner.state.lock().await;
            let handle = match &mut *state {
                TxState::Active(handle) => handle,
                closed => return Err(closed.closed_error()),
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "sqlweave.sql",
                in_transaction = true,
                param_count = query.params().len(),
                sql = %query.sql(),
                "executing statement"
            );
            with_timeout(
                timeout.or(self.inner.query_timeout),
                self.inner
                    .driver
                    .query_in(handle, query.sql(), query.params()),
            )
            .await
        }
    }

    fn execute(
        &self,
        query: &ComposedQuery,
        timeout: Option<Duration>,
    ) -> impl std::future::Future<Output = SqlResult<u64>> + Send {
        async move {
            let mut state = self.inner.state.lock().await;
            let handle = match &mut *state {
                TxState::Active(handle) => handle,
                closed => return Err(closed.closed_error()),
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "sqlweave.sql",
                in_transaction = true,
                param_count = query.params().len(),
                sql = %query.sql(),
                "executing statement"
            );
            with_timeout(
                timeout.or(self.inner.query_timeout),
                self.inner
                    .driver
                    .execute_in(handle, query.sql(), query.params()),
            )
            .await
        }
    }
}
