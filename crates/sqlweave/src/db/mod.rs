//! Database handle: a [`Driver`] plus a prepared statement cache, a dialect and defaults.
//!
//! `Db` is the entry point for running composed statements. It derives the dialect from
//! the driver name, hands out dialect-bound builders, caches prepared statements by SQL
//! text, and coordinates transactions.
//!
//! # Example
//!
//! ```ignore
//! use sqlweave::prelude::*;
//! use std::time::Duration;
//!
//! let db = Db::with_config(
//!     PgDriver::connect(&database_url).await?,
//!     DbConfig::new()
//!         .statement_cache(128)
//!         .timeout(Duration::from_secs(30)),
//! )?;
//!
//! let rows = db
//!     .select_from("users")
//!     .eq("status", "active")
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .fetch_all(&db)
//!     .await?;
//!
//! println!("cache: {:?}", db.cache_stats());
//! ```

pub mod config;
mod execute;
pub mod statement_cache;

pub use config::{DbConfig, StatementCacheConfig};
pub use statement_cache::{CacheStats, CachedStatement, StatementCache};

use crate::dialect::Dialect;
use crate::driver::{Driver, TxOptions};
use crate::error::{SqlError, SqlResult};
use crate::qb::{
    BatchInsert, BatchUpdate, DeleteQuery, InsertQuery, OnConflict, QueryBuilder, SelectQuery,
    UpdateQuery,
};
use crate::transaction::{Transaction, TxStatus};
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;


struct DbInner<D: Driver> {
    driver: Arc<D>,
    dialect: Dialect,
    cache: StatementCache<D::Statement>,
    config: DbConfig,
}

/// A database handle. Cloning is cheap and shares the driver and statement cache.
pub struct Db<D: Driver> {
    inner: Arc<DbInner<D>>,
}

impl<D: Driver> Clone for Db<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> fmt::Debug for Db<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("driver", &self.inner.driver.name())
            .field("dialect", &self.inner.dialect.name)
            .field("cache", &self.inner.cache.stats())
            .finish()
    }
}

impl<D: Driver> Db<D> {
    /// Open a handle with the default configuration.
    ///
    /// Fails with [`SqlError::Malformed`] when the driver name maps to no known dialect.
    pub fn open(driver: D) -> SqlResult<Self> {
        Self::with_config(driver, DbConfig::default())
    }

    /// Open a handle with a custom configuration.
    pub fn with_config(driver: D, config: DbConfig) -> SqlResult<Self> {
        let dialect = match config.dialect {
            Some(dialect) => dialect,
            None => Dialect::from_driver_name(driver.name())?,
        };

        let driver = Arc::new(driver);
        let closer = Arc::clone(&driver);
        let cache = StatementCache::new(
            config.statement_cache.effective_capacity(),
            move |stmt: &D::Statement| closer.close_statement(stmt),
        );

        Ok(Self {
            inner: Arc::new(DbInner {
                driver,
                dialect,
                cache,
                config,
            }),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    /// Statement factory bound to this handle's dialect.
    pub fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.inner.dialect)
    }

    pub fn select<S: AsRef<str>>(&self, columns: impl IntoIterator<Item = S>) -> SelectQuery {
        self.builder().select(columns)
    }

    pub fn select_from(&self, table: &str) -> SelectQuery {
        self.builder().select_from(table)
    }

    pub fn insert(&self, table: &str) -> InsertQuery {
        self.builder().insert(table)
    }

    pub fn upsert<S: AsRef<str>>(
        &self,
        table: &str,
        target: impl IntoIterator<Item = S>,
    ) -> OnConflict<InsertQuery> {
        self.builder().upsert(table, target)
    }

    pub fn update(&self, table: &str) -> UpdateQuery {
        self.builder().update(table)
    }

    pub fn delete(&self, table: &str) -> DeleteQuery {
        self.builder().delete(table)
    }

    pub fn batch_insert<S: AsRef<str>>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> BatchInsert {
        self.builder().batch_insert(table, columns)
    }

    pub fn batch_update(&self, table: &str, key_column: &str) -> BatchUpdate {
        self.builder().batch_update(table, key_column)
    }

    /// Prepared statement cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Release every cached prepared statement.
    ///
    /// Statements still held by in-flight calls are released when those calls finish.
    /// The handle stays usable; later statements are prepared again.
    pub fn close(&self) {
        self.inner.cache.clear();
    }

    /// Start a transaction for manual control.
    ///
    /// The caller must `commit` or `rollback`; dropping an active transaction leaves
    /// cleanup to the driver.
    ///
    /// Drivers that hand the transaction a single connection (such as `PgDriver`) keep it
    /// until the transaction finishes. While it is open, run statements on the
    /// transaction, not on this `Db`.
    pub async fn begin(&self, options: TxOptions) -> SqlResult<Transaction<D>> {
        let handle = self.inner.driver.begin(&options).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "sqlweave.tx",
            isolation = ?options.isolation,
            read_only = options.read_only,
            "transaction started"
        );
        Ok(Transaction::new(
            Arc::clone(&self.inner.driver),
            self.inner.dialect,
            self.inner.config.query_timeout,
            handle,
        ))
    }

    /// Run `f` inside a transaction.
    ///
    /// - `Ok(value)`: commits and returns `value`, or the commit error.
    /// - `Err(e)`: rolls back and returns `e` unchanged. A failed rollback is logged.
    /// - panic: rolls back, then resumes unwinding with the original payload.
    ///
    /// If `f` commits the transaction itself, its value is returned as is. If `f` rolls it
    /// back and still returns `Ok`, the result is [`SqlError::TransactionClosed`].
    ///
    /// Inside `f`, execute against the transaction handle, as with [`Db::begin`].
    pub async fn transaction<T, F, Fut>(&self, options: TxOptions, f: F) -> SqlResult<T>
    where
        F: FnOnce(Transaction<D>) -> Fut + Send,
        Fut: Future<Output = SqlResult<T>> + Send,
        T: Send,
    {
        let tx = self.begin(options).await?;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(tx.clone()))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };

        match outcome {
            Err(payload) => {
                tx.rollback_quietly().await;
                panic::resume_unwind(payload)
            }
            Ok(Err(err)) => {
                tx.rollback_quietly().await;
                Err(err)
            }
            Ok(Ok(value)) => match tx.status().await {
                TxStatus::Active => {
                    tx.commit().await?;
                    Ok(value)
                }
                TxStatus::Committed => Ok(value),
                TxStatus::RolledBack => Err(SqlError::TransactionClosed(
                    "rolled back before the closure returned",
                )),
            },
        }
    }
}
