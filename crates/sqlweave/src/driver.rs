//! The execution collaborator: what a database driver must provide.
//!
//! The composition engine never talks to a database itself. A [`Driver`] prepares
//! statements, runs them with an ordered parameter list, and manages transactions.
//! [`crate::Db`] layers the statement cache and timeouts on top of it.

use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use std::future::Future;

/// Transaction isolation levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options passed to [`Driver::begin`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// `None` keeps the server default.
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
    /// Postgres only; ignored elsewhere.
    pub deferrable: bool,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = deferrable;
        self
    }
}

/// A database driver.
///
/// Async methods return `Send` futures so a `Db` can be shared across tasks.
pub trait Driver: Send + Sync + 'static {
    /// Prepared statement handle.
    type Statement: Send + Sync + 'static;
    /// Result row.
    type Row: Send + 'static;
    /// Open transaction handle.
    type Transaction: Send + 'static;

    /// Driver name, used to pick the SQL dialect (`postgres`, `mysql`, `sqlite3`, ...).
    fn name(&self) -> &str;

    /// Prepare `sql` into a reusable handle.
    fn prepare(&self, sql: &str) -> impl Future<Output = SqlResult<Self::Statement>> + Send;

    /// Run a prepared statement, returning the affected row count.
    fn execute(
        &self,
        stmt: &Self::Statement,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<u64>> + Send;

    /// Run a prepared statement, returning its rows.
    fn query(
        &self,
        stmt: &Self::Statement,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<Vec<Self::Row>>> + Send;

    /// Release a prepared statement. Called once per handle, when its last user drops it
    /// after eviction, removal or shutdown. The handle itself is dropped right after.
    fn close_statement(&self, stmt: &Self::Statement);

    /// Start a transaction.
    fn begin(&self, options: &TxOptions) -> impl Future<Output = SqlResult<Self::Transaction>> + Send;

    /// Run a statement inside `tx`, returning the affected row count.
    fn execute_in(
        &self,
        tx: &mut Self::Transaction,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<u64>> + Send;

    /// Run a statement inside `tx`, returning its rows.
    fn query_in(
        &self,
        tx: &mut Self::Transaction,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = SqlResult<Vec<Self::Row>>> + Send;

    fn commit(&self, tx: Self::Transaction) -> impl Future<Output = SqlResult<()>> + Send;

    fn rollback(&self, tx: Self::Transaction) -> impl Future<Output = SqlResult<()>> + Send;

    /// Whether `err` means a cached prepared statement went stale (schema change,
    /// server-side deallocation) and should be prepared again.
    fn is_stale_statement(&self, err: &SqlError) -> bool {
        let _ = err;
        false
    }
}
