//! # sqlweave
//!
//! Dialect-aware SQL composition with cached prepared statements.
//!
//! ## Features
//!
//! - **Composable expressions**: conditions are values (`Expr`) that nest, negate and
//!   combine with correct parenthesization
//! - **One builder, three dialects**: Postgres (`$n`, `"ident"`), MySQL (`?`, `` `ident` ``)
//!   and SQLite (`?`, `"ident"`); capability gaps are reported, never rendered
//! - **Safe defaults**: every value is a bound parameter, DELETE requires WHERE, UPDATE
//!   requires SET
//! - **Statement cache**: prepared statements are reused per SQL text with bounded LRU
//!   eviction
//! - **Transactions**: closure-scoped commit/rollback, including on panic
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use sqlweave::prelude::*;
//!
//! let db = Db::open(PgDriver::connect(&database_url).await?)?;
//!
//! // SELECT
//! let users = db
//!     .select(["id", "name"])
//!     .from("users u")
//!     .and_where(or([eq("u.status", "active"), gt("u.score", 90)]))
//!     .order_by_desc("u.created_at")
//!     .limit(10)
//!     .fetch_all(&db)
//!     .await?;
//!
//! // INSERT
//! db.insert("users")
//!     .set("username", "alice")
//!     .set("email", "alice@example.com")
//!     .execute(&db)
//!     .await?;
//!
//! // UPDATE
//! db.update("users")
//!     .set("status", "inactive")
//!     .eq("id", user_id)
//!     .execute(&db)
//!     .await?;
//!
//! // DELETE
//! db.delete("users").eq("id", user_id).execute(&db).await?;
//! ```
//!
//! Builders are pure: [`QueryBuilder`] renders SQL for a dialect without a connection.

pub mod client;
pub mod db;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod ident;
pub mod prelude;
pub mod qb;
pub mod row;
pub mod transaction;
pub mod value;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use client::Executor;
pub use db::{CacheStats, CachedStatement, Db, DbConfig, StatementCache, StatementCacheConfig};
pub use dialect::{ConflictSyntax, Dialect, Features, PlaceholderStyle};
pub use driver::{Driver, IsolationLevel, TxOptions};
pub use error::{SqlError, SqlResult};
pub use qb::{
    BatchInsert, BatchUpdate, ComposedQuery, Conflict, DeleteQuery, Expr, Filter, InsertQuery,
    JoinKind, OnConflict, QueryBuilder, SelectQuery, SetOp, SqlQuery, UpdateQuery, Upsertable,
};
pub use row::FromRow;
pub use transaction::{Transaction, TxStatus};
pub use value::Value;

#[cfg(feature = "postgres")]
pub use postgres::{PgDriver, PgTransaction};

#[cfg(feature = "postgres")]
pub use row::RowExt;

// Re-export tokio_postgres for drivers and row mapping
#[cfg(feature = "postgres")]
pub use tokio_postgres;
