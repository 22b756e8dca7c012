//! Convenient imports for typical `sqlweave` usage.
//!
//! ```ignore
//! use sqlweave::prelude::*;
//! ```
//!
//! Brings in the builders, the builder traits, and the expression constructors
//! (`eq`, `and`, `exists`, ...).

pub use crate::qb::expr::{
    and, between, eq, exists, gt, gte, hash_eq, in_list, in_subquery, is_not_null, is_null,
    like, like_all, like_any, like_prefix, like_suffix, lt, lte, ne, not, not_between,
    not_exists, not_in, not_in_subquery, not_like, or, raw,
};
pub use crate::{
    Db, DbConfig, Dialect, Executor, Expr, Filter, FromRow, IsolationLevel, QueryBuilder,
    SqlError, SqlQuery, SqlResult, Transaction, TxOptions, Upsertable, Value, values,
};

#[cfg(feature = "postgres")]
pub use crate::{PgDriver, RowExt};
