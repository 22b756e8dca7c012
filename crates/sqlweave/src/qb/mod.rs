//! Dialect-aware query builders.
//!
//! Builders render to a [`ComposedQuery`]: SQL text plus parameters in placeholder order.
//! Every fragment emits `?`; numbered dialects get one renumbering pass at the end, so
//! CTEs, subqueries and set operations composed independently still share one global
//! `$n` sequence.
//!
//! # Usage
//!
//! ```ignore
//! use sqlweave::prelude::*;
//!
//! let qb = QueryBuilder::new(Dialect::POSTGRES);
//!
//! // SELECT
//! let users = qb.select(["id", "name"])
//!     .from("users")
//!     .eq("status", "active")
//!     .order_by(["created_at DESC"])
//!     .limit(20)
//!     .fetch_all_as::<User, _>(&db)
//!     .await?;
//!
//! // INSERT ... ON CONFLICT
//! qb.insert("users")
//!     .set("email", "alice@example.com")
//!     .set("name", "alice")
//!     .on_conflict(["email"])
//!     .do_update(["name"])?
//!     .execute(&db)
//!     .await?;
//!
//! // UPDATE / DELETE
//! qb.update("users").set("status", "inactive").eq("id", user_id).execute(&db).await?;
//! qb.delete("users").eq("id", user_id).execute(&db).await?;
//! ```

mod batch;
mod delete;
pub mod expr;
mod insert;
mod select;
mod traits;
mod update;
mod writer;


pub use batch::{BatchInsert, BatchUpdate};
pub use delete::DeleteQuery;
pub use expr::Expr;
pub use insert::{Conflict, InsertQuery, OnConflict, Upsertable};
pub use select::{JoinKind, SelectQuery, SetOp};
pub use traits::{Filter, SqlQuery};
pub use update::UpdateQuery;
pub use writer::ComposedQuery;

use crate::dialect::Dialect;

/// Factory for statement builders bound to one dialect.
///
/// Pure: it holds only the dialect and never touches a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryBuilder {
    dialect: Dialect,
}

impl QueryBuilder {
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// `SELECT columns`; add a source with [`SelectQuery::from`].
    pub fn select<S: AsRef<str>>(&self, columns: impl IntoIterator<Item = S>) -> SelectQuery {
        SelectQuery::new(self.dialect).select(columns)
    }

    /// `SELECT * FROM table`, narrowed later with [`SelectQuery::select`].
    pub fn select_from(&self, table: &str) -> SelectQuery {
        SelectQuery::new(self.dialect).from(table)
    }

    pub fn insert(&self, table: &str) -> InsertQuery {
        InsertQuery::new(self.dialect, table)
    }

    /// An insert with a pending conflict clause on `target`; finish with
    /// `do_update`, `do_update_set` or `do_nothing`.
    pub fn upsert<S: AsRef<str>>(
        &self,
        table: &str,
        target: impl IntoIterator<Item = S>,
    ) -> OnConflict<InsertQuery> {
        self.insert(table).on_conflict(target)
    }

    pub fn update(&self, table: &str) -> UpdateQuery {
        UpdateQuery::new(self.dialect, table)
    }

    pub fn delete(&self, table: &str) -> DeleteQuery {
        DeleteQuery::new(self.dialect, table)
    }

    pub fn batch_insert<S: AsRef<str>>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> BatchInsert {
        BatchInsert::new(self.dialect, table, columns)
    }

    pub fn batch_update(&self, table: &str, key_column: &str) -> BatchUpdate {
        BatchUpdate::new(self.dialect, table, key_column)
    }
}
