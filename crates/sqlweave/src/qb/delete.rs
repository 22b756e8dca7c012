//! DELETE query builder.

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::ident::TableRef;
use crate::qb::expr::{Condition, Expr};
use crate::qb::insert::write_returning;
use crate::qb::traits::{Filter, SqlQuery};
use crate::qb::writer::{ComposedQuery, Writer};
use std::time::Duration;

/// DELETE query builder.
#[derive(Clone, Debug)]
pub struct DeleteQuery {
    dialect: Dialect,
    table: TableRef,
    where_tree: Condition,
    returning: Vec<String>,
    /// Whether to allow DELETE without WHERE (dangerous!)
    allow_delete_all: bool,
    timeout: Option<Duration>,
}

impl DeleteQuery {
    /// Create a new DELETE on `table`.
    pub fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: TableRef::parse(table),
            where_tree: Condition::default(),
            returning: Vec::new(),
            allow_delete_all: false,
            timeout: None,
        }
    }

    /// Allow DELETE without WHERE conditions (dangerous!).
    ///
    /// By default a DELETE whose condition renders to nothing fails to build.
    pub fn allow_delete_all(mut self, allow: bool) -> Self {
        self.allow_delete_all = allow;
        self
    }

    /// Add RETURNING columns.
    pub fn returning<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> SqlResult<Self> {
        self.dialect
            .require(self.dialect.features.returning, "RETURNING")?;
        self.returning
            .extend(columns.into_iter().map(|c| c.as_ref().to_string()));
        Ok(self)
    }

    /// Fail the statement with [`SqlError::Timeout`] if it runs longer than `d`.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

impl Filter for DeleteQuery {
    fn and_where(mut self, cond: impl Into<Expr>) -> Self {
        self.where_tree.and(cond.into());
        self
    }

    fn or_where(mut self, cond: impl Into<Expr>) -> Self {
        self.where_tree.or(cond.into());
        self
    }
}

impl SqlQuery for DeleteQuery {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self) -> SqlResult<ComposedQuery> {
        if self.where_tree.is_empty() && !self.allow_delete_all {
            return Err(SqlError::malformed(
                "DELETE without WHERE; call allow_delete_all(true) to delete every row",
            ));
        }

        let mut w = Writer::new(self.dialect);
        w.push("DELETE FROM ");
        self.table.write_sql(&w.dialect, &mut w.sql);
        self.where_tree.write_clause(&mut w, "WHERE")?;
        write_returning(&mut w, &self.returning);
        Ok(w.finish())
    }

    fn deadline(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn pg(table: &str) -> DeleteQuery {
        DeleteQuery::new(Dialect::POSTGRES, table)
    }

    #[test]
    fn basic_delete() {
        let built = pg("sessions")
            .lt("expires_at", 100)
            .returning(["id"])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            built.sql(),
            r#"DELETE FROM "sessions" WHERE "expires_at" < $1 RETURNING "id""#
        );
        assert_eq!(built.params(), &[Value::Int(100)]);
    }

    #[test]
    fn delete_without_where_is_rejected() {
        assert!(matches!(pg("t").build(), Err(SqlError::Malformed(_))));
        // An empty NOT IN renders nothing, so it does not count as a filter.
        assert!(pg("t").not_in("id", Vec::<i64>::new()).build().is_err());
        assert_eq!(
            pg("t").allow_delete_all(true).to_sql().unwrap(),
            r#"DELETE FROM "t""#
        );
    }
}
