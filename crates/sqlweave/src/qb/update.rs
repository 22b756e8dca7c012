//! UPDATE query builder.

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::ident::TableRef;
use crate::qb::expr::{Condition, Expr};
use crate::qb::insert::{write_returning, Assign};
use crate::qb::traits::{Filter, SqlQuery};
use crate::qb::writer::{ComposedQuery, Writer};
use crate::value::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug)]
enum SetExpr {
    Assign(Assign),
    /// `column = column + ?`
    Increment(Value),
}

/// UPDATE query builder.
///
/// SET columns render sorted; SET parameters precede WHERE parameters.
#[derive(Clone, Debug)]
pub struct UpdateQuery {
    dialect: Dialect,
    table: TableRef,
    sets: BTreeMap<String, SetExpr>,
    where_tree: Condition,
    returning: Vec<String>,
    timeout: Option<Duration>,
}

impl UpdateQuery {
    /// Create a new UPDATE on `table`.
    pub fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: TableRef::parse(table),
            sets: BTreeMap::new(),
            where_tree: Condition::default(),
            returning: Vec::new(),
            timeout: None,
        }
    }

    /// Set a column value.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.sets.insert(
            column.to_string(),
            SetExpr::Assign(Assign::Value(value.into())),
        );
        self
    }

    /// Set an optional column value (None => skip).
    pub fn set_opt<T: Into<Value>>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a JSON column.
    pub fn set_json<T: serde::Serialize>(self, column: &str, value: &T) -> serde_json::Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(self.set(column, json))
    }

    /// Set a raw SQL expression (no params).
    pub fn set_raw(mut self, column: &str, sql: &str) -> Self {
        self.sets.insert(
            column.to_string(),
            SetExpr::Assign(Assign::Raw(sql.to_string())),
        );
        self
    }

    /// `column = column + by`
    pub fn increment(mut self, column: &str, by: impl Into<Value>) -> Self {
        self.sets
            .insert(column.to_string(), SetExpr::Increment(by.into()));
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

impl Filter for UpdateQuery {
    fn and_where(mut self, cond: impl Into<Expr>) -> Self {
        self.where_tree.and(cond.into());
        self
    }

    fn or_where(mut self, cond: impl Into<Expr>) -> Self {
        self.where_tree.or(cond.into());
        self
    }
}

impl SqlQuery for UpdateQuery {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self) -> SqlResult<ComposedQuery> {
        if self.sets.is_empty() {
            return Err(SqlError::malformed("UPDATE has no SET columns"));
        }

        let mut w = Writer::new(self.dialect);
        w.push("UPDATE ");
        self.table.write_sql(&w.dialect, &mut w.sql);
        w.push(" SET ");
        for (i, (column, set)) in self.sets.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.column(column);
            w.push(" = ");
            match set {
                SetExpr::Assign(assign) => assign.write(&mut w)?,
                SetExpr::Increment(by) => {
                    w.column(column);
                    w.push(" + ");
                    w.bind(by.clone());
                }
            }
        }
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

    fn pg(table: &str) -> UpdateQuery {
        UpdateQuery::new(Dialect::POSTGRES, table)
    }

    #[test]
    fn set_params_precede_where() {
        let built = pg("users")
            .eq("id", 9)
            .set("status", "inactive")
            .set_raw("updated_at", "now()")
            .increment("version", 1)
            .build()
            .unwrap();
        assert_eq!(
            built.sql(),
            r#"UPDATE "users" SET "status" = $1, "updated_at" = now(), "version" = "version" + $2 WHERE "id" = $3"#
        );
        assert_eq!(
            built.params(),
            &[Value::from("inactive"), Value::Int(1), Value::Int(9)]
        );
    }

    #[test]
    fn empty_set_is_malformed() {
        let err = pg("users").eq("id", 1).build().unwrap_err();
        assert!(err.is_build_error());
    }

    #[test]
    fn returning_on_sqlite() {
        let q = UpdateQuery::new(Dialect::SQLITE, "t")
            .set("a", 1)
            .eq("id", 2)
            .returning(["a"])
            .unwrap();
        assert_eq!(
            q.to_sql().unwrap(),
            r#"UPDATE "t" SET "a" = ? WHERE "id" = ? RETURNING "a""#
        );
    }
}
