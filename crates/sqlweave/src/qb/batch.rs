//! Multi-row INSERT and keyed multi-row UPDATE.
//!
//! # Example
//! ```ignore
//! let q = qb.batch_insert("tags", ["name", "color"])
//!     .row(values!["rust", "orange"])?
//!     .row(values!["sql", "blue"])?;
//!
//! // UPDATE "users" SET "name" = CASE "id" WHEN $1 THEN $2 ... ELSE "name" END
//! // WHERE "id" IN ($n, ...)
//! let q = qb.batch_update("users", "id")
//!     .row(1, [("name", "ann")])
//!     .row(2, [("name", "bob")]);
//! ```

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::ident::TableRef;
use crate::qb::insert::{write_returning, Conflict, Upsertable};
use crate::qb::traits::SqlQuery;
use crate::qb::writer::{ComposedQuery, Writer};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Multi-row INSERT with a fixed column list.
#[derive(Clone, Debug)]
pub struct BatchInsert {
    dialect: Dialect,
    table: TableRef,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    conflict: Option<Conflict>,
    returning: Vec<String>,
    timeout: Option<Duration>,
}

impl BatchInsert {
    /// Create a batch insert into `table` with `columns`, in the given order.
    pub fn new<S: AsRef<str>>(
        dialect: Dialect,
        table: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            dialect,
            table: TableRef::parse(table),
            columns: columns.into_iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
            conflict: None,
            returning: Vec::new(),
            timeout: None,
        }
    }

    /// Append one row; its arity must match the column list.
    pub fn row(mut self, values: Vec<Value>) -> SqlResult<Self> {
        if values.len() != self.columns.len() {
            return Err(SqlError::malformed(format!(
                "batch row has {} value(s) for {} column(s)",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(values);
        Ok(self)
    }

    /// Append several rows.
    pub fn rows(self, rows: impl IntoIterator<Item = Vec<Value>>) -> SqlResult<Self> {
        rows.into_iter().try_fold(self, BatchInsert::row)
    }

    /// Number of rows collected so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
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

impl Upsertable for BatchInsert {
    fn upsert_dialect(&self) -> Dialect {
        self.dialect
    }

    fn attach_conflict(mut self, conflict: Conflict) -> Self {
        self.conflict = Some(conflict);
        self
    }
}

impl SqlQuery for BatchInsert {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self) -> SqlResult<ComposedQuery> {
        if self.columns.is_empty() {
            return Err(SqlError::malformed("batch insert has no columns"));
        }
        if self.rows.is_empty() {
            return Err(SqlError::malformed("batch insert has no rows"));
        }

        let mut w = Writer::new(self.dialect);
        Conflict::write_verb(self.conflict.as_ref(), &mut w);
        self.table.write_sql(&w.dialect, &mut w.sql);
        w.push(" (");
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.column(c);
        }
        w.push(") VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_char('(');
            w.bind_list(row);
            w.push_char(')');
        }
        if let Some(conflict) = &self.conflict {
            conflict.write_clause(&mut w);
        }
        write_returning(&mut w, &self.returning);
        Ok(w.finish())
    }

    fn deadline(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Keyed multi-row UPDATE rendered with one `CASE` per column.
///
/// Rows that do not mention a column keep their current value through `ELSE "column"`.
#[derive(Clone, Debug)]
pub struct BatchUpdate {
    dialect: Dialect,
    table: TableRef,
    key_column: String,
    rows: Vec<(Value, BTreeMap<String, Value>)>,
    timeout: Option<Duration>,
}

impl BatchUpdate {
    /// Create a batch update on `table`, matching rows by `key_column`.
    pub fn new(dialect: Dialect, table: &str, key_column: &str) -> Self {
        Self {
            dialect,
            table: TableRef::parse(table),
            key_column: key_column.to_string(),
            rows: Vec::new(),
            timeout: None,
        }
    }

    /// Set `values` on the row whose key equals `key`. Each key may appear once; a
    /// repeated key fails at build time.
    pub fn row<K, V>(mut self, key: impl Into<Value>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.rows.push((key.into(), values));
        self
    }

    /// Number of rows collected so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail the statement with [`SqlError::Timeout`] if it runs longer than `d`.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

impl SqlQuery for BatchUpdate {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self) -> SqlResult<ComposedQuery> {
        let columns: BTreeSet<&String> = self.rows.iter().flat_map(|(_, m)| m.keys()).collect();
        if columns.is_empty() {
            return Err(SqlError::malformed("batch update has no rows"));
        }

        for (i, (key, _)) in self.rows.iter().enumerate() {
            if self.rows[..i].iter().any(|(seen, _)| seen == key) {
                return Err(SqlError::malformed(format!(
                    "batch update lists key {key:?} more than once"
                )));
            }
        }

        let mut w = Writer::new(self.dialect);
        w.push("UPDATE ");
        self.table.write_sql(&w.dialect, &mut w.sql);
        w.push(" SET ");
        for (i, column) in columns.into_iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.column(column);
            w.push(" = CASE ");
            w.column(&self.key_column);
            for (key, values) in &self.rows {
                if let Some(v) = values.get(column) {
                    w.push(" WHEN ");
                    w.bind(key.clone());
                    w.push(" THEN ");
                    w.bind(v.clone());
                }
            }
            w.push(" ELSE ");
            w.column(column);
            w.push(" END");
        }

        let keys: Vec<Value> = self.rows.iter().map(|(k, _)| k.clone()).collect();
        w.push(" WHERE ");
        w.column(&self.key_column);
        w.push(" IN (");
        w.bind_list(&keys);
        w.push_char(')');
        Ok(w.finish())
    }

    fn deadline(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values;

    #[test]
    fn multi_row_values() {
        let built = BatchInsert::new(Dialect::POSTGRES, "tags", ["name", "color"])
            .row(values!["rust", "orange"])
            .unwrap()
            .row(values!["sql", "blue"])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            built.sql(),
            r#"INSERT INTO "tags" ("name", "color") VALUES ($1, $2), ($3, $4)"#
        );
        assert_eq!(built.params().len(), 4);
        assert_eq!(built.params()[2], Value::from("sql"));
    }

    #[test]
    fn arity_mismatch_fails_at_row() {
        let err = BatchInsert::new(Dialect::POSTGRES, "t", ["a", "b"])
            .row(values![1])
            .unwrap_err();
        assert!(matches!(err, SqlError::Malformed(_)));
    }

    #[test]
    fn no_rows_fails_at_build() {
        let q = BatchInsert::new(Dialect::POSTGRES, "t", ["a"]);
        assert!(q.is_empty());
        assert!(matches!(q.build(), Err(SqlError::Malformed(_))));
        assert!(BatchUpdate::new(Dialect::POSTGRES, "t", "id").build().is_err());
    }

    #[test]
    fn batch_insert_with_conflict() {
        let q = BatchInsert::new(Dialect::SQLITE, "tags", ["name"])
            .rows([values!["a"], values!["b"]])
            .unwrap()
            .on_conflict(["name"])
            .do_nothing()
            .unwrap();
        assert_eq!(
            q.to_sql().unwrap(),
            r#"INSERT INTO "tags" ("name") VALUES (?), (?) ON CONFLICT ("name") DO NOTHING"#
        );
    }

    #[test]
    fn case_per_column_then_keys() {
        let built = BatchUpdate::new(Dialect::POSTGRES, "users", "id")
            .row(1, [("name", Value::from("ann")), ("age", Value::from(30))])
            .row(2, [("name", "bob")])
            .build()
            .unwrap();
        assert_eq!(
            built.sql(),
            concat!(
                r#"UPDATE "users" SET "age" = CASE "id" WHEN $1 THEN $2 ELSE "age" END, "#,
                r#""name" = CASE "id" WHEN $3 THEN $4 WHEN $5 THEN $6 ELSE "name" END "#,
                r#"WHERE "id" IN ($7, $8)"#
            )
        );
        assert_eq!(
            built.params(),
            &[
                Value::Int(1),
                Value::Int(30),
                Value::Int(1),
                Value::from("ann"),
                Value::Int(2),
                Value::from("bob"),
                Value::Int(1),
                Value::Int(2),
            ]
        );
    }

    #[test]
    fn duplicate_batch_update_key_is_malformed() {
        let err = BatchUpdate::new(Dialect::POSTGRES, "users", "id")
            .row(1, [("name", "ann")])
            .row(2, [("name", "bob")])
            .row(1, [("name", "amy")])
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlError::Malformed(_)));
    }
}
