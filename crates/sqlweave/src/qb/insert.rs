//! INSERT and upsert builders.
//!
//! Columns are kept sorted so the same logical insert always renders the same text and
//! reuses one cached statement. Conflict handling follows the dialect:
//!
//! - `ON CONFLICT (target) DO UPDATE SET ... | DO NOTHING` (Postgres, SQLite)
//! - `ON DUPLICATE KEY UPDATE ...` / `INSERT IGNORE` (MySQL)

use crate::dialect::{ConflictSyntax, Dialect};
use crate::error::{SqlError, SqlResult};
use crate::ident::TableRef;
use crate::qb::traits::SqlQuery;
use crate::qb::writer::{ComposedQuery, Writer};
use crate::value::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Right-hand side of a column assignment.
#[derive(Clone, Debug)]
pub(crate) enum Assign {
    Value(Value),
    /// Raw SQL without placeholders (`now()`, `DEFAULT`).
    Raw(String),
}

impl Assign {
    pub(crate) fn write(&self, w: &mut Writer) -> SqlResult<()> {
        match self {
            Assign::Value(v) => w.bind(v.clone()),
            Assign::Raw(sql) => w.template(sql, &[])?,
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum ConflictUpdate {
    /// Take the value the insert proposed for this column.
    Proposed,
    Value(Value),
}

#[derive(Clone, Debug)]
enum ConflictAction {
    Nothing,
    Update(BTreeMap<String, ConflictUpdate>),
}

/// A resolved conflict clause, produced by [`OnConflict`].
#[derive(Clone, Debug)]
pub struct Conflict {
    target: Vec<String>,
    action: ConflictAction,
}

impl Conflict {
    /// `INSERT` or `INSERT IGNORE`.
    pub(crate) fn write_verb(conflict: Option<&Conflict>, w: &mut Writer) {
        let ignore = matches!(
            (w.dialect.conflict, conflict.map(|c| &c.action)),
            (ConflictSyntax::OnDuplicateKey, Some(ConflictAction::Nothing))
        );
        w.push(if ignore { "INSERT IGNORE INTO " } else { "INSERT INTO " });
    }

    pub(crate) fn write_clause(&self, w: &mut Writer) {
        match w.dialect.conflict {
            ConflictSyntax::OnConflict => {
                w.push(" ON CONFLICT (");
                for (i, c) in self.target.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.column(c);
                }
                w.push_char(')');
                match &self.action {
                    ConflictAction::Nothing => w.push(" DO NOTHING"),
                    ConflictAction::Update(sets) => {
                        w.push(" DO UPDATE SET ");
                        self.write_sets(w, sets);
                    }
                }
            }
            ConflictSyntax::OnDuplicateKey => {
                if let ConflictAction::Update(sets) = &self.action {
                    w.push(" ON DUPLICATE KEY UPDATE ");
                    self.write_sets(w, sets);
                }
            }
            // Rejected when the clause was attached.
            ConflictSyntax::Unsupported => {}
        }
    }

    fn write_sets(&self, w: &mut Writer, sets: &BTreeMap<String, ConflictUpdate>) {
        for (i, (column, update)) in sets.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.column(column);
            w.push(" = ");
            match update {
                ConflictUpdate::Value(v) => w.bind(v.clone()),
                ConflictUpdate::Proposed => match w.dialect.conflict {
                    ConflictSyntax::OnDuplicateKey => {
                        w.push("VALUES(");
                        w.column(column);
                        w.push_char(')');
                    }
                    _ => {
                        w.push("EXCLUDED.");
                        w.column(column);
                    }
                },
            }
        }
    }
}

/// Statements that accept a conflict clause.
pub trait Upsertable: Sized {
    #[doc(hidden)]
    fn upsert_dialect(&self) -> Dialect;
    #[doc(hidden)]
    fn attach_conflict(self, conflict: Conflict) -> Self;

    /// Start a conflict clause on `target` columns.
    fn on_conflict<S: AsRef<str>>(self, target: impl IntoIterator<Item = S>) -> OnConflict<Self> {
        OnConflict {
            query: self,
            target: target.into_iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }
}

/// An insert waiting for its conflict action.
#[derive(Clone, Debug)]
pub struct OnConflict<Q> {
    query: Q,
    target: Vec<String>,
}

impl<Q: Upsertable> OnConflict<Q> {
    fn finish(self, action: ConflictAction) -> SqlResult<Q> {
        let dialect = self.query.upsert_dialect();
        match dialect.conflict {
            ConflictSyntax::Unsupported => {
                return Err(SqlError::unsupported("upsert", dialect.name));
            }
            ConflictSyntax::OnConflict if self.target.is_empty() => {
                return Err(SqlError::malformed("upsert needs at least one conflict target column"));
            }
            _ => {}
        }
        if let ConflictAction::Update(sets) = &action {
            if sets.is_empty() {
                return Err(SqlError::malformed("upsert DO UPDATE needs at least one column"));
            }
        }
        Ok(self.query.attach_conflict(Conflict {
            target: self.target,
            action,
        }))
    }

    /// Ignore conflicting rows.
    pub fn do_nothing(self) -> SqlResult<Q> {
        self.finish(ConflictAction::Nothing)
    }

    /// On conflict, overwrite `columns` with the values the insert proposed.
    pub fn do_update<S: AsRef<str>>(self, columns: impl IntoIterator<Item = S>) -> SqlResult<Q> {
        let sets = columns
            .into_iter()
            .map(|c| (c.as_ref().to_string(), ConflictUpdate::Proposed))
            .collect();
        self.finish(ConflictAction::Update(sets))
    }

    /// On conflict, assign explicit values. Assignments render sorted by column; a
    /// repeated column keeps its last value.
    pub fn do_update_set<K: Into<String>, V: Into<Value>>(
        self,
        assignments: impl IntoIterator<Item = (K, V)>,
    ) -> SqlResult<Q> {
        let sets = assignments
            .into_iter()
            .map(|(k, v)| (k.into(), ConflictUpdate::Value(v.into())))
            .collect();
        self.finish(ConflictAction::Update(sets))
    }
}

impl OnConflict<InsertQuery> {
    /// Set a column value on the pending insert.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query = self.query.set(column, value);
        self
    }

    /// Set several column values on the pending insert.
    pub fn values<K: Into<String>, V: Into<Value>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.query = self.query.values(pairs);
        self
    }
}

/// INSERT query builder.
#[derive(Clone, Debug)]
pub struct InsertQuery {
    dialect: Dialect,
    table: TableRef,
    values: BTreeMap<String, Assign>,
    returning: Vec<String>,
    conflict: Option<Conflict>,
    timeout: Option<Duration>,
}

impl InsertQuery {
    /// Create a new INSERT into `table`.
    pub fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            table: TableRef::parse(table),
            values: BTreeMap::new(),
            returning: Vec::new(),
            conflict: None,
            timeout: None,
        }
    }

    /// Set a column value.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.values
            .insert(column.to_string(), Assign::Value(value.into()));
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
        self.values
            .insert(column.to_string(), Assign::Raw(sql.to_string()));
        self
    }

    /// Set several column values.
    pub fn values<K: Into<String>, V: Into<Value>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        for (k, v) in pairs {
            self.values.insert(k.into(), Assign::Value(v.into()));
        }
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

impl Upsertable for InsertQuery {
    fn upsert_dialect(&self) -> Dialect {
        self.dialect
    }

    fn attach_conflict(mut self, conflict: Conflict) -> Self {
        self.conflict = Some(conflict);
        self
    }
}

pub(crate) fn write_returning(w: &mut Writer, columns: &[String]) {
    if columns.is_empty() {
        return;
    }
    w.push(" RETURNING ");
    for (i, c) in columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.column(c);
    }
}

impl SqlQuery for InsertQuery {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self) -> SqlResult<ComposedQuery> {
        let mut w = Writer::new(self.dialect);
        Conflict::write_verb(self.conflict.as_ref(), &mut w);
        self.table.write_sql(&w.dialect, &mut w.sql);

        if self.values.is_empty() {
            w.push(if w.dialect.features.default_values {
                " DEFAULT VALUES"
            } else {
                " () VALUES ()"
            });
        } else {
            w.push(" (");
            for (i, column) in self.values.keys().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.column(column);
            }
            w.push(") VALUES (");
            for (i, assign) in self.values.values().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                assign.write(&mut w)?;
            }
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
