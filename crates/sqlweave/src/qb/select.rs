//! SELECT statement builder.
//!
//! Clauses render in a fixed order regardless of the order the builder methods are called:
//!
//! ```text
//! WITH [RECURSIVE] … SELECT [DISTINCT] … FROM … JOIN … WHERE … GROUP BY … HAVING …
//! ORDER BY … LIMIT … OFFSET …   [UNION | UNION ALL | INTERSECT | EXCEPT …]
//! ```
//!
//! Parameters are collected in that same textual order.

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::ident::{self, TableRef};
use crate::qb::expr::{self, Condition, Expr};
use crate::qb::traits::{Filter, SqlQuery};
use crate::qb::writer::{ComposedQuery, Writer};
use crate::value::Value;
use std::time::Duration;

/// JOIN kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// Set operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOp {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOp {
    fn as_sql(self) -> &'static str {
        match self {
            SetOp::Union => "UNION",
            SetOp::UnionAll => "UNION ALL",
            SetOp::Intersect => "INTERSECT",
            SetOp::Except => "EXCEPT",
        }
    }
}

#[derive(Clone, Debug)]
enum SelectItem {
    Column(String),
    Expr { sql: String, values: Vec<Value> },
}

#[derive(Clone, Debug)]
enum Source {
    Table(TableRef),
    Subquery { query: Box<SelectQuery>, alias: String },
}

#[derive(Clone, Debug)]
struct Join {
    kind: JoinKind,
    target: TableRef,
    on: Option<Expr>,
}

#[derive(Clone, Debug)]
struct Cte {
    name: String,
    columns: Vec<String>,
    query: Box<SelectQuery>,
    recursive: bool,
}

/// SELECT query builder.
#[derive(Clone, Debug)]
pub struct SelectQuery {
    dialect: Dialect,
    distinct: bool,
    columns: Vec<SelectItem>,
    source: Option<Source>,
    joins: Vec<Join>,
    where_tree: Condition,
    group_by: Vec<String>,
    having_tree: Condition,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    ctes: Vec<Cte>,
    set_ops: Vec<(SetOp, SelectQuery)>,
    timeout: Option<Duration>,
}

impl SelectQuery {
    /// Create an empty SELECT for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            distinct: false,
            columns: Vec::new(),
            source: None,
            joins: Vec::new(),
            where_tree: Condition::default(),
            group_by: Vec::new(),
            having_tree: Condition::default(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            ctes: Vec::new(),
            set_ops: Vec::new(),
            timeout: None,
        }
    }

    // ==================== SELECT list ====================

    /// Append select-list entries. `*` is passed through; entries with `(` are raw.
    pub fn select<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.extend(
            columns
                .into_iter()
                .map(|c| SelectItem::Column(c.as_ref().to_string())),
        );
        self
    }

    /// Append a parameterized select-list expression (`?` placeholders).
    pub fn select_expr<V: Into<Value>>(
        mut self,
        sql: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.columns.push(SelectItem::Expr {
            sql: sql.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// SELECT DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== FROM ====================

    /// Select from a table; `"users u"` and `"users AS u"` add an alias.
    pub fn from(mut self, table: &str) -> Self {
        self.source = Some(Source::Table(TableRef::parse(table)));
        self
    }

    /// Select from a derived table.
    pub fn from_subquery(mut self, query: SelectQuery, alias: &str) -> Self {
        self.source = Some(Source::Subquery {
            query: Box::new(query),
            alias: alias.to_string(),
        });
        self
    }

    // ==================== JOIN ====================

    /// Add a join. Every kind except CROSS needs an ON condition.
    pub fn join(mut self, kind: JoinKind, target: &str, on: Option<Expr>) -> SqlResult<Self> {
        if kind == JoinKind::Full {
            self.dialect
                .require(self.dialect.features.full_outer_join, "FULL OUTER JOIN")?;
        }
        if kind != JoinKind::Cross && on.as_ref().is_none_or(Expr::is_empty) {
            return Err(SqlError::malformed(format!(
                "{} {target} has no ON condition",
                kind.as_sql()
            )));
        }
        self.joins.push(Join {
            kind,
            target: TableRef::parse(target),
            on: on.filter(|_| kind != JoinKind::Cross),
        });
        Ok(self)
    }

    /// Add INNER JOIN.
    pub fn inner_join(self, target: &str, on: impl Into<Expr>) -> SqlResult<Self> {
        self.join(JoinKind::Inner, target, Some(on.into()))
    }

    /// Add LEFT JOIN.
    pub fn left_join(self, target: &str, on: impl Into<Expr>) -> SqlResult<Self> {
        self.join(JoinKind::Left, target, Some(on.into()))
    }

    /// Add RIGHT JOIN.
    pub fn right_join(self, target: &str, on: impl Into<Expr>) -> SqlResult<Self> {
        self.join(JoinKind::Right, target, Some(on.into()))
    }

    /// Add FULL OUTER JOIN (not available on every dialect).
    pub fn full_join(self, target: &str, on: impl Into<Expr>) -> SqlResult<Self> {
        self.join(JoinKind::Full, target, Some(on.into()))
    }

    /// Add CROSS JOIN.
    pub fn cross_join(mut self, target: &str) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Cross,
            target: TableRef::parse(target),
            on: None,
        });
        self
    }

    // ==================== GROUP BY / HAVING ====================

    /// Append GROUP BY columns.
    pub fn group_by<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by
            .extend(columns.into_iter().map(|c| c.as_ref().to_string()));
        self
    }

    /// Add a HAVING condition joined with AND.
    pub fn having(mut self, cond: impl Into<Expr>) -> Self {
        self.having_tree.and(cond.into());
        self
    }

    /// Rewrite the HAVING condition to `(existing) OR cond`.
    pub fn or_having(mut self, cond: impl Into<Expr>) -> Self {
        self.having_tree.or(cond.into());
        self
    }

    /// Add a raw `?`-placeholder HAVING condition.
    pub fn having_raw<V: Into<Value>>(self, sql: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.having(expr::raw(sql, values))
    }

    // ==================== ORDER BY / LIMIT / OFFSET ====================

    /// Append ORDER BY entries (`"created_at DESC"`). Repeated calls accumulate.
    pub fn order_by<S: AsRef<str>>(mut self, entries: impl IntoIterator<Item = S>) -> Self {
        self.order_by
            .extend(entries.into_iter().map(|c| c.as_ref().to_string()));
        self
    }

    /// Append `column ASC`.
    pub fn order_by_asc(mut self, column: &str) -> Self {
        self.order_by.push(format!("{column} ASC"));
        self
    }

    /// Append `column DESC`.
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(format!("{column} DESC"));
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Pagination helper.
    ///
    /// `page` is 1-based (clamped to >= 1).
    /// `per_page` is clamped to >= 1.
    pub fn paginate(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        let size = per_page.max(1);
        self.limit = Some(size);
        self.offset = Some((page - 1).saturating_mul(size));
        self
    }

    // ==================== CTE ====================

    /// Add `WITH name AS (query)`. Multiple CTEs render in declaration order.
    pub fn with(mut self, name: &str, query: SelectQuery) -> Self {
        self.ctes.push(Cte {
            name: name.to_string(),
            columns: Vec::new(),
            query: Box::new(query),
            recursive: false,
        });
        self
    }

    /// Add `WITH name (col, ...) AS (query)`.
    pub fn with_columns<S: AsRef<str>>(
        mut self,
        name: &str,
        columns: impl IntoIterator<Item = S>,
        query: SelectQuery,
    ) -> Self {
        self.ctes.push(Cte {
            name: name.to_string(),
            columns: columns.into_iter().map(|c| c.as_ref().to_string()).collect(),
            query: Box::new(query),
            recursive: false,
        });
        self
    }

    /// Add `WITH RECURSIVE name AS (anchor UNION [ALL] recursive)`.
    ///
    /// `query` must be exactly `anchor.union(recursive)` or `anchor.union_all(recursive)`.
    pub fn with_recursive(mut self, name: &str, query: SelectQuery) -> SqlResult<Self> {
        self.dialect
            .require(self.dialect.features.recursive_cte, "WITH RECURSIVE")?;
        match query.set_ops.as_slice() {
            [(SetOp::Union | SetOp::UnionAll, _)] => {}
            _ => {
                return Err(SqlError::malformed(format!(
                    "recursive CTE {name} must be an anchor query joined to a recursive \
                     query with UNION or UNION ALL"
                )));
            }
        }
        self.ctes.push(Cte {
            name: name.to_string(),
            columns: Vec::new(),
            query: Box::new(query),
            recursive: true,
        });
        Ok(self)
    }

    // ==================== Set operations ====================

    fn push_set_op(mut self, op: SetOp, other: Option<SelectQuery>) -> Self {
        if let Some(other) = other {
            self.set_ops.push((op, other));
        }
        self
    }

    /// `self UNION other`. `None` leaves the query unchanged.
    pub fn union(self, other: impl Into<Option<SelectQuery>>) -> Self {
        self.push_set_op(SetOp::Union, other.into())
    }

    /// `self UNION ALL other`. `None` leaves the query unchanged.
    pub fn union_all(self, other: impl Into<Option<SelectQuery>>) -> Self {
        self.push_set_op(SetOp::UnionAll, other.into())
    }

    /// `self INTERSECT other`. `None` leaves the query unchanged.
    pub fn intersect(self, other: impl Into<Option<SelectQuery>>) -> SqlResult<Self> {
        self.dialect
            .require(self.dialect.features.intersect_except, "INTERSECT")?;
        Ok(self.push_set_op(SetOp::Intersect, other.into()))
    }

    /// `self EXCEPT other`. `None` leaves the query unchanged.
    pub fn except(self, other: impl Into<Option<SelectQuery>>) -> SqlResult<Self> {
        self.dialect
            .require(self.dialect.features.intersect_except, "EXCEPT")?;
        Ok(self.push_set_op(SetOp::Except, other.into()))
    }

    // ==================== Execution options ====================

    /// Fail the statement with [`SqlError::Timeout`] if it runs longer than `d`.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    // ==================== Rendering ====================

    /// A COUNT(*) over this query's rows.
    ///
    /// Ordering and paging are dropped. Grouped, distinct or compound queries are wrapped
    /// as a derived table; anything else gets its select list replaced.
    pub fn count_query(&self) -> SelectQuery {
        let mut base = self.clone();
        base.order_by.clear();
        base.limit = None;
        base.offset = None;

        let wrap = base.distinct
            || !base.group_by.is_empty()
            || !base.having_tree.is_empty()
            || !base.set_ops.is_empty();

        if wrap {
            let ctes = std::mem::take(&mut base.ctes);
            let mut outer = SelectQuery::new(self.dialect)
                .select(["COUNT(*)"])
                .from_subquery(base, "t");
            outer.ctes = ctes;
            outer.timeout = self.timeout;
            outer
        } else {
            base.columns = vec![SelectItem::Column("COUNT(*)".to_string())];
            base
        }
    }

    pub(crate) fn write_to(&self, w: &mut Writer) -> SqlResult<()> {
        self.write_with(w)?;
        if self.set_ops.is_empty() {
            return self.write_core(w);
        }
        self.write_compound(w)
    }

    fn write_with(&self, w: &mut Writer) -> SqlResult<()> {
        if self.ctes.is_empty() {
            return Ok(());
        }
        w.push("WITH ");
        if self.ctes.iter().any(|c| c.recursive) {
            w.push("RECURSIVE ");
        }
        for (i, cte) in self.ctes.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.ident(&cte.name);
            if !cte.columns.is_empty() {
                w.push(" (");
                for (j, c) in cte.columns.iter().enumerate() {
                    if j > 0 {
                        w.push(", ");
                    }
                    w.ident(c);
                }
                w.push_char(')');
            }
            w.push(" AS (");
            if cte.recursive {
                cte.query.write_flat(w)?;
            } else {
                expr::write_subquery(w, &cte.query)?;
            }
            w.push_char(')');
        }
        w.push_char(' ');
        Ok(())
    }

    /// `anchor UNION [ALL] recursive`, without operand parentheses.
    fn write_flat(&self, w: &mut Writer) -> SqlResult<()> {
        if self.dialect != w.dialect {
            return Err(SqlError::malformed(format!(
                "subquery built for the {} dialect used inside a {} statement",
                self.dialect.name, w.dialect.name
            )));
        }
        self.write_with(w)?;
        self.write_core(w)?;
        for (op, rhs) in &self.set_ops {
            w.push_char(' ');
            w.push(op.as_sql());
            w.push_char(' ');
            expr::write_subquery(w, rhs)?;
        }
        Ok(())
    }

    fn write_compound(&self, w: &mut Writer) -> SqlResult<()> {
        if w.dialect.features.parenthesized_set_operands {
            for _ in 1..self.set_ops.len() {
                w.push_char('(');
            }
            w.push_char('(');
            self.write_core(w)?;
            w.push_char(')');
            for (i, (op, rhs)) in self.set_ops.iter().enumerate() {
                w.push_char(' ');
                w.push(op.as_sql());
                w.push(" (");
                expr::write_subquery(w, rhs)?;
                w.push_char(')');
                if i + 1 < self.set_ops.len() {
                    w.push_char(')');
                }
            }
        } else {
            if self.has_paging() {
                w.push("SELECT * FROM (");
                self.write_core(w)?;
                w.push_char(')');
            } else {
                self.write_core(w)?;
            }
            for (op, rhs) in &self.set_ops {
                w.push_char(' ');
                w.push(op.as_sql());
                w.push_char(' ');
                if rhs.has_paging() || !rhs.set_ops.is_empty() || !rhs.ctes.is_empty() {
                    w.push("SELECT * FROM (");
                    expr::write_subquery(w, rhs)?;
                    w.push_char(')');
                } else {
                    expr::write_subquery(w, rhs)?;
                }
            }
        }
        Ok(())
    }

    fn has_paging(&self) -> bool {
        !self.order_by.is_empty() || self.limit.is_some() || self.offset.is_some()
    }

    /// Everything from SELECT through OFFSET.
    fn write_core(&self, w: &mut Writer) -> SqlResult<()> {
        if self.columns.is_empty() && self.source.is_none() {
            return Err(SqlError::malformed(
                "SELECT needs a column list or a FROM source",
            ));
        }

        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        if self.columns.is_empty() {
            w.push_char('*');
        }
        for (i, item) in self.columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match item {
                SelectItem::Column(c) => w.column(c),
                SelectItem::Expr { sql, values } => w.template(sql, values)?,
            }
        }

        match &self.source {
            None => {}
            Some(Source::Table(table)) => {
                w.push(" FROM ");
                table.write_sql(&w.dialect, &mut w.sql);
            }
            Some(Source::Subquery { query, alias }) => {
                w.push(" FROM (");
                expr::write_subquery(w, query)?;
                w.push(") AS ");
                w.ident(alias);
            }
        }

        for join in &self.joins {
            w.push_char(' ');
            w.push(join.kind.as_sql());
            w.push_char(' ');
            join.target.write_sql(&w.dialect, &mut w.sql);
            if let Some(on) = &join.on {
                w.push(" ON ");
                on.write(w)?;
            }
        }

        self.where_tree.write_clause(w, "WHERE")?;

        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            for (i, c) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.column(c);
            }
        }

        self.having_tree.write_clause(w, "HAVING")?;

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (i, entry) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                ident::write_order(&w.dialect, &mut w.sql, entry);
            }
        }

        let limit = match (self.limit, self.offset) {
            (None, Some(_)) if w.dialect.features.offset_requires_limit => Some(i64::MAX),
            (limit, _) => limit.map(to_i64),
        };
        if let Some(n) = limit {
            w.push(" LIMIT ");
            w.bind(Value::Int(n));
        }
        if let Some(n) = self.offset {
            w.push(" OFFSET ");
            w.bind(Value::Int(to_i64(n)));
        }
        Ok(())
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Filter for SelectQuery {
    fn and_where(mut self, cond: impl Into<Expr>) -> Self {
        self.where_tree.and(cond.into());
        self
    }

    fn or_where(mut self, cond: impl Into<Expr>) -> Self {
        self.where_tree.or(cond.into());
        self
    }
}

impl SqlQuery for SelectQuery {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn build(&self) -> SqlResult<ComposedQuery> {
        let mut w = Writer::new(self.dialect);
        self.write_to(&mut w)?;
        Ok(w.finish())
    }

    fn deadline(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qb::expr::{and, eq, gt, in_subquery, not_in, or, raw};

    fn pg() -> SelectQuery {
        SelectQuery::new(Dialect::POSTGRES)
    }

    fn sql(q: &SelectQuery) -> String {
        q.build().unwrap().sql().to_string()
    }

    #[test]
    fn where_raw_fragments_renumber() {
        let q = pg()
            .select(["*"])
            .from("users")
            .where_raw("status = ?", [1])
            .where_raw("age > ?", [18]);
        let built = q.build().unwrap();
        assert_eq!(
            built.sql(),
            r#"SELECT * FROM "users" WHERE status = $1 AND age > $2"#
        );
        assert_eq!(built.params(), &[Value::Int(1), Value::Int(18)]);
    }

    #[test]
    fn empty_projection_defaults_to_star() {
        assert_eq!(sql(&pg().from("users")), r#"SELECT * FROM "users""#);
    }

    #[test]
    fn no_projection_and_no_source_is_malformed() {
        assert!(matches!(pg().build(), Err(SqlError::Malformed(_))));
        assert_eq!(sql(&pg().select(["1"])), "SELECT 1");
        assert_eq!(sql(&pg().select_expr("?::int", [1])), "SELECT $1::int");
    }

    #[test]
    fn wildcards_are_not_quoted() {
        for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
            let q = SelectQuery::new(dialect).select(["*"]).from("t");
            let text = q.to_sql().unwrap();
            assert!(text.starts_with("SELECT * FROM"), "{text}");
        }
        let q = pg().select(["u.*", "o.id"]).from("users u");
        assert_eq!(sql(&q), r#"SELECT "u".*, "o"."id" FROM "users" AS "u""#);
    }

    #[test]
    fn clause_order_is_fixed() {
        let q = pg()
            .limit(10)
            .order_by(["created_at DESC"])
            .having_raw("COUNT(*) > ?", [2])
            .group_by(["user_id"])
            .eq("status", "paid")
            .select(["user_id", "COUNT(*) AS n"])
            .from("orders");
        let built = q.build().unwrap();
        assert_eq!(
            built.sql(),
            r#"SELECT "user_id", COUNT(*) AS n FROM "orders" WHERE "status" = $1 GROUP BY "user_id" HAVING COUNT(*) > $2 ORDER BY "created_at" DESC LIMIT $3"#
        );
        assert_eq!(
            built.params(),
            &[Value::from("paid"), Value::Int(2), Value::Int(10)]
        );
    }

    #[test]
    fn order_by_accumulates() {
        let q = pg().from("t").order_by(["a"]).order_by_desc("b").order_by_asc("c");
        assert_eq!(
            sql(&q),
            r#"SELECT * FROM "t" ORDER BY "a", "b" DESC, "c" ASC"#
        );
    }

    #[test]
    fn joins_split_alias_and_require_on() {
        let q = pg()
            .select(["u.name", "o.total"])
            .from("users u")
            .inner_join("orders o", "o.user_id = u.id")
            .unwrap()
            .left_join("refunds r", eq("r.status", "open"))
            .unwrap()
            .cross_join("regions");
        assert_eq!(
            sql(&q),
            r#"SELECT "u"."name", "o"."total" FROM "users" AS "u" INNER JOIN "orders" AS "o" ON o.user_id = u.id LEFT JOIN "refunds" AS "r" ON "r"."status" = $1 CROSS JOIN "regions""#
        );

        let err = pg().from("a").join(JoinKind::Left, "b", None).unwrap_err();
        assert!(matches!(err, SqlError::Malformed(_)));
        assert!(pg().from("a").join(JoinKind::Cross, "b", None).is_ok());
    }

    #[test]
    fn join_shorthands_reject_empty_on() {
        let empty = || and(Vec::<Expr>::new());
        for result in [
            pg().from("a").inner_join("b", empty()),
            pg().from("a").left_join("b", ""),
            pg().from("a").right_join("b", not_in("b.id", Vec::<i64>::new())),
        ] {
            assert!(matches!(result.unwrap_err(), SqlError::Malformed(_)));
        }

        let q = pg().from("a").right_join("b", "a.id = b.a_id").unwrap();
        assert!(sql(&q).ends_with(r#"RIGHT JOIN "b" ON a.id = b.a_id"#));
    }

    #[test]
    fn full_join_is_dialect_gated() {
        let err = SelectQuery::new(Dialect::MYSQL)
            .from("a")
            .full_join("b", "a.id = b.id")
            .unwrap_err();
        assert!(matches!(err, SqlError::Unsupported { feature: "FULL OUTER JOIN", .. }));

        let q = pg().from("a").full_join("b", "a.id = b.id").unwrap();
        assert!(sql(&q).contains(r#"FULL OUTER JOIN "b" ON a.id = b.id"#));
    }

    #[test]
    fn or_where_wraps_existing_root() {
        let q = pg()
            .from("t")
            .eq("a", 1)
            .eq("b", 2)
            .or_where(eq("c", 3));
        assert_eq!(
            sql(&q),
            r#"SELECT * FROM "t" WHERE ("a" = $1 AND "b" = $2) OR "c" = $3"#
        );
    }

    #[test]
    fn union_wraps_each_operand() {
        let q1 = pg().select(["name"]).from("users");
        let q2 = pg().select(["name"]).from("archived");
        assert_eq!(
            sql(&q1.union(q2)),
            r#"(SELECT "name" FROM "users") UNION (SELECT "name" FROM "archived")"#
        );
    }

    #[test]
    fn set_op_chain_folds_left() {
        let q1 = pg().select(["id"]).from("a").eq("x", 1);
        let q2 = pg().select(["id"]).from("b").eq("y", 2);
        let q3 = pg().select(["id"]).from("c").eq("z", 3);
        let built = q1.union(q2).except(q3).unwrap().build().unwrap();
        assert_eq!(
            built.sql(),
            r#"((SELECT "id" FROM "a" WHERE "x" = $1) UNION (SELECT "id" FROM "b" WHERE "y" = $2)) EXCEPT (SELECT "id" FROM "c" WHERE "z" = $3)"#
        );
        assert_eq!(built.params(), &[Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn none_set_operand_is_noop() {
        let q = pg().from("t");
        let before = sql(&q);
        let q = q.union(None).intersect(None).unwrap();
        assert_eq!(sql(&q), before);
    }

    #[test]
    fn intersect_unsupported_on_mysql() {
        let q = SelectQuery::new(Dialect::MYSQL).from("a");
        let other = SelectQuery::new(Dialect::MYSQL).from("b");
        assert!(matches!(
            q.intersect(other),
            Err(SqlError::Unsupported { feature: "INTERSECT", dialect: "mysql" })
        ));
    }

    #[test]
    fn sqlite_set_operands_are_flat() {
        let d = Dialect::SQLITE;
        let q1 = SelectQuery::new(d).select(["id"]).from("a");
        let q2 = SelectQuery::new(d).select(["id"]).from("b").order_by(["id"]).limit(5);
        assert_eq!(
            q1.union_all(q2).to_sql().unwrap(),
            r#"SELECT "id" FROM "a" UNION ALL SELECT * FROM (SELECT "id" FROM "b" ORDER BY "id" LIMIT ?)"#
        );
    }

    #[test]
    fn cte_params_come_first() {
        let active = pg().select(["id"]).from("users").eq("status", "active");
        let q = pg()
            .with("active_users", active)
            .select_expr("? AS tag", ["x"])
            .from("orders o")
            .inner_join("active_users a", raw("a.id = o.user_id AND o.kind = ?", ["web"]))
            .unwrap()
            .gt("o.total", 100)
            .group_by(["o.user_id"])
            .having_raw("SUM(o.total) > ?", [1000]);
        let built = q.build().unwrap();
        assert_eq!(
            built.sql(),
            r#"WITH "active_users" AS (SELECT "id" FROM "users" WHERE "status" = $1) SELECT $2 AS tag FROM "orders" AS "o" INNER JOIN "active_users" AS "a" ON a.id = o.user_id AND o.kind = $3 WHERE "o"."total" > $4 GROUP BY "o"."user_id" HAVING SUM(o.total) > $5"#
        );
        assert_eq!(
            built.params(),
            &[
                Value::from("active"),
                Value::from("x"),
                Value::from("web"),
                Value::Int(100),
                Value::Int(1000),
            ]
        );
    }

    #[test]
    fn recursive_cte_requires_union() {
        let plain = pg().select(["id"]).from("nodes");
        let err = pg().with_recursive("h", plain).unwrap_err();
        assert!(matches!(err, SqlError::Malformed(_)));

        let anchor = pg().select(["id", "parent_id"]).from("nodes").is_null("parent_id");
        let step = pg()
            .select(["n.id", "n.parent_id"])
            .from("nodes n")
            .inner_join("h", "n.parent_id = h.id")
            .unwrap();
        let q = pg()
            .with_recursive("h", anchor.union_all(step))
            .unwrap()
            .from("h");
        assert_eq!(
            sql(&q),
            r#"WITH RECURSIVE "h" AS (SELECT "id", "parent_id" FROM "nodes" WHERE "parent_id" IS NULL UNION ALL SELECT "n"."id", "n"."parent_id" FROM "nodes" AS "n" INNER JOIN "h" ON n.parent_id = h.id) SELECT * FROM "h""#
        );
    }

    #[test]
    fn with_columns_lists_names() {
        let q = pg()
            .with_columns("t", ["a", "b"], pg().select(["x", "y"]).from("src"))
            .from("t");
        assert!(sql(&q).starts_with(r#"WITH "t" ("a", "b") AS (SELECT "x", "y" FROM "src")"#));
    }

    #[test]
    fn limit_and_offset_are_bound() {
        let built = pg().from("t").eq("a", 1).paginate(3, 20).build().unwrap();
        assert_eq!(
            built.sql(),
            r#"SELECT * FROM "t" WHERE "a" = $1 LIMIT $2 OFFSET $3"#
        );
        assert_eq!(built.params(), &[Value::Int(1), Value::Int(20), Value::Int(40)]);

        let built = pg().from("t").paginate(0, 0).build().unwrap();
        assert_eq!(built.params(), &[Value::Int(1), Value::Int(0)]);
    }

    #[test]
    fn offset_without_limit_on_mysql() {
        let built = SelectQuery::new(Dialect::MYSQL).from("t").offset(5).build().unwrap();
        assert_eq!(built.sql(), "SELECT * FROM `t` LIMIT ? OFFSET ?");
        assert_eq!(built.params(), &[Value::Int(i64::MAX), Value::Int(5)]);
    }

    #[test]
    fn subqueries_fold_params_in_place() {
        let banned = pg().select(["user_id"]).from("bans").eq("active", true);
        let q = pg()
            .from("users")
            .eq("org", 7)
            .and_where(or([Some(in_subquery("id", banned)), Some(gt("strikes", 3))]));
        let built = q.build().unwrap();
        assert_eq!(
            built.sql(),
            r#"SELECT * FROM "users" WHERE "org" = $1 AND ("id" IN (SELECT "user_id" FROM "bans" WHERE "active" = $2) OR "strikes" > $3)"#
        );
        assert_eq!(
            built.params(),
            &[Value::Int(7), Value::Bool(true), Value::Int(3)]
        );
    }

    #[test]
    fn subquery_from_other_dialect_is_malformed() {
        let sub = SelectQuery::new(Dialect::MYSQL).select(["id"]).from("x");
        let q = pg().from_subquery(sub, "s");
        assert!(matches!(q.build(), Err(SqlError::Malformed(_))));
    }

    #[test]
    fn from_subquery_aliases() {
        let sub = pg().select(["id"]).from("x").eq("k", 1);
        let q = pg().select(["s.id"]).from_subquery(sub, "s").eq("s.id", 2);
        let built = q.build().unwrap();
        assert_eq!(
            built.sql(),
            r#"SELECT "s"."id" FROM (SELECT "id" FROM "x" WHERE "k" = $1) AS "s" WHERE "s"."id" = $2"#
        );
    }

    #[test]
    fn distinct_and_count_query() {
        let q = pg().select(["city"]).distinct().from("users").eq("active", true);
        assert_eq!(
            sql(&q),
            r#"SELECT DISTINCT "city" FROM "users" WHERE "active" = $1"#
        );
        assert_eq!(
            sql(&q.count_query()),
            r#"SELECT COUNT(*) FROM (SELECT DISTINCT "city" FROM "users" WHERE "active" = $1) AS "t""#
        );

        let plain = pg().from("users").eq("active", true).order_by(["id"]).limit(5);
        assert_eq!(
            sql(&plain.count_query()),
            r#"SELECT COUNT(*) FROM "users" WHERE "active" = $1"#
        );
    }
}
