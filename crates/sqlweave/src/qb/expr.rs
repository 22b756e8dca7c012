//! Expression layer for WHERE/HAVING/ON conditions.
//!
//! [`Expr`] is a closed set of predicate variants. Each variant renders itself against a
//! [`Dialect`] and contributes its parameters in textual order. Free functions
//! (`eq`, `and`, `like`, `in_list`, ...) are the usual way to build them:
//!
//! ```ignore
//! use sqlweave::qb::expr::*;
//!
//! let cond = and([
//!     Some(eq("status", "active")),
//!     None,
//!     Some(or([Some(gt("age", 18)), Some(is_null("age"))])),
//! ]);
//! ```

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::qb::select::SelectQuery;
use crate::qb::traits::SqlQuery;
use crate::qb::writer::Writer;
use crate::value::Value;
use std::collections::BTreeMap;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }
}

/// How multiple LIKE values are joined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

/// Logical connective of a [`Expr::Logical`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Right-hand side of an IN / NOT IN.
#[derive(Clone, Debug)]
pub enum Members {
    Values(Vec<Value>),
    Subquery(Box<SelectQuery>),
}

/// A boolean SQL expression.
#[derive(Clone, Debug)]
pub enum Expr {
    /// `column op ?`
    Comparison {
        column: String,
        op: CompareOp,
        value: Value,
    },

    /// Conjunction of `column = ?` / `IS NULL` / `IN (...)`, one per key, keys sorted.
    HashEquality(BTreeMap<String, Value>),

    /// LIKE family. Each value is escaped, then wrapped in `%` on the enabled sides.
    Pattern {
        column: String,
        values: Vec<String>,
        escape_left: bool,
        escape_right: bool,
        combinator: Combinator,
        negate: bool,
    },

    /// `column IN (...)` / `column NOT IN (...)`
    Membership {
        column: String,
        members: Members,
        negate: bool,
    },

    /// `column BETWEEN ? AND ?`
    Range {
        column: String,
        low: Value,
        high: Value,
        negate: bool,
    },

    /// `column IS NULL` / `column IS NOT NULL`
    NullCheck { column: String, negate: bool },

    /// AND / OR / NOT over operands. `NOT` with several operands negates their conjunction.
    Logical { op: LogicalOp, operands: Vec<Expr> },

    /// `EXISTS (subquery)` / `NOT EXISTS (subquery)`
    Existence {
        subquery: Box<SelectQuery>,
        negate: bool,
    },

    /// Caller-written SQL with `?` placeholders.
    Raw { sql: String, values: Vec<Value> },
}

/// Binding strength of a rendered expression, used to decide on parentheses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Prec {
    Atom,
    And,
    Or,
}

impl Expr {
    /// Whether this expression renders to nothing (and is dropped by its parent).
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::HashEquality(map) => map.is_empty(),
            Expr::Pattern { values, .. } => values.is_empty(),
            Expr::Membership {
                members: Members::Values(values),
                negate,
                ..
            } => values.is_empty() && *negate,
            Expr::Logical { operands, .. } => operands.iter().all(Expr::is_empty),
            Expr::Raw { sql, .. } => sql.trim().is_empty(),
            _ => false,
        }
    }

    pub(crate) fn prec(&self) -> Prec {
        match self {
            Expr::HashEquality(map) if map.len() > 1 => Prec::And,
            Expr::Pattern {
                values, combinator, ..
            } if values.len() > 1 => match combinator {
                Combinator::And => Prec::And,
                Combinator::Or => Prec::Or,
            },
            Expr::Logical { op, operands } => {
                let mut live = operands.iter().filter(|e| !e.is_empty());
                match (op, live.next(), live.next()) {
                    (LogicalOp::Not, _, _) => Prec::Atom,
                    (_, Some(only), None) => only.prec(),
                    (LogicalOp::And, _, _) => Prec::And,
                    (LogicalOp::Or, _, _) => Prec::Or,
                }
            }
            Expr::Raw { sql, .. } if has_top_level_or(sql) => Prec::Or,
            _ => Prec::Atom,
        }
    }

    /// Render this expression on its own, numbering placeholders from 1.
    pub fn render(&self, dialect: Dialect) -> SqlResult<(String, Vec<Value>)> {
        let mut w = Writer::new(dialect);
        self.write(&mut w)?;
        let q = w.finish();
        Ok((q.sql().to_string(), q.params().to_vec()))
    }

    pub(crate) fn write(&self, w: &mut Writer) -> SqlResult<()> {
        match self {
            Expr::Comparison { column, op, value } => {
                w.column(column);
                w.push_char(' ');
                w.push(op.as_sql());
                w.push_char(' ');
                w.bind(value.clone());
            }
            Expr::HashEquality(map) => {
                for (i, (column, value)) in map.iter().enumerate() {
                    if i > 0 {
                        w.push(" AND ");
                    }
                    write_hash_entry(w, column, value);
                }
            }
            Expr::Pattern {
                column,
                values,
                escape_left,
                escape_right,
                combinator,
                negate,
            } => {
                let op = if *negate { " NOT LIKE " } else { " LIKE " };
                let joiner = match combinator {
                    Combinator::And => " AND ",
                    Combinator::Or => " OR ",
                };
                for (i, raw) in values.iter().enumerate() {
                    if i > 0 {
                        w.push(joiner);
                    }
                    w.column(column);
                    w.push(op);
                    w.bind(Value::Text(wrap_pattern(raw, *escape_left, *escape_right)));
                    if w.dialect.features.like_escape_clause {
                        w.push(" ESCAPE '\\'");
                    }
                }
            }
            Expr::Membership {
                column,
                members,
                negate,
            } => match members {
                Members::Values(values) => write_membership(w, column, values, *negate),
                Members::Subquery(sub) => {
                    w.column(column);
                    w.push(if *negate { " NOT IN (" } else { " IN (" });
                    write_subquery(w, sub)?;
                    w.push_char(')');
                }
            },
            Expr::Range {
                column,
                low,
                high,
                negate,
            } => {
                w.column(column);
                w.push(if *negate { " NOT BETWEEN " } else { " BETWEEN " });
                w.bind(low.clone());
                w.push(" AND ");
                w.bind(high.clone());
            }
            Expr::NullCheck { column, negate } => {
                w.column(column);
                w.push(if *negate { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::Logical { op, operands } => write_logical(w, *op, operands)?,
            Expr::Existence { subquery, negate } => {
                w.push(if *negate { "NOT EXISTS (" } else { "EXISTS (" });
                write_subquery(w, subquery)?;
                w.push_char(')');
            }
            Expr::Raw { sql, values } => w.template(sql, values)?,
        }
        Ok(())
    }
}

fn write_hash_entry(w: &mut Writer, column: &str, value: &Value) {
    match value {
        Value::Null => {
            w.column(column);
            w.push(" IS NULL");
        }
        Value::Array(values) => write_membership(w, column, values, false),
        other => {
            w.column(column);
            w.push(" = ");
            w.bind(other.clone());
        }
    }
}

fn write_membership(w: &mut Writer, column: &str, values: &[Value], negate: bool) {
    match values {
        // Empty NOT IN is dropped by `is_empty`; only the IN case reaches here.
        [] => {
            if !negate {
                w.push("1=0");
            }
        }
        [single] => {
            w.column(column);
            w.push(if negate { " <> " } else { " = " });
            w.bind(single.clone());
        }
        many => {
            w.column(column);
            w.push(if negate { " NOT IN (" } else { " IN (" });
            w.bind_list(many);
            w.push_char(')');
        }
    }
}

fn write_logical(w: &mut Writer, op: LogicalOp, operands: &[Expr]) -> SqlResult<()> {
    let live: Vec<&Expr> = operands.iter().filter(|e| !e.is_empty()).collect();
    if live.is_empty() {
        return Ok(());
    }

    let (joiner, own) = match op {
        LogicalOp::Not => {
            w.push("NOT (");
            write_logical(w, LogicalOp::And, operands)?;
            w.push_char(')');
            return Ok(());
        }
        LogicalOp::And => (" AND ", Prec::And),
        LogicalOp::Or => (" OR ", Prec::Or),
    };

    let single = live.len() == 1;
    for (i, e) in live.into_iter().enumerate() {
        if i > 0 {
            w.push(joiner);
        }
        let child = e.prec();
        let wrap = !single && child != Prec::Atom && child != own;
        if wrap {
            w.push_char('(');
        }
        e.write(w)?;
        if wrap {
            w.push_char(')');
        }
    }
    Ok(())
}

/// Whether `sql` contains an `OR` keyword outside parentheses and quoted text.
fn has_top_level_or(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b'o' | b'O' if depth == 0 => {
                    let next = bytes.get(i + 1).copied();
                    let after = bytes.get(i + 2).copied();
                    let before = i.checked_sub(1).map(|j| bytes[j]);
                    if matches!(next, Some(b'r' | b'R'))
                        && !before.is_some_and(is_word)
                        && !after.is_some_and(is_word)
                    {
                        return true;
                    }
                }
                _ => {}
            },
        }
    }
    false
}

pub(crate) fn write_subquery(w: &mut Writer, sub: &SelectQuery) -> SqlResult<()> {
    if sub.dialect() != w.dialect {
        return Err(SqlError::malformed(format!(
            "subquery built for the {} dialect used inside a {} statement",
            sub.dialect().name,
            w.dialect.name
        )));
    }
    sub.write_to(w)
}

/// Escape LIKE metacharacters with a backslash (the backslash itself first).
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn wrap_pattern(value: &str, left: bool, right: bool) -> String {
    let escaped = escape_like(value);
    let mut out = String::with_capacity(escaped.len() + 2);
    if left {
        out.push('%');
    }
    out.push_str(&escaped);
    if right {
        out.push('%');
    }
    out
}

// ==================== Constructors ====================

fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Expr {
    Expr::Comparison {
        column: column.into(),
        op,
        value: value.into(),
    }
}

/// `column = value`
pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Expr {
    compare(column, CompareOp::Eq, value)
}

/// `column <> value`
pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Expr {
    compare(column, CompareOp::Ne, value)
}

/// `column < value`
pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Expr {
    compare(column, CompareOp::Lt, value)
}

/// `column > value`
pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Expr {
    compare(column, CompareOp::Gt, value)
}

/// `column <= value`
pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Expr {
    compare(column, CompareOp::Le, value)
}

/// `column >= value`
pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Expr {
    compare(column, CompareOp::Ge, value)
}

/// Equality over a column → value mapping. `Null` renders `IS NULL`, arrays render `IN`.
pub fn hash_eq<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Expr
where
    K: Into<String>,
    V: Into<Value>,
{
    Expr::HashEquality(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

fn pattern(
    column: impl Into<String>,
    values: Vec<String>,
    left: bool,
    right: bool,
    combinator: Combinator,
    negate: bool,
) -> Expr {
    Expr::Pattern {
        column: column.into(),
        values,
        escape_left: left,
        escape_right: right,
        combinator,
        negate,
    }
}

/// `column LIKE '%value%'` with `value` matched literally.
pub fn like(column: impl Into<String>, value: impl Into<String>) -> Expr {
    pattern(column, vec![value.into()], true, true, Combinator::Or, false)
}

/// `column NOT LIKE '%value%'`
pub fn not_like(column: impl Into<String>, value: impl Into<String>) -> Expr {
    pattern(column, vec![value.into()], true, true, Combinator::Or, true)
}

/// `column LIKE 'value%'`
pub fn like_prefix(column: impl Into<String>, value: impl Into<String>) -> Expr {
    pattern(column, vec![value.into()], false, true, Combinator::Or, false)
}

/// `column LIKE '%value'`
pub fn like_suffix(column: impl Into<String>, value: impl Into<String>) -> Expr {
    pattern(column, vec![value.into()], true, false, Combinator::Or, false)
}

/// `column LIKE '%a%' OR column LIKE '%b%' ...`
pub fn like_any<S: Into<String>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = S>,
) -> Expr {
    let values = values.into_iter().map(Into::into).collect();
    pattern(column, values, true, true, Combinator::Or, false)
}

/// `column LIKE '%a%' AND column LIKE '%b%' ...`
pub fn like_all<S: Into<String>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = S>,
) -> Expr {
    let values = values.into_iter().map(Into::into).collect();
    pattern(column, values, true, true, Combinator::And, false)
}

/// `column IN (values...)`
pub fn in_list<V: Into<Value>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> Expr {
    Expr::Membership {
        column: column.into(),
        members: Members::Values(values.into_iter().map(Into::into).collect()),
        negate: false,
    }
}

/// `column NOT IN (values...)`
pub fn not_in<V: Into<Value>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> Expr {
    Expr::Membership {
        column: column.into(),
        members: Members::Values(values.into_iter().map(Into::into).collect()),
        negate: true,
    }
}

/// `column IN (subquery)`
pub fn in_subquery(column: impl Into<String>, subquery: SelectQuery) -> Expr {
    Expr::Membership {
        column: column.into(),
        members: Members::Subquery(Box::new(subquery)),
        negate: false,
    }
}

/// `column NOT IN (subquery)`
pub fn not_in_subquery(column: impl Into<String>, subquery: SelectQuery) -> Expr {
    Expr::Membership {
        column: column.into(),
        members: Members::Subquery(Box::new(subquery)),
        negate: true,
    }
}

/// `column BETWEEN low AND high`
pub fn between(
    column: impl Into<String>,
    low: impl Into<Value>,
    high: impl Into<Value>,
) -> Expr {
    Expr::Range {
        column: column.into(),
        low: low.into(),
        high: high.into(),
        negate: false,
    }
}

/// `column NOT BETWEEN low AND high`
pub fn not_between(
    column: impl Into<String>,
    low: impl Into<Value>,
    high: impl Into<Value>,
) -> Expr {
    Expr::Range {
        column: column.into(),
        low: low.into(),
        high: high.into(),
        negate: true,
    }
}

/// `column IS NULL`
pub fn is_null(column: impl Into<String>) -> Expr {
    Expr::NullCheck {
        column: column.into(),
        negate: false,
    }
}

/// `column IS NOT NULL`
pub fn is_not_null(column: impl Into<String>) -> Expr {
    Expr::NullCheck {
        column: column.into(),
        negate: true,
    }
}

fn logical<E: Into<Option<Expr>>>(op: LogicalOp, operands: impl IntoIterator<Item = E>) -> Expr {
    Expr::Logical {
        op,
        operands: operands.into_iter().filter_map(Into::into).collect(),
    }
}

/// Conjunction. `None` operands are skipped; no operands renders nothing.
pub fn and<E: Into<Option<Expr>>>(operands: impl IntoIterator<Item = E>) -> Expr {
    logical(LogicalOp::And, operands)
}

/// Disjunction. `None` operands are skipped; no operands renders nothing.
pub fn or<E: Into<Option<Expr>>>(operands: impl IntoIterator<Item = E>) -> Expr {
    logical(LogicalOp::Or, operands)
}

/// `NOT (expr)`
pub fn not(expr: Expr) -> Expr {
    Expr::Logical {
        op: LogicalOp::Not,
        operands: vec![expr],
    }
}

/// `EXISTS (subquery)`
pub fn exists(subquery: SelectQuery) -> Expr {
    Expr::Existence {
        subquery: Box::new(subquery),
        negate: false,
    }
}

/// `NOT EXISTS (subquery)`
pub fn not_exists(subquery: SelectQuery) -> Expr {
    Expr::Existence {
        subquery: Box::new(subquery),
        negate: true,
    }
}

/// Raw SQL with `?` placeholders, one per value.
pub fn raw<V: Into<Value>>(sql: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
    Expr::Raw {
        sql: sql.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

impl From<&str> for Expr {
    fn from(sql: &str) -> Self {
        Expr::Raw {
            sql: sql.to_string(),
            values: Vec::new(),
        }
    }
}

impl From<String> for Expr {
    fn from(sql: String) -> Self {
        Expr::Raw {
            sql,
            values: Vec::new(),
        }
    }
}

/// An accumulating condition: the root of a WHERE or HAVING tree.
///
/// `and` appends to the root conjunction; `or` rewrites the root to `OR(root, new)`.
#[derive(Clone, Debug, Default)]
pub(crate) struct Condition {
    root: Option<Expr>,
}

impl Condition {
    pub(crate) fn is_empty(&self) -> bool {
        self.root.as_ref().is_none_or(Expr::is_empty)
    }

    pub(crate) fn and(&mut self, expr: Expr) {
        self.root = Some(match self.root.take() {
            None => and([expr]),
            Some(Expr::Logical {
                op: LogicalOp::And,
                mut operands,
            }) => {
                operands.push(expr);
                Expr::Logical {
                    op: LogicalOp::And,
                    operands,
                }
            }
            Some(other) => and([other, expr]),
        });
    }

    pub(crate) fn or(&mut self, expr: Expr) {
        self.root = Some(match self.root.take() {
            Some(existing) if !existing.is_empty() => or([existing, expr]),
            _ => and([expr]),
        });
    }

    /// Write ` KEYWORD <condition>` when the condition renders to something.
    pub(crate) fn write_clause(&self, w: &mut Writer, keyword: &str) -> SqlResult<()> {
        if let Some(root) = self.root.as_ref().filter(|r| !r.is_empty()) {
            w.push_char(' ');
            w.push(keyword);
            w.push_char(' ');
            root.write(w)?;
        }
        Ok(())
    }
}
