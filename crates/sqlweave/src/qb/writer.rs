//! SQL text + parameter accumulation shared by every builder.
//!
//! Fragments always emit the `?` token. Numbered dialects get a single renumbering pass
//! over the finished text in [`Writer::finish`], so subqueries and clauses composed
//! independently still end up with globally consistent `$n` positions.

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use std::sync::Arc;

/// The rendered statement: SQL text plus parameters in placeholder order.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposedQuery {
    sql: Arc<str>,
    params: Arc<[Value]>,
}

impl ComposedQuery {
    pub(crate) fn new(sql: String, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params: params.into(),
        }
    }

    /// SQL text with dialect placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters, one per placeholder, in order of occurrence.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Accumulates SQL text and parameters while a statement renders.
#[derive(Debug)]
pub(crate) struct Writer {
    pub(crate) dialect: Dialect,
    pub(crate) sql: String,
    pub(crate) params: Vec<Value>,
}

impl Writer {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub(crate) fn push_char(&mut self, ch: char) {
        self.sql.push(ch);
    }

    /// Emit one placeholder bound to `value`.
    pub(crate) fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// Emit `?, ?, ...` for each value.
    pub(crate) fn bind_list(&mut self, values: &[Value]) {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.bind(v.clone());
        }
    }

    pub(crate) fn column(&mut self, name: &str) {
        crate::ident::write_column(&self.dialect, &mut self.sql, name);
    }

    pub(crate) fn ident(&mut self, name: &str) {
        crate::ident::write_dotted(&self.dialect, &mut self.sql, name);
    }

    /// Append a caller-written fragment that uses `?` tokens, checking the token count.
    pub(crate) fn template(&mut self, sql: &str, values: &[Value]) -> SqlResult<()> {
        let found = placeholder_offsets(sql).len();
        if found != values.len() {
            return Err(SqlError::malformed(format!(
                "fragment `{sql}` has {found} placeholder(s) but {} value(s)",
                values.len()
            )));
        }
        self.sql.push_str(sql);
        self.params.extend(values.iter().cloned());
        Ok(())
    }

    /// Produce the final statement, renumbering placeholders for numbered dialects.
    pub(crate) fn finish(self) -> ComposedQuery {
        let sql = match self.dialect.placeholder {
            PlaceholderStyle::Numbered { prefix } => renumber(&self.sql, prefix),
            PlaceholderStyle::Token('?') => self.sql,
            PlaceholderStyle::Token(token) => replace_tokens(&self.sql, token),
        };
        ComposedQuery::new(sql, self.params)
    }
}

/// Byte offsets of every `?` placeholder outside quoted strings and identifiers.
pub(crate) fn placeholder_offsets(sql: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut quote: Option<char> = None;

    for (i, ch) in sql.char_indices() {
        match quote {
            // A doubled quote closes and immediately reopens, which nets out correctly.
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '?' => offsets.push(i),
                _ => {}
            },
        }
    }
    offsets
}

/// Replace each `?` placeholder, left to right, with `prefix` + its 1-based position.
pub(crate) fn renumber(sql: &str, prefix: &str) -> String {
    let offsets = placeholder_offsets(sql);
    if offsets.is_empty() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + offsets.len() * (prefix.len() + 2));
    let mut last = 0;
    for (n, &at) in offsets.iter().enumerate() {
        out.push_str(&sql[last..at]);
        out.push_str(prefix);
        out.push_str(&(n + 1).to_string());
        last = at + 1;
    }
    out.push_str(&sql[last..]);
    out
}

fn replace_tokens(sql: &str, token: char) -> String {
    let offsets = placeholder_offsets(sql);
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for &at in &offsets {
        out.push_str(&sql[last..at]);
        out.push(token);
        last = at + 1;
    }
    out.push_str(&sql[last..]);
    out
}
