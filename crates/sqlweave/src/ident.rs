//! Identifier quoting for table, column and select-list entries.
//!
//! Rules, applied against a [`Dialect`]:
//!
//! - `*` is never quoted; `t.*` becomes `"t".*`
//! - anything containing `(` is treated as a raw expression and passed through, as are
//!   integer literals (`SELECT 1`)
//! - `expr AS alias` and `name alias` are split and quoted independently
//! - dotted names are quoted per part; parts that are already quoted are kept as-is
//!
//! Quoting never fails: embedded closing quotes are doubled, so arbitrary input cannot
//! break out of the identifier.

use crate::dialect::Dialect;

/// A table reference: `base` with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub base: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Split `"users u"` (or `"users AS u"`) on the first whitespace run.
    pub fn parse(s: &str) -> Self {
        let (base, alias) = split_alias(s.trim());
        Self {
            base: base.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    pub(crate) fn write_sql(&self, dialect: &Dialect, out: &mut String) {
        write_dotted(dialect, out, &self.base);
        if let Some(alias) = &self.alias {
            out.push_str(" AS ");
            write_dotted(dialect, out, alias);
        }
    }
}

/// Quote a column or select-list entry.
pub fn quote_column(dialect: &Dialect, s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    write_column(dialect, &mut out, s);
    out
}

pub(crate) fn write_column(dialect: &Dialect, out: &mut String, s: &str) {
    let s = s.trim();
    if s.contains('(') || (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())) {
        out.push_str(s);
        return;
    }
    let (base, alias) = split_alias(s);
    write_dotted(dialect, out, base);
    if let Some(alias) = alias {
        out.push_str(" AS ");
        write_dotted(dialect, out, alias);
    }
}

/// Quote an ORDER BY entry, keeping a trailing `ASC`/`DESC` and `NULLS FIRST|LAST`.
pub(crate) fn write_order(dialect: &Dialect, out: &mut String, s: &str) {
    let s = s.trim();
    if s.contains('(') {
        out.push_str(s);
        return;
    }
    let mut words = s.split_whitespace();
    let Some(column) = words.next() else {
        return;
    };
    write_dotted(dialect, out, column);
    for word in words {
        out.push(' ');
        out.push_str(&word.to_ascii_uppercase());
    }
}

/// Quote a possibly dotted name, part by part.
pub(crate) fn write_dotted(dialect: &Dialect, out: &mut String, name: &str) {
    for (i, part) in split_parts(dialect, name).into_iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        match part {
            Part::Star => out.push('*'),
            Part::Quoted(raw) => out.push_str(raw),
            Part::Plain(p) => dialect.push_quoted(out, p),
        }
    }
}

enum Part<'a> {
    Star,
    /// Already quoted by the caller, including its quotes.
    Quoted(&'a str),
    Plain(&'a str),
}

fn split_parts<'a>(dialect: &Dialect, name: &'a str) -> Vec<Part<'a>> {
    let (open, close) = dialect.quote;
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quote = false;

    for (i, ch) in name.char_indices() {
        if in_quote {
            if ch == close {
                in_quote = false;
            }
            continue;
        }
        if ch == open && i == start {
            in_quote = true;
        } else if ch == '.' {
            parts.push(classify(&name[start..i], open));
            start = i + 1;
        }
    }
    parts.push(classify(&name[start..], open));
    parts
}

fn classify(part: &str, open: char) -> Part<'_> {
    if part == "*" {
        Part::Star
    } else if part.starts_with(open) && part.len() > 1 {
        Part::Quoted(part)
    } else {
        Part::Plain(part)
    }
}

/// Split `"x AS y"` / `"x y"` into `("x", Some("y"))`.
fn split_alias(s: &str) -> (&str, Option<&str>) {
    let lower = s.to_ascii_lowercase();
    if let Some(pos) = lower.find(" as ") {
        let alias = s[pos + 4..].trim();
        if !alias.is_empty() {
            return (s[..pos].trim_end(), Some(alias));
        }
    }
    match s.find(char::is_whitespace) {
        Some(pos) => {
            let alias = s[pos..].trim();
            if alias.is_empty() {
                (s, None)
            } else {
                (&s[..pos], Some(alias))
            }
        }
        None => (s, None),
    }
}
