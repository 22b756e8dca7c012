//! SQL dialect descriptors.
//!
//! A [`Dialect`] is plain data: how placeholders are written, how identifiers are quoted,
//! and which optional features the target database accepts. Builders consult it and fail
//! with [`SqlError::Unsupported`] instead of emitting SQL the server would reject.

use crate::error::{SqlError, SqlResult};

/// How bind placeholders appear in the final SQL text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (the prefix followed by the 1-based position).
    Numbered { prefix: &'static str },
    /// The same token repeated, bound by position (`?`).
    Token(char),
}

/// Conflict-resolution syntax used by upserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictSyntax {
    /// `ON CONFLICT (target) DO UPDATE SET ... / DO NOTHING`
    OnConflict,
    /// `ON DUPLICATE KEY UPDATE ...` and `INSERT IGNORE`
    OnDuplicateKey,
    /// No upsert support.
    Unsupported,
}

/// Optional SQL features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Features {
    pub full_outer_join: bool,
    pub intersect_except: bool,
    pub recursive_cte: bool,
    pub returning: bool,
    /// Whether set-operation operands may be wrapped in parentheses.
    pub parenthesized_set_operands: bool,
    /// Whether LIKE needs an explicit `ESCAPE '\'` to honour backslash escapes.
    pub like_escape_clause: bool,
    /// Whether OFFSET is only accepted after a LIMIT.
    pub offset_requires_limit: bool,
    /// Whether `INSERT INTO t DEFAULT VALUES` is accepted (otherwise `() VALUES ()`).
    pub default_values: bool,
}

/// A named SQL variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub placeholder: PlaceholderStyle,
    /// Opening and closing identifier quote characters.
    pub quote: (char, char),
    pub features: Features,
    pub conflict: ConflictSyntax,
}

impl Dialect {
    pub const POSTGRES: Dialect = Dialect {
        name: "postgres",
        placeholder: PlaceholderStyle::Numbered { prefix: "$" },
        quote: ('"', '"'),
        features: Features {
            full_outer_join: true,
            intersect_except: true,
            recursive_cte: true,
            returning: true,
            parenthesized_set_operands: true,
            like_escape_clause: false,
            offset_requires_limit: false,
            default_values: true,
        },
        conflict: ConflictSyntax::OnConflict,
    };

    pub const MYSQL: Dialect = Dialect {
        name: "mysql",
        placeholder: PlaceholderStyle::Token('?'),
        quote: ('`', '`'),
        features: Features {
            full_outer_join: false,
            intersect_except: false,
            recursive_cte: true,
            returning: false,
            parenthesized_set_operands: true,
            like_escape_clause: false,
            offset_requires_limit: true,
            default_values: false,
        },
        conflict: ConflictSyntax::OnDuplicateKey,
    };

    pub const SQLITE: Dialect = Dialect {
        name: "sqlite",
        placeholder: PlaceholderStyle::Token('?'),
        quote: ('"', '"'),
        features: Features {
            full_outer_join: true,
            intersect_except: true,
            recursive_cte: true,
            returning: true,
            parenthesized_set_operands: false,
            like_escape_clause: true,
            offset_requires_limit: true,
            default_values: true,
        },
        conflict: ConflictSyntax::OnConflict,
    };

    /// Select a dialect from a driver name (`postgres`, `pgx`, `mysql`, `sqlite3`, ...).
    pub fn from_driver_name(driver: &str) -> SqlResult<Dialect> {
        match driver.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" | "pgx" => Ok(Self::POSTGRES),
            "mysql" | "mariadb" => Ok(Self::MYSQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLITE),
            _ => Err(SqlError::malformed(format!("unknown driver '{driver}'"))),
        }
    }

    /// Whether placeholders carry explicit positions.
    pub fn is_numbered(&self) -> bool {
        matches!(self.placeholder, PlaceholderStyle::Numbered { .. })
    }

    /// Fail with `Unsupported` unless `supported` holds.
    pub(crate) fn require(&self, supported: bool, feature: &'static str) -> SqlResult<()> {
        if supported {
            Ok(())
        } else {
            Err(SqlError::unsupported(feature, self.name))
        }
    }

    /// Append a single identifier part, quoted, doubling any embedded closing quote.
    pub(crate) fn push_quoted(&self, out: &mut String, name: &str) {
        let (open, close) = self.quote;
        out.push(open);
        for ch in name.chars() {
            if ch == close {
                out.push(close);
            }
            out.push(ch);
        }
        out.push(close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names_map_to_dialects() {
        assert_eq!(Dialect::from_driver_name("pgx").unwrap(), Dialect::POSTGRES);
        assert_eq!(Dialect::from_driver_name("Postgres").unwrap(), Dialect::POSTGRES);
        assert_eq!(Dialect::from_driver_name("mysql").unwrap(), Dialect::MYSQL);
        assert_eq!(Dialect::from_driver_name("sqlite3").unwrap(), Dialect::SQLITE);
        assert!(Dialect::from_driver_name("oracle").is_err());
    }

    #[test]
    fn quoting_doubles_closing_quote() {
        let mut out = String::new();
        Dialect::POSTGRES.push_quoted(&mut out, r#"we"ird"#);
        assert_eq!(out, r#""we""ird""#);

        let mut out = String::new();
        Dialect::MYSQL.push_quoted(&mut out, "a`b");
        assert_eq!(out, "`a``b`");
    }

    #[test]
    fn require_names_feature_and_dialect() {
        let err = Dialect::MYSQL
            .require(Dialect::MYSQL.features.full_outer_join, "FULL OUTER JOIN")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "FULL OUTER JOIN is not supported by the mysql dialect"
        );
    }
}
