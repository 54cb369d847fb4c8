//! SQL dialects.
//!
//! The placeholder style is the only thing that changes how a statement is
//! laid out; string escaping differs for the few literals that are inlined.

use std::fmt;
use std::str::FromStr;

use supersql_core::{SqlError, SqlResult};

/// A supported database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `PostgreSQL`: numbered `$1, $2, …` placeholders.
    Postgres,
    /// `MySQL`: positional `%s` placeholders.
    MySql,
    /// `SQLite`: positional `?` placeholders.
    Sqlite,
}

impl Dialect {
    /// Returns the vendor name used in configuration and logs.
    pub const fn vendor(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns `true` if placeholders carry an increasing index.
    pub const fn numbered_placeholders(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Returns the placeholder style as shown in docs and logs.
    pub const fn placeholder_style(self) -> &'static str {
        match self {
            Self::Postgres => "$n",
            Self::MySql => "%s",
            Self::Sqlite => "?",
        }
    }

    /// Returns the placeholder for the parameter at 1-based `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::MySql => "%s".to_string(),
            Self::Sqlite => "?".to_string(),
        }
    }

    /// Quotes `s` as a string literal.
    ///
    /// Single quotes are doubled everywhere. `MySQL` also treats the backslash
    /// as an escape character unless `NO_BACKSLASH_ESCAPES` is set, so
    /// backslashes are doubled there as well.
    pub fn quote_literal(self, s: &str) -> String {
        let mut escaped = s.replace('\'', "''");
        if self == Self::MySql {
            escaped = escaped.replace('\\', "\\\\");
        }
        format!("'{escaped}'")
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vendor())
    }
}

impl FromStr for Dialect {
    type Err = SqlError;

    fn from_str(s: &str) -> SqlResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(SqlError::not_implemented(
                format!("the '{other}' engine"),
                "postgres, mysql or sqlite",
            )),
        }
    }
}

/// Quotes an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder(3), "%s");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert!(Dialect::Postgres.numbered_placeholders());
        assert!(!Dialect::Sqlite.numbered_placeholders());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
    }

    #[test]
    fn test_unknown_engine_is_not_implemented() {
        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, SqlError::NotImplemented { .. }));
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_display() {
        assert_eq!(Dialect::MySql.to_string(), "mysql");
    }
}
