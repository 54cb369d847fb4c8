//! Parameter and result values.
//!
//! Builders bind [`Value`]s as query parameters, drivers hand them back inside
//! a [`Row`](crate::row::Row), and [`Value::to_sql_literal`] renders one inline
//! for debug output.

use std::fmt;

use crate::dialect::Dialect;

/// One SQL value, independent of the driver that binds it.
///
/// ```
/// use supersql_query::value::Value;
///
/// assert_eq!(Value::from(Some(7)), Value::Int(7));
/// assert_eq!(Value::from(None::<&str>), Value::Null);
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(chrono::NaiveDate),
    DateTime(chrono::NaiveDateTime),
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    Time(chrono::NaiveTime),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    /// A row of values; drivers without arrays bind it as JSON text.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                let items: Vec<String> = vals.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<chrono::NaiveTime> for Value {
    fn from(v: chrono::NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The text of a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts this value to JSON.
    ///
    /// Drivers without an array type bind [`Value::List`] this way.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Json(j) => j.clone(),
            Self::List(vals) => Json::Array(vals.iter().map(Self::to_json).collect()),
            Self::Bytes(b) => Json::String(b.iter().map(|byte| format!("{byte:02x}")).collect()),
            Self::Date(_)
            | Self::DateTime(_)
            | Self::DateTimeTz(_)
            | Self::Time(_)
            | Self::Uuid(_) => Json::String(self.to_string()),
        }
    }

    /// Renders this value as an SQL literal for `dialect`.
    ///
    /// Used by the inline (debug) rendering mode and for the handful of
    /// places where SQL needs a literal rather than a placeholder. Strings are
    /// escaped with [`Dialect::quote_literal`].
    ///
    /// ```
    /// use supersql_query::{dialect::Dialect, value::Value};
    ///
    /// assert_eq!(Value::from("O'Brien").to_sql_literal(Dialect::Postgres), "'O''Brien'");
    /// assert_eq!(Value::Null.to_sql_literal(Dialect::Sqlite), "NULL");
    /// ```
    pub fn to_sql_literal(&self, dialect: Dialect) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(v) => v.to_string(),
            Self::String(s) => dialect.quote_literal(s),
            Self::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::List(vals) => {
                let items: Vec<String> = vals.iter().map(|v| v.to_sql_literal(dialect)).collect();
                format!("({})", items.join(", "))
            }
            Self::Date(_)
            | Self::DateTime(_)
            | Self::DateTimeTz(_)
            | Self::Time(_)
            | Self::Uuid(_)
            | Self::Json(_) => dialect.quote_literal(&self.to_string()),
        }
    }
}
