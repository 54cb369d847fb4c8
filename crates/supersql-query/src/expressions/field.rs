//! Tables and columns.
//!
//! A [`Table`] knows its name, optional schema and optional alias; a [`Field`]
//! is a column, optionally qualified by a table. Fields are the left-hand side
//! of every predicate, built with explicit methods rather than operator
//! overloading:
//!
//! ```
//! use supersql_query::expressions::Table;
//!
//! let users = Table::new("users");
//! let adults = users.field("age").ge(18) & users.field("email").is_not_null();
//! assert_eq!(
//!     adults.to_string(),
//!     r#"("users"."age" >= 18) AND ("users"."email" IS NOT NULL)"#
//! );
//! ```

use std::fmt;
use std::ops;

use crate::dialect::quote_ident;
use crate::value::Value;

use super::condition::{CompareOp, Condition, InSet, Operand};
use super::expr::{Direction, Expr, OrderItem};

/// A table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    name: String,
    schema: Option<String>,
    alias: Option<String>,
}

impl Table {
    /// Creates a table reference with no schema and no alias.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            alias: None,
        }
    }

    /// Qualifies the table with a schema.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Returns a copy of this table carrying `alias`.
    #[must_use]
    pub fn as_(&self, alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..self.clone()
        }
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The name columns are qualified with: the alias if set, else the name.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// The quoted, schema-qualified name without the alias.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// A column of this table.
    pub fn field(&self, name: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            table: Some(self.clone()),
        }
    }

    /// Shorthand for [`field`](Self::field).
    pub fn col(&self, name: impl Into<String>) -> Field {
        self.field(name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", quote_ident(alias))?;
        }
        Ok(())
    }
}

impl From<&str> for Table {
    /// `"schema.name"` splits into schema and name.
    fn from(name: &str) -> Self {
        match name.split_once('.') {
            Some((schema, table)) => Self::new(table).in_schema(schema),
            None => Self::new(name),
        }
    }
}

impl From<String> for Table {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

/// A column, optionally qualified by its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
    table: Option<Table>,
}

#[allow(clippy::should_implement_trait)]
impl Field {
    /// An unqualified column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
        }
    }

    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning table, if qualified.
    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    fn compare(&self, op: CompareOp, right: impl Into<Operand>) -> Condition {
        Condition::compare(self.clone(), op, right.into())
    }

    /// `field = value`; comparing with NULL yields `IS NULL`.
    pub fn eq(&self, right: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Eq, right)
    }

    /// `field <> value`; comparing with NULL yields `IS NOT NULL`.
    pub fn ne(&self, right: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Ne, right)
    }

    /// `field > value`
    pub fn gt(&self, right: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Gt, right)
    }

    /// `field >= value`
    pub fn ge(&self, right: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Ge, right)
    }

    /// `field < value`
    pub fn lt(&self, right: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Lt, right)
    }

    /// `field <= value`
    pub fn le(&self, right: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Le, right)
    }

    /// `field LIKE pattern`
    pub fn like(&self, pattern: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::Like, pattern)
    }

    /// `field ILIKE pattern`
    pub fn ilike(&self, pattern: impl Into<Operand>) -> Condition {
        self.compare(CompareOp::ILike, pattern)
    }

    /// `field IN (…)` over a list of values or a sub-select.
    pub fn is_in(&self, set: impl Into<InSet>) -> Condition {
        Condition::In {
            field: self.clone(),
            negated: false,
            set: set.into(),
        }
    }

    /// `field NOT IN (…)`
    pub fn not_in(&self, set: impl Into<InSet>) -> Condition {
        Condition::In {
            field: self.clone(),
            negated: true,
            set: set.into(),
        }
    }

    /// `field BETWEEN lower AND upper`
    pub fn between(&self, lower: impl Into<Value>, upper: impl Into<Value>) -> Condition {
        Condition::Between {
            field: self.clone(),
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// `field IS NULL`
    pub fn is_null(&self) -> Condition {
        Condition::Null {
            field: self.clone(),
            negated: false,
        }
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(&self) -> Condition {
        Condition::Null {
            field: self.clone(),
            negated: true,
        }
    }

    /// Ascending sort key.
    pub fn asc(&self) -> OrderItem {
        OrderItem::new(self.clone(), Direction::Asc)
    }

    /// Descending sort key.
    pub fn desc(&self) -> OrderItem {
        OrderItem::new(self.clone(), Direction::Desc)
    }

    /// `field AS alias` for a select list.
    pub fn as_(&self, alias: impl Into<String>) -> Expr {
        Expr::Column(self.clone()).as_(alias)
    }

    /// An UPDATE assignment `field = value`.
    pub fn assign(&self, value: impl Into<Operand>) -> crate::state::Assignment {
        crate::state::Assignment::Set {
            column: self.name.clone(),
            value: value.into(),
        }
    }
}

impl ops::Neg for Field {
    type Output = OrderItem;

    fn neg(self) -> OrderItem {
        OrderItem::new(self, Direction::Desc)
    }
}

impl ops::Neg for &Field {
    type Output = OrderItem;

    fn neg(self) -> OrderItem {
        self.desc()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{}.", quote_ident(table.reference()))?;
        }
        f.write_str(&quote_ident(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_display() {
        assert_eq!(Table::new("users").to_string(), r#""users""#);
        assert_eq!(Table::new("users").as_("u").to_string(), r#""users" AS "u""#);
        assert_eq!(
            Table::new("users").in_schema("app").as_("u").to_string(),
            r#""app"."users" AS "u""#
        );
    }

    #[test]
    fn test_table_from_dotted_str() {
        let t = Table::from("public.users");
        assert_eq!(t.schema(), Some("public"));
        assert_eq!(t.name(), "users");
    }

    #[test]
    fn test_field_display_uses_alias() {
        let u = Table::new("users").as_("u");
        assert_eq!(u.field("id").to_string(), r#""u"."id""#);
        assert_eq!(Table::new("users").col("id").to_string(), r#""users"."id""#);
        assert_eq!(Field::new("id").to_string(), r#""id""#);
    }

    #[test]
    fn test_eq_none_is_null() {
        let f = Field::new("deleted_at");
        assert_eq!(f.eq(Value::Null), f.is_null());
        assert_eq!(f.eq(None::<i64>), f.is_null());
        assert_eq!(f.ne(Value::Null), f.is_not_null());
    }

    #[test]
    fn test_neg_is_desc() {
        let f = Field::new("created_at");
        assert_eq!(-f.clone(), f.desc());
        assert_eq!(-&f, f.desc());
    }

    #[test]
    fn test_assign() {
        let a = Table::new("users").field("name").assign("Bob");
        assert!(matches!(a, crate::state::Assignment::Set { ref column, .. } if column == "name"));
    }
}
