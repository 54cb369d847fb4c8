//! Select-list items and sort keys.

use supersql_core::SqlResult;

use crate::compiler::{Compilable, Compiler};
use crate::state::QueryState;
use crate::value::Value;

use super::condition::{push_table, Condition};
use super::field::{Field, Table};
use super::function::Function;
use super::window::WindowFunction;

/// Anything that can appear in a select list, GROUP BY, PARTITION BY or as a
/// window-function argument.
///
/// A `&str` converts to [`Expr::Raw`] and is emitted verbatim, so
/// `"COUNT(*)"` and `"name"` both work as select items.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(Field),
    Raw(String),
    /// `NULL` renders inline; anything else binds.
    Value(Value),
    Function(Function),
    Window(Box<WindowFunction>),
    Condition(Box<Condition>),
    SubQuery(Box<QueryState>),
    Aliased { expr: Box<Expr>, alias: String },
}

impl Expr {
    /// Verbatim SQL.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// A bound value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// `expr AS alias`. Re-aliasing replaces the previous alias.
    #[must_use]
    pub fn as_(self, alias: impl Into<String>) -> Self {
        let expr = match self {
            Self::Aliased { expr, .. } => expr,
            other => Box::new(other),
        };
        Self::Aliased {
            expr,
            alias: alias.into(),
        }
    }

    pub(crate) fn collect_tables(&self, out: &mut Vec<Table>) {
        match self {
            Self::Column(field) => push_table(field, out),
            Self::Function(function) => function.collect_tables(out),
            Self::Window(window) => window.collect_tables(out),
            Self::Condition(condition) => condition.collect_tables(out),
            Self::Aliased { expr, .. } => expr.collect_tables(out),
            Self::Raw(_) | Self::Value(_) | Self::SubQuery(_) => {}
        }
    }
}

impl Compilable for Expr {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        match self {
            Self::Column(field) => Ok(field.to_string()),
            Self::Raw(sql) => Ok(sql.clone()),
            Self::Value(Value::Null) => Ok("NULL".to_string()),
            Self::Value(value) => Ok(compiler.bind(value.clone())),
            Self::Function(function) => function.write_sql(compiler),
            Self::Window(window) => window.write_sql(compiler),
            Self::Condition(condition) => condition.write_sql(compiler),
            Self::SubQuery(query) => Ok(format!("({})", compiler.compile_statement(query)?)),
            Self::Aliased { expr, alias } => Ok(format!("{} AS {alias}", expr.write_sql(compiler)?)),
        }
    }
}

impl From<Field> for Expr {
    fn from(field: Field) -> Self {
        Self::Column(field)
    }
}

impl From<&Field> for Expr {
    fn from(field: &Field) -> Self {
        Self::Column(field.clone())
    }
}

impl From<&str> for Expr {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for Expr {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Function> for Expr {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<WindowFunction> for Expr {
    fn from(window: WindowFunction) -> Self {
        Self::Window(Box::new(window))
    }
}

impl From<Condition> for Expr {
    fn from(condition: Condition) -> Self {
        Self::Condition(Box::new(condition))
    }
}

impl From<QueryState> for Expr {
    fn from(query: QueryState) -> Self {
        Self::SubQuery(Box::new(query))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// An ORDER BY key.
///
/// Strings follow the `"-col"` convention for descending order:
///
/// ```
/// use supersql_query::expressions::{Direction, OrderItem};
///
/// assert_eq!(OrderItem::from("-created_at").direction(), Direction::Desc);
/// assert_eq!(OrderItem::from("name").direction(), Direction::Asc);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    expr: Expr,
    direction: Direction,
}

impl OrderItem {
    pub fn new(expr: impl Into<Expr>, direction: Direction) -> Self {
        Self {
            expr: expr.into(),
            direction,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }
}

impl From<&str> for OrderItem {
    fn from(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(column) => Self::new(column, Direction::Desc),
            None => Self::new(key.strip_prefix('+').unwrap_or(key), Direction::Asc),
        }
    }
}

impl From<String> for OrderItem {
    fn from(key: String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<Field> for OrderItem {
    fn from(field: Field) -> Self {
        Self::new(field, Direction::Asc)
    }
}

impl From<&Field> for OrderItem {
    fn from(field: &Field) -> Self {
        Self::new(field, Direction::Asc)
    }
}

impl From<Expr> for OrderItem {
    fn from(expr: Expr) -> Self {
        Self::new(expr, Direction::Asc)
    }
}

impl Compilable for OrderItem {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        Ok(format!(
            "{} {}",
            self.expr.write_sql(compiler)?,
            self.direction.as_sql()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_raw_is_verbatim() {
        let out = Expr::from("COUNT(*)").compile(&mut Compiler::new(Dialect::Postgres)).unwrap();
        assert_eq!(out.sql, "COUNT(*)");
        assert!(out.params.is_empty());
    }

    #[test]
    fn test_null_value_inline_other_values_bind() {
        let mut compiler = Compiler::new(Dialect::Postgres);
        assert_eq!(Expr::Value(Value::Null).compile(&mut compiler).unwrap().sql, "NULL");
        let out = Expr::value(5).compile(&mut compiler).unwrap();
        assert_eq!(out.sql, "$1");
        assert_eq!(out.params, vec![Value::Int(5)]);
    }

    #[test]
    fn test_realias_replaces() {
        let e = Expr::from(Field::new("n")).as_("a").as_("b");
        let out = e.compile(&mut Compiler::new(Dialect::Sqlite)).unwrap();
        assert_eq!(out.sql, r#""n" AS b"#);
    }

    #[test]
    fn test_order_item_from_str() {
        let mut compiler = Compiler::new(Dialect::Sqlite);
        assert_eq!(OrderItem::from("-id").compile(&mut compiler).unwrap().sql, "id DESC");
        assert_eq!(OrderItem::from("+id").compile(&mut compiler).unwrap().sql, "id ASC");
        assert_eq!(OrderItem::from("id").compile(&mut compiler).unwrap().sql, "id ASC");
    }

    #[test]
    fn test_collect_tables_through_alias() {
        let users = Table::new("users");
        let mut out = Vec::new();
        users.field("id").as_("uid").collect_tables(&mut out);
        assert_eq!(out, vec![users]);
    }
}
