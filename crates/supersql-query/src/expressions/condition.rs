//! Predicates.
//!
//! [`Condition`] is a small expression tree. Leaves compare a [`Field`] with
//! an [`Operand`]; branches combine conditions with `AND`/`OR`/`NOT`. Every
//! plain value reaching a leaf is bound as a parameter, never spliced into
//! the SQL text, unless the compiler runs in inline (debug) mode.

use std::fmt;
use std::ops;

use supersql_core::{SqlError, SqlResult};

use crate::compiler::{Compilable, Compiler};
use crate::dialect::Dialect;
use crate::state::QueryState;
use crate::value::Value;

use super::expr::Expr;
use super::field::{Field, Table};

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    ILike,
}

impl CompareOp {
    /// The SQL spelling of the operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

/// The right-hand side of a comparison or a function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A plain value, bound as a parameter.
    Value(Value),
    /// A column, rendered inline (join keys, column-to-column comparisons).
    Column(Field),
    /// Any other node, compiled in place.
    Expr(Expr),
}

impl Operand {
    /// Verbatim SQL such as `*` or `INTERVAL '1 day'`.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Expr(Expr::Raw(sql.into()))
    }

    pub(crate) fn collect_tables(&self, out: &mut Vec<Table>) {
        match self {
            Self::Value(_) => {}
            Self::Column(field) => push_table(field, out),
            Self::Expr(expr) => expr.collect_tables(out),
        }
    }
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl From<Field> for Operand {
    fn from(field: Field) -> Self {
        Self::Column(field)
    }
}

impl From<&Field> for Operand {
    fn from(field: &Field) -> Self {
        Self::Column(field.clone())
    }
}

impl From<Expr> for Operand {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

impl From<super::function::Function> for Operand {
    fn from(function: super::function::Function) -> Self {
        Self::Expr(Expr::Function(function))
    }
}

impl From<QueryState> for Operand {
    fn from(query: QueryState) -> Self {
        Self::Expr(Expr::SubQuery(Box::new(query)))
    }
}

impl Compilable for Operand {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        match self {
            Self::Value(Value::Null) => Ok("NULL".to_string()),
            Self::Value(value) => Ok(compiler.bind(value.clone())),
            Self::Column(field) => Ok(field.to_string()),
            Self::Expr(expr) => expr.write_sql(compiler),
        }
    }
}

/// The set an `IN` predicate tests membership of.
#[derive(Debug, Clone, PartialEq)]
pub enum InSet {
    /// A literal list; one placeholder per element.
    List(Vec<Value>),
    /// A sub-select sharing the outer placeholder counter.
    SubQuery(Box<QueryState>),
}

impl<T: Into<Value>> From<Vec<T>> for InSet {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for InSet {
    fn from(values: [T; N]) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<QueryState> for InSet {
    fn from(query: QueryState) -> Self {
        Self::SubQuery(Box::new(query))
    }
}

/// `AND` / `OR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

impl Logical {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// A boolean SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `left op right`
    Compare {
        left: Field,
        op: CompareOp,
        right: Operand,
    },
    /// `field IS [NOT] NULL`
    Null { field: Field, negated: bool },
    /// `(left) AND|OR (right)`
    Boolean {
        left: Box<Condition>,
        op: Logical,
        right: Box<Condition>,
    },
    /// `field [NOT] IN (…)`
    In {
        field: Field,
        negated: bool,
        set: InSet,
    },
    /// `field BETWEEN lower AND upper`
    Between {
        field: Field,
        lower: Value,
        upper: Value,
    },
    /// `NOT (inner)`
    Not(Box<Condition>),
    /// Verbatim SQL.
    Raw(String),
}

#[allow(clippy::should_implement_trait)]
impl Condition {
    /// Builds a comparison, turning `= NULL` and `<> NULL` into
    /// `IS NULL` and `IS NOT NULL`.
    pub fn compare(left: Field, op: CompareOp, right: Operand) -> Self {
        match (op, &right) {
            (CompareOp::Eq, Operand::Value(Value::Null)) => Self::Null {
                field: left,
                negated: false,
            },
            (CompareOp::Ne, Operand::Value(Value::Null)) => Self::Null {
                field: left,
                negated: true,
            },
            _ => Self::Compare { left, op, right },
        }
    }

    /// Verbatim SQL predicate.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// `(self) AND (other)`
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::Boolean {
            left: Box::new(self),
            op: Logical::And,
            right: Box::new(other),
        }
    }

    /// `(self) OR (other)`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Boolean {
            left: Box::new(self),
            op: Logical::Or,
            right: Box::new(other),
        }
    }

    /// `NOT (self)`; a double negation cancels out.
    #[must_use]
    pub fn not(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Tables referenced by this condition, in first-seen order.
    pub fn tables(&self) -> Vec<Table> {
        let mut out = Vec::new();
        self.collect_tables(&mut out);
        out
    }

    pub(crate) fn collect_tables(&self, out: &mut Vec<Table>) {
        match self {
            Self::Compare { left, right, .. } => {
                push_table(left, out);
                right.collect_tables(out);
            }
            Self::Null { field, .. } | Self::In { field, .. } | Self::Between { field, .. } => {
                push_table(field, out);
            }
            Self::Boolean { left, right, .. } => {
                left.collect_tables(out);
                right.collect_tables(out);
            }
            Self::Not(inner) => inner.collect_tables(out),
            Self::Raw(_) => {}
        }
    }
}

pub(crate) fn push_table(field: &Field, out: &mut Vec<Table>) {
    if let Some(table) = field.table() {
        if !out.contains(table) {
            out.push(table.clone());
        }
    }
}

impl Compilable for Condition {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        match self {
            Self::Compare { left, op, right } => {
                let right = right.write_sql(compiler)?;
                Ok(format!("{left} {} {right}", op.as_sql()))
            }
            Self::Null { field, negated } => Ok(if *negated {
                format!("{field} IS NOT NULL")
            } else {
                format!("{field} IS NULL")
            }),
            Self::Boolean { left, op, right } => {
                let left = left.write_sql(compiler)?;
                let right = right.write_sql(compiler)?;
                Ok(format!("({left}) {} ({right})", op.as_sql()))
            }
            Self::In {
                field,
                negated,
                set,
            } => {
                let keyword = if *negated { "NOT IN" } else { "IN" };
                match set {
                    // x IN () is a syntax error; NOT IN over nothing holds for every row.
                    InSet::List(values) if values.is_empty() => Ok(if *negated {
                        "1 = 1".to_string()
                    } else {
                        format!("{field} IN (NULL)")
                    }),
                    InSet::List(values) => {
                        let placeholders: Vec<String> =
                            values.iter().map(|v| compiler.bind(v.clone())).collect();
                        Ok(format!("{field} {keyword} ({})", placeholders.join(", ")))
                    }
                    InSet::SubQuery(query) => {
                        let sub = compiler.compile_statement(query)?;
                        Ok(format!("{field} {keyword} ({sub})"))
                    }
                }
            }
            Self::Between {
                field,
                lower,
                upper,
            } => {
                let lower = compiler.bind(lower.clone());
                let upper = compiler.bind(upper.clone());
                Ok(format!("{field} BETWEEN {lower} AND {upper}"))
            }
            Self::Not(inner) => Ok(format!("NOT ({})", inner.write_sql(compiler)?)),
            Self::Raw(sql) => Ok(sql.clone()),
        }
    }
}

impl fmt::Display for Condition {
    /// Inline form with literal values, for debugging only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut compiler = Compiler::inline(Dialect::Postgres);
        let sql = self.write_sql(&mut compiler).map_err(|_| fmt::Error)?;
        f.write_str(&sql)
    }
}

impl ops::BitAnd for Condition {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl ops::BitOr for Condition {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl ops::Not for Condition {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::not(self)
    }
}

/// Anything accepted where a predicate is expected: WHERE, AND, ON.
///
/// A bare column is representable so that it can be rejected with a clear
/// error instead of silently producing `WHERE "active"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition(Condition),
    Raw(String),
    Column(Field),
}

impl Predicate {
    /// Validates the predicate into a [`Condition`].
    pub fn into_condition(self) -> SqlResult<Condition> {
        match self {
            Self::Condition(condition) => Ok(condition),
            Self::Raw(sql) if sql.trim().is_empty() => Err(SqlError::Argument(
                "predicate must not be an empty string".to_string(),
            )),
            Self::Raw(sql) => Ok(Condition::Raw(sql)),
            Self::Column(field) => Err(SqlError::BareColumn(format!(
                "invalid use of bare column {field} in predicate, compare it with a value"
            ))),
        }
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl From<&str> for Predicate {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for Predicate {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

impl From<Field> for Predicate {
    fn from(field: Field) -> Self {
        Self::Column(field)
    }
}

impl From<&Field> for Predicate {
    fn from(field: &Field) -> Self {
        Self::Column(field.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
    }

    fn compile(c: &Condition, dialect: Dialect) -> (String, Vec<Value>) {
        let out = c.compile(&mut Compiler::new(dialect)).unwrap();
        (out.sql, out.params)
    }

    #[test]
    fn test_compare_binds_value() {
        let c = users().field("id").eq(1);
        assert_eq!(
            compile(&c, Dialect::Postgres),
            (r#""users"."id" = $1"#.to_string(), vec![Value::Int(1)])
        );
        assert_eq!(compile(&c, Dialect::Sqlite).0, r#""users"."id" = ?"#);
        assert_eq!(compile(&c, Dialect::MySql).0, r#""users"."id" = %s"#);
    }

    #[test]
    fn test_string_value_is_never_inlined() {
        let c = users().field("name").eq("x'); DROP TABLE users; --");
        let (sql, params) = compile(&c, Dialect::Postgres);
        assert_eq!(sql, r#""users"."name" = $1"#);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_null_comparisons_have_no_params() {
        let (sql, params) = compile(&users().field("email").eq(Value::Null), Dialect::Postgres);
        assert_eq!(sql, r#""users"."email" IS NULL"#);
        assert!(params.is_empty());

        let (sql, params) = compile(&users().field("email").ne(None::<String>), Dialect::MySql);
        assert_eq!(sql, r#""users"."email" IS NOT NULL"#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_column_operand_renders_inline() {
        let orders = Table::new("orders");
        let c = users().field("id").eq(orders.field("user_id"));
        let (sql, params) = compile(&c, Dialect::Postgres);
        assert_eq!(sql, r#""users"."id" = "orders"."user_id""#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_boolean_nesting() {
        let u = users();
        let c = (u.field("a").eq(1) & u.field("b").eq(2)) | u.field("c").eq(3);
        let (sql, params) = compile(&c, Dialect::Postgres);
        assert_eq!(
            sql,
            r#"(("users"."a" = $1) AND ("users"."b" = $2)) OR ("users"."c" = $3)"#
        );
        assert_eq!(params, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_in_list_one_placeholder_each_in_order() {
        let c = users().field("id").is_in(vec![10, 20, 30]);
        let (sql, params) = compile(&c, Dialect::Postgres);
        assert_eq!(sql, r#""users"."id" IN ($1, $2, $3)"#);
        assert_eq!(params, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn test_not_in_array() {
        let (sql, _) = compile(&users().field("role").not_in(["admin", "staff"]), Dialect::Sqlite);
        assert_eq!(sql, r#""users"."role" NOT IN (?, ?)"#);
    }

    #[test]
    fn test_empty_in_list() {
        let (sql, params) = compile(&users().field("id").is_in(Vec::<i64>::new()), Dialect::Postgres);
        assert_eq!(sql, r#""users"."id" IN (NULL)"#);
        assert!(params.is_empty());
        let (sql, _) = compile(&users().field("id").not_in(Vec::<i64>::new()), Dialect::Postgres);
        assert_eq!(sql, "1 = 1");
    }

    #[test]
    fn test_between_two_placeholders() {
        let (sql, params) = compile(&users().field("age").between(18, 65), Dialect::Postgres);
        assert_eq!(sql, r#""users"."age" BETWEEN $1 AND $2"#);
        assert_eq!(params, vec![Value::Int(18), Value::Int(65)]);
    }

    #[test]
    fn test_not_and_double_negation() {
        let c = users().field("active").eq(true);
        assert_eq!(!!c.clone(), c);
        let (sql, _) = compile(&!c, Dialect::Postgres);
        assert_eq!(sql, r#"NOT ("users"."active" = $1)"#);
    }

    #[test]
    fn test_like_ilike() {
        let (sql, _) = compile(&users().field("name").ilike("%bob%"), Dialect::Postgres);
        assert_eq!(sql, r#""users"."name" ILIKE $1"#);
    }

    #[test]
    fn test_display_inlines_literals() {
        let c = users().field("name").eq("O'Brien") & users().field("age").gt(30);
        assert_eq!(
            c.to_string(),
            r#"("users"."name" = 'O''Brien') AND ("users"."age" > 30)"#
        );
    }

    #[test]
    fn test_tables_collected_in_order() {
        let orders = Table::new("orders");
        let c = users().field("id").eq(orders.field("user_id")) & orders.field("total").gt(5);
        assert_eq!(c.tables(), vec![users(), orders]);
    }

    #[test]
    fn test_predicate_validation() {
        let bare = Predicate::from(users().field("active"));
        assert!(matches!(bare.into_condition(), Err(SqlError::BareColumn(_))));
        assert!(matches!(
            Predicate::from("   ").into_condition(),
            Err(SqlError::Argument(_))
        ));
        assert_eq!(
            Predicate::from("age > 18").into_condition().unwrap(),
            Condition::raw("age > 18")
        );
    }
}
