//! The accumulated clauses of a statement.
//!
//! A [`QueryState`] is plain data. The builder fills it in and the
//! [`Compiler`](crate::compiler::Compiler) turns it into SQL. Earlier
//! statements of a multi-statement script are kept in [`QueryState::chain`].

use once_cell::sync::Lazy;
use regex::Regex;
use supersql_core::SqlResult;

use crate::compiler::{Compilable, Compiler};
use crate::expressions::{Condition, Expr, Operand, OrderItem, Table, WindowSpec};
use crate::value::Value;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// The kind of statement a state compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Begin,
    Commit,
    Rollback,
}

impl StatementType {
    /// Whether running the statement yields rows without a RETURNING clause.
    pub const fn returns_rows(self) -> bool {
        matches!(self, Self::Select)
    }
}

/// A FROM or JOIN source.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(Table),
    SubQuery {
        query: Box<QueryState>,
        alias: Option<String>,
    },
    /// Verbatim SQL such as `generate_series(1, 10) AS n`.
    Raw(String),
}

impl From<Table> for Source {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl From<&Table> for Source {
    fn from(table: &Table) -> Self {
        Self::Table(table.clone())
    }
}

impl From<&str> for Source {
    /// Plain identifiers (optionally schema-qualified) become tables, anything
    /// else is kept verbatim.
    fn from(source: &str) -> Self {
        if IDENTIFIER.is_match(source) {
            Self::Table(Table::from(source))
        } else {
            Self::Raw(source.to_string())
        }
    }
}

impl From<String> for Source {
    fn from(source: String) -> Self {
        Self::from(source.as_str())
    }
}

impl From<QueryState> for Source {
    fn from(query: QueryState) -> Self {
        Self::SubQuery {
            query: Box::new(query),
            alias: None,
        }
    }
}

impl Compilable for Source {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        match self {
            Self::Table(table) => Ok(table.to_string()),
            Self::Raw(sql) => Ok(sql.clone()),
            Self::SubQuery { query, alias } => {
                let sub = compiler.compile_statement(query)?;
                Ok(match alias {
                    Some(alias) => format!("({sub}) AS {}", crate::dialect::quote_ident(alias)),
                    None => format!("({sub})"),
                })
            }
        }
    }
}

/// The flavour of a JOIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: Source,
    pub on: Option<Condition>,
}

impl Compilable for Join {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        let mut sql = format!("{} {}", self.kind.sql_keyword(), self.source.write_sql(compiler)?);
        if let Some(on) = &self.on {
            sql.push_str(" ON ");
            sql.push_str(&on.write_sql(compiler)?);
        }
        Ok(sql)
    }
}

/// The body of a common table expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CteBody {
    Query(Box<QueryState>),
    Raw(String),
}

impl From<QueryState> for CteBody {
    fn from(query: QueryState) -> Self {
        Self::Query(Box::new(query))
    }
}

impl From<&str> for CteBody {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for CteBody {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

/// `name AS (body)` inside a WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub body: CteBody,
}

impl Compilable for Cte {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        let body = match &self.body {
            CteBody::Query(query) => compiler.compile_statement(query)?,
            CteBody::Raw(sql) => sql.clone(),
        };
        Ok(format!("{} AS ({body})", self.name))
    }
}

/// One `SET` item of an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `"column" = value`
    Set { column: String, value: Operand },
    /// Verbatim, e.g. `visits = visits + 1`.
    Raw(String),
}

impl Assignment {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }
}

impl<C: Into<String>, V: Into<Operand>> From<(C, V)> for Assignment {
    fn from((column, value): (C, V)) -> Self {
        Self::Set {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl Compilable for Assignment {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        match self {
            Self::Set { column, value } => Ok(format!(
                "{} = {}",
                crate::dialect::quote_ident(column),
                value.write_sql(compiler)?
            )),
            Self::Raw(sql) => Ok(sql.clone()),
        }
    }
}

/// What to do when an INSERT hits a uniqueness conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    Nothing,
    /// Column/value pairs; a string starting with `EXCLUDED.` is kept
    /// verbatim, other values are rendered as literals.
    Update(Vec<(String, Value)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub targets: Vec<String>,
    pub action: ConflictAction,
}

impl Compilable for OnConflict {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        let mut sql = String::from("ON CONFLICT");
        if !self.targets.is_empty() {
            sql.push_str(&format!(" ({})", self.targets.join(", ")));
        }
        match &self.action {
            ConflictAction::Nothing => sql.push_str(" DO NOTHING"),
            ConflictAction::Update(assignments) => {
                let dialect = compiler.dialect();
                let items: Vec<String> = assignments
                    .iter()
                    .map(|(column, value)| {
                        let rendered = match value {
                            Value::String(s) if s.starts_with("EXCLUDED.") => s.clone(),
                            other => other.to_sql_literal(dialect),
                        };
                        format!("{} = {rendered}", crate::dialect::quote_ident(column))
                    })
                    .collect();
                sql.push_str(&format!(" DO UPDATE SET {}", items.join(", ")));
            }
        }
        Ok(sql)
    }
}

/// Everything needed to compile one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    pub statement_type: StatementType,
    pub selects: Vec<Expr>,
    pub distinct: bool,
    pub from_sources: Vec<Source>,
    pub joins: Vec<Join>,
    pub wheres: Vec<Condition>,
    pub groups: Vec<Expr>,
    pub orders: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub returning: Vec<String>,
    pub ctes: Vec<Cte>,
    pub insert_table: Option<Table>,
    pub insert_columns: Vec<String>,
    pub insert_values: Vec<Vec<Value>>,
    /// INSERT … SELECT source.
    pub insert_query: Option<Box<QueryState>>,
    pub update_table: Option<Table>,
    pub updates: Vec<Assignment>,
    pub delete_table: Option<Source>,
    /// Named windows in declaration order; names are unique.
    pub window_definitions: Vec<(String, WindowSpec)>,
    pub on_conflict: Option<OnConflict>,
    /// Statements preceding this one in a multi-statement script.
    pub chain: Vec<QueryState>,
}

impl QueryState {
    pub fn new(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            ..Self::default()
        }
    }

    /// Whether this state already describes a statement, so that opening a
    /// new one must archive it first.
    pub fn is_dirty(&self) -> bool {
        self.statement_type != StatementType::Select
            || !self.selects.is_empty()
            || !self.from_sources.is_empty()
    }

    /// Whether executing this statement produces rows.
    pub fn returns_rows(&self) -> bool {
        self.statement_type.returns_rows() || !self.returning.is_empty()
    }

    /// Declares or replaces the named window `name`.
    pub fn define_window(&mut self, name: String, spec: WindowSpec) {
        match self.window_definitions.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = spec,
            None => self.window_definitions.push((name, spec)),
        }
    }

    /// Moves this state into its own chain and leaves a fresh state behind.
    pub(crate) fn archive(&mut self) {
        let mut previous = std::mem::take(self);
        let mut chain = std::mem::take(&mut previous.chain);
        chain.push(previous);
        self.chain = chain;
    }

    /// This state's chain followed by the state itself.
    pub fn into_statements(mut self) -> Vec<QueryState> {
        let mut statements = std::mem::take(&mut self.chain);
        statements.push(self);
        statements
    }

    /// Field references that should be resolved against a FROM clause.
    pub fn referenced_tables(&self) -> Vec<Table> {
        let mut out = Vec::new();
        for expr in &self.selects {
            expr.collect_tables(&mut out);
        }
        for condition in &self.wheres {
            condition.collect_tables(&mut out);
        }
        out
    }
}

impl Compilable for QueryState {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        compiler.compile_statement(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_source_from_str() {
        assert_eq!(Source::from("users"), Source::Table(Table::new("users")));
        assert_eq!(
            Source::from("app.users"),
            Source::Table(Table::new("users").in_schema("app"))
        );
        assert_eq!(
            Source::from("generate_series(1, 3) AS n"),
            Source::Raw("generate_series(1, 3) AS n".to_string())
        );
    }

    #[test]
    fn test_is_dirty() {
        assert!(!QueryState::default().is_dirty());
        assert!(QueryState::new(StatementType::Delete).is_dirty());
        let mut s = QueryState::default();
        s.from_sources.push(Source::from("users"));
        assert!(s.is_dirty());
    }

    #[test]
    fn test_archive_flattens_chain() {
        let mut s = QueryState::new(StatementType::Begin);
        s.archive();
        s.statement_type = StatementType::Delete;
        s.archive();
        assert_eq!(s.chain.len(), 2);
        assert!(s.chain.iter().all(|c| c.chain.is_empty()));
        assert_eq!(s.chain[0].statement_type, StatementType::Begin);
        assert!(!s.is_dirty());
    }

    #[test]
    fn test_referenced_tables_from_selects_then_wheres() {
        let users = Table::new("users");
        let orders = Table::new("orders");
        let mut s = QueryState::default();
        s.selects.push(users.field("name").into());
        s.wheres.push(orders.field("total").gt(10));
        s.wheres.push(users.field("id").eq(orders.field("user_id")));
        assert_eq!(s.referenced_tables(), vec![users, orders]);
    }

    #[test]
    fn test_define_window_replaces_by_name() {
        let mut s = QueryState::default();
        s.define_window("w".into(), WindowSpec::new().order_by(["a"]));
        s.define_window("v".into(), WindowSpec::new());
        s.define_window("w".into(), WindowSpec::new().order_by(["b"]));
        let names: Vec<&str> = s.window_definitions.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["w", "v"]);
        assert_eq!(s.window_definitions[0].1, WindowSpec::new().order_by(["b"]));
    }

    #[test]
    fn test_on_conflict_rendering() {
        let conflict = OnConflict {
            targets: vec!["id".into()],
            action: ConflictAction::Update(vec![
                ("name".into(), Value::from("EXCLUDED.name")),
                ("note".into(), Value::from("it's")),
                ("hits".into(), Value::Int(0)),
            ]),
        };
        let out = conflict.compile(&mut Compiler::new(Dialect::Postgres)).unwrap();
        assert_eq!(
            out.sql,
            r#"ON CONFLICT (id) DO UPDATE SET "name" = EXCLUDED.name, "note" = 'it''s', "hits" = 0"#
        );
        assert!(out.params.is_empty());
    }

    #[test]
    fn test_returns_rows() {
        let mut s = QueryState::new(StatementType::Insert);
        assert!(!s.returns_rows());
        s.returning.push("id".into());
        assert!(s.returns_rows());
        assert!(QueryState::default().returns_rows());
    }
}
