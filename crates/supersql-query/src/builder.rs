//! The fluent builder.
//!
//! [`QueryBuilder`] is immutable: every method borrows the builder and returns
//! a new one, so a partially built query can serve as a prototype for several
//! variants.
//!
//! # Examples
//!
//! ```
//! use supersql_query::builder::QueryBuilder;
//! use supersql_query::expressions::Table;
//! use supersql_query::value::Value;
//!
//! let users = Table::new("users");
//! let q = QueryBuilder::sqlite()
//!     .select([users.field("id")])
//!     .where_(users.field("id").eq(1))
//!     .unwrap();
//! let compiled = q.build().unwrap();
//! assert_eq!(compiled.sql, r#"SELECT "users"."id" FROM "users" WHERE "users"."id" = ?"#);
//! assert_eq!(compiled.params, vec![Value::Int(1)]);
//! ```

use supersql_core::{SqlError, SqlResult};

use crate::compiler::{CompiledQuery, Compiler};
use crate::dialect::Dialect;
use crate::expressions::{Expr, InSet, Operand, OrderItem, Predicate, Table, WindowSpec};
use crate::state::{
    Assignment, ConflictAction, Cte, CteBody, Join, JoinKind, OnConflict, QueryState, Source,
    StatementType,
};
use crate::transaction::TransactionBuilder;
use crate::value::Value;

/// Builds SQL statements for one dialect.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: Dialect,
    state: QueryState,
    /// Tables referenced by fields, in first-seen order.
    implied_sources: Vec<Table>,
    /// Whether `state.from_sources` was synthesized from `implied_sources`.
    from_implied: bool,
    alias: Option<String>,
    strict: bool,
    last_clause: Option<&'static str>,
    chaining_error: Option<String>,
}

impl QueryBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: QueryState::default(),
            implied_sources: Vec::new(),
            from_implied: false,
            alias: None,
            strict: false,
            last_clause: None,
            chaining_error: None,
        }
    }

    pub fn postgres() -> Self {
        Self::new(Dialect::Postgres)
    }

    pub fn mysql() -> Self {
        Self::new(Dialect::MySql)
    }

    pub fn sqlite() -> Self {
        Self::new(Dialect::Sqlite)
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The raw state, without a synthesized FROM clause.
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// The state as it will be compiled.
    pub fn into_state(mut self) -> QueryState {
        self.settle();
        self.state
    }

    /// Rejects calling the same clause method twice in a row.
    ///
    /// The error is reported by the next fallible call or by
    /// [`build`](Self::build).
    #[must_use]
    pub fn strict(&self, enabled: bool) -> Self {
        let mut next = self.clone();
        next.strict = enabled;
        next
    }

    /// The alias this builder gets when used as a FROM or JOIN source.
    #[must_use]
    pub fn as_(&self, alias: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.alias = Some(alias.into());
        next
    }

    fn step(&self, clause: &'static str) -> Self {
        let mut next = self.clone();
        if next.strict && next.last_clause == Some(clause) && next.chaining_error.is_none() {
            next.chaining_error = Some(format!(
                "Invalid Query Chaining: repeated {clause} more than once"
            ));
        }
        next.last_clause = Some(clause);
        next
    }

    fn check(&self) -> SqlResult<()> {
        match &self.chaining_error {
            Some(message) => Err(SqlError::Argument(message.clone())),
            None => Ok(()),
        }
    }

    /// Starts a new statement, archiving the current one if it has content.
    fn open(&self, clause: &'static str, statement_type: StatementType) -> Self {
        let mut next = self.step(clause);
        if next.state.is_dirty() {
            next.settle();
            next.state.archive();
            next.implied_sources.clear();
            next.from_implied = false;
        }
        next.state.statement_type = statement_type;
        next
    }

    fn imply(&mut self, tables: Vec<Table>) {
        for table in tables {
            if !self.implied_sources.contains(&table) {
                self.implied_sources.push(table);
            }
        }
    }

    /// Fills in FROM from the tables fields refer to when a SELECT has none.
    ///
    /// With several tables, each unaliased one is aliased by its own name so
    /// that qualified columns keep resolving.
    fn settle(&mut self) {
        if self.state.statement_type != StatementType::Select {
            return;
        }
        if !self.state.from_sources.is_empty() && !self.from_implied {
            return;
        }
        let joined: Vec<&Table> = self
            .state
            .joins
            .iter()
            .filter_map(|j| match &j.source {
                Source::Table(t) => Some(t),
                _ => None,
            })
            .collect();
        let tables: Vec<Table> = self
            .implied_sources
            .iter()
            .filter(|t| !joined.iter().any(|j| j.reference() == t.reference()))
            .cloned()
            .collect();
        if tables.is_empty() {
            return;
        }
        let heterogeneous = tables.len() > 1;
        self.state.from_sources = tables
            .into_iter()
            .map(|t| {
                if heterogeneous && t.alias().is_none() {
                    let alias = t.name().to_string();
                    Source::Table(t.as_(alias))
                } else {
                    Source::Table(t)
                }
            })
            .collect();
        self.from_implied = true;
    }

    // ── SELECT ──────────────────────────────────────────────────────

    fn push_selects<I, E>(&mut self, items: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        for item in items {
            let expr = item.into();
            let mut tables = Vec::new();
            expr.collect_tables(&mut tables);
            self.imply(tables);
            self.state.selects.push(expr);
        }
    }

    /// Opens a SELECT; strings are emitted verbatim, fields imply FROM.
    pub fn select<I, E>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let mut next = self.open("SELECT", StatementType::Select);
        next.push_selects(items);
        next
    }

    /// Opens a `SELECT DISTINCT`.
    pub fn select_distinct<I, E>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let mut next = self.open("SELECT", StatementType::Select);
        next.state.distinct = true;
        next.push_selects(items);
        next
    }

    /// Adds one FROM source.
    pub fn from(&self, source: impl Into<Source>) -> Self {
        let mut next = self.step("FROM");
        if next.from_implied {
            next.state.from_sources.clear();
            next.from_implied = false;
        }
        next.state.from_sources.push(source.into());
        next
    }

    /// Adds several FROM sources at once.
    pub fn from_sources<I, S>(&self, sources: I) -> SqlResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Source>,
    {
        self.check()?;
        let sources: Vec<Source> = sources.into_iter().map(Into::into).collect();
        if sources.is_empty() {
            return Err(SqlError::MissingArgument(format!(
                "FROM requires at least one source ({} implied from selected fields)",
                self.implied_sources.len()
            )));
        }
        let mut next = self.step("FROM");
        if next.from_implied {
            next.state.from_sources.clear();
            next.from_implied = false;
        }
        next.state.from_sources.extend(sources);
        next.check()?;
        Ok(next)
    }

    // ── JOIN ────────────────────────────────────────────────────────

    fn push_join(&self, clause: &'static str, kind: JoinKind, source: impl Into<Source>) -> Self {
        let mut next = self.step(clause);
        next.state.joins.push(Join {
            kind,
            source: source.into(),
            on: None,
        });
        next
    }

    /// `INNER JOIN source`
    pub fn join(&self, source: impl Into<Source>) -> Self {
        self.push_join("JOIN", JoinKind::Inner, source)
    }

    pub fn left_join(&self, source: impl Into<Source>) -> Self {
        self.push_join("LEFT JOIN", JoinKind::Left, source)
    }

    pub fn right_join(&self, source: impl Into<Source>) -> Self {
        self.push_join("RIGHT JOIN", JoinKind::Right, source)
    }

    pub fn full_join(&self, source: impl Into<Source>) -> Self {
        self.push_join("FULL JOIN", JoinKind::Full, source)
    }

    pub fn cross_join(&self, source: impl Into<Source>) -> Self {
        self.push_join("CROSS JOIN", JoinKind::Cross, source)
    }

    /// Sets the ON condition of the last join; a second call ANDs onto it.
    pub fn on(&self, predicate: impl Into<Predicate>) -> SqlResult<Self> {
        self.check()?;
        let condition = predicate.into().into_condition()?;
        let mut next = self.step("ON");
        let join = next
            .state
            .joins
            .last_mut()
            .ok_or_else(|| SqlError::Argument("ON requires a preceding JOIN".to_string()))?;
        if join.kind == JoinKind::Cross {
            return Err(SqlError::Argument(
                "CROSS JOIN does not take an ON condition".to_string(),
            ));
        }
        join.on = Some(match join.on.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        next.check()?;
        Ok(next)
    }

    // ── WHERE ───────────────────────────────────────────────────────

    fn push_where(&self, clause: &'static str, predicate: impl Into<Predicate>) -> SqlResult<Self> {
        self.check()?;
        let condition = predicate.into().into_condition()?;
        let mut next = self.step(clause);
        next.imply(condition.tables());
        next.state.wheres.push(condition);
        next.settle();
        next.check()?;
        Ok(next)
    }

    /// Adds a predicate; several are ANDed together.
    pub fn where_(&self, predicate: impl Into<Predicate>) -> SqlResult<Self> {
        self.push_where("WHERE", predicate)
    }

    /// Same as [`where_`](Self::where_).
    pub fn and(&self, predicate: impl Into<Predicate>) -> SqlResult<Self> {
        self.push_where("AND", predicate)
    }

    // ── GROUP / ORDER / LIMIT ───────────────────────────────────────

    pub fn group_by<I, E>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let mut next = self.step("GROUP BY");
        next.state.groups.extend(items.into_iter().map(Into::into));
        next
    }

    /// Adds sort keys; `"-col"` sorts descending.
    pub fn order_by<I, O>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<OrderItem>,
    {
        let mut next = self.step("ORDER BY");
        next.state.orders.extend(items.into_iter().map(Into::into));
        next
    }

    pub fn limit(&self, limit: u64) -> Self {
        let mut next = self.step("LIMIT");
        next.state.limit = Some(limit);
        next
    }

    pub fn offset(&self, offset: u64) -> Self {
        let mut next = self.step("OFFSET");
        next.state.offset = Some(offset);
        next
    }

    pub fn limit_offset(&self, limit: u64, offset: u64) -> Self {
        let mut next = self.step("LIMIT");
        next.state.limit = Some(limit);
        next.state.offset = Some(offset);
        next
    }

    /// `RETURNING cols`; an empty list means `RETURNING *`.
    pub fn returning<I, C>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let mut next = self.step("RETURNING");
        let mut columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            columns.push("*".to_string());
        }
        next.state.returning = columns;
        next
    }

    /// `RETURNING *`
    pub fn returning_all(&self) -> Self {
        self.returning(["*"])
    }

    // ── WITH / WINDOW ───────────────────────────────────────────────

    /// Adds a common table expression from a sub-builder or raw SQL.
    pub fn with(&self, name: impl Into<String>, body: impl Into<CteBody>) -> Self {
        let mut next = self.step("WITH");
        next.state.ctes.push(Cte {
            name: name.into(),
            body: body.into(),
        });
        next
    }

    /// Declares `WINDOW name AS (spec)` for `over_named(name)`.
    pub fn window(&self, name: impl Into<String>, spec: WindowSpec) -> Self {
        let mut next = self.step("WINDOW");
        next.state.define_window(name.into(), spec);
        next
    }

    // ── INSERT ──────────────────────────────────────────────────────

    /// Opens `INSERT INTO table (columns)`.
    pub fn insert_into<I, C>(&self, table: impl Into<Table>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let mut next = self.open("INSERT", StatementType::Insert);
        next.state.insert_table = Some(table.into());
        next.state.insert_columns = columns.into_iter().map(Into::into).collect();
        next
    }

    /// Opens `INSERT INTO table` without a column list.
    pub fn insert(&self, table: impl Into<Table>) -> Self {
        self.insert_into(table, Vec::<String>::new())
    }

    /// Adds VALUES rows: one flat row, one tuple, or many rows.
    pub fn values(&self, rows: impl Into<InsertRows>) -> SqlResult<Self> {
        self.check()?;
        if self.state.statement_type != StatementType::Insert {
            return Err(SqlError::Argument("VALUES requires INSERT".to_string()));
        }
        let InsertRows(rows) = rows.into();
        if rows.is_empty() || rows.iter().all(Vec::is_empty) {
            return Err(SqlError::MissingArgument(
                "VALUES requires at least one value".to_string(),
            ));
        }
        let width = match self.state.insert_columns.len() {
            0 => rows[0].len(),
            n => n,
        };
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(SqlError::Argument(format!(
                "VALUES row has {} values but {width} columns are expected",
                bad.len()
            )));
        }
        let mut next = self.step("VALUES");
        next.state.insert_values.extend(rows);
        next.check()?;
        Ok(next)
    }

    /// `INSERT … SELECT` from a sub-query.
    pub fn insert_from(&self, query: impl Into<QueryState>) -> SqlResult<Self> {
        self.check()?;
        if self.state.statement_type != StatementType::Insert {
            return Err(SqlError::Argument("INSERT … SELECT requires INSERT".to_string()));
        }
        let mut next = self.step("VALUES");
        next.state.insert_query = Some(Box::new(query.into()));
        next.check()?;
        Ok(next)
    }

    /// Starts an `ON CONFLICT (targets)` clause for the current INSERT.
    pub fn on_conflict<I, C>(&self, targets: I) -> SqlResult<OnConflictBuilder>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.check()?;
        if self.state.statement_type != StatementType::Insert {
            return Err(SqlError::Argument("ON CONFLICT requires INSERT".to_string()));
        }
        Ok(OnConflictBuilder {
            builder: self.step("ON CONFLICT"),
            targets: targets.into_iter().map(Into::into).collect(),
        })
    }

    // ── UPDATE / DELETE ─────────────────────────────────────────────

    /// Opens `UPDATE table`.
    pub fn update(&self, table: impl Into<Table>) -> Self {
        let mut next = self.open("UPDATE", StatementType::Update);
        next.state.update_table = Some(table.into());
        next
    }

    /// Adds SET assignments to the current UPDATE.
    pub fn set<I, A>(&self, assignments: I) -> SqlResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<Assignment>,
    {
        self.check()?;
        if self.state.statement_type != StatementType::Update {
            return Err(SqlError::Argument("SET requires UPDATE".to_string()));
        }
        let assignments: Vec<Assignment> = assignments.into_iter().map(Into::into).collect();
        if assignments.is_empty() {
            return Err(SqlError::MissingArgument(
                "SET requires at least one assignment".to_string(),
            ));
        }
        let mut next = self.step("SET");
        next.state.updates.extend(assignments);
        next.check()?;
        Ok(next)
    }

    /// Opens `DELETE FROM source`.
    pub fn delete_from(&self, source: impl Into<Source>) -> Self {
        let mut next = self.open("DELETE", StatementType::Delete);
        next.state.delete_table = Some(source.into());
        next
    }

    /// Opens a DELETE whose target comes from a later [`from`](Self::from).
    pub fn delete(&self) -> Self {
        self.open("DELETE", StatementType::Delete)
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Starts a transaction in this builder's dialect.
    pub fn begin(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.dialect)
    }

    // ── Unsupported ─────────────────────────────────────────────────

    pub fn union(&self, _other: &Self) -> SqlResult<Self> {
        Err(SqlError::not_implemented("UNION", "with() and raw SQL"))
    }

    pub fn upsert(&self) -> SqlResult<Self> {
        Err(SqlError::not_implemented("UPSERT", "on_conflict()"))
    }

    pub fn without(&self) -> SqlResult<Self> {
        Err(SqlError::not_implemented("WITHOUT", "a narrower select()"))
    }

    // ── Output ──────────────────────────────────────────────────────

    /// Compiles the statement chain into SQL and bound parameters.
    pub fn build(&self) -> SqlResult<CompiledQuery> {
        self.check()?;
        let state = self.clone().into_state();
        let compiled = Compiler::new(self.dialect).compile(&state)?;
        tracing::debug!(
            dialect = %self.dialect,
            sql = %compiled.sql,
            params = compiled.params.len(),
            "built query"
        );
        Ok(compiled)
    }

    /// The SQL text alone.
    pub fn to_sql(&self) -> SqlResult<String> {
        self.build().map(|compiled| compiled.sql)
    }

    /// Renders the statement with literal values in place of placeholders.
    ///
    /// For logs and debugging only.
    pub fn print(&self) -> SqlResult<String> {
        self.check()?;
        let state = self.clone().into_state();
        Compiler::inline(self.dialect)
            .compile(&state)
            .map(|compiled| compiled.sql)
    }
}

/// Completes an `ON CONFLICT` clause started by
/// [`QueryBuilder::on_conflict`].
#[derive(Debug, Clone)]
#[must_use]
pub struct OnConflictBuilder {
    builder: QueryBuilder,
    targets: Vec<String>,
}

impl OnConflictBuilder {
    /// `ON CONFLICT (…) DO NOTHING`
    pub fn do_nothing(self) -> QueryBuilder {
        self.finish(ConflictAction::Nothing)
    }

    /// `ON CONFLICT (…) DO UPDATE SET …`
    ///
    /// Use `"EXCLUDED.col"` to refer to the proposed row.
    pub fn do_update<I, C, V>(self, assignments: I) -> QueryBuilder
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        let assignments = assignments
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .collect();
        self.finish(ConflictAction::Update(assignments))
    }

    fn finish(self, action: ConflictAction) -> QueryBuilder {
        let mut builder = self.builder;
        builder.state.on_conflict = Some(OnConflict {
            targets: self.targets,
            action,
        });
        builder
    }
}

/// Rows for [`QueryBuilder::values`].
///
/// A `Vec<Value>` is one row unless its first element is a
/// [`Value::List`], in which case every element is a row. Tuples are single
/// rows; vectors and arrays of tuples are many rows.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRows(pub Vec<Vec<Value>>);

impl From<Vec<Value>> for InsertRows {
    fn from(values: Vec<Value>) -> Self {
        if matches!(values.first(), Some(Value::List(_))) {
            Self(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::List(row) => row,
                        other => vec![other],
                    })
                    .collect(),
            )
        } else {
            Self(vec![values])
        }
    }
}

impl From<Vec<Vec<Value>>> for InsertRows {
    fn from(rows: Vec<Vec<Value>>) -> Self {
        Self(rows)
    }
}

macro_rules! impl_insert_rows_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> From<($($name,)+)> for InsertRows {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Self(vec![vec![$($name.into()),+]])
            }
        }

        impl<$($name: Into<Value>),+> From<Vec<($($name,)+)>> for InsertRows {
            #[allow(non_snake_case)]
            fn from(rows: Vec<($($name,)+)>) -> Self {
                Self(rows.into_iter().map(|($($name,)+)| vec![$($name.into()),+]).collect())
            }
        }

        impl<$($name: Into<Value>),+, const N: usize> From<[($($name,)+); N]> for InsertRows {
            fn from(rows: [($($name,)+); N]) -> Self {
                Self::from(Vec::from(rows))
            }
        }
    };
}

impl_insert_rows_for_tuple!(A);
impl_insert_rows_for_tuple!(A, B);
impl_insert_rows_for_tuple!(A, B, C);
impl_insert_rows_for_tuple!(A, B, C, D);
impl_insert_rows_for_tuple!(A, B, C, D, E);
impl_insert_rows_for_tuple!(A, B, C, D, E, F);
impl_insert_rows_for_tuple!(A, B, C, D, E, F, G);
impl_insert_rows_for_tuple!(A, B, C, D, E, F, G, H);

// ── Sub-query conversions ───────────────────────────────────────────

impl From<QueryBuilder> for QueryState {
    fn from(builder: QueryBuilder) -> Self {
        builder.into_state()
    }
}

impl From<&QueryBuilder> for QueryState {
    fn from(builder: &QueryBuilder) -> Self {
        builder.clone().into_state()
    }
}

impl From<QueryBuilder> for Source {
    fn from(builder: QueryBuilder) -> Self {
        let alias = builder.alias.clone();
        Self::SubQuery {
            query: Box::new(builder.into_state()),
            alias,
        }
    }
}

impl From<QueryBuilder> for CteBody {
    fn from(builder: QueryBuilder) -> Self {
        Self::Query(Box::new(builder.into_state()))
    }
}

impl From<QueryBuilder> for InSet {
    fn from(builder: QueryBuilder) -> Self {
        Self::SubQuery(Box::new(builder.into_state()))
    }
}

impl From<QueryBuilder> for Expr {
    fn from(builder: QueryBuilder) -> Self {
        Self::SubQuery(Box::new(builder.into_state()))
    }
}

impl From<QueryBuilder> for Operand {
    fn from(builder: QueryBuilder) -> Self {
        Self::Expr(Expr::from(builder))
    }
}
