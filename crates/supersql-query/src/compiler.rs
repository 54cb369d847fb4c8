//! The dialect compiler.
//!
//! A [`Compiler`] turns a [`QueryState`] into SQL text plus the ordered list of
//! bound parameters. Placeholder styles differ per backend:
//! - `PostgreSQL`: `$1, $2, $3, ...`, numbered across the whole script
//! - `MySQL`: `%s`
//! - `SQLite`: `?`
//!
//! Use one compiler per compilation; [`Compiler::compile`] resets it anyway.

use supersql_core::{SqlError, SqlResult};

use crate::dialect::Dialect;
use crate::state::{QueryState, StatementType};
use crate::value::Value;

/// SQL text and the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A node that can render itself through a [`Compiler`].
pub trait Compilable {
    /// Renders the node, pushing any bound values into `compiler`.
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String>;

    /// Renders the node and returns its SQL with only the values it bound.
    ///
    /// The placeholder counter is shared, so compiling two nodes with the
    /// same compiler numbers the second one after the first.
    fn compile(&self, compiler: &mut Compiler) -> SqlResult<CompiledQuery> {
        let mark = compiler.params.len();
        let sql = self.write_sql(compiler)?;
        let params = compiler.params.split_off(mark);
        Ok(CompiledQuery { sql, params })
    }
}

/// Renders states and expression nodes for one dialect.
#[derive(Debug)]
pub struct Compiler {
    dialect: Dialect,
    placeholders: usize,
    params: Vec<Value>,
    inline: bool,
}

impl Compiler {
    /// A compiler that binds every value as a parameter.
    pub const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            placeholders: 0,
            params: Vec::new(),
            inline: false,
        }
    }

    /// A compiler that renders values as literals.
    ///
    /// The output is for logs and debugging; never execute it with untrusted
    /// input.
    pub const fn inline(dialect: Dialect) -> Self {
        Self {
            dialect,
            placeholders: 0,
            params: Vec::new(),
            inline: true,
        }
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub const fn is_inline(&self) -> bool {
        self.inline
    }

    /// Returns the next placeholder, advancing the counter.
    pub fn next_placeholder(&mut self) -> String {
        self.placeholders += 1;
        self.dialect.placeholder(self.placeholders)
    }

    /// Binds `value` and returns the SQL that stands in for it.
    pub fn bind(&mut self, value: Value) -> String {
        if self.inline {
            return value.to_sql_literal(self.dialect);
        }
        let placeholder = self.next_placeholder();
        self.params.push(value);
        placeholder
    }

    /// Compiles `state` and every statement chained before it.
    ///
    /// Statements are joined with `"; "` and share one placeholder counter.
    pub fn compile(&mut self, state: &QueryState) -> SqlResult<CompiledQuery> {
        self.placeholders = 0;
        self.params.clear();

        let mut statements = Vec::with_capacity(state.chain.len() + 1);
        for previous in &state.chain {
            statements.push(self.compile_statement(previous)?);
        }
        statements.push(self.compile_statement(state)?);

        let sql = statements.join("; ");
        tracing::trace!(dialect = %self.dialect, sql = %sql, params = self.params.len(), "compiled query");
        Ok(CompiledQuery {
            sql,
            params: std::mem::take(&mut self.params),
        })
    }

    /// Compiles a single statement, ignoring its chain.
    pub fn compile_statement(&mut self, state: &QueryState) -> SqlResult<String> {
        match state.statement_type {
            StatementType::Begin => Ok("BEGIN".to_string()),
            StatementType::Commit => Ok("COMMIT;".to_string()),
            StatementType::Rollback => Ok("ROLLBACK;".to_string()),
            StatementType::Select => self.compile_select(state),
            StatementType::Insert => self.compile_insert(state),
            StatementType::Update => self.compile_update(state),
            StatementType::Delete => self.compile_delete(state),
        }
    }

    fn compile_with(&mut self, state: &QueryState) -> SqlResult<String> {
        if state.ctes.is_empty() {
            return Ok(String::new());
        }
        let ctes = join(self, &state.ctes, ", ")?;
        Ok(format!("WITH {ctes}\n"))
    }

    /// Compiles a SELECT statement.
    fn compile_select(&mut self, state: &QueryState) -> SqlResult<String> {
        let mut sql = self.compile_with(state)?;
        sql.push_str("SELECT ");

        if state.distinct {
            sql.push_str("DISTINCT ");
        }

        // SELECT columns
        if state.selects.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&join(self, &state.selects, ", ")?);
        }

        // FROM
        if !state.from_sources.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&join(self, &state.from_sources, ", ")?);
        }

        // JOINs
        for join_clause in &state.joins {
            sql.push(' ');
            sql.push_str(&join_clause.write_sql(self)?);
        }

        self.push_where(&mut sql, state)?;

        // GROUP BY
        if !state.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&join(self, &state.groups, ", ")?);
        }

        // WINDOW
        if !state.window_definitions.is_empty() {
            let mut windows = Vec::with_capacity(state.window_definitions.len());
            for (name, spec) in &state.window_definitions {
                windows.push(format!("{name} AS ({})", spec.write_sql(self)?));
            }
            sql.push_str(" WINDOW ");
            sql.push_str(&windows.join(", "));
        }

        // ORDER BY
        if !state.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&join(self, &state.orders, ", ")?);
        }

        if let Some(limit) = state.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = state.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        push_returning(&mut sql, state);
        Ok(sql)
    }

    /// Compiles an INSERT statement.
    fn compile_insert(&mut self, state: &QueryState) -> SqlResult<String> {
        let table = state
            .insert_table
            .as_ref()
            .ok_or_else(|| SqlError::Compile("INSERT requires a target table".to_string()))?;

        let mut sql = self.compile_with(state)?;
        sql.push_str(&format!("INSERT INTO {}", table.qualified_name()));

        if !state.insert_columns.is_empty() {
            let columns: Vec<String> = state
                .insert_columns
                .iter()
                .map(|c| crate::dialect::quote_ident(c))
                .collect();
            sql.push_str(&format!(" ({})", columns.join(", ")));
        }

        if let Some(query) = &state.insert_query {
            sql.push(' ');
            sql.push_str(&self.compile_statement(query)?);
        } else if state.insert_values.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            let mut rows = Vec::with_capacity(state.insert_values.len());
            for row in &state.insert_values {
                let placeholders: Vec<String> = row.iter().map(|v| self.bind(v.clone())).collect();
                rows.push(format!("({})", placeholders.join(", ")));
            }
            sql.push_str(" VALUES ");
            sql.push_str(&rows.join(", "));
        }

        if let Some(conflict) = &state.on_conflict {
            sql.push(' ');
            sql.push_str(&conflict.write_sql(self)?);
        }

        push_returning(&mut sql, state);
        Ok(sql)
    }

    /// Compiles an UPDATE statement.
    fn compile_update(&mut self, state: &QueryState) -> SqlResult<String> {
        let table = state
            .update_table
            .as_ref()
            .ok_or_else(|| SqlError::Compile("UPDATE requires a target table".to_string()))?;
        if state.updates.is_empty() {
            return Err(SqlError::Compile(format!(
                "UPDATE {table} has no SET assignments"
            )));
        }

        let mut sql = self.compile_with(state)?;
        sql.push_str(&format!("UPDATE {table} SET "));
        sql.push_str(&join(self, &state.updates, ", ")?);

        self.push_where(&mut sql, state)?;
        push_returning(&mut sql, state);
        Ok(sql)
    }

    /// Compiles a DELETE statement.
    fn compile_delete(&mut self, state: &QueryState) -> SqlResult<String> {
        let target = state
            .from_sources
            .first()
            .or(state.delete_table.as_ref())
            .ok_or_else(|| SqlError::Compile("DELETE requires a target table".to_string()))?;

        let mut sql = self.compile_with(state)?;
        sql.push_str("DELETE FROM ");
        sql.push_str(&target.write_sql(self)?);

        self.push_where(&mut sql, state)?;
        push_returning(&mut sql, state);
        Ok(sql)
    }

    fn push_where(&mut self, sql: &mut String, state: &QueryState) -> SqlResult<()> {
        if !state.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&join(self, &state.wheres, " AND ")?);
        }
        Ok(())
    }
}

fn push_returning(sql: &mut String, state: &QueryState) {
    if !state.returning.is_empty() {
        sql.push_str(" RETURNING ");
        sql.push_str(&state.returning.join(", "));
    }
}

fn join<T: Compilable>(compiler: &mut Compiler, items: &[T], separator: &str) -> SqlResult<String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(item.write_sql(compiler)?);
    }
    Ok(parts.join(separator))
}
