//! Window functions.
//!
//! A [`WindowFunction`] is an aggregate or ranking call with an optional
//! `FILTER (WHERE …)` and an `OVER` clause, which is either a named window
//! declared with [`QueryBuilder::window`](crate::builder::QueryBuilder::window)
//! or an inline [`WindowSpec`].
//!
//! # Examples
//!
//! ```
//! use supersql_query::expressions::window::{partition_by, row_number};
//!
//! // ROW_NUMBER() OVER (PARTITION BY department ORDER BY salary DESC) AS rn
//! let rn = row_number()
//!     .over(partition_by(["department"]).order_by(["-salary"]))
//!     .as_("rn");
//! ```

use supersql_core::SqlResult;

use crate::compiler::{Compilable, Compiler};
use crate::value::Value;

use super::condition::Condition;
use super::expr::{Expr, OrderItem};
use super::field::Table;

/// The body of an `OVER (…)` clause or a `WINDOW name AS (…)` definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    partition_by: Vec<Expr>,
    order_by: Vec<OrderItem>,
    frame: Option<String>,
}

/// Starts a [`WindowSpec`] partitioned by `items`.
pub fn partition_by<I, E>(items: I) -> WindowSpec
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    WindowSpec::new().partition_by(items)
}

impl WindowSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn collect_tables(&self, out: &mut Vec<Table>) {
        for expr in &self.partition_by {
            expr.collect_tables(out);
        }
        for item in &self.order_by {
            item.expr().collect_tables(out);
        }
    }

    #[must_use]
    pub fn partition_by<I, E>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.partition_by.extend(items.into_iter().map(Into::into));
        self
    }

    /// Adds sort keys; `"-col"` sorts descending.
    #[must_use]
    pub fn order_by<I, O>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<OrderItem>,
    {
        self.order_by.extend(items.into_iter().map(Into::into));
        self
    }

    /// `ROWS BETWEEN start AND end`
    #[must_use]
    pub fn rows_between(mut self, start: &str, end: &str) -> Self {
        self.frame = Some(format!("ROWS BETWEEN {start} AND {end}"));
        self
    }

    /// `RANGE BETWEEN start AND end`
    #[must_use]
    pub fn range_between(mut self, start: &str, end: &str) -> Self {
        self.frame = Some(format!("RANGE BETWEEN {start} AND {end}"));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.partition_by.is_empty() && self.order_by.is_empty() && self.frame.is_none()
    }
}

impl Compilable for WindowSpec {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        let mut parts = Vec::new();
        if !self.partition_by.is_empty() {
            let items = self
                .partition_by
                .iter()
                .map(|e| e.write_sql(compiler))
                .collect::<SqlResult<Vec<_>>>()?;
            parts.push(format!("PARTITION BY {}", items.join(", ")));
        }
        if !self.order_by.is_empty() {
            let items = self
                .order_by
                .iter()
                .map(|o| o.write_sql(compiler))
                .collect::<SqlResult<Vec<_>>>()?;
            parts.push(format!("ORDER BY {}", items.join(", ")));
        }
        if let Some(frame) = &self.frame {
            parts.push(frame.clone());
        }
        Ok(parts.join(" "))
    }
}

/// The window a function runs over.
#[derive(Debug, Clone, PartialEq)]
pub enum Over {
    /// `OVER name`, referring to a `WINDOW name AS (…)` definition.
    Named(String),
    /// `OVER (spec)`
    Spec(WindowSpec),
}

/// A window or aggregate function call.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunction {
    name: String,
    args: Vec<Expr>,
    distinct: bool,
    filter: Option<Condition>,
    over: Option<Over>,
    alias: Option<String>,
}

impl WindowFunction {
    pub fn new<I, E>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            distinct: false,
            filter: None,
            over: None,
            alias: None,
        }
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// `FILTER (WHERE condition)`; a second call ANDs onto the first.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn over(mut self, spec: WindowSpec) -> Self {
        self.over = Some(Over::Spec(spec));
        self
    }

    #[must_use]
    pub fn over_named(mut self, name: impl Into<String>) -> Self {
        self.over = Some(Over::Named(name.into()));
        self
    }

    /// `OVER ()`, the whole result set as one partition.
    #[must_use]
    pub fn over_all(self) -> Self {
        self.over(WindowSpec::new())
    }

    #[must_use]
    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn collect_tables(&self, out: &mut Vec<Table>) {
        for arg in &self.args {
            arg.collect_tables(out);
        }
        if let Some(filter) = &self.filter {
            filter.collect_tables(out);
        }
        if let Some(Over::Spec(spec)) = &self.over {
            spec.collect_tables(out);
        }
    }
}

impl Compilable for WindowFunction {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        let args = self
            .args
            .iter()
            .map(|a| a.write_sql(compiler))
            .collect::<SqlResult<Vec<_>>>()?;
        let mut sql = format!(
            "{}({}{})",
            self.name,
            if self.distinct { "DISTINCT " } else { "" },
            args.join(", ")
        );
        if let Some(filter) = &self.filter {
            sql.push_str(&format!(" FILTER (WHERE {})", filter.write_sql(compiler)?));
        }
        match &self.over {
            Some(Over::Named(name)) => sql.push_str(&format!(" OVER {name}")),
            Some(Over::Spec(spec)) => sql.push_str(&format!(" OVER ({})", spec.write_sql(compiler)?)),
            None => {}
        }
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" AS {alias}"));
        }
        Ok(sql)
    }
}

fn int(n: i64) -> Expr {
    Expr::Raw(n.to_string())
}

pub fn row_number() -> WindowFunction {
    WindowFunction::new("ROW_NUMBER", Vec::<Expr>::new())
}

pub fn rank() -> WindowFunction {
    WindowFunction::new("RANK", Vec::<Expr>::new())
}

pub fn dense_rank() -> WindowFunction {
    WindowFunction::new("DENSE_RANK", Vec::<Expr>::new())
}

pub fn percent_rank() -> WindowFunction {
    WindowFunction::new("PERCENT_RANK", Vec::<Expr>::new())
}

pub fn cume_dist() -> WindowFunction {
    WindowFunction::new("CUME_DIST", Vec::<Expr>::new())
}

/// `NTILE(buckets)`
pub fn ntile(buckets: i64) -> WindowFunction {
    WindowFunction::new("NTILE", [int(buckets)])
}

fn offset_fn(name: &str, column: Expr, offset: i64, default: Value) -> WindowFunction {
    let mut args = vec![column, int(offset)];
    if !default.is_null() {
        args.push(Expr::Value(default));
    }
    WindowFunction::new(name, args)
}

/// `LAG(column, offset[, default])`; a NULL default is left out.
pub fn lag(column: impl Into<Expr>, offset: i64, default: impl Into<Value>) -> WindowFunction {
    offset_fn("LAG", column.into(), offset, default.into())
}

/// `LEAD(column, offset[, default])`; a NULL default is left out.
pub fn lead(column: impl Into<Expr>, offset: i64, default: impl Into<Value>) -> WindowFunction {
    offset_fn("LEAD", column.into(), offset, default.into())
}

pub fn first_value(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("FIRST_VALUE", [column.into()])
}

pub fn last_value(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("LAST_VALUE", [column.into()])
}

/// `NTH_VALUE(column, n)`
pub fn nth_value(column: impl Into<Expr>, n: i64) -> WindowFunction {
    WindowFunction::new("NTH_VALUE", [column.into(), int(n)])
}

pub fn sum(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("SUM", [column.into()])
}

pub fn avg(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("AVG", [column.into()])
}

pub fn count(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("COUNT", [column.into()])
}

pub fn min(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("MIN", [column.into()])
}

pub fn max(column: impl Into<Expr>) -> WindowFunction {
    WindowFunction::new("MAX", [column.into()])
}
