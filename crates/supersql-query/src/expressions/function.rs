//! SQL function calls.
//!
//! String arguments are inlined as quoted literals while every other plain
//! value becomes a placeholder. Some backends cannot infer the type of a lone
//! parameter passed to a polymorphic function (`lower($1)`), so strings are
//! spelled out.

use supersql_core::SqlResult;

use crate::compiler::{Compilable, Compiler};
use crate::dialect::Dialect;
use crate::value::Value;

use super::condition::Operand;
use super::field::Table;

/// What a [`Function`] calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionName {
    /// A function spelled the same on every backend.
    Named(String),
    /// `json_build_object` on Postgres, `json_object` elsewhere.
    JsonObject,
}

impl FunctionName {
    fn sql_name(&self, dialect: Dialect) -> &str {
        match (self, dialect) {
            (Self::Named(name), _) => name,
            (Self::JsonObject, Dialect::Postgres) => "json_build_object",
            (Self::JsonObject, _) => "json_object",
        }
    }
}

/// A function call such as `COALESCE("users"."nick", 'anon')`.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: FunctionName,
    args: Vec<Operand>,
    alias: Option<String>,
}

impl Function {
    pub fn new<I, A>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Operand>,
    {
        Self {
            name: FunctionName::Named(name.into()),
            args: args.into_iter().map(Into::into).collect(),
            alias: None,
        }
    }

    /// A JSON object built from key/value pairs.
    pub fn json_object<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        let args = pairs
            .into_iter()
            .flat_map(|(k, v)| [Operand::Value(Value::String(k.into())), v.into()])
            .collect();
        Self {
            name: FunctionName::JsonObject,
            args,
            alias: None,
        }
    }

    /// `fn(...) AS alias`
    #[must_use]
    pub fn as_(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &FunctionName {
        &self.name
    }

    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    pub(crate) fn collect_tables(&self, out: &mut Vec<Table>) {
        for arg in &self.args {
            arg.collect_tables(out);
        }
    }
}

impl Compilable for Function {
    fn write_sql(&self, compiler: &mut Compiler) -> SqlResult<String> {
        let dialect = compiler.dialect();
        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            args.push(match arg {
                Operand::Value(Value::String(s)) => dialect.quote_literal(s),
                other => other.write_sql(compiler)?,
            });
        }
        let mut sql = format!("{}({})", self.name.sql_name(dialect), args.join(", "));
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
        Ok(sql)
    }
}

/// Function constructors.
///
/// ```
/// use supersql_query::expressions::{fx, Table};
///
/// let users = Table::new("users");
/// let total = fx::count(users.field("id")).as_("total");
/// let nick = fx::coalesce([users.field("nick").into(), "anon".into()]);
/// # let _ = (total, nick);
/// ```
pub mod fx {
    use super::{Function, Operand};

    /// Any function by name.
    pub fn call<I, A>(name: impl Into<String>, args: I) -> Function
    where
        I: IntoIterator<Item = A>,
        A: Into<Operand>,
    {
        Function::new(name, args)
    }

    /// `json_build_object(k, v, …)` / `json_object(k, v, …)`
    pub fn json_object<I, K, V>(pairs: I) -> Function
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Operand>,
    {
        Function::json_object(pairs)
    }

    pub fn count(arg: impl Into<Operand>) -> Function {
        Function::new("COUNT", [arg])
    }

    /// `COUNT(*)`
    pub fn count_all() -> Function {
        Function::new("COUNT", [Operand::raw("*")])
    }

    pub fn sum(arg: impl Into<Operand>) -> Function {
        Function::new("SUM", [arg])
    }

    pub fn avg(arg: impl Into<Operand>) -> Function {
        Function::new("AVG", [arg])
    }

    pub fn min(arg: impl Into<Operand>) -> Function {
        Function::new("MIN", [arg])
    }

    pub fn max(arg: impl Into<Operand>) -> Function {
        Function::new("MAX", [arg])
    }

    pub fn lower(arg: impl Into<Operand>) -> Function {
        Function::new("LOWER", [arg])
    }

    pub fn upper(arg: impl Into<Operand>) -> Function {
        Function::new("UPPER", [arg])
    }

    pub fn coalesce<I: IntoIterator<Item = Operand>>(args: I) -> Function {
        Function::new("COALESCE", args)
    }

    pub fn now() -> Function {
        Function::new("NOW", Vec::<Operand>::new())
    }
}
