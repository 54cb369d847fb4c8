//! # supersql-query
//!
//! The query-building half of supersql. A [`QueryBuilder`](builder::QueryBuilder)
//! accumulates clauses into a [`QueryState`](state::QueryState) without
//! touching a database; [`build`](builder::QueryBuilder::build) hands the
//! state to a [`Compiler`](compiler::Compiler), which renders SQL for the
//! builder's [`Dialect`](dialect::Dialect) and collects the bound parameters.
//!
//! ## Module Overview
//!
//! - [`builder`] - The fluent [`QueryBuilder`](builder::QueryBuilder)
//! - [`expressions`] - Tables, fields, conditions, functions, window functions
//! - [`state`] - The statement data model
//! - [`compiler`] - Dialect-aware SQL generation
//! - [`transaction`] - `BEGIN … COMMIT` scripts
//! - [`value`] / [`row`] - Parameter values and result rows
//! - [`dialect`] - Placeholder styles and quoting

// These clippy lints are intentionally allowed for the query crate:
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - return_self_not_must_use: builder methods return a new builder by value
// - module_name_repetitions: `QueryState` lives in `state`, `Compiler` in `compiler`
#![allow(clippy::format_push_string)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]

pub mod builder;
pub mod compiler;
pub mod dialect;
pub mod expressions;
pub mod row;
pub mod state;
pub mod transaction;
pub mod value;

pub use builder::{InsertRows, OnConflictBuilder, QueryBuilder};
pub use compiler::{Compilable, CompiledQuery, Compiler};
pub use dialect::Dialect;
pub use expressions::window;
pub use expressions::{
    fx, partition_by, Condition, Direction, Expr, Field, Function, Operand, OrderItem, Predicate,
    Table, WindowFunction, WindowSpec,
};
pub use row::{FromValue, Row};
pub use state::{Assignment, JoinKind, QueryState, Source, StatementType};
pub use transaction::{Transaction, TransactionBuilder};
pub use value::Value;
