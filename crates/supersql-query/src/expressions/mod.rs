//! The expression model: tables, columns, predicates, functions and window
//! functions.
//!
//! Every node implements [`Compilable`](crate::compiler::Compilable), which
//! renders it through a [`Compiler`](crate::compiler::Compiler) so that bound
//! values and placeholder numbering stay consistent across a whole statement.
//!
//! # Submodules
//!
//! - [`field`] - [`Table`] and [`Field`], the entry points for predicates
//! - [`condition`] - [`Condition`] trees, [`Operand`], [`Predicate`]
//! - [`expr`] - [`Expr`] select items and [`OrderItem`] sort keys
//! - [`function`] - [`Function`] calls and the [`fx`] constructors
//! - [`window`] - [`WindowFunction`] and [`WindowSpec`]

pub mod condition;
pub mod expr;
pub mod field;
pub mod function;
pub mod window;

pub use self::condition::{CompareOp, Condition, InSet, Logical, Operand, Predicate};
pub use self::expr::{Direction, Expr, OrderItem};
pub use self::field::{Field, Table};
pub use self::function::{fx, Function, FunctionName};
pub use self::window::{partition_by, Over, WindowFunction, WindowSpec};
