//! Multi-statement transactions.
//!
//! A [`TransactionBuilder`] collects statements between `BEGIN` and the final
//! `COMMIT` or `ROLLBACK`. Statements are pushed in place, so there is never a
//! half-built transaction that could be branched by accident.
//!
//! ```
//! use supersql_query::builder::QueryBuilder;
//!
//! let q = QueryBuilder::postgres();
//! let mut tx = q.begin();
//! tx.push(q.insert_into("users", ["name"]).values(("Ann",)).unwrap())
//!     .push(q.select(["*"]).from("users"));
//! let tx = tx.commit();
//! assert_eq!(
//!     tx.build().unwrap().sql,
//!     r#"BEGIN; INSERT INTO "users" ("name") VALUES ($1); SELECT * FROM "users"; COMMIT;"#
//! );
//! ```

use supersql_core::SqlResult;

use crate::compiler::{CompiledQuery, Compiler};
use crate::dialect::Dialect;
use crate::state::{QueryState, StatementType};

/// Collects the statements of a transaction.
#[derive(Debug, Clone)]
#[must_use]
pub struct TransactionBuilder {
    dialect: Dialect,
    statements: Vec<QueryState>,
}

impl TransactionBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// Appends a statement; a chained builder contributes each of its
    /// statements in order.
    pub fn push(&mut self, statement: impl Into<QueryState>) -> &mut Self {
        self.statements.extend(statement.into().into_statements());
        self
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Ends the transaction with `COMMIT`.
    pub fn commit(self) -> Transaction {
        self.finish(StatementType::Commit)
    }

    /// Ends the transaction with `ROLLBACK`.
    pub fn rollback(self) -> Transaction {
        self.finish(StatementType::Rollback)
    }

    fn finish(self, end: StatementType) -> Transaction {
        Transaction {
            dialect: self.dialect,
            statements: self.statements,
            end,
        }
    }
}

/// A finished transaction, ready to render or to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    dialect: Dialect,
    statements: Vec<QueryState>,
    end: StatementType,
}

impl Transaction {
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The statements between `BEGIN` and the final `COMMIT`/`ROLLBACK`.
    pub fn body(&self) -> &[QueryState] {
        &self.statements
    }

    /// [`StatementType::Commit`] or [`StatementType::Rollback`].
    pub const fn ends_with(&self) -> StatementType {
        self.end
    }

    /// The whole transaction as a single state chain.
    pub fn to_state(&self) -> QueryState {
        let mut chain = Vec::with_capacity(self.statements.len() + 1);
        chain.push(QueryState::new(StatementType::Begin));
        chain.extend(self.statements.iter().cloned());
        QueryState {
            chain,
            ..QueryState::new(self.end)
        }
    }

    /// One script, `BEGIN; …; COMMIT;`, numbered continuously.
    pub fn build(&self) -> SqlResult<CompiledQuery> {
        Compiler::new(self.dialect).compile(&self.to_state())
    }

    /// Each body statement compiled on its own, for separate execution on
    /// one connection.
    pub fn statements(&self) -> SqlResult<Vec<CompiledQuery>> {
        self.statements
            .iter()
            .map(|state| Compiler::new(self.dialect).compile(state))
            .collect()
    }
}
