//! # supersql
//!
//! A fluent SQL query builder for PostgreSQL, MySQL and SQLite with pooled
//! async execution.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on
//! `supersql` to get everything, or on the individual crates for finer
//! control. Engines are behind the `sqlite` (default), `postgres` and `mysql`
//! features.
//!
//! ```
//! use supersql::prelude::*;
//!
//! let users = Table::new("users").as_("u");
//! let query = QueryBuilder::postgres()
//!     .select([users.field("id"), users.field("name")])
//!     .where_(users.field("age").gt(18) & users.field("active").eq(true))
//!     .unwrap()
//!     .order_by([-users.field("name")])
//!     .limit(10)
//!     .build()
//!     .unwrap();
//! assert_eq!(query.params, vec![Value::Int(18), Value::Bool(true)]);
//! ```

#![allow(clippy::doc_markdown)]

/// Errors, settings, and logging setup.
pub use supersql_core as core;

/// Expressions, the query builder and the dialect compiler.
pub use supersql_query as query;

/// Engines, connections and the connection pool.
pub use supersql_engines as engines;

// Third-party crates used in the public API.
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;

/// The types most programs need.
pub mod prelude {
    pub use supersql_core::logging::setup_logging;
    pub use supersql_core::{DatabaseSettings, ErrorKind, PoolSettings, Settings, SqlError, SqlResult};
    pub use supersql_engines::{
        create_engine, run_transaction, Connection, Engine, PoolConfig, StatementResult,
    };
    pub use supersql_query::window;
    pub use supersql_query::{
        fx, partition_by, Assignment, CompiledQuery, Condition, Dialect, Expr, Field, FromValue,
        QueryBuilder, Row, Table, Transaction, Value, WindowSpec,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_builds_queries() {
        let sql = QueryBuilder::sqlite()
            .select(["*"])
            .from("users")
            .where_(Field::new("id").eq(1))
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(sql, r#"SELECT * FROM "users" WHERE "id" = ?"#);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_prelude_runs_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let engine = create_engine(&DatabaseSettings::sqlite(path.to_string_lossy())).unwrap();
        engine.connect().await.unwrap();

        let q = QueryBuilder::sqlite();
        let mut tx = q.begin();
        tx.push(q.select([fx::call("abs", [Value::Int(-4)]).as_("n")]));
        let results = engine.transaction(&tx.commit()).await.unwrap();
        let rows = results[0].rows().unwrap();
        assert_eq!(rows[0].get::<i64>("n").unwrap(), 4);

        engine.disconnect().await.unwrap();
    }
}
