//! # supersql-engines
//!
//! Pooled async execution for queries built with `supersql-query`.
//!
//! Every engine implements [`Engine`]: `connect` opens a pool, `connection`
//! hands out a [`Connection`] that checks a session out with `begin` and
//! returns it with `done`. Vendors are behind cargo features:
//!
//! - `sqlite` (default) - `rusqlite` on a blocking thread pool, see [`pool`]
//! - `postgres` - `tokio-postgres` pooled by `deadpool-postgres`
//! - `mysql` - `mysql_async` and its built-in pool
//!
//! ```no_run
//! # async fn run() -> supersql_core::SqlResult<()> {
//! use supersql_core::DatabaseSettings;
//! use supersql_engines::create_engine;
//! use supersql_query::QueryBuilder;
//!
//! let engine = create_engine(&DatabaseSettings::sqlite("app.db"))?;
//! engine.connect().await?;
//! let mut conn = engine.connection()?;
//! conn.begin().await?;
//! let query = QueryBuilder::sqlite().select(["*"]).from("users").build()?;
//! let rows = conn.fetch(&query).await?;
//! conn.done().await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]

pub mod base;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use supersql_core::{DatabaseSettings, SqlError, SqlResult};
use supersql_query::Dialect;

pub use base::{run_transaction, Connection, Engine, PoolConfig, StatementResult};

/// Creates an engine for `settings.engine`, which names the vendor.
///
/// Fails with a configuration error when the vendor's feature is disabled.
pub fn create_engine(settings: &DatabaseSettings) -> SqlResult<Arc<dyn Engine>> {
    let dialect: Dialect = settings.engine.parse()?;
    tracing::debug!(vendor = dialect.vendor(), name = %settings.name, "creating engine");
    match dialect {
        #[cfg(feature = "sqlite")]
        Dialect::Sqlite => Ok(Arc::new(sqlite::SqliteEngine::from_settings(settings))),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(Arc::new(postgres::PostgresEngine::new(settings.clone()))),
        #[cfg(feature = "mysql")]
        Dialect::MySql => Ok(Arc::new(mysql::MySqlEngine::new(settings.clone()))),
        #[allow(unreachable_patterns)]
        other => {
            let vendor = other.vendor();
            Err(SqlError::Configuration(format!(
                "the '{vendor}' engine is not enabled; rebuild with the `{vendor}` feature"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine_is_rejected() {
        let mut settings = DatabaseSettings::sqlite("x.db");
        settings.engine = "oracle".into();
        assert!(matches!(
            create_engine(&settings),
            Err(SqlError::NotImplemented { .. })
        ));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_create_sqlite_engine() {
        let engine = create_engine(&DatabaseSettings::sqlite(":memory:")).unwrap();
        assert_eq!(engine.dialect(), Dialect::Sqlite);
        assert!(!engine.is_connected());
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_disabled_vendor_is_configuration_error() {
        let settings = DatabaseSettings::mysql("localhost", 3306, "db", "u", "p");
        assert!(matches!(
            create_engine(&settings),
            Err(SqlError::Configuration(_))
        ));
    }
}
