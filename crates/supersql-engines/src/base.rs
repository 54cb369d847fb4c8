//! Engine and connection traits shared by every database adapter.
//!
//! An [`Engine`] owns a connection pool for one database. A [`Connection`] is
//! a handle that checks a pooled session out with [`Connection::begin`] and
//! returns it with [`Connection::done`]; statements run on the held session in
//! between. [`run_transaction`] drives a compiled
//! [`Transaction`] over one held session.

use std::time::Duration;

use supersql_core::{PoolSettings, SqlError, SqlResult};
use supersql_query::{CompiledQuery, Dialect, Row, StatementType, Transaction, Value};

/// Pool sizing and timing for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections opened when the engine connects.
    pub min_size: usize,
    /// Upper bound on live connections.
    pub max_size: usize,
    /// How long an acquire may wait for a free connection.
    pub timeout: Duration,
    /// Connections older than this are closed instead of reused.
    pub recycle: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&PoolSettings::default())
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        let max_size = (settings.pool_max_size as usize).max(1);
        Self {
            min_size: (settings.pool_min_size as usize).min(max_size),
            max_size,
            timeout: settings.timeout(),
            recycle: settings.recycle(),
        }
    }
}

/// A database engine: a pool of connections to one database.
///
/// All methods take `&self`; engines keep their pool behind interior
/// mutability so they can be shared as `Arc<dyn Engine>`.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// The SQL dialect this engine speaks.
    fn dialect(&self) -> Dialect;

    /// The placeholder marker used by this engine's dialect.
    fn parameter_placeholder(&self) -> &'static str {
        self.dialect().placeholder_style()
    }

    /// Opens the connection pool.
    ///
    /// Returns [`SqlError::AlreadyConnected`] if the pool is already open.
    async fn connect(&self) -> SqlResult<()>;

    /// Closes the connection pool.
    ///
    /// Returns [`SqlError::NotConnected`] if the pool is not open.
    async fn disconnect(&self) -> SqlResult<()>;

    fn is_connected(&self) -> bool;

    /// Returns a connection handle bound to the open pool.
    ///
    /// The handle holds no session until [`Connection::begin`] is called.
    fn connection(&self) -> SqlResult<Box<dyn Connection>>;

    /// Runs `transaction` on one pooled session and releases it afterwards.
    async fn transaction(&self, transaction: &Transaction) -> SqlResult<Vec<StatementResult>> {
        let mut conn = self.connection()?;
        conn.begin().await?;
        let result = run_transaction(conn.as_mut(), transaction).await;
        let released = conn.done().await;
        let outcome = result?;
        released?;
        Ok(outcome)
    }
}

/// A handle onto one pooled database session.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Checks a session out of the pool.
    ///
    /// Returns [`SqlError::AlreadyConnected`] if this handle already holds one.
    async fn begin(&mut self) -> SqlResult<()>;

    /// Returns the held session to the pool.
    ///
    /// Returns [`SqlError::NotConnected`] if this handle holds none.
    async fn done(&mut self) -> SqlResult<()>;

    /// Whether a session is currently held.
    fn is_active(&self) -> bool;

    /// Runs a statement that produces no rows and returns the affected count.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64>;

    /// Runs a query and returns every row.
    async fn fetchall(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>>;

    /// Runs a query and returns at most `limit` rows.
    async fn fetchmany(&mut self, sql: &str, params: &[Value], limit: usize) -> SqlResult<Vec<Row>> {
        let mut rows = self.fetchall(sql, params).await?;
        rows.truncate(limit);
        Ok(rows)
    }

    /// Rows affected by the last `execute`, or returned by the last fetch.
    fn rowcount(&self) -> u64;

    /// Runs several statements in order and returns the total affected count.
    async fn executemany(&mut self, queries: &[CompiledQuery]) -> SqlResult<u64> {
        let mut total = 0;
        for query in queries {
            total += self.execute(&query.sql, &query.params).await?;
        }
        Ok(total)
    }

    /// [`execute`](Self::execute) for a compiled query.
    async fn run(&mut self, query: &CompiledQuery) -> SqlResult<u64> {
        self.execute(&query.sql, &query.params).await
    }

    /// [`fetchall`](Self::fetchall) for a compiled query.
    async fn fetch(&mut self, query: &CompiledQuery) -> SqlResult<Vec<Row>> {
        self.fetchall(&query.sql, &query.params).await
    }
}

/// The outcome of one statement inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    /// Rows from a SELECT or a statement with RETURNING.
    Rows(Vec<Row>),
    /// Affected row count of any other statement.
    Affected(u64),
}

impl StatementResult {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Affected(_) => None,
        }
    }

    pub const fn affected(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Affected(n) => Some(*n),
        }
    }
}

/// Runs `transaction` on the session `conn` already holds.
///
/// Issues `BEGIN`, every body statement, then `COMMIT` or `ROLLBACK` as the
/// transaction ends. When a statement fails the transaction is rolled back
/// and the statement's error is returned. The session stays checked out.
pub async fn run_transaction(
    conn: &mut dyn Connection,
    transaction: &Transaction,
) -> SqlResult<Vec<StatementResult>> {
    if !conn.is_active() {
        return Err(SqlError::NotConnected);
    }
    let statements = transaction.statements()?;
    let vendor = transaction.dialect().vendor();

    conn.execute("BEGIN", &[]).await?;
    let mut results = Vec::with_capacity(statements.len());
    for (state, compiled) in transaction.body().iter().zip(&statements) {
        let kind = format!("{:?}", state.statement_type);
        let span = supersql_core::logging::statement_span(vendor, &kind);
        let outcome = if state.returns_rows() {
            conn.fetch(compiled).await.map(StatementResult::Rows)
        } else {
            conn.run(compiled).await.map(StatementResult::Affected)
        };
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                span.in_scope(|| tracing::warn!(error = %e, "statement failed, rolling back"));
                rollback(conn).await;
                return Err(e);
            }
        }
    }

    match transaction.ends_with() {
        StatementType::Rollback => {
            conn.execute("ROLLBACK", &[]).await?;
        }
        _ => {
            // A failed COMMIT (e.g. a deferred constraint) can leave the
            // transaction open on the session.
            if let Err(e) = conn.execute("COMMIT", &[]).await {
                tracing::warn!(vendor, error = %e, "commit failed, rolling back");
                rollback(conn).await;
                return Err(e);
            }
        }
    }
    tracing::debug!(vendor, statements = results.len(), "transaction finished");
    Ok(results)
}

async fn rollback(conn: &mut dyn Connection) {
    if let Err(e) = conn.execute("ROLLBACK", &[]).await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

/// How a statement changes the session's transaction state: `Some(true)`
/// when it opens a transaction, `Some(false)` when it ends one.
#[cfg_attr(not(any(feature = "postgres", feature = "mysql")), allow(dead_code))]
pub(crate) fn transaction_effect(sql: &str) -> Option<bool> {
    let kind = statement_kind(sql).trim_end_matches(';').to_ascii_uppercase();
    match kind.as_str() {
        "BEGIN" | "START" => Some(true),
        "COMMIT" | "ROLLBACK" | "END" | "ABORT" => Some(false),
        _ => None,
    }
}

/// The leading keyword of `sql`, used to label statement spans.
pub(crate) fn statement_kind(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use supersql_query::QueryBuilder;

    /// Records every statement; fails on SQL containing `fail`.
    #[derive(Default)]
    struct Recorder {
        active: bool,
        fail_commit: bool,
        log: Vec<String>,
        rowcount: u64,
    }

    #[async_trait::async_trait]
    impl Connection for Recorder {
        async fn begin(&mut self) -> SqlResult<()> {
            if self.active {
                return Err(SqlError::AlreadyConnected);
            }
            self.active = true;
            Ok(())
        }

        async fn done(&mut self) -> SqlResult<()> {
            if !self.active {
                return Err(SqlError::NotConnected);
            }
            self.active = false;
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active
        }

        async fn execute(&mut self, sql: &str, _params: &[Value]) -> SqlResult<u64> {
            self.log.push(sql.to_string());
            if self.fail_commit && sql == "COMMIT" {
                return Err(SqlError::Integrity("FOREIGN KEY constraint failed".into()));
            }
            if sql.contains("fail") {
                return Err(SqlError::Database("boom".into()));
            }
            self.rowcount = 1;
            Ok(1)
        }

        async fn fetchall(&mut self, sql: &str, _params: &[Value]) -> SqlResult<Vec<Row>> {
            self.log.push(sql.to_string());
            let rows = vec![
                Row::new(vec!["n".into()], vec![Value::Int(1)])?,
                Row::new(vec!["n".into()], vec![Value::Int(2)])?,
            ];
            self.rowcount = rows.len() as u64;
            Ok(rows)
        }

        fn rowcount(&self) -> u64 {
            self.rowcount
        }
    }

    #[test]
    fn test_pool_config_from_settings() {
        let settings = PoolSettings {
            pool_min_size: 20,
            pool_max_size: 5,
            pool_timeout: 3,
            pool_recycle: Some(600),
        };
        let config = PoolConfig::from(&settings);
        assert_eq!(config.max_size, 5);
        assert_eq!(config.min_size, 5);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.recycle, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_statement_kind() {
        assert_eq!(statement_kind("  SELECT * FROM t"), "SELECT");
        assert_eq!(statement_kind("BEGIN"), "BEGIN");
        assert_eq!(statement_kind(""), "");
    }

    #[test]
    fn test_transaction_effect() {
        assert_eq!(transaction_effect("BEGIN"), Some(true));
        assert_eq!(transaction_effect("start transaction"), Some(true));
        assert_eq!(transaction_effect("COMMIT;"), Some(false));
        assert_eq!(transaction_effect("  rollback"), Some(false));
        assert_eq!(transaction_effect("SELECT 1"), None);
        assert_eq!(transaction_effect(""), None);
    }

    #[test]
    fn test_pool_config_never_zero_sized() {
        let settings = PoolSettings {
            pool_max_size: 0,
            ..PoolSettings::default()
        };
        assert_eq!(PoolConfig::from(&settings).max_size, 1);
    }

    #[tokio::test]
    async fn test_begin_and_done_ordering() {
        let mut conn = Recorder::default();
        assert!(matches!(conn.done().await, Err(SqlError::NotConnected)));
        conn.begin().await.unwrap();
        assert!(matches!(conn.begin().await, Err(SqlError::AlreadyConnected)));
        conn.done().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_transaction_commits_in_order() {
        let q = QueryBuilder::sqlite();
        let mut tx = q.begin();
        tx.push(q.insert_into("t", ["a"]).values((1,)).unwrap())
            .push(q.select(["a"]).from("t"));
        let tx = tx.commit();

        let mut conn = Recorder::default();
        conn.begin().await.unwrap();
        let results = run_transaction(&mut conn, &tx).await.unwrap();
        assert_eq!(
            conn.log,
            [
                "BEGIN",
                r#"INSERT INTO "t" ("a") VALUES (?)"#,
                r#"SELECT a FROM "t""#,
                "COMMIT"
            ]
        );
        assert_eq!(results[0], StatementResult::Affected(1));
        assert_eq!(results[1].rows().map(<[Row]>::len), Some(2));
        assert!(conn.is_active());
    }

    #[tokio::test]
    async fn test_run_transaction_rolls_back_on_error() {
        let q = QueryBuilder::sqlite();
        let mut tx = q.begin();
        tx.push(q.delete_from("ok"))
            .push(q.delete_from("fail"))
            .push(q.delete_from("never"));
        let tx = tx.commit();

        let mut conn = Recorder::default();
        conn.begin().await.unwrap();
        let err = run_transaction(&mut conn, &tx).await.unwrap_err();
        assert!(matches!(err, SqlError::Database(_)));
        assert_eq!(
            conn.log,
            ["BEGIN", r#"DELETE FROM "ok""#, r#"DELETE FROM "fail""#, "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_run_transaction_rolls_back_failed_commit() {
        let q = QueryBuilder::sqlite();
        let mut tx = q.begin();
        tx.push(q.insert_into("child", ["pid"]).values((7,)).unwrap());
        let tx = tx.commit();

        let mut conn = Recorder {
            fail_commit: true,
            ..Recorder::default()
        };
        conn.begin().await.unwrap();
        let err = run_transaction(&mut conn, &tx).await.unwrap_err();
        assert!(matches!(err, SqlError::Integrity(_)));
        assert_eq!(
            conn.log,
            [
                "BEGIN",
                r#"INSERT INTO "child" ("pid") VALUES (?)"#,
                "COMMIT",
                "ROLLBACK"
            ]
        );
    }

    #[tokio::test]
    async fn test_run_transaction_explicit_rollback_and_returning() {
        let q = QueryBuilder::postgres();
        let mut tx = q.begin();
        tx.push(q.delete_from("t").returning(["id"]));
        let tx = tx.rollback();

        let mut conn = Recorder::default();
        conn.begin().await.unwrap();
        let results = run_transaction(&mut conn, &tx).await.unwrap();
        assert!(results[0].rows().is_some());
        assert_eq!(conn.log.last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn test_run_transaction_requires_held_session() {
        let tx = QueryBuilder::sqlite().begin().commit();
        let mut conn = Recorder::default();
        assert!(matches!(
            run_transaction(&mut conn, &tx).await,
            Err(SqlError::NotConnected)
        ));
        assert!(conn.log.is_empty());
    }

    #[tokio::test]
    async fn test_provided_helpers() {
        let mut conn = Recorder::default();
        conn.begin().await.unwrap();
        let rows = conn.fetchmany("SELECT n", &[], 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        let total = conn
            .executemany(&[
                CompiledQuery::new("UPDATE a SET x = 1", vec![]),
                CompiledQuery::new("UPDATE b SET x = 1", vec![]),
            ])
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(conn.rowcount(), 1);
    }
}
