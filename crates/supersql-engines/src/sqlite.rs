//! SQLite engine using `rusqlite`.
//!
//! Each pooled connection is a `rusqlite::Connection` behind an async mutex;
//! statements run on `tokio::task::spawn_blocking` so the runtime never
//! blocks on disk I/O.
//!
//! - WAL journal mode and foreign keys are enabled on every connection
//! - `:memory:` opens an in-memory database; its pool holds one connection
//!   so every session sees the same data

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;
use supersql_core::logging::statement_span;
use supersql_core::{DatabaseSettings, SqlError, SqlResult};
use supersql_query::{Dialect, Row, Value};

use crate::base::{statement_kind, Connection, Engine, PoolConfig};
use crate::pool::{Manager, Pool, PooledConnection};

const MEMORY: &str = ":memory:";

type Shared = Arc<tokio::sync::Mutex<rusqlite::Connection>>;

/// Opens SQLite connections for a [`Pool`].
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: PathBuf,
    busy_timeout: std::time::Duration,
}

#[async_trait::async_trait]
impl Manager for SqliteManager {
    type Connection = Shared;

    async fn create(&self) -> SqlResult<Shared> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let conn = tokio::task::spawn_blocking(move || {
            let conn = if path.to_str() == Some(MEMORY) {
                rusqlite::Connection::open_in_memory()
            } else {
                rusqlite::Connection::open(&path)
            }
            .map_err(|e| SqlError::Operational(format!("SQLite open failed: {e}")))?;

            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
                .map_err(|e| SqlError::Operational(format!("Failed to set pragmas: {e}")))?;
            conn.busy_timeout(busy_timeout).map_err(map_error)?;
            Ok::<_, SqlError>(conn)
        })
        .await
        .map_err(join_error)??;

        tracing::debug!(path = %self.path.display(), "opened SQLite connection");
        Ok(Arc::new(tokio::sync::Mutex::new(conn)))
    }

    /// Refuses connections still in use by a blocking task or left inside
    /// a transaction.
    fn is_reusable(&self, conn: &mut Shared) -> bool {
        Arc::strong_count(conn) == 1 && conn.try_lock().is_ok_and(|c| c.is_autocommit())
    }
}

/// A pooled SQLite database.
pub struct SqliteEngine {
    path: PathBuf,
    config: PoolConfig,
    pool: Mutex<Option<Pool<SqliteManager>>>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SqliteEngine {
    /// Creates an engine for the database at `path`, or `:memory:`.
    ///
    /// Nothing is opened until [`Engine::connect`].
    pub fn new(path: impl Into<PathBuf>, config: PoolConfig) -> Self {
        let path = path.into();
        let config = if path.to_str() == Some(MEMORY) {
            PoolConfig {
                min_size: 1,
                max_size: 1,
                ..config
            }
        } else {
            config
        };
        Self {
            path,
            config,
            pool: Mutex::new(None),
        }
    }

    /// An in-memory database with default pool settings.
    pub fn memory() -> Self {
        Self::new(MEMORY, PoolConfig::default())
    }

    /// Builds an engine from settings; the database name is the file path.
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self::new(&settings.name, PoolConfig::from(&settings.pool))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn pool_config(&self) -> &PoolConfig {
        &self.config
    }

    fn pool(&self) -> SqlResult<Pool<SqliteManager>> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SqlError::NotConnected)
    }
}

#[async_trait::async_trait]
impl Engine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&self) -> SqlResult<()> {
        if self.is_connected() {
            return Err(SqlError::AlreadyConnected);
        }
        let manager = SqliteManager {
            path: self.path.clone(),
            busy_timeout: self.config.timeout,
        };
        let pool = Pool::new(manager, self.config);
        pool.warm().await?;

        let mut slot = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            pool.close_all();
            return Err(SqlError::AlreadyConnected);
        }
        *slot = Some(pool);
        tracing::info!(
            path = %self.path.display(),
            max_size = self.config.max_size,
            "connected to SQLite"
        );
        Ok(())
    }

    async fn disconnect(&self) -> SqlResult<()> {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SqlError::NotConnected)?;
        pool.close_all();
        tracing::info!(path = %self.path.display(), "disconnected from SQLite");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn connection(&self) -> SqlResult<Box<dyn Connection>> {
        Ok(Box::new(SqliteConnection {
            pool: self.pool()?,
            conn: None,
            rowcount: 0,
        }))
    }
}

/// A handle onto one pooled SQLite connection.
pub struct SqliteConnection {
    pool: Pool<SqliteManager>,
    conn: Option<PooledConnection<SqliteManager>>,
    rowcount: u64,
}

impl SqliteConnection {
    fn held(&self) -> SqlResult<Shared> {
        self.conn
            .as_deref()
            .cloned()
            .ok_or(SqlError::NotConnected)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        limit: Option<usize>,
    ) -> SqlResult<Vec<Row>> {
        let conn = self.held()?;
        let sql = sql.to_string();
        let params = params.to_vec();
        let span = statement_span("sqlite", statement_kind(&sql));

        let rows = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            tracing::debug!(sql = %sql, params = params.len(), "query");
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();
            bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while limit.map_or(true, |n| rows.len() < n) {
                let Some(row) = raw_rows.next().map_err(map_error)? else {
                    break;
                };
                rows.push(convert_row(row, &column_names)?);
            }
            Ok::<_, SqlError>(rows)
        })
        .await
        .map_err(join_error)??;

        self.rowcount = rows.len() as u64;
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl Connection for SqliteConnection {
    async fn begin(&mut self) -> SqlResult<()> {
        if self.conn.is_some() {
            return Err(SqlError::AlreadyConnected);
        }
        self.conn = Some(self.pool.acquire().await?);
        tracing::debug!("acquired SQLite connection");
        Ok(())
    }

    async fn done(&mut self) -> SqlResult<()> {
        let conn = self.held()?;
        let rolled_back = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            if conn.is_autocommit() {
                return Ok(false);
            }
            conn.execute_batch("ROLLBACK").map(|()| true)
        })
        .await
        .map_err(join_error)?;
        match rolled_back {
            Ok(true) => {
                tracing::warn!("released SQLite connection inside a transaction; rolled back");
            }
            Ok(false) => {}
            // The pool closes the connection on release.
            Err(e) => tracing::warn!(error = %e, "rollback before release failed"),
        }
        self.conn = None;
        tracing::debug!("released SQLite connection");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        let conn = self.held()?;
        let sql = sql.to_string();
        let params = params.to_vec();
        let span = statement_span("sqlite", statement_kind(&sql));

        let count = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            tracing::debug!(sql = %sql, params = params.len(), "execute");
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(map_error)?;
            bind_params(&mut stmt, &params)?;
            stmt.raw_execute().map_err(map_error)
        })
        .await
        .map_err(join_error)??;

        self.rowcount = count as u64;
        Ok(self.rowcount)
    }

    async fn fetchall(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        self.query(sql, params, None).await
    }

    async fn fetchmany(&mut self, sql: &str, params: &[Value], limit: usize) -> SqlResult<Vec<Row>> {
        self.query(sql, params, Some(limit)).await
    }

    fn rowcount(&self) -> u64 {
        self.rowcount
    }
}

fn join_error(e: tokio::task::JoinError) -> SqlError {
    SqlError::Database(format!("Task join error: {e}"))
}

fn map_error(e: rusqlite::Error) -> SqlError {
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
        _ => None,
    };
    match code {
        Some(ErrorCode::ConstraintViolation) => SqlError::Integrity(e.to_string()),
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::ReadOnly,
        ) => SqlError::Operational(e.to_string()),
        _ => SqlError::Database(e.to_string()),
    }
}

/// Binds `Value`s to a prepared statement.
fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> SqlResult<()> {
    for (i, param) in params.iter().enumerate() {
        let idx = i + 1;
        match param {
            Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
            Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
            Value::Int(v) => stmt.raw_bind_parameter(idx, v),
            Value::Float(v) => stmt.raw_bind_parameter(idx, v),
            Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
            Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
            Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
            Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string()),
            Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
            Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string()),
            Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
            Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
            Value::List(_) => stmt.raw_bind_parameter(idx, param.to_json().to_string()),
        }
        .map_err(|e| SqlError::Database(format!("Bind error: {e}")))?;
    }
    Ok(())
}

fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> SqlResult<Row> {
    let mut values = Vec::with_capacity(column_names.len());
    for i in 0..column_names.len() {
        let value = match sqlite_row.get_ref(i).map_err(map_error)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        };
        values.push(value);
    }
    Row::new(column_names.to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn session() -> (SqliteEngine, Box<dyn Connection>) {
        let engine = SqliteEngine::memory();
        engine.connect().await.unwrap();
        let mut conn = engine.connection().unwrap();
        conn.begin().await.unwrap();
        (engine, conn)
    }

    #[test]
    fn test_memory_pool_holds_one_connection() {
        let engine = SqliteEngine::memory();
        assert_eq!(engine.pool_config().max_size, 1);
        assert_eq!(engine.path().to_str(), Some(":memory:"));
        assert_eq!(engine.parameter_placeholder(), "?");
        assert!(!engine.is_connected());
    }

    #[tokio::test]
    async fn test_done_rolls_back_open_transaction() {
        let (engine, mut conn) = session().await;
        conn.execute("CREATE TABLE t (x INTEGER)", &[]).await.unwrap();
        conn.execute("BEGIN", &[]).await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        conn.done().await.unwrap();

        // The single in-memory connection survived the release.
        let mut conn = engine.connection().unwrap();
        conn.begin().await.unwrap();
        let rows = conn.fetchall("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get::<i64>("n").unwrap(), 0);
        conn.execute("BEGIN", &[]).await.unwrap();
        conn.done().await.unwrap();
    }

    #[tokio::test]
    async fn test_manager_rejects_connection_inside_transaction() {
        let manager = SqliteManager {
            path: PathBuf::from(MEMORY),
            busy_timeout: std::time::Duration::from_secs(1),
        };
        let mut conn = manager.create().await.unwrap();
        assert!(manager.is_reusable(&mut conn));

        conn.lock().await.execute_batch("BEGIN").unwrap();
        assert!(!manager.is_reusable(&mut conn));

        let extra = Arc::clone(&conn);
        extra.lock().await.execute_batch("ROLLBACK").unwrap();
        assert!(!manager.is_reusable(&mut conn));
        drop(extra);
        assert!(manager.is_reusable(&mut conn));
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let (_engine, mut conn) = session().await;
        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
            &[],
        )
        .await
        .unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO users (name, age) VALUES (?, ?), (?, ?)",
                &[
                    Value::from("Alice"),
                    Value::from(30),
                    Value::from("Bob"),
                    Value::from(25),
                ],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(conn.rowcount(), 2);

        let rows = conn
            .fetchall("SELECT id, name, age FROM users ORDER BY age", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Bob");
        assert_eq!(rows[1].get::<i64>("age").unwrap(), 30);
        assert_eq!(conn.rowcount(), 2);
    }

    #[tokio::test]
    async fn test_fetchmany_stops_early() {
        let (_engine, mut conn) = session().await;
        conn.execute("CREATE TABLE n (v INTEGER)", &[]).await.unwrap();
        for v in 0..5 {
            conn.execute("INSERT INTO n (v) VALUES (?)", &[Value::from(v)])
                .await
                .unwrap();
        }
        let rows = conn
            .fetchmany("SELECT v FROM n ORDER BY v", &[], 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_by_index::<i64>(0).unwrap(), 1);
        assert_eq!(conn.rowcount(), 2);
    }

    #[tokio::test]
    async fn test_null_float_blob_and_bool() {
        let (_engine, mut conn) = session().await;
        conn.execute(
            "CREATE TABLE t (bio TEXT, price REAL, data BLOB, active INTEGER)",
            &[],
        )
        .await
        .unwrap();
        let blob = vec![0xDE_u8, 0xAD, 0xBE, 0xEF];
        conn.execute(
            "INSERT INTO t VALUES (?, ?, ?, ?)",
            &[
                Value::Null,
                Value::from(19.99),
                Value::Bytes(blob.clone()),
                Value::Bool(true),
            ],
        )
        .await
        .unwrap();

        let rows = conn.fetchall("SELECT * FROM t", &[]).await.unwrap();
        let row = &rows[0];
        assert_eq!(row.get::<Option<String>>("bio").unwrap(), None);
        assert!((row.get::<f64>("price").unwrap() - 19.99).abs() < f64::EPSILON);
        assert_eq!(row.get::<Vec<u8>>("data").unwrap(), blob);
        assert!(row.get::<bool>("active").unwrap());
    }

    #[tokio::test]
    async fn test_list_binds_as_json_text() {
        let (_engine, mut conn) = session().await;
        let rows = conn
            .fetchall(
                "SELECT ? AS tags",
                &[Value::List(vec![Value::from("a"), Value::from(1)])],
            )
            .await
            .unwrap();
        assert_eq!(rows[0].get::<String>("tags").unwrap(), r#"["a",1]"#);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_integrity_error() {
        let (_engine, mut conn) = session().await;
        conn.execute("CREATE TABLE u (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        conn.execute("INSERT INTO u (id) VALUES (1)", &[]).await.unwrap();
        let err = conn
            .execute("INSERT INTO u (id) VALUES (1)", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlError::Integrity(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_syntax_error_is_database_error() {
        let (_engine, mut conn) = session().await;
        let err = conn.execute("SELEC 1", &[]).await.unwrap_err();
        assert!(matches!(err, SqlError::Database(_)));
    }

    #[tokio::test]
    async fn test_statements_require_begin() {
        let engine = SqliteEngine::memory();
        engine.connect().await.unwrap();
        let mut conn = engine.connection().unwrap();
        assert!(matches!(
            conn.execute("SELECT 1", &[]).await,
            Err(SqlError::NotConnected)
        ));
        assert!(!conn.is_active());
    }

    #[tokio::test]
    async fn test_memory_data_survives_release() {
        let (engine, mut conn) = session().await;
        conn.execute("CREATE TABLE kept (v INTEGER)", &[]).await.unwrap();
        conn.done().await.unwrap();

        let mut other = engine.connection().unwrap();
        other.begin().await.unwrap();
        let rows = other.fetchall("SELECT * FROM kept", &[]).await.unwrap();
        assert!(rows.is_empty());
    }
}
