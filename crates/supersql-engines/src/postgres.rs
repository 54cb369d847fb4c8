//! PostgreSQL engine using `tokio-postgres` and `deadpool-postgres`.
//!
//! Pool sizing, acquire timeout and recycle age come from [`PoolConfig`].
//! Connections older than the recycle age are detached from the pool and
//! closed when they are next acquired.

use std::error::Error;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use deadpool_postgres::{ManagerConfig, Object, PoolError, RecyclingMethod, Runtime, Timeouts};
use supersql_core::logging::statement_span;
use supersql_core::{DatabaseSettings, SqlError, SqlResult};
use supersql_query::{Dialect, Row, Value};
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::Instrument;

use crate::base::{statement_kind, transaction_effect, Connection, Engine, PoolConfig};

/// Builds the `deadpool-postgres` configuration for `settings`.
pub fn pg_config(settings: &DatabaseSettings, pool: &PoolConfig) -> deadpool_postgres::Config {
    let mut config = deadpool_postgres::Config::new();
    config.dbname = Some(settings.name.clone());
    config.host = Some(settings.host.clone());
    config.port = Some(settings.port);
    config.user = Some(settings.user.clone()).filter(|u| !u.is_empty());
    config.password = Some(settings.password.clone()).filter(|p| !p.is_empty());
    config.application_name = settings.options.get("application_name").cloned();
    config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    config.pool = Some(deadpool_postgres::PoolConfig {
        max_size: pool.max_size,
        timeouts: Timeouts {
            wait: Some(pool.timeout),
            create: Some(pool.timeout),
            recycle: None,
        },
        ..deadpool_postgres::PoolConfig::default()
    });
    config
}

/// A pooled PostgreSQL database.
pub struct PostgresEngine {
    settings: DatabaseSettings,
    config: PoolConfig,
    pool: Mutex<Option<deadpool_postgres::Pool>>,
}

impl std::fmt::Debug for PostgresEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresEngine")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("name", &self.settings.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostgresEngine {
    /// Creates an engine; nothing is opened until [`Engine::connect`].
    pub fn new(settings: DatabaseSettings) -> Self {
        let config = PoolConfig::from(&settings.pool);
        Self {
            settings,
            config,
            pool: Mutex::new(None),
        }
    }

    pub const fn pool_config(&self) -> &PoolConfig {
        &self.config
    }

    fn pool(&self) -> SqlResult<deadpool_postgres::Pool> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SqlError::NotConnected)
    }
}

#[async_trait::async_trait]
impl Engine for PostgresEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&self) -> SqlResult<()> {
        if self.is_connected() {
            return Err(SqlError::AlreadyConnected);
        }
        let pool = pg_config(&self.settings, &self.config)
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| SqlError::Configuration(format!("Failed to create pool: {e}")))?;

        let mut warm = Vec::with_capacity(self.config.min_size);
        for _ in 0..self.config.min_size {
            warm.push(acquire(&pool, &self.config).await?);
        }
        drop(warm);

        let mut slot = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            pool.close();
            return Err(SqlError::AlreadyConnected);
        }
        *slot = Some(pool);
        tracing::info!(
            host = %self.settings.host,
            port = self.settings.port,
            database = %self.settings.name,
            max_size = self.config.max_size,
            "connected to PostgreSQL"
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
        pool.close();
        tracing::info!(database = %self.settings.name, "disconnected from PostgreSQL");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn connection(&self) -> SqlResult<Box<dyn Connection>> {
        Ok(Box::new(PostgresConnection {
            pool: self.pool()?,
            config: self.config,
            client: None,
            in_transaction: false,
            rowcount: 0,
        }))
    }
}

/// Gets a client from `pool`, closing any whose age exceeds the recycle age.
async fn acquire(pool: &deadpool_postgres::Pool, config: &PoolConfig) -> SqlResult<Object> {
    loop {
        let client = pool.get().await.map_err(|e| map_pool_error(e, config.timeout))?;
        match config.recycle {
            Some(max_age) if Object::metrics(&client).age() > max_age => {
                tracing::debug!("closing expired PostgreSQL connection");
                drop(Object::take(client));
            }
            _ => return Ok(client),
        }
    }
}

/// A handle onto one pooled PostgreSQL client.
///
/// A client released while a transaction is open is rolled back by `done`;
/// one dropped without `done` is detached and closed rather than recycled.
pub struct PostgresConnection {
    pool: deadpool_postgres::Pool,
    config: PoolConfig,
    client: Option<Object>,
    in_transaction: bool,
    rowcount: u64,
}

impl PostgresConnection {
    fn held(&self) -> SqlResult<&Object> {
        self.client.as_ref().ok_or(SqlError::NotConnected)
    }
}

#[async_trait::async_trait]
impl Connection for PostgresConnection {
    async fn begin(&mut self) -> SqlResult<()> {
        if self.client.is_some() {
            return Err(SqlError::AlreadyConnected);
        }
        self.client = Some(acquire(&self.pool, &self.config).await?);
        tracing::debug!("acquired PostgreSQL connection");
        Ok(())
    }

    async fn done(&mut self) -> SqlResult<()> {
        let client = self.client.take().ok_or(SqlError::NotConnected)?;
        if std::mem::take(&mut self.in_transaction) {
            if let Err(e) = client.simple_query("ROLLBACK").await {
                tracing::warn!(error = %e, "rollback before release failed; closing connection");
                drop(Object::take(client));
                return Ok(());
            }
            tracing::warn!("released PostgreSQL connection inside a transaction; rolled back");
        }
        drop(client);
        tracing::debug!("released PostgreSQL connection");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.client.is_some()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        let client = self.held()?;
        let span = statement_span("postgres", statement_kind(sql));
        let count = async {
            tracing::debug!(sql, params = params.len(), "execute");
            if params.is_empty() {
                // The simple protocol accepts scripts and transaction control.
                let messages = client.simple_query(sql).await.map_err(map_error)?;
                Ok::<u64, SqlError>(
                    messages
                        .iter()
                        .map(|m| match m {
                            SimpleQueryMessage::CommandComplete(n) => *n,
                            _ => 0,
                        })
                        .sum(),
                )
            } else {
                let bound = to_params(params);
                client.execute(sql, &param_refs(&bound)).await.map_err(map_error)
            }
        }
        .instrument(span)
        .await;
        if let Some(open) = transaction_effect(sql) {
            self.in_transaction = open && count.is_ok();
        }
        self.rowcount = count?;
        Ok(self.rowcount)
    }

    async fn fetchall(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        let client = self.held()?;
        let span = statement_span("postgres", statement_kind(sql));
        let rows = async {
            tracing::debug!(sql, params = params.len(), "query");
            let bound = to_params(params);
            let rows = client
                .query(sql, &param_refs(&bound))
                .await
                .map_err(map_error)?;
            rows.iter().map(convert_row).collect::<SqlResult<Vec<_>>>()
        }
        .instrument(span)
        .await?;
        self.rowcount = rows.len() as u64;
        Ok(rows)
    }

    fn rowcount(&self) -> u64 {
        self.rowcount
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if self.in_transaction {
                tracing::debug!("closing PostgreSQL connection dropped inside a transaction");
                drop(Object::take(client));
            }
        }
    }
}

fn map_pool_error(e: PoolError, timeout: Duration) -> SqlError {
    match e {
        PoolError::Timeout(_) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis(),
                "timed out waiting for a PostgreSQL connection"
            );
            SqlError::PoolTimeout(timeout)
        }
        PoolError::Closed => SqlError::PoolClosed,
        PoolError::Backend(e) => map_error(e),
        other => SqlError::Operational(other.to_string()),
    }
}

fn map_error(e: tokio_postgres::Error) -> SqlError {
    if e.is_closed() {
        return SqlError::Operational(e.to_string());
    }
    let class = e.code().map(|c| &c.code()[..2]);
    match class {
        Some("23") => SqlError::Integrity(e.to_string()),
        Some("08" | "40" | "53" | "57") => SqlError::Operational(e.to_string()),
        _ => SqlError::Database(e.to_string()),
    }
}

/// Binds a [`Value`] to whatever type the server expects for the parameter.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

impl ToSql for PgParam<'_> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::String(s) => s.to_sql(ty, out),
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::DateTime(dt) => dt.to_sql(ty, out),
            Value::DateTimeTz(dt) => dt.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            Value::List(_) => self.0.to_json().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn to_params(params: &[Value]) -> Vec<PgParam<'_>> {
    params.iter().map(PgParam).collect()
}

fn param_refs<'a>(params: &'a [PgParam<'_>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn convert_row(pg_row: &tokio_postgres::Row) -> SqlResult<Row> {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(pg_row, i, col.type_()))
        .collect::<SqlResult<Vec<_>>>()?;

    Row::new(columns, values)
}

fn convert_value(row: &tokio_postgres::Row, i: usize, ty: &Type) -> SqlResult<Value> {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        i: usize,
    ) -> SqlResult<Option<T>> {
        row.try_get::<_, Option<T>>(i)
            .map_err(|e| SqlError::Database(format!("Column {i}: {e}")))
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, i)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, i)?.map(|v| Value::Int(i64::from(v))),
        Type::INT4 => get::<i32>(row, i)?.map(|v| Value::Int(i64::from(v))),
        Type::INT8 => get::<i64>(row, i)?.map(Value::Int),
        Type::FLOAT4 => get::<f32>(row, i)?.map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, i)?.map(Value::Float),
        Type::BYTEA => get::<Vec<u8>>(row, i)?.map(Value::Bytes),
        Type::UUID => get::<uuid::Uuid>(row, i)?.map(Value::Uuid),
        Type::DATE => get::<chrono::NaiveDate>(row, i)?.map(Value::Date),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, i)?.map(Value::DateTime),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, i)?.map(Value::DateTimeTz),
        Type::TIME => get::<chrono::NaiveTime>(row, i)?.map(Value::Time),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, i)?.map(Value::Json),
        _ => row
            .try_get::<_, Option<String>>(i)
            .ok()
            .flatten()
            .map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}
