//! MySQL engine using `mysql_async`.
//!
//! The query builder renders MySQL parameters as `%s`; they are rewritten to
//! the driver's `?` markers just before a statement is sent. Identifiers are
//! double-quoted, so every session runs with `ANSI_QUOTES` enabled.

use std::sync::{Mutex, PoisonError};

use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, PoolConstraints, PoolOpts};
use supersql_core::logging::statement_span;
use supersql_core::{DatabaseSettings, SqlError, SqlResult};
use supersql_query::{Dialect, Row, Value};
use tracing::Instrument;

use crate::base::{statement_kind, transaction_effect, Connection, Engine, PoolConfig};

/// Rewrites `%s` placeholders to `?`, leaving quoted literals untouched.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            (None, '%') if chars.peek() == Some(&'s') => {
                chars.next();
                out.push('?');
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Session setup run on every new connection.
pub const SESSION_INIT: &str = "SET SESSION sql_mode = CONCAT(@@sql_mode, ',ANSI_QUOTES')";

/// Builds `mysql_async` connection options for `settings`.
///
/// Connections are reset when they return to the pool, which rolls back any
/// transaction a dropped session left open.
pub fn mysql_opts(settings: &DatabaseSettings, pool: &PoolConfig) -> OptsBuilder {
    let constraints = PoolConstraints::new(pool.min_size, pool.max_size).unwrap_or_default();
    let mut pool_opts = PoolOpts::default()
        .with_constraints(constraints)
        .with_reset_connection(true)
        .with_abs_conn_ttl(pool.recycle);
    if let Some(recycle) = pool.recycle {
        pool_opts = pool_opts.with_inactive_connection_ttl(recycle);
    }
    OptsBuilder::default()
        .ip_or_hostname(settings.host.clone())
        .tcp_port(settings.port)
        .user(Some(settings.user.clone()).filter(|u| !u.is_empty()))
        .pass(Some(settings.password.clone()).filter(|p| !p.is_empty()))
        .db_name(Some(settings.name.clone()))
        .init(vec![SESSION_INIT])
        .pool_opts(pool_opts)
}

/// A pooled MySQL database.
pub struct MySqlEngine {
    settings: DatabaseSettings,
    config: PoolConfig,
    pool: Mutex<Option<mysql_async::Pool>>,
}

impl std::fmt::Debug for MySqlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlEngine")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("name", &self.settings.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MySqlEngine {
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

    fn pool(&self) -> SqlResult<mysql_async::Pool> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SqlError::NotConnected)
    }
}

#[async_trait::async_trait]
impl Engine for MySqlEngine {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn connect(&self) -> SqlResult<()> {
        if self.is_connected() {
            return Err(SqlError::AlreadyConnected);
        }
        let pool = mysql_async::Pool::new(mysql_opts(&self.settings, &self.config));

        let mut warm = Vec::with_capacity(self.config.min_size);
        for _ in 0..self.config.min_size {
            match acquire(&pool, &self.config).await {
                Ok(conn) => warm.push(conn),
                Err(e) => {
                    drop(warm);
                    close_pool(pool).await;
                    return Err(e);
                }
            }
        }
        drop(warm);

        let rejected = {
            let mut slot = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                Some(pool)
            } else {
                *slot = Some(pool);
                None
            }
        };
        if let Some(pool) = rejected {
            close_pool(pool).await;
            return Err(SqlError::AlreadyConnected);
        }
        tracing::info!(
            host = %self.settings.host,
            port = self.settings.port,
            database = %self.settings.name,
            max_size = self.config.max_size,
            "connected to MySQL"
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
        pool.disconnect().await.map_err(map_error)?;
        tracing::info!(database = %self.settings.name, "disconnected from MySQL");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn connection(&self) -> SqlResult<Box<dyn Connection>> {
        Ok(Box::new(MySqlConnection {
            pool: self.pool()?,
            config: self.config,
            conn: None,
            in_transaction: false,
            rowcount: 0,
        }))
    }
}

/// Disconnects a pool that never became the engine's, logging any failure.
async fn close_pool(pool: mysql_async::Pool) {
    if let Err(e) = pool.disconnect().await {
        tracing::warn!(error = %e, "failed to close MySQL pool");
    }
}

async fn acquire(pool: &mysql_async::Pool, config: &PoolConfig) -> SqlResult<Conn> {
    match tokio::time::timeout(config.timeout, pool.get_conn()).await {
        Ok(conn) => conn.map_err(map_error),
        Err(_) => {
            tracing::warn!(
                timeout_ms = config.timeout.as_millis(),
                "timed out waiting for a MySQL connection"
            );
            Err(SqlError::PoolTimeout(config.timeout))
        }
    }
}

/// A handle onto one pooled MySQL connection.
pub struct MySqlConnection {
    pool: mysql_async::Pool,
    config: PoolConfig,
    conn: Option<Conn>,
    in_transaction: bool,
    rowcount: u64,
}

impl MySqlConnection {
    fn held(&mut self) -> SqlResult<&mut Conn> {
        self.conn.as_mut().ok_or(SqlError::NotConnected)
    }
}

#[async_trait::async_trait]
impl Connection for MySqlConnection {
    async fn begin(&mut self) -> SqlResult<()> {
        if self.conn.is_some() {
            return Err(SqlError::AlreadyConnected);
        }
        self.conn = Some(acquire(&self.pool, &self.config).await?);
        tracing::debug!("acquired MySQL connection");
        Ok(())
    }

    async fn done(&mut self) -> SqlResult<()> {
        let mut conn = self.conn.take().ok_or(SqlError::NotConnected)?;
        if std::mem::take(&mut self.in_transaction) {
            if let Err(e) = conn.query_drop("ROLLBACK").await {
                tracing::warn!(error = %e, "rollback before release failed; closing connection");
                if let Err(e) = conn.disconnect().await {
                    tracing::warn!(error = %e, "failed to close MySQL connection");
                }
                return Ok(());
            }
            tracing::warn!("released MySQL connection inside a transaction; rolled back");
        }
        drop(conn);
        tracing::debug!("released MySQL connection");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        let span = statement_span("mysql", statement_kind(sql));
        let sql = rewrite_placeholders(sql);
        let conn = self.held()?;
        let count = async {
            tracing::debug!(sql = %sql, params = params.len(), "execute");
            if params.is_empty() {
                conn.query_drop(sql.as_str()).await.map_err(map_error)?;
            } else {
                conn.exec_drop(sql.as_str(), Params::Positional(values_to_params(params)))
                    .await
                    .map_err(map_error)?;
            }
            Ok::<_, SqlError>(conn.affected_rows())
        }
        .instrument(span)
        .await;
        if let Some(open) = transaction_effect(&sql) {
            self.in_transaction = open && count.is_ok();
        }
        self.rowcount = count?;
        Ok(self.rowcount)
    }

    async fn fetchall(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        let span = statement_span("mysql", statement_kind(sql));
        let sql = rewrite_placeholders(sql);
        let conn = self.held()?;
        let rows = async {
            tracing::debug!(sql = %sql, params = params.len(), "query");
            let raw: Vec<mysql_async::Row> = if params.is_empty() {
                conn.query(sql.as_str()).await.map_err(map_error)?
            } else {
                conn.exec(sql.as_str(), Params::Positional(values_to_params(params)))
                    .await
                    .map_err(map_error)?
            };
            raw.into_iter().map(convert_row).collect::<SqlResult<Vec<_>>>()
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

fn map_error(e: mysql_async::Error) -> SqlError {
    match &e {
        mysql_async::Error::Server(server) if server.state.starts_with("23") => {
            SqlError::Integrity(e.to_string())
        }
        mysql_async::Error::Io(_) | mysql_async::Error::Driver(_) => {
            SqlError::Operational(e.to_string())
        }
        _ => SqlError::Database(e.to_string()),
    }
}

/// Converts `Value`s to `mysql_async` parameter values.
fn values_to_params(params: &[Value]) -> Vec<mysql_async::Value> {
    params
        .iter()
        .map(|v| match v {
            Value::Null => mysql_async::Value::NULL,
            Value::Bool(b) => mysql_async::Value::from(*b),
            Value::Int(i) => mysql_async::Value::from(*i),
            Value::Float(f) => mysql_async::Value::from(*f),
            Value::String(s) => mysql_async::Value::from(s.as_str()),
            Value::Bytes(b) => mysql_async::Value::from(b.as_slice()),
            Value::Date(d) => mysql_async::Value::from(d.to_string()),
            Value::DateTime(dt) => mysql_async::Value::from(dt.to_string()),
            Value::DateTimeTz(dt) => mysql_async::Value::from(dt.naive_utc().to_string()),
            Value::Time(t) => mysql_async::Value::from(t.to_string()),
            Value::Uuid(u) => mysql_async::Value::from(u.to_string()),
            Value::Json(j) => mysql_async::Value::from(j.to_string()),
            Value::List(_) => mysql_async::Value::from(v.to_json().to_string()),
        })
        .collect()
}

fn convert_row(mysql_row: mysql_async::Row) -> SqlResult<Row> {
    let columns: Vec<String> = mysql_row
        .columns_ref()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect();
    let types: Vec<ColumnType> = mysql_row
        .columns_ref()
        .iter()
        .map(mysql_async::Column::column_type)
        .collect();

    let values = types
        .iter()
        .enumerate()
        .map(|(i, ty)| convert_value(mysql_row.get(i), *ty))
        .collect();

    Row::new(columns, values)
}

fn convert_value(value: Option<mysql_async::Value>, ty: ColumnType) -> Value {
    match value {
        None | Some(mysql_async::Value::NULL) => Value::Null,
        Some(mysql_async::Value::Bytes(b)) => match ty {
            ColumnType::MYSQL_TYPE_JSON => serde_json::from_slice(&b)
                .map_or_else(|_| Value::Bytes(b), Value::Json),
            _ => match String::from_utf8(b) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
        },
        Some(mysql_async::Value::Int(i)) => Value::Int(i),
        Some(mysql_async::Value::UInt(u)) => {
            i64::try_from(u).map_or_else(|_| Value::String(u.to_string()), Value::Int)
        }
        Some(mysql_async::Value::Float(f)) => Value::Float(f64::from(f)),
        Some(mysql_async::Value::Double(d)) => Value::Float(d),
        Some(mysql_async::Value::Date(y, mo, d, h, mi, s, us)) => {
            let date = chrono::NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d));
            match (ty, date) {
                (ColumnType::MYSQL_TYPE_DATE, Some(date)) => Value::Date(date),
                (_, Some(date)) => date
                    .and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                    .map_or(Value::Null, Value::DateTime),
                (_, None) => Value::Null,
            }
        }
        Some(mysql_async::Value::Time(neg, days, h, mi, s, us)) => {
            let total_hours = days * 24 + u32::from(h);
            let sign = if neg { "-" } else { "" };
            match chrono::NaiveTime::from_hms_micro_opt(total_hours, u32::from(mi), u32::from(s), us)
            {
                Some(t) if !neg => Value::Time(t),
                _ => Value::String(format!("{sign}{total_hours:02}:{mi:02}:{s:02}.{us:06}")),
            }
        }
    }
}
