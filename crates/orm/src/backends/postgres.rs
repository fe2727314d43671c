//! PostgreSQL Backend Implementation
//!
//! Pooled and exclusive transports over sqlx. Statements are sent as plain
//! SQL text through the simple query protocol, so every column arrives in
//! text format and is decoded by the column's type name.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgRow, PgSslMode};
use sqlx::{Column, Connection, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use super::core::*;
use crate::config::{ConnectionConfig, DriverOptions, Profiler};
use crate::connection::PoolRegistry;
use crate::error::{OrmError, OrmResult};
use crate::sql::dialect::{Dialect, PostgresDialect};

/// PostgreSQL adapter, registered as `postgres` with aliases `postgresql` and `pg`
#[derive(Debug, Default)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl DatabaseAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(PostgresDialect::new())
    }

    fn create_transport(
        &self,
        config: &ConnectionConfig,
        options: &DriverOptions,
        pools: &PoolRegistry,
    ) -> OrmResult<Arc<dyn Transport>> {
        config.validate()?;

        if options.pool {
            let pool = pools.get_or_create(config)?;
            Ok(Arc::new(PooledTransport::new(pool)))
        } else {
            Ok(Arc::new(ClientTransport::new(
                connect_options(config),
                options.profiler.clone(),
            )))
        }
    }
}

/// Build sqlx connect options from a connection config
pub fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .ssl_mode(if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        });

    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(application_name) = config.params.get("application_name") {
        options = options.application_name(application_name);
    }

    options
}

/// Borrows a connection from the shared pool for every statement
#[derive(Debug, Clone)]
pub struct PooledTransport {
    pool: PgPool,
}

impl PooledTransport {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Transport for PooledTransport {
    async fn connect(&self) -> OrmResult<()> {
        // Borrow and hand back one connection to prove the pool is reachable
        let connection = self.pool.acquire().await?;
        drop(connection);
        Ok(())
    }

    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        let mut connection = self.pool.acquire().await.map_err(|e| {
            tracing::error!("Failed to acquire pooled connection: {}", e);
            OrmError::from(e)
        })?;

        // The borrowed connection returns to the pool when dropped, on both paths
        let rows = (&mut *connection).fetch_all(sql).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn close(&self) -> OrmResult<()> {
        Ok(())
    }

    fn is_pooled(&self) -> bool {
        true
    }

    fn on_error(&self, _handler: ErrorHandler) {}
}

/// Owns one connection for the lifetime of the driver
pub struct ClientTransport {
    options: PgConnectOptions,
    connection: Mutex<Option<PgConnection>>,
    handlers: StdMutex<Vec<ErrorHandler>>,
    profiler: Option<Profiler>,
}

impl ClientTransport {
    pub fn new(options: PgConnectOptions, profiler: Option<Profiler>) -> Self {
        Self {
            options,
            connection: Mutex::new(None),
            handlers: StdMutex::new(Vec::new()),
            profiler,
        }
    }

    /// Whether the client currently holds an open connection
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    fn notify(&self, error: &OrmError) {
        let handlers: Vec<ErrorHandler> = self.handlers.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for handler in &handlers {
            handler(error);
        }
    }
}

#[async_trait]
impl Transport for ClientTransport {
    async fn connect(&self) -> OrmResult<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let connection = PgConnection::connect_with(&self.options).await.map_err(|e| {
            let error = OrmError::from(e);
            tracing::error!("Failed to open client connection: {}", error);
            error
        })?;
        *guard = Some(connection);
        tracing::debug!("Client connection opened");
        Ok(())
    }

    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| OrmError::Connection("client is not connected".to_string()))?;

        let started = Instant::now();
        let result = connection.fetch_all(sql).await;
        if let Some(profiler) = &self.profiler {
            profiler(started.elapsed(), sql);
        }

        match result {
            Ok(rows) => rows.iter().map(decode_row).collect(),
            Err(e) => {
                let connection_lost = is_connection_error(&e);
                let error = OrmError::from(e);
                if connection_lost {
                    tracing::error!("Client connection error: {}", error);
                    self.notify(&error);
                }
                Err(error)
            }
        }
    }

    async fn close(&self) -> OrmResult<()> {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await?;
            tracing::debug!("Client connection closed");
        }
        Ok(())
    }

    fn is_pooled(&self) -> bool {
        false
    }

    fn on_error(&self, handler: ErrorHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }
}

fn is_connection_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) | sqlx::Error::WorkerCrashed
    )
}

/// Decode every column of a PostgreSQL row, in column order
pub fn decode_row(row: &PgRow) -> OrmResult<Row> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        decoded.insert(column.name(), decode_value(row, index)?);
    }
    Ok(decoded)
}

/// Convert a PostgreSQL column value to DatabaseValue
fn decode_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name();
    let failed = |e: sqlx::Error| {
        OrmError::Query(format!("Failed to decode {} column {}: {}", type_name, index, e))
    };

    let value = match type_name {
        "BOOL" => DatabaseValue::Bool(row.try_get(index).map_err(failed)?),
        "INT2" => DatabaseValue::Int32(row.try_get::<i16, _>(index).map_err(failed)? as i32),
        "INT4" => DatabaseValue::Int32(row.try_get(index).map_err(failed)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index).map_err(failed)?),
        "FLOAT4" => DatabaseValue::Float32(row.try_get(index).map_err(failed)?),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index).map_err(failed)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            DatabaseValue::String(row.try_get(index).map_err(failed)?)
        }
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index).map_err(failed)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index).map_err(failed)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index).map_err(failed)?),
        // Wall-clock timestamps are read as UTC; timezone coercion shifts them
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index).map_err(failed)?;
            DatabaseValue::DateTime(naive.and_utc())
        }
        "DATE" => DatabaseValue::Date(row.try_get(index).map_err(failed)?),
        "TIME" => DatabaseValue::Time(row.try_get(index).map_err(failed)?),
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index).map_err(failed)?),
        // Anything else (numeric, point, arrays, enums) keeps its text form
        _ => DatabaseValue::String(row.try_get_unchecked::<String, _>(index).map_err(failed)?),
    };

    Ok(value)
}
