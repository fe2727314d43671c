//! Driver - executes compiled SQL over a transport
//!
//! A driver pairs a [`Query`] factory with one [`Transport`]. The transport
//! strategy (shared pool or exclusive client) is picked once, at
//! construction, by the adapter. Statements are plain SQL text, one per call.

pub mod coercion;
pub mod operations;

use std::collections::HashMap;
use std::sync::Arc;

pub use coercion::{ArrayElement, CustomType, Property, PropertyType, TypeCoercer};
pub use operations::{
    CountOptions, EagerAssociation, ExistsFilter, FindOptions, JoinSpec, MergeSpec, OrderSpec,
};

use crate::backends::{AdapterRegistry, DatabaseAdapter, DatabaseValue, Row, Transport};
use crate::config::{ConnectionConfig, DriverOptions};
use crate::connection::PoolRegistry;
use crate::error::{OrmError, OrmResult};
use crate::query::Query;
use crate::sql::dialect::Dialect;

/// Statement used by `ping`
const PING_SQL: &str = "SELECT * FROM pg_stat_activity LIMIT 1";

/// Database driver bound to one configuration
pub struct Driver {
    config: ConnectionConfig,
    options: DriverOptions,
    query: Query,
    transport: Arc<dyn Transport>,
    coercer: TypeCoercer,
}

impl Driver {
    /// PostgreSQL driver from the global adapter and pool registries
    pub fn new(config: ConnectionConfig, options: DriverOptions) -> OrmResult<Self> {
        Self::with_registries("postgres", config, options, AdapterRegistry::global(), PoolRegistry::global())
    }

    /// PostgreSQL driver configured from `DATABASE_URL` and its overrides
    pub fn from_env(options: DriverOptions) -> OrmResult<Self> {
        Self::new(ConnectionConfig::from_env()?, options)
    }

    /// Driver for the adapter registered as `adapter_name`
    pub fn with_registries(
        adapter_name: &str,
        config: ConnectionConfig,
        options: DriverOptions,
        adapters: &AdapterRegistry,
        pools: &PoolRegistry,
    ) -> OrmResult<Self> {
        let adapter = adapters.get(adapter_name)?;
        Self::from_adapter(adapter.as_ref(), config, options, pools)
    }

    pub fn from_adapter(
        adapter: &dyn DatabaseAdapter,
        config: ConnectionConfig,
        options: DriverOptions,
        pools: &PoolRegistry,
    ) -> OrmResult<Self> {
        let transport = adapter.create_transport(&config, &options, pools)?;
        tracing::debug!(
            "Created {} driver for {}:{}/{} (pooled: {})",
            adapter.name(),
            config.host,
            config.port,
            config.database,
            transport.is_pooled()
        );
        Ok(Self::with_transport(transport, adapter.dialect(), config, options))
    }

    /// Driver over an already constructed transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        dialect: Arc<dyn Dialect>,
        config: ConnectionConfig,
        options: DriverOptions,
    ) -> Self {
        let timezone = config.timezone();
        Self {
            query: Query::new(dialect, timezone.clone()),
            coercer: TypeCoercer::new(timezone),
            config,
            options,
            transport,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn is_pooled(&self) -> bool {
        self.transport.is_pooled()
    }

    pub async fn connect(&self) -> OrmResult<()> {
        self.transport.connect().await
    }

    /// Close the owned connection. Pooled drivers leave the shared pool open.
    pub async fn close(&self) -> OrmResult<()> {
        self.transport.close().await
    }

    /// Execute one statement and return its rows
    pub async fn execute(&self, sql: &str) -> OrmResult<Vec<Row>> {
        if self.options.debug {
            tracing::info!(target: "quarry_orm::sql", dialect = self.query.dialect().name(), "{}", sql);
        }

        self.transport.query(sql).await.map_err(|e| {
            tracing::error!("Statement failed: {} ({})", e, sql);
            e
        })
    }

    /// Round trip to the server
    pub async fn ping(&self) -> OrmResult<()> {
        self.execute(PING_SQL).await.map(|_| ())
    }

    pub async fn begin(&self) -> OrmResult<()> {
        self.transaction_statement("BEGIN").await
    }

    pub async fn commit(&self) -> OrmResult<()> {
        self.transaction_statement("COMMIT").await
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        self.transaction_statement("ROLLBACK").await
    }

    async fn transaction_statement(&self, statement: &str) -> OrmResult<()> {
        self.execute(statement).await?;
        tracing::debug!("Transaction {}", statement);
        Ok(())
    }

    /// Subscribe to out-of-band connection errors
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&OrmError) + Send + Sync + 'static,
    {
        self.transport.on_error(Arc::new(handler));
    }

    /// Register coercion rules for a custom property type
    pub fn register_custom_type(&mut self, name: &str, custom: impl CustomType + 'static) {
        self.coercer.register(name, Arc::new(custom));
    }

    pub fn custom_types(&self) -> &HashMap<String, Arc<dyn CustomType>> {
        self.coercer.custom_types()
    }

    /// Storage value to caller-facing value
    pub fn value_to_property(&self, value: DatabaseValue, property: &Property) -> DatabaseValue {
        self.coercer.value_to_property(value, property)
    }

    /// Caller-facing value to storage value
    pub fn property_to_value(&self, value: DatabaseValue, property: &Property) -> DatabaseValue {
        self.coercer.property_to_value(value, property)
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("pooled", &self.transport.is_pooled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pooled_driver_from_registries() {
        let pools = PoolRegistry::new();
        let adapters = AdapterRegistry::with_defaults();
        let config = ConnectionConfig::from_url("postgres://localhost/app?timezone=Z").unwrap();

        let driver =
            Driver::with_registries("pg", config.clone(), DriverOptions::pooled(), &adapters, &pools).unwrap();
        assert!(driver.is_pooled());
        assert_eq!(driver.query().dialect().name(), "postgresql");
        assert_eq!(driver.query().timezone().offset_minutes(), Some(0));

        // A second pooled driver with the same configuration reuses the pool
        Driver::with_registries("postgres", config, DriverOptions::pooled(), &adapters, &pools).unwrap();
        assert_eq!(pools.len(), 1);

        // Closing a pooled driver leaves the shared pool alone
        driver.close().await.unwrap();
        assert_eq!(pools.len(), 1);
    }

    #[test]
    fn test_client_driver_opens_no_pool() {
        let pools = PoolRegistry::new();
        let adapters = AdapterRegistry::with_defaults();
        let config = ConnectionConfig::default();

        let driver =
            Driver::with_registries("postgresql", config, DriverOptions::default(), &adapters, &pools).unwrap();
        assert!(!driver.is_pooled());
        assert!(pools.is_empty());
    }

    #[test]
    fn test_unknown_adapter_name() {
        let err = Driver::with_registries(
            "mssql",
            ConnectionConfig::default(),
            DriverOptions::default(),
            &AdapterRegistry::with_defaults(),
            &PoolRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(err, OrmError::UnknownAdapter(_)));
    }
}
