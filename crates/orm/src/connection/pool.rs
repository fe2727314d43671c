//! Shared Connection Pool Registry
//!
//! Pooled drivers built from equal configurations share one pool. Pools are
//! keyed by the serialized configuration and created lazily: no connection
//! is opened until the first statement borrows one.

use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::backends::postgres::connect_options;
use crate::config::ConnectionConfig;
use crate::error::OrmResult;

static GLOBAL_POOLS: Lazy<PoolRegistry> = Lazy::new(PoolRegistry::new);

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
}

impl PoolStats {
    pub fn active_connections(&self) -> u32 {
        self.total_connections.saturating_sub(self.idle_connections)
    }

    /// Active connections as a percentage of the maximum
    pub fn utilization(&self) -> f64 {
        if self.max_connections > 0 {
            (self.active_connections() as f64 / self.max_connections as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Configuration-keyed map of shared pools
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: DashMap<String, PgPool>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static PoolRegistry {
        &GLOBAL_POOLS
    }

    /// Return the pool for `config`, creating it on first use.
    ///
    /// Creation and insertion happen under the map's entry lock, so two
    /// concurrent callers with equal configurations get the same pool.
    /// Must be called from within a tokio runtime.
    pub fn get_or_create(&self, config: &ConnectionConfig) -> OrmResult<PgPool> {
        let key = config.pool_key()?;

        let pool = self
            .pools
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(
                    "Creating connection pool for {}:{}/{} (max {})",
                    config.host,
                    config.port,
                    config.database,
                    config.max_connections
                );
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect_lazy_with(connect_options(config))
            })
            .clone();

        Ok(pool)
    }

    /// Whether a pool exists for `config`
    pub fn contains(&self, config: &ConnectionConfig) -> bool {
        config
            .pool_key()
            .map(|key| self.pools.contains_key(&key))
            .unwrap_or(false)
    }

    pub fn stats(&self, config: &ConnectionConfig) -> Option<PoolStats> {
        let key = config.pool_key().ok()?;
        self.pools.get(&key).map(|pool| PoolStats {
            total_connections: pool.size(),
            idle_connections: pool.num_idle() as u32,
            max_connections: pool.options().get_max_connections(),
        })
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Close and forget every pool; for process shutdown
    pub async fn close_all(&self) {
        let pools: Vec<PgPool> = self.pools.iter().map(|entry| entry.value().clone()).collect();
        self.pools.clear();

        for pool in pools {
            pool.close().await;
        }
        tracing::debug!("Closed all shared connection pools");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_equal_configs_share_a_pool() {
        let registry = PoolRegistry::new();
        let config = ConnectionConfig::from_url("postgres://localhost/app").unwrap();

        registry.get_or_create(&config).unwrap();
        registry.get_or_create(&config.clone()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&config));

        let other = ConnectionConfig::from_url("postgres://localhost/other").unwrap();
        assert!(!registry.contains(&other));
        registry.get_or_create(&other).unwrap();
        assert_eq!(registry.len(), 2);

        registry.close_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_lazy_pool_opens_nothing() {
        let registry = PoolRegistry::new();
        let config = ConnectionConfig::from_url("postgres://localhost/app?max_connections=4").unwrap();
        registry.get_or_create(&config).unwrap();

        let stats = registry.stats(&config).unwrap();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.max_connections, 4);
        assert_eq!(stats.active_connections(), 0);
        assert_eq!(stats.utilization(), 0.0);
    }
}
