//! Driver configuration
//!
//! `ConnectionConfig` is what the transport connects with; its serialized
//! form doubles as the pool-registry key, so two drivers built from equal
//! configurations share one pool. `DriverOptions` carries the behavior
//! switches that are not part of the connection identity.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};

static TIMEZONE_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+\-\s])(\d\d):?(\d\d)?").expect("valid timezone regex"));

/// Connection configuration consumed at driver construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    /// `local`, `Z`, or a `+HH:MM` style offset
    pub timezone: String,
    pub max_connections: u32,
    /// Extra URL query parameters, kept sorted for a stable pool key
    pub params: BTreeMap<String, String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: None,
            password: None,
            ssl: false,
            timezone: "local".to_string(),
            max_connections: 10,
            params: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Parse a `postgres://` or `postgresql://` URL
    pub fn from_url(database_url: &str) -> OrmResult<Self> {
        let parsed = url::Url::parse(database_url)?;

        if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
            return Err(OrmError::Configuration(format!(
                "Invalid PostgreSQL URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| OrmError::Configuration("Missing host in database URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(OrmError::Configuration("Missing database name in URL".to_string()));
        }

        let mut config = ConnectionConfig {
            host,
            port: parsed.port().unwrap_or(5432),
            database,
            user: (!parsed.username().is_empty()).then(|| parsed.username().to_string()),
            password: parsed.password().map(|p| p.to_string()),
            ..Default::default()
        };

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "ssl" => config.ssl = value == "true" || value == "1",
                "sslmode" => config.ssl = value != "disable",
                "timezone" => config.timezone = value.to_string(),
                "max_connections" | "pool_max" => {
                    config.max_connections = value.parse().map_err(|_| {
                        OrmError::Configuration(format!("Invalid max_connections '{}'", value))
                    })?;
                }
                _ => {
                    config.params.insert(key.to_string(), value.to_string());
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from `DATABASE_URL`, with optional `DATABASE_TIMEZONE` and `DATABASE_SSL` overrides
    pub fn from_env() -> OrmResult<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| OrmError::Configuration("DATABASE_URL is not set".to_string()))?;
        let mut config = Self::from_url(&database_url)?;

        if let Some(timezone) = lookup("DATABASE_TIMEZONE") {
            config.timezone = timezone;
        }
        if let Some(ssl) = lookup("DATABASE_SSL") {
            config.ssl = matches!(ssl.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.host.is_empty() {
            return Err(OrmError::Configuration("host must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(OrmError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed timezone setting
    pub fn timezone(&self) -> Timezone {
        self.timezone.parse().unwrap_or(Timezone::Local)
    }

    /// Serialized form used to key the shared pool
    pub fn pool_key(&self) -> OrmResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Timezone used when formatting and coercing date values
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Timezone {
    /// Leave dates in the process' local time
    #[default]
    Local,
    /// Fixed offset east of UTC, in minutes
    Offset(i32),
    /// A setting that is neither `local` nor an offset; only the UTC stage applies
    Unrecognized(String),
}

impl Timezone {
    pub fn is_local(&self) -> bool {
        matches!(self, Timezone::Local)
    }

    /// Offset in minutes, if this is a fixed offset
    pub fn offset_minutes(&self) -> Option<i32> {
        match self {
            Timezone::Offset(minutes) => Some(*minutes),
            _ => None,
        }
    }
}

impl FromStr for Timezone {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "local" {
            return Ok(Timezone::Local);
        }
        if s == "Z" {
            return Ok(Timezone::Offset(0));
        }

        match TIMEZONE_OFFSET.captures(s) {
            Some(caps) => {
                let sign = if &caps[1] == "-" { -1 } else { 1 };
                let hours: i32 = caps[2].parse().unwrap_or(0);
                let minutes: i32 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
                Ok(Timezone::Offset(sign * (hours * 60 + minutes)))
            }
            None => Ok(Timezone::Unrecognized(s.to_string())),
        }
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::Local => write!(f, "local"),
            Timezone::Offset(0) => write!(f, "Z"),
            Timezone::Offset(minutes) => {
                let sign = if *minutes < 0 { '-' } else { '+' };
                let minutes = minutes.abs();
                write!(f, "{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
            }
            Timezone::Unrecognized(raw) => write!(f, "{}", raw),
        }
    }
}

/// Called once per non-pooled statement with elapsed time and SQL text
pub type Profiler = Arc<dyn Fn(Duration, &str) + Send + Sync>;

/// Behavior switches for a driver instance
#[derive(Clone, Default)]
pub struct DriverOptions {
    /// Borrow connections from the shared pool instead of owning one
    pub pool: bool,
    /// Log every executed statement
    pub debug: bool,
    pub profiler: Option<Profiler>,
}

impl DriverOptions {
    pub fn pooled() -> Self {
        Self {
            pool: true,
            ..Default::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_profiler<F>(mut self, profiler: F) -> Self
    where
        F: Fn(Duration, &str) + Send + Sync + 'static,
    {
        self.profiler = Some(Arc::new(profiler));
        self
    }
}

impl fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverOptions")
            .field("pool", &self.pool)
            .field("debug", &self.debug)
            .field("profiler", &self.profiler.is_some())
            .finish()
    }
}
