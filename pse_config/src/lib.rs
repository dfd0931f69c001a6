//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles exporter settings and database target descriptors

use config::{Config as ConfigBuilder, Environment, File};
use pse_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Environment variable prefix; nested keys use `__`, e.g. `PG_EXPORTER__SERVER__PORT`
pub const ENV_PREFIX: &str = "PG_EXPORTER";

/// Collectors enabled when the configuration does not name any
pub const DEFAULT_COLLECTORS: &[&str] = &["activity", "locks", "user_tables", "user_indexes"];

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub exporter: ExporterConfig,
    #[validate(nested)]
    pub targets: Vec<TargetDescriptor>,
}

/// HTTP exposition server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9187,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Scrape orchestration settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ExporterConfig {
    /// Names of the domain collectors to run on every scrape
    #[validate(length(min = 1))]
    pub collectors: Vec<String>,
    /// Client-side deadline for each per-target query
    #[validate(range(min = 1, max = 3600000))]
    pub query_timeout_ms: u64,
    /// Abort startup when any target cannot be connected; otherwise drop it
    pub fail_fast: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            collectors: DEFAULT_COLLECTORS.iter().map(|c| c.to_string()).collect(),
            query_timeout_ms: 10_000,
            fail_fast: true,
        }
    }
}

impl ExporterConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Default transaction isolation level requested for exporter sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadCommitted,
    #[default]
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Value for the `default_transaction_isolation` server setting
    pub fn as_pg_setting(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

/// Connection settings for one monitored database instance
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_pool_bounds"))]
pub struct TargetDescriptor {
    /// Display name used as the `target` label; defaults to `host:port/database`
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[validate(length(min = 1))]
    pub user: String,
    pub password: String,
    #[validate(length(min = 1))]
    pub database: String,
    pub application_name: String,
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,
    /// 0 = single attempt, N = N retries, negative = retry until cancelled
    pub max_connection_retries: i64,
    pub retry_delay_ms: u64,
    #[validate(range(min = 1, max = 1000))]
    pub pool_max_conns: u32,
    pub pool_min_conns: u32,
    pub pool_max_conn_lifetime_secs: u64,
    pub pool_max_conn_idle_time_secs: u64,
    pub statement_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    pub idle_in_transaction_session_timeout_ms: u64,
    pub default_isolation_level: IsolationLevel,
    pub read_only: bool,
}

impl Default for TargetDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            application_name: "pg-stat-exporter".to_string(),
            connect_timeout_ms: 10_000,
            max_connection_retries: 6,
            retry_delay_ms: 2_000,
            pool_max_conns: 10,
            pool_min_conns: 2,
            pool_max_conn_lifetime_secs: 3600,
            pool_max_conn_idle_time_secs: 1800,
            statement_timeout_ms: 5_000,
            lock_timeout_ms: 0,
            idle_in_transaction_session_timeout_ms: 5_000,
            default_isolation_level: IsolationLevel::RepeatableRead,
            read_only: false,
        }
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("application_name", &self.application_name)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("max_connection_retries", &self.max_connection_retries)
            .field("pool_max_conns", &self.pool_max_conns)
            .field("pool_min_conns", &self.pool_min_conns)
            .field("default_isolation_level", &self.default_isolation_level)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl TargetDescriptor {
    /// Name used in logs and as the `target` label value
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn pool_max_conn_lifetime(&self) -> Duration {
        Duration::from_secs(self.pool_max_conn_lifetime_secs)
    }

    pub fn pool_max_conn_idle_time(&self) -> Duration {
        Duration::from_secs(self.pool_max_conn_idle_time_secs)
    }
}

fn validate_pool_bounds(target: &TargetDescriptor) -> std::result::Result<(), ValidationError> {
    if target.pool_min_conns > target.pool_max_conns {
        let mut err = ValidationError::new("pool_bounds");
        err.message = Some("pool_min_conns must not exceed pool_max_conns".into());
        return Err(err);
    }
    Ok(())
}

impl Config {
    /// Load configuration from an optional file and `PG_EXPORTER__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        // Environment variables have the highest priority
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("exporter.collectors"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed.check()?;
        Ok(parsed)
    }

    /// Field validation plus the cross-target rules
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        if self.targets.is_empty() {
            return Err(Error::Config(
                "at least one database target must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            let name = target.display_name();
            if !seen.insert(name.clone()) {
                return Err(Error::Config(format!("duplicate target name '{}'", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    const TWO_TARGETS: &str = r#"
[server]
port = 9300

[exporter]
collectors = ["activity", "locks", "statements"]
query_timeout_ms = 2500

[[targets]]
name = "primary"
host = "db-primary"
password = "s3cret-primary"

[[targets]]
host = "db-replica"
port = 5433
database = "app"
read_only = true
max_connection_retries = -1
default_isolation_level = "READ_COMMITTED"
"#;

    #[test]
    fn test_load_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config(TWO_TARGETS);

        let config = Config::load(Some(file.path())).expect("Should load from file");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9300);
        assert_eq!(config.exporter.collectors, vec!["activity", "locks", "statements"]);
        assert_eq!(config.exporter.query_timeout(), Duration::from_millis(2500));
        assert!(config.exporter.fail_fast);

        assert_eq!(config.targets.len(), 2);
        let primary = &config.targets[0];
        assert_eq!(primary.display_name(), "primary");
        assert_eq!(primary.port, 5432);
        assert_eq!(primary.max_connection_retries, 6);
        assert_eq!(primary.retry_delay(), Duration::from_secs(2));
        assert_eq!(primary.default_isolation_level, IsolationLevel::RepeatableRead);

        let replica = &config.targets[1];
        assert_eq!(replica.display_name(), "db-replica:5433/app");
        assert!(replica.read_only);
        assert_eq!(replica.max_connection_retries, -1);
        assert_eq!(replica.default_isolation_level, IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_zero_targets_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config("[server]\nport = 9187\n");

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("at least one database target"));
    }

    #[test]
    fn test_duplicate_target_names_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config(
            "[[targets]]\nname = \"a\"\nhost = \"h1\"\n[[targets]]\nname = \"a\"\nhost = \"h2\"\n",
        );

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("duplicate target name 'a'"));
    }

    #[test]
    fn test_pool_bounds_validation() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config(
            "[[targets]]\nhost = \"h1\"\npool_min_conns = 20\npool_max_conns = 5\n",
        );

        let result = Config::load(Some(file.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_isolation_level_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config(
            "[[targets]]\nhost = \"h1\"\ndefault_isolation_level = \"READ_UNCOMMITTED\"\n",
        );

        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let err = Config::load(Some(Path::new("/nonexistent/pg-exporter.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config(TWO_TARGETS);

        env::set_var("PG_EXPORTER__SERVER__PORT", "9400");
        env::set_var("PG_EXPORTER__EXPORTER__FAIL_FAST", "false");

        let result = Config::load(Some(file.path()));

        // Cleanup before asserting so a failure doesn't leak into other tests
        env::remove_var("PG_EXPORTER__SERVER__PORT");
        env::remove_var("PG_EXPORTER__EXPORTER__FAIL_FAST");

        let config = result.expect("Should load with env overrides");
        assert_eq!(config.server.port, 9400);
        assert!(!config.exporter.fail_fast);
    }

    #[test]
    fn test_secret_redaction() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let file = write_config(TWO_TARGETS);

        let config = Config::load(Some(file.path())).expect("Should load from file");
        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("s3cret-primary"));
    }

    #[test]
    fn test_isolation_level_settings() {
        assert_eq!(IsolationLevel::ReadCommitted.as_pg_setting(), "read committed");
        assert_eq!(IsolationLevel::default().as_pg_setting(), "repeatable read");
        assert_eq!(IsolationLevel::Serializable.as_pg_setting(), "serializable");
    }
}
