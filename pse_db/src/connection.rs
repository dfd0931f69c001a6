//! ABOUTME: Pooled PostgreSQL connection to one monitored database instance
//! ABOUTME: Built through the retry loop; exposes query, ping, and close

use async_trait::async_trait;
use pse_config::TargetDescriptor;
use pse_core::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::retry::{connect_with_retry, RetryPolicy};
use crate::{Record, Target};

/// Connection pool bound to a single target
#[derive(Debug, Clone)]
pub struct TargetConnection {
    name: String,
    pool: PgPool,
}

impl TargetConnection {
    /// Establish the pool, retrying per the descriptor's budget
    #[instrument(skip_all, fields(target_name = %descriptor.display_name()))]
    pub async fn connect(descriptor: &TargetDescriptor, cancel: &CancellationToken) -> Result<Self> {
        let name = descriptor.display_name();
        let policy = RetryPolicy::from_descriptor(descriptor);
        let connect_options = connect_options(descriptor);

        info!(
            host = %descriptor.host,
            port = descriptor.port,
            database = %descriptor.database,
            budget = ?policy.budget,
            "Connecting to database target"
        );

        let pool = connect_with_retry(&name, &policy, cancel, || {
            let pool_options = pool_options(descriptor);
            let connect_options = connect_options.clone();
            async move {
                pool_options
                    .connect_with(connect_options)
                    .await
                    .map_err(classify_sqlx_error)
            }
        })
        .await?;

        info!("Database target connected");
        Ok(Self { name, pool })
    }

    /// Wrap an existing pool (for reuse in tests and tools)
    pub fn from_pool(name: impl Into<String>, pool: PgPool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Target for TargetConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        debug!(target_name = %self.name, rows = rows.len(), "Query returned rows");
        rows.iter().map(Record::from_pg_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) {
        info!(target_name = %self.name, "Closing database pool");
        self.pool.close().await;
    }
}

/// Server settings applied to every session through the startup `options` parameter
pub fn session_settings(descriptor: &TargetDescriptor) -> Vec<(&'static str, String)> {
    vec![
        (
            "default_transaction_isolation",
            escape_option_value(descriptor.default_isolation_level.as_pg_setting()),
        ),
        (
            "default_transaction_read_only",
            if descriptor.read_only { "on" } else { "off" }.to_string(),
        ),
        ("timezone", "UTC".to_string()),
        ("statement_timeout", descriptor.statement_timeout_ms.to_string()),
        ("lock_timeout", descriptor.lock_timeout_ms.to_string()),
        (
            "idle_in_transaction_session_timeout",
            descriptor.idle_in_transaction_session_timeout_ms.to_string(),
        ),
    ]
}

/// The startup `options` string is split on whitespace by the server
fn escape_option_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace(' ', "\\ ")
}

fn connect_options(descriptor: &TargetDescriptor) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&descriptor.host)
        .port(descriptor.port)
        .username(&descriptor.user)
        .database(&descriptor.database)
        .options(session_settings(descriptor));

    if !descriptor.password.is_empty() {
        options = options.password(&descriptor.password);
    }
    if !descriptor.application_name.is_empty() {
        options = options.application_name(&descriptor.application_name);
    }

    options
}

fn pool_options(descriptor: &TargetDescriptor) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(descriptor.pool_max_conns)
        .min_connections(descriptor.pool_min_conns)
        .acquire_timeout(descriptor.connect_timeout())
        .max_lifetime(descriptor.pool_max_conn_lifetime())
        .idle_timeout(descriptor.pool_max_conn_idle_time())
}

/// Map driver errors onto the exporter's taxonomy
pub fn classify_sqlx_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => Error::Connection(err.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => Error::Scan(err.to_string()),
        _ => Error::Query(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pse_config::IsolationLevel;

    #[test]
    fn test_session_settings_defaults() {
        let settings = session_settings(&TargetDescriptor::default());

        assert!(settings.contains(&("default_transaction_isolation", "repeatable\\ read".into())));
        assert!(settings.contains(&("default_transaction_read_only", "off".into())));
        assert!(settings.contains(&("timezone", "UTC".into())));
        assert!(settings.contains(&("statement_timeout", "5000".into())));
        assert!(settings.contains(&("lock_timeout", "0".into())));
        assert!(settings.contains(&("idle_in_transaction_session_timeout", "5000".into())));
    }

    #[test]
    fn test_session_settings_read_only_replica() {
        let descriptor = TargetDescriptor {
            read_only: true,
            default_isolation_level: IsolationLevel::Serializable,
            ..TargetDescriptor::default()
        };
        let settings = session_settings(&descriptor);

        assert!(settings.contains(&("default_transaction_isolation", "serializable".into())));
        assert!(settings.contains(&("default_transaction_read_only", "on".into())));
    }

    #[test]
    fn test_classify_sqlx_errors() {
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::PoolTimedOut),
            Error::Connection(_)
        ));
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::ColumnNotFound("seq_scan".into())),
            Error::Scan(_)
        ));
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::RowNotFound),
            Error::Query(_)
        ));
    }
}
