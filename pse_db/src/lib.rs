//! ABOUTME: Database target layer with pooled PostgreSQL connections
//! ABOUTME: Handles retrying connection setup and the read-only query primitive

use async_trait::async_trait;
use pse_core::Result;

pub mod connection;
pub mod record;
pub mod retry;

pub use connection::{classify_sqlx_error, session_settings, TargetConnection};
pub use record::{Record, Value};
pub use retry::{connect_with_retry, RetryBudget, RetryPolicy};

/// A monitored database instance that collectors can query.
///
/// Implementations must not retry internally; the caller bounds every call
/// with its own deadline by dropping the future.
#[async_trait]
pub trait Target: Send + Sync + std::fmt::Debug {
    /// Display name, used as the `target` label value
    fn name(&self) -> &str;

    /// Execute a read-only statement and decode every row
    async fn query(&self, sql: &str) -> Result<Vec<Record>>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<()>;

    /// Release pooled connections at shutdown
    async fn close(&self) {}
}
