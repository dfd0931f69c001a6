//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Scripted database targets and row fixtures for all crates

use async_trait::async_trait;
use pse_core::{Error, Result};
use pse_db::{Record, Target};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted target answers queries
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return the scripted rows
    Respond,
    /// Fail every query with a connection error
    Fail(String),
    /// Never answer; the caller's deadline must cut it off
    Hang,
}

/// In-memory stand-in for a monitored database.
///
/// Rows are scripted per SQL fragment: a query receives the rows of the first
/// fragment it contains, or no rows at all.
#[derive(Debug)]
pub struct FakeTarget {
    name: String,
    responses: Mutex<Vec<(String, Vec<Record>)>>,
    behavior: Mutex<Behavior>,
    delay: Mutex<Duration>,
    healthy: AtomicBool,
    closed: AtomicBool,
    queries: AtomicUsize,
}

impl FakeTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(Vec::new()),
            behavior: Mutex::new(Behavior::Respond),
            delay: Mutex::new(Duration::ZERO),
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(self, sql_fragment: impl Into<String>, rows: Vec<Record>) -> Self {
        self.set_rows(sql_fragment, rows);
        self
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        self.set_behavior(Behavior::Fail(message.into()));
        self
    }

    pub fn hanging(self) -> Self {
        self.set_behavior(Behavior::Hang);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Target> {
        Arc::new(self)
    }

    pub fn set_rows(&self, sql_fragment: impl Into<String>, rows: Vec<Record>) {
        let fragment = sql_fragment.into();
        let mut responses = self.responses.lock().unwrap();
        responses.retain(|(f, _)| *f != fragment);
        responses.push((fragment, rows));
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Target for FakeTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Respond => {}
            Behavior::Fail(message) => return Err(Error::Connection(message)),
            Behavior::Hang => std::future::pending::<()>().await,
        }

        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connection(format!("{}: ping failed", self.name)))
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A `pg_stat_activity` aggregate row
pub fn activity_row(datname: &str, state: &str, count: i64, max_tx_duration: f64) -> Record {
    Record::new()
        .with("datname", datname)
        .with("state", state)
        .with("count", count)
        .with("max_tx_duration", max_tx_duration)
}

/// A `pg_locks` aggregate row
pub fn locks_row(datname: &str, mode: &str, count: i64) -> Record {
    Record::new()
        .with("datname", datname)
        .with("mode", mode)
        .with("count", count)
}

/// A `pg_stat_user_indexes` row
pub fn user_index_row(
    datname: &str,
    schemaname: &str,
    relname: &str,
    indexrelname: &str,
    idx_scan: i64,
) -> Record {
    Record::new()
        .with("datname", datname)
        .with("schemaname", schemaname)
        .with("relname", relname)
        .with("indexrelname", indexrelname)
        .with("idx_scan", idx_scan)
        .with("idx_tup_read", idx_scan * 10)
        .with("idx_tup_fetch", idx_scan * 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fragment_matching() {
        let target = FakeTarget::new("db-a")
            .with_rows("pg_locks", vec![locks_row("app", "AccessShareLock", 3)]);

        let rows = target.query("SELECT ... FROM pg_locks").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(target.query("SELECT 1").await.unwrap().is_empty());
        assert_eq!(target.query_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_and_unhealthy() {
        let target = FakeTarget::new("db-b").failing("connection reset");
        assert!(matches!(
            target.query("SELECT 1").await,
            Err(Error::Connection(_))
        ));

        target.set_healthy(false);
        assert!(target.ping().await.is_err());

        target.close().await;
        assert!(target.is_closed());
    }
}
