//! ABOUTME: Fixed catalog of built-in domains and collector construction
//! ABOUTME: Resolves configured collector names at startup

use crate::collector::{DomainCollector, DomainSpec, StatCollector};
use crate::domains;
use pse_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Every built-in domain, in exposition order
pub static ALL_DOMAINS: &[&DomainSpec] = &[
    &domains::ACTIVITY,
    &domains::LOCKS,
    &domains::USER_TABLES,
    &domains::USER_INDEXES,
    &domains::STATIO_USER_TABLES,
    &domains::STATIO_USER_INDEXES,
    &domains::STATEMENTS,
];

/// Look up a built-in domain by collector name
pub fn domain(name: &str) -> Option<&'static DomainSpec> {
    ALL_DOMAINS.iter().copied().find(|spec| spec.name == name)
}

/// Names of all built-in collectors
pub fn available() -> Vec<&'static str> {
    ALL_DOMAINS.iter().map(|spec| spec.name).collect()
}

/// Build the collectors named in configuration, in the given order
pub fn build_collectors(
    names: &[String],
    query_timeout: Duration,
) -> Result<Vec<Arc<dyn DomainCollector>>> {
    let mut seen = HashSet::new();
    let mut collectors: Vec<Arc<dyn DomainCollector>> = Vec::with_capacity(names.len());

    for name in names {
        let spec = domain(name).ok_or_else(|| {
            Error::Config(format!(
                "unknown collector '{}' (available: {})",
                name,
                available().join(", ")
            ))
        })?;

        if !seen.insert(spec.name) {
            return Err(Error::Config(format!(
                "collector '{}' is listed more than once",
                name
            )));
        }

        collectors.push(Arc::new(StatCollector::new(spec, query_timeout)));
    }

    info!(
        collectors = ?names,
        query_timeout_ms = query_timeout.as_millis(),
        "Domain collectors configured"
    );
    Ok(collectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pse_core::MetricKind;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_default_collectors() {
        let collectors = build_collectors(
            &names(&["activity", "locks", "user_tables", "user_indexes"]),
            Duration::from_secs(10),
        )
        .unwrap();

        let built: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(built, vec!["activity", "locks", "user_tables", "user_indexes"]);
    }

    #[test]
    fn test_unknown_collector_rejected() {
        let err = build_collectors(&names(&["locks", "replication"]), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("unknown collector 'replication'"));
    }

    #[test]
    fn test_duplicate_collector_rejected() {
        let err = build_collectors(&names(&["locks", "locks"]), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("listed more than once"));
    }

    #[test]
    fn test_catalog_descriptor_names_unique() {
        let mut seen = HashSet::new();
        for spec in ALL_DOMAINS {
            for desc in spec.descriptors() {
                assert!(seen.insert(desc.fq_name().to_string()), "{}", desc);
                assert_eq!(desc.labels()[0], "target");
            }
        }
    }

    #[test]
    fn test_catalog_shapes() {
        assert_eq!(domains::USER_TABLES.fields.len(), 19);
        assert_eq!(domains::STATEMENTS.fields.len(), 19);
        assert_eq!(domains::STATIO_USER_TABLES.fields.len(), 8);
        assert_eq!(domains::STATIO_USER_TABLES.namespace, "pg_statio");

        let activity = domains::ACTIVITY.descriptors();
        assert_eq!(activity[0].fq_name(), "pg_stat_activity_count");
        assert_eq!(activity[1].fq_name(), "pg_stat_activity_max_tx_duration");

        let statements = domains::STATEMENTS.descriptors();
        let calls = statements.iter().find(|d| d.fq_name() == "pg_stat_statements_calls");
        assert_eq!(calls.map(|d| d.kind()), Some(MetricKind::Counter));
    }
}
