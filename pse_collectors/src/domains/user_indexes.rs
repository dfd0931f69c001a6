use crate::collector::{DomainSpec, FieldSpec};

/// Scan activity per user index
pub static USER_INDEXES: DomainSpec = DomainSpec {
    name: "user_indexes",
    namespace: super::NAMESPACE,
    subsystem: "user_indexes",
    query: r#"
SELECT
    current_database()::text AS datname,
    schemaname::text AS schemaname,
    relname::text AS relname,
    indexrelname::text AS indexrelname,
    COALESCE(idx_scan, 0)::bigint AS idx_scan,
    COALESCE(idx_tup_read, 0)::bigint AS idx_tup_read,
    COALESCE(idx_tup_fetch, 0)::bigint AS idx_tup_fetch
FROM pg_stat_user_indexes"#,
    labels: &["datname", "schemaname", "relname", "indexrelname"],
    fields: &[
        FieldSpec::counter(
            "idx_scan",
            "index_scan",
            "Number of index scans initiated on this index",
        ),
        FieldSpec::counter(
            "idx_tup_read",
            "index_tup_read",
            "Number of index entries returned by scans on this index",
        ),
        FieldSpec::counter(
            "idx_tup_fetch",
            "index_tup_fetch",
            "Number of live table rows fetched by simple index scans using this index",
        ),
    ],
};
