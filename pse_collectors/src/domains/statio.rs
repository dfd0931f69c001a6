use crate::collector::{DomainSpec, FieldSpec};

/// Buffer cache hits and disk reads per user table
pub static STATIO_USER_TABLES: DomainSpec = DomainSpec {
    name: "statio_user_tables",
    namespace: super::NAMESPACE_IO,
    subsystem: "user_tables",
    query: r#"
SELECT
    current_database()::text AS datname,
    schemaname::text AS schemaname,
    relname::text AS relname,
    COALESCE(heap_blks_read, 0)::bigint AS heap_blks_read,
    COALESCE(heap_blks_hit, 0)::bigint AS heap_blks_hit,
    COALESCE(idx_blks_read, 0)::bigint AS idx_blks_read,
    COALESCE(idx_blks_hit, 0)::bigint AS idx_blks_hit,
    COALESCE(toast_blks_read, 0)::bigint AS toast_blks_read,
    COALESCE(toast_blks_hit, 0)::bigint AS toast_blks_hit,
    COALESCE(tidx_blks_read, 0)::bigint AS tidx_blks_read,
    COALESCE(tidx_blks_hit, 0)::bigint AS tidx_blks_hit
FROM pg_statio_user_tables"#,
    labels: &["datname", "schemaname", "relname"],
    fields: &[
        FieldSpec::counter(
            "heap_blks_read",
            "heap_blks_read",
            "Number of disk blocks read from this table",
        ),
        FieldSpec::counter(
            "heap_blks_hit",
            "heap_blks_hit",
            "Number of buffer hits in this table",
        ),
        FieldSpec::counter(
            "idx_blks_read",
            "idx_blks_read",
            "Number of disk blocks read from all indexes on this table",
        ),
        FieldSpec::counter(
            "idx_blks_hit",
            "idx_blks_hit",
            "Number of buffer hits in all indexes on this table",
        ),
        FieldSpec::counter(
            "toast_blks_read",
            "toast_blks_read",
            "Number of disk blocks read from this table's TOAST table (if any)",
        ),
        FieldSpec::counter(
            "toast_blks_hit",
            "toast_blks_hit",
            "Number of buffer hits in this table's TOAST table (if any)",
        ),
        FieldSpec::counter(
            "tidx_blks_read",
            "tidx_blks_read",
            "Number of disk blocks read from this table's TOAST table indexes (if any)",
        ),
        FieldSpec::counter(
            "tidx_blks_hit",
            "tidx_blks_hit",
            "Number of buffer hits in this table's TOAST table indexes (if any)",
        ),
    ],
};

/// Buffer cache hits and disk reads per user index
pub static STATIO_USER_INDEXES: DomainSpec = DomainSpec {
    name: "statio_user_indexes",
    namespace: super::NAMESPACE_IO,
    subsystem: "user_indexes",
    query: r#"
SELECT
    current_database()::text AS datname,
    schemaname::text AS schemaname,
    relname::text AS relname,
    indexrelname::text AS indexrelname,
    COALESCE(idx_blks_read, 0)::bigint AS idx_blks_read,
    COALESCE(idx_blks_hit, 0)::bigint AS idx_blks_hit
FROM pg_statio_user_indexes"#,
    labels: &["datname", "schemaname", "relname", "indexrelname"],
    fields: &[
        FieldSpec::counter(
            "idx_blks_read",
            "idx_blks_read",
            "Number of disk blocks read from this index",
        ),
        FieldSpec::counter("idx_blks_hit", "idx_blks_hit", "Number of buffer hits in this index"),
    ],
};
