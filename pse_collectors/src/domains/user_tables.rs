use crate::collector::{DomainSpec, FieldSpec};

/// Access and maintenance statistics per user table.
///
/// Vacuum and analyze times are Unix epoch seconds; never-run maps to 0.
pub static USER_TABLES: DomainSpec = DomainSpec {
    name: "user_tables",
    namespace: super::NAMESPACE,
    subsystem: "user_tables",
    query: r#"
SELECT
    current_database()::text AS datname,
    schemaname::text AS schemaname,
    relname::text AS relname,
    COALESCE(seq_scan, 0)::bigint AS seq_scan,
    COALESCE(seq_tup_read, 0)::bigint AS seq_tup_read,
    COALESCE(idx_scan, 0)::bigint AS idx_scan,
    COALESCE(idx_tup_fetch, 0)::bigint AS idx_tup_fetch,
    COALESCE(n_tup_ins, 0)::bigint AS n_tup_ins,
    COALESCE(n_tup_upd, 0)::bigint AS n_tup_upd,
    COALESCE(n_tup_del, 0)::bigint AS n_tup_del,
    COALESCE(n_tup_hot_upd, 0)::bigint AS n_tup_hot_upd,
    COALESCE(n_live_tup, 0)::bigint AS n_live_tup,
    COALESCE(n_dead_tup, 0)::bigint AS n_dead_tup,
    COALESCE(n_mod_since_analyze, 0)::bigint AS n_mod_since_analyze,
    COALESCE(last_vacuum, '1970-01-01Z') AS last_vacuum,
    COALESCE(last_autovacuum, '1970-01-01Z') AS last_autovacuum,
    COALESCE(last_analyze, '1970-01-01Z') AS last_analyze,
    COALESCE(last_autoanalyze, '1970-01-01Z') AS last_autoanalyze,
    COALESCE(vacuum_count, 0)::bigint AS vacuum_count,
    COALESCE(autovacuum_count, 0)::bigint AS autovacuum_count,
    COALESCE(analyze_count, 0)::bigint AS analyze_count,
    COALESCE(autoanalyze_count, 0)::bigint AS autoanalyze_count
FROM pg_stat_user_tables"#,
    labels: &["datname", "schemaname", "relname"],
    fields: &[
        FieldSpec::counter(
            "seq_scan",
            "sequential_scan",
            "Number of sequential scans initiated on this table",
        ),
        FieldSpec::counter(
            "seq_tup_read",
            "sequential_scan_tup_read",
            "Number of live rows fetched by sequential scans",
        ),
        FieldSpec::counter(
            "idx_scan",
            "index_scan",
            "Number of index scans initiated on this table",
        ),
        FieldSpec::counter(
            "idx_tup_fetch",
            "index_tup_fetch",
            "Number of live rows fetched by index scans",
        ),
        FieldSpec::counter("n_tup_ins", "n_tup_ins", "Number of rows inserted"),
        FieldSpec::counter("n_tup_upd", "n_tup_upd", "Number of rows updated"),
        FieldSpec::counter("n_tup_del", "n_tup_del", "Number of rows deleted"),
        FieldSpec::counter("n_tup_hot_upd", "n_tup_hot_upd", "Number of rows HOT updated"),
        FieldSpec::gauge("n_live_tup", "n_live_tup", "Estimated number of live rows"),
        FieldSpec::gauge("n_dead_tup", "n_dead_tup", "Estimated number of dead rows"),
        FieldSpec::gauge(
            "n_mod_since_analyze",
            "n_mod_since_analyze",
            "Estimated number of rows changed since last analyze",
        ),
        FieldSpec::gauge(
            "last_vacuum",
            "last_vacuum",
            "Last time at which this table was manually vacuumed (not counting VACUUM FULL)",
        ),
        FieldSpec::gauge(
            "last_autovacuum",
            "last_autovacuum",
            "Last time at which this table was vacuumed by the autovacuum daemon",
        ),
        FieldSpec::gauge(
            "last_analyze",
            "last_analyze",
            "Last time at which this table was manually analyzed",
        ),
        FieldSpec::gauge(
            "last_autoanalyze",
            "last_autoanalyze",
            "Last time at which this table was analyzed by the autovacuum daemon",
        ),
        FieldSpec::counter(
            "vacuum_count",
            "vacuum_count",
            "Number of times this table has been manually vacuumed (not counting VACUUM FULL)",
        ),
        FieldSpec::counter(
            "autovacuum_count",
            "autovacuum_count",
            "Number of times this table has been vacuumed by the autovacuum daemon",
        ),
        FieldSpec::counter(
            "analyze_count",
            "analyze_count",
            "Number of times this table has been manually analyzed",
        ),
        FieldSpec::counter(
            "autoanalyze_count",
            "autoanalyze_count",
            "Number of times this table has been analyzed by the autovacuum daemon",
        ),
    ],
};
