use crate::collector::{DomainSpec, FieldSpec};

/// Per-statement execution statistics from the `pg_stat_statements` extension.
///
/// The `query` label is the first 200 characters of the statement text, tagged
/// with its query id and full length so truncated statements stay distinct.
pub static STATEMENTS: DomainSpec = DomainSpec {
    name: "statements",
    namespace: super::NAMESPACE,
    subsystem: "statements",
    query: r#"
SELECT
    t2.rolname::text AS rolname,
    t3.datname::text AS datname,
    t1.queryid::text AS queryid,
    concat(left(t1.query, 200), '__@', t1.queryid::text, '__', length(t1.query)) AS query,
    t1.calls::bigint AS calls,
    (t1.total_exec_time / 1000)::float8 AS total_time_seconds,
    (t1.min_exec_time / 1000)::float8 AS min_time_seconds,
    (t1.max_exec_time / 1000)::float8 AS max_time_seconds,
    (t1.mean_exec_time / 1000)::float8 AS mean_time_seconds,
    (t1.stddev_exec_time / 1000)::float8 AS stddev_time_seconds,
    t1.rows::bigint AS rows,
    t1.shared_blks_hit::bigint AS shared_blks_hit,
    t1.shared_blks_read::bigint AS shared_blks_read,
    t1.shared_blks_dirtied::bigint AS shared_blks_dirtied,
    t1.shared_blks_written::bigint AS shared_blks_written,
    t1.local_blks_hit::bigint AS local_blks_hit,
    t1.local_blks_read::bigint AS local_blks_read,
    t1.local_blks_dirtied::bigint AS local_blks_dirtied,
    t1.local_blks_written::bigint AS local_blks_written,
    t1.temp_blks_read::bigint AS temp_blks_read,
    t1.temp_blks_written::bigint AS temp_blks_written,
    (t1.blk_read_time / 1000)::float8 AS blk_read_time_seconds,
    (t1.blk_write_time / 1000)::float8 AS blk_write_time_seconds
FROM pg_stat_statements t1
JOIN pg_roles t2 ON (t1.userid = t2.oid)
JOIN pg_database t3 ON (t1.dbid = t3.oid)
WHERE t2.rolname != 'rdsadmin'"#,
    labels: &["rolname", "datname", "queryid", "query"],
    fields: &[
        FieldSpec::counter("calls", "calls", "Number of times the statement was executed"),
        FieldSpec::counter(
            "total_time_seconds",
            "total_time_seconds",
            "Total time spent executing the statement, in seconds",
        ),
        FieldSpec::gauge(
            "min_time_seconds",
            "min_time_seconds",
            "Minimum time spent executing the statement, in seconds",
        ),
        FieldSpec::gauge(
            "max_time_seconds",
            "max_time_seconds",
            "Maximum time spent executing the statement, in seconds",
        ),
        FieldSpec::gauge(
            "mean_time_seconds",
            "mean_time_seconds",
            "Mean time spent executing the statement, in seconds",
        ),
        FieldSpec::gauge(
            "stddev_time_seconds",
            "std_dev_time_seconds",
            "Population standard deviation of the statement's execution time, in seconds",
        ),
        FieldSpec::counter("rows", "rows", "Total number of rows retrieved or affected"),
        FieldSpec::counter(
            "shared_blks_hit",
            "shared_blks_hit",
            "Total number of shared block cache hits",
        ),
        FieldSpec::counter(
            "shared_blks_read",
            "shared_blks_read",
            "Total number of shared blocks read",
        ),
        FieldSpec::counter(
            "shared_blks_dirtied",
            "shared_blks_dirtied",
            "Total number of shared blocks dirtied",
        ),
        FieldSpec::counter(
            "shared_blks_written",
            "shared_blks_written",
            "Total number of shared blocks written",
        ),
        FieldSpec::counter(
            "local_blks_hit",
            "local_blks_hit",
            "Total number of local block cache hits",
        ),
        FieldSpec::counter("local_blks_read", "local_blks_read", "Total number of local blocks read"),
        FieldSpec::counter(
            "local_blks_dirtied",
            "local_blks_dirtied",
            "Total number of local blocks dirtied",
        ),
        FieldSpec::counter(
            "local_blks_written",
            "local_blks_written",
            "Total number of local blocks written",
        ),
        FieldSpec::counter("temp_blks_read", "temp_blks_read", "Total number of temp blocks read"),
        FieldSpec::counter(
            "temp_blks_written",
            "temp_blks_written",
            "Total number of temp blocks written",
        ),
        FieldSpec::counter(
            "blk_read_time_seconds",
            "blk_read_time_seconds",
            "Total time spent reading blocks, in seconds",
        ),
        FieldSpec::counter(
            "blk_write_time_seconds",
            "blk_write_time_seconds",
            "Total time spent writing blocks, in seconds",
        ),
    ],
};
