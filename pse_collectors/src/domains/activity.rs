use crate::collector::{DomainSpec, FieldSpec};

/// Connections per database and state, with the longest running transaction
pub static ACTIVITY: DomainSpec = DomainSpec {
    name: "activity",
    namespace: super::NAMESPACE,
    subsystem: "activity",
    query: r#"
SELECT
    pg_database.datname::text AS datname,
    tmp.state,
    COALESCE(tmp2.count, 0)::bigint AS count,
    COALESCE(tmp2.max_tx_duration, 0)::float8 AS max_tx_duration
FROM
(
    VALUES ('active'),
           ('idle'),
           ('idle in transaction'),
           ('idle in transaction (aborted)'),
           ('fastpath function call'),
           ('disabled')
) AS tmp(state) CROSS JOIN pg_database
LEFT JOIN
(
    SELECT
        datname,
        state,
        count(*) AS count,
        MAX(EXTRACT(EPOCH FROM now() - xact_start))::float8 AS max_tx_duration
    FROM pg_stat_activity
    GROUP BY datname, state
) AS tmp2
ON tmp.state = tmp2.state AND pg_database.datname = tmp2.datname"#,
    labels: &["datname", "state"],
    fields: &[
        FieldSpec::gauge("count", "count", "Number of connections in this state"),
        FieldSpec::gauge(
            "max_tx_duration",
            "max_tx_duration",
            "Max duration in seconds any active transaction has been running",
        ),
    ],
};
