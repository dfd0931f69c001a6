use crate::collector::{DomainSpec, FieldSpec};

/// Locks held per database and lock mode; absent modes report zero
pub static LOCKS: DomainSpec = DomainSpec {
    name: "locks",
    namespace: super::NAMESPACE,
    subsystem: "locks",
    query: r#"
SELECT
    pg_database.datname::text AS datname,
    tmp.mode,
    COALESCE(tmp2.count, 0)::bigint AS count
FROM
(
    VALUES ('accesssharelock'),
           ('rowsharelock'),
           ('rowexclusivelock'),
           ('shareupdateexclusivelock'),
           ('sharelock'),
           ('sharerowexclusivelock'),
           ('exclusivelock'),
           ('accessexclusivelock'),
           ('sireadlock')
) AS tmp(mode) CROSS JOIN pg_database
LEFT JOIN
(
    SELECT database, lower(mode) AS mode, count(*) AS count
    FROM pg_locks
    WHERE database IS NOT NULL
    GROUP BY database, lower(mode)
) AS tmp2
ON tmp.mode = tmp2.mode AND pg_database.oid = tmp2.database
ORDER BY 1, 2"#,
    labels: &["datname", "mode"],
    fields: &[FieldSpec::gauge("count", "count", "Number of locks")],
};
