//! ABOUTME: Domain collector contract and the generic table-driven implementation
//! ABOUTME: Fans one statistics query out to every target and emits labelled samples

use async_trait::async_trait;
use pse_core::{Error, MetricDesc, MetricKind, Result, Sample, SampleSink};
use pse_db::{Record, Target};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Label carrying the target's display name on every domain sample
pub const TARGET_LABEL: &str = "target";

/// One area of database statistics exposed as a set of metric families
#[async_trait]
pub trait DomainCollector: Send + Sync {
    /// Registry name, e.g. `locks`
    fn name(&self) -> &str;

    /// Every descriptor this collector can emit. Never performs I/O.
    fn describe(&self) -> Vec<Arc<MetricDesc>>;

    /// Query every target concurrently and emit samples for the ones that answer.
    ///
    /// Returns the first per-target error after all targets have finished.
    async fn scrape(&self, targets: &[Arc<dyn Target>], sink: &SampleSink) -> Result<()>;
}

/// One numeric column exported as a metric family
#[derive(Debug)]
pub struct FieldSpec {
    pub column: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

impl FieldSpec {
    pub const fn gauge(column: &'static str, name: &'static str, help: &'static str) -> Self {
        Self {
            column,
            name,
            help,
            kind: MetricKind::Gauge,
        }
    }

    pub const fn counter(column: &'static str, name: &'static str, help: &'static str) -> Self {
        Self {
            column,
            name,
            help,
            kind: MetricKind::Counter,
        }
    }
}

/// Static description of a statistics domain: its query and row shape
#[derive(Debug)]
pub struct DomainSpec {
    pub name: &'static str,
    pub namespace: &'static str,
    pub subsystem: &'static str,
    pub query: &'static str,
    /// Columns rendered as label values, in label order
    pub labels: &'static [&'static str],
    pub fields: &'static [FieldSpec],
}

/// A result row reduced to the domain's shape
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRow {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl DomainSpec {
    /// Build descriptors, with the target label ahead of the domain labels
    pub fn descriptors(&self) -> Vec<Arc<MetricDesc>> {
        let labels: Vec<String> = std::iter::once(TARGET_LABEL)
            .chain(self.labels.iter().copied())
            .map(str::to_string)
            .collect();

        self.fields
            .iter()
            .map(|field| {
                Arc::new(MetricDesc::new(
                    self.namespace,
                    self.subsystem,
                    field.name,
                    field.help,
                    field.kind,
                    labels.clone(),
                ))
            })
            .collect()
    }

    /// Extract label and field values from a record
    pub fn scan(&self, record: &Record) -> Result<ScannedRow> {
        let labels = self
            .labels
            .iter()
            .map(|column| record.label(column))
            .collect::<Result<Vec<_>>>()?;
        let values = self
            .fields
            .iter()
            .map(|field| record.number(field.column))
            .collect::<Result<Vec<_>>>()?;

        Ok(ScannedRow { labels, values })
    }
}

/// Bookkeeping guarded for the duration of a scrape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeStats {
    pub last_duration: Duration,
    pub consecutive_failures: u32,
}

/// Domain collector driven by a [`DomainSpec`]
pub struct StatCollector {
    spec: &'static DomainSpec,
    descs: Arc<[Arc<MetricDesc>]>,
    query_timeout: Duration,
    stats: Mutex<ScrapeStats>,
}

impl StatCollector {
    pub fn new(spec: &'static DomainSpec, query_timeout: Duration) -> Self {
        Self {
            spec,
            descs: spec.descriptors().into(),
            query_timeout,
            stats: Mutex::new(ScrapeStats::default()),
        }
    }

    pub fn spec(&self) -> &'static DomainSpec {
        self.spec
    }

    /// Snapshot of the bookkeeping; waits for an in-flight scrape to finish
    pub async fn stats(&self) -> ScrapeStats {
        self.stats.lock().await.clone()
    }
}

impl std::fmt::Debug for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatCollector")
            .field("name", &self.spec.name)
            .field("metrics", &self.descs.len())
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

#[async_trait]
impl DomainCollector for StatCollector {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn describe(&self) -> Vec<Arc<MetricDesc>> {
        self.descs.to_vec()
    }

    async fn scrape(&self, targets: &[Arc<dyn Target>], sink: &SampleSink) -> Result<()> {
        let mut stats = self.stats.lock().await;
        let started = Instant::now();

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let task = scrape_target(
                    self.spec,
                    Arc::clone(&self.descs),
                    Arc::clone(target),
                    self.query_timeout,
                    sink.clone(),
                );
                (target.name().to_string(), tokio::spawn(task))
            })
            .collect();

        let mut first_error = None;
        for (target_name, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|join_err| {
                Err(Error::Query(format!("scrape task aborted: {}", join_err)))
            });

            match outcome {
                Ok(samples) => {
                    debug!(
                        collector = self.spec.name,
                        target_name = %target_name,
                        samples,
                        "Target scraped"
                    );
                }
                Err(e) => {
                    let e = e.context(format!("{} on {}", self.spec.name, target_name));
                    warn!(
                        collector = self.spec.name,
                        target_name = %target_name,
                        error = %e,
                        "Target scrape failed"
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        stats.last_duration = started.elapsed();
        stats.consecutive_failures = if first_error.is_some() {
            stats.consecutive_failures.saturating_add(1)
        } else {
            0
        };

        debug!(
            collector = self.spec.name,
            duration_ms = stats.last_duration.as_millis(),
            consecutive_failures = stats.consecutive_failures,
            "Collector scrape finished"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Query one target and emit its samples; nothing is emitted unless every row scans
async fn scrape_target(
    spec: &'static DomainSpec,
    descs: Arc<[Arc<MetricDesc>]>,
    target: Arc<dyn Target>,
    query_timeout: Duration,
    sink: SampleSink,
) -> Result<usize> {
    let records = tokio::time::timeout(query_timeout, target.query(spec.query))
        .await
        .map_err(|_| Error::Query(format!("query timed out after {:?}", query_timeout)))??;

    let mut samples = Vec::with_capacity(records.len() * descs.len());
    for record in &records {
        let row = spec.scan(record)?;
        let label_values: Vec<String> = std::iter::once(target.name().to_string())
            .chain(row.labels)
            .collect();

        for (desc, value) in descs.iter().zip(row.values) {
            samples.push(Sample::new(Arc::clone(desc), value, label_values.clone())?);
        }
    }

    let count = samples.len();
    for sample in samples {
        sink.emit(sample);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    static WIDGETS: DomainSpec = DomainSpec {
        name: "widgets",
        namespace: "pg_stat",
        subsystem: "widgets",
        query: "SELECT kind, count FROM widgets",
        labels: &["kind"],
        fields: &[
            FieldSpec::gauge("count", "count", "Number of widgets"),
            FieldSpec::counter("spins", "spins", "Widget spins"),
        ],
    };

    #[test]
    fn test_descriptors_lead_with_target_label() {
        let descs = WIDGETS.descriptors();
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].fq_name(), "pg_stat_widgets_count");
        assert_eq!(descs[0].labels(), &["target".to_string(), "kind".to_string()]);
        assert_eq!(descs[1].kind(), MetricKind::Counter);
    }

    #[test]
    fn test_scan_extracts_labels_and_values() {
        let record = Record::new()
            .with("kind", "sprocket")
            .with("count", 3i64)
            .with("spins", 12.5);

        let row = WIDGETS.scan(&record).unwrap();
        assert_eq!(row.labels, vec!["sprocket"]);
        assert_eq!(row.values, vec![3.0, 12.5]);
    }

    #[test]
    fn test_scan_rejects_missing_field() {
        let record = Record::new().with("kind", "sprocket").with("count", 3i64);
        let err = WIDGETS.scan(&record).unwrap_err();
        assert!(matches!(err, Error::Scan(_)));
    }

    #[tokio::test]
    async fn test_scrape_with_no_targets_is_ok() {
        let collector = StatCollector::new(&WIDGETS, Duration::from_secs(1));
        let (sink, stream) = pse_core::sample_channel();

        collector.scrape(&[], &sink).await.unwrap();
        drop(sink);

        assert!(stream.drain().await.is_empty());
        assert_eq!(collector.stats().await.consecutive_failures, 0);
    }
}
