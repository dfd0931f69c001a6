//! ABOUTME: Scrape orchestration root for the PostgreSQL statistics exporter
//! ABOUTME: Runs every collector per cycle and owns the up/scrapes_total metrics

use futures_util::future::join_all;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use pse_collectors::DomainCollector;
use pse_core::{Error, MetricDesc, MetricKind, Result, Sample, SampleSink};
use pse_db::Target;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Namespace shared by the exporter's own metrics and the default domains
pub const NAMESPACE: &str = "pg_stat";

/// Outcome of one collect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStatus {
    /// Every collector reported success; `up` is 1
    Healthy,
    /// At least one collector reported an error; `up` is 0
    Degraded,
}

impl ScrapeStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ScrapeStatus::Healthy)
    }
}

/// Root collector: fans each scrape out to every domain collector
pub struct Exporter {
    targets: Arc<[Arc<dyn Target>]>,
    collectors: Vec<Arc<dyn DomainCollector>>,
    up: Gauge,
    scrapes_total: Counter,
    up_desc: Arc<MetricDesc>,
    scrapes_total_desc: Arc<MetricDesc>,
    scrape_lock: Arc<Mutex<()>>,
    runtime: Handle,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field(
                "targets",
                &self.targets.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field(
                "collectors",
                &self.collectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("up", &self.up.get())
            .field("scrapes_total", &self.scrapes_total.get())
            .finish()
    }
}

impl Exporter {
    /// Create an exporter over a fixed target set.
    ///
    /// Must be called from within a tokio runtime; collector tasks are spawned
    /// on that runtime regardless of where `collect` is later awaited.
    pub fn new(
        targets: Vec<Arc<dyn Target>>,
        collectors: Vec<Arc<dyn DomainCollector>>,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(Error::Config(
                "exporter needs at least one database target".to_string(),
            ));
        }
        check_unique_targets(&targets)?;

        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("exporter requires a tokio runtime: {}", e)))?;

        let exporter = Self {
            targets: targets.into(),
            collectors: Vec::new(),
            up: Gauge::default(),
            scrapes_total: Counter::default(),
            up_desc: Arc::new(MetricDesc::new(
                NAMESPACE,
                "",
                "up",
                "Was the last scrape of PostgreSQL successful.",
                MetricKind::Gauge,
                Vec::new(),
            )),
            scrapes_total_desc: Arc::new(MetricDesc::new(
                NAMESPACE,
                "exporter",
                "scrapes_total",
                "Current total PostgreSQL scrapes",
                MetricKind::Counter,
                Vec::new(),
            )),
            scrape_lock: Arc::new(Mutex::new(())),
            runtime,
        };

        exporter.with_collectors(collectors)
    }

    /// Register additional collectors, builder style
    pub fn with_collectors(mut self, collectors: Vec<Arc<dyn DomainCollector>>) -> Result<Self> {
        for collector in collectors {
            self.register_collector(collector)?;
        }
        Ok(self)
    }

    /// Register one collector; its descriptors must not clash with existing ones
    pub fn register_collector(&mut self, collector: Arc<dyn DomainCollector>) -> Result<()> {
        let mut names: HashSet<String> = self
            .describe()
            .iter()
            .map(|desc| desc.fq_name().to_string())
            .collect();

        for desc in collector.describe() {
            if !names.insert(desc.fq_name().to_string()) {
                return Err(Error::Config(format!(
                    "collector '{}' redefines metric '{}'",
                    collector.name(),
                    desc.fq_name()
                )));
            }
        }

        info!(collector = collector.name(), "Registered collector");
        self.collectors.push(collector);
        Ok(())
    }

    /// Add a target before the first scrape
    pub fn add_target(&mut self, target: Arc<dyn Target>) -> Result<()> {
        let mut targets = self.targets.to_vec();
        targets.push(target);
        check_unique_targets(&targets)?;
        self.targets = targets.into();
        Ok(())
    }

    pub fn targets(&self) -> &[Arc<dyn Target>] {
        &self.targets
    }

    pub fn collectors(&self) -> &[Arc<dyn DomainCollector>] {
        &self.collectors
    }

    /// Every descriptor this exporter can emit, exporter metrics first
    pub fn describe(&self) -> Vec<Arc<MetricDesc>> {
        let mut descs = vec![
            Arc::clone(&self.up_desc),
            Arc::clone(&self.scrapes_total_desc),
        ];
        for collector in &self.collectors {
            descs.extend(collector.describe());
        }
        descs
    }

    /// Run one scrape cycle, emitting every sample into `sink`.
    ///
    /// Cycles are serialized. The `up` and `scrapes_total` samples are always
    /// emitted, after every domain sample. The cycle runs in its own task, so
    /// dropping this future does not release the guard before the cycle ends.
    pub async fn collect(&self, sink: &SampleSink) -> ScrapeStatus {
        let cycle = ScrapeCycle {
            lock: Arc::clone(&self.scrape_lock),
            targets: Arc::clone(&self.targets),
            collectors: self.collectors.clone(),
            up: self.up.clone(),
            scrapes_total: self.scrapes_total.clone(),
            up_desc: Arc::clone(&self.up_desc),
            scrapes_total_desc: Arc::clone(&self.scrapes_total_desc),
        };

        match self.runtime.spawn(cycle.run(sink.clone())).await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Scrape cycle task failed");
                ScrapeStatus::Degraded
            }
        }
    }

    /// Ping every target concurrently; fails if any target is unreachable
    pub async fn health_check(&self) -> Result<()> {
        let results = join_all(self.targets.iter().map(|target| async move {
            target
                .ping()
                .await
                .map_err(|e| e.context(format!("health check on {}", target.name())))
        }))
        .await;

        let mut first_error = None;
        for err in results.into_iter().filter_map(|r| r.err()) {
            warn!(error = %err, "Target health check failed");
            if first_error.is_none() {
                first_error = Some(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Value of `up` after the most recent cycle (0 before the first)
    pub fn up(&self) -> i64 {
        self.up.get()
    }

    pub fn scrapes_total(&self) -> u64 {
        self.scrapes_total.get()
    }

    /// Close every target's pool
    pub async fn close(&self) {
        join_all(self.targets.iter().map(|target| target.close())).await;
    }
}

/// Everything one collect cycle touches, owned by the cycle's task
struct ScrapeCycle {
    lock: Arc<Mutex<()>>,
    targets: Arc<[Arc<dyn Target>]>,
    collectors: Vec<Arc<dyn DomainCollector>>,
    up: Gauge,
    scrapes_total: Counter,
    up_desc: Arc<MetricDesc>,
    scrapes_total_desc: Arc<MetricDesc>,
}

impl ScrapeCycle {
    async fn run(self, sink: SampleSink) -> ScrapeStatus {
        let _guard = self.lock.lock_owned().await;
        let started = Instant::now();
        self.scrapes_total.inc();

        let handles: Vec<_> = self
            .collectors
            .iter()
            .map(|collector| {
                let collector = Arc::clone(collector);
                let targets = Arc::clone(&self.targets);
                let sink = sink.clone();
                let name = collector.name().to_string();
                let handle =
                    tokio::spawn(async move { collector.scrape(&targets, &sink).await });
                (name, handle)
            })
            .collect();

        let mut status = ScrapeStatus::Healthy;
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(collector = %name, error = %e, "Collector reported errors");
                    status = ScrapeStatus::Degraded;
                }
                Err(e) => {
                    error!(collector = %name, error = %e, "Collector task failed");
                    status = ScrapeStatus::Degraded;
                }
            }
        }

        self.up.set(if status.is_healthy() { 1 } else { 0 });
        emit_internal(&sink, &self.up_desc, self.up.get() as f64);
        emit_internal(
            &sink,
            &self.scrapes_total_desc,
            self.scrapes_total.get() as f64,
        );

        info!(
            duration_ms = started.elapsed().as_millis(),
            status = ?status,
            "exporter collect took"
        );
        status
    }
}

fn emit_internal(sink: &SampleSink, desc: &Arc<MetricDesc>, value: f64) {
    match Sample::new(Arc::clone(desc), value, Vec::new()) {
        Ok(sample) => {
            sink.emit(sample);
        }
        Err(e) => error!(metric = desc.fq_name(), error = %e, "Failed to build sample"),
    }
}

fn check_unique_targets(targets: &[Arc<dyn Target>]) -> Result<()> {
    let mut seen = HashSet::new();
    for target in targets {
        if !seen.insert(target.name()) {
            return Err(Error::Config(format!(
                "duplicate target name '{}'",
                target.name()
            )));
        }
    }
    Ok(())
}
