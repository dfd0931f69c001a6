//! ABOUTME: Metric descriptors, samples, and the multi-producer sample conduit
//! ABOUTME: Collectors emit samples here; the exposition layer drains them

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{Error, Result};

/// Kind of a metric as seen by the exposition layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Immutable description of one metric family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    fq_name: String,
    help: String,
    kind: MetricKind,
    labels: Vec<String>,
}

impl MetricDesc {
    /// Create a descriptor named `<namespace>_<subsystem>_<name>`
    ///
    /// Empty components are skipped, so an empty subsystem yields
    /// `<namespace>_<name>`.
    pub fn new(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: impl Into<String>,
        kind: MetricKind,
        labels: Vec<String>,
    ) -> Self {
        Self {
            fq_name: build_fq_name(namespace, subsystem, name),
            help: help.into(),
            kind,
            labels,
        }
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl fmt::Display for MetricDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.fq_name, self.labels.join(","))
    }
}

/// Join non-empty name components with `_`
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// One observation of a metric family
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    desc: Arc<MetricDesc>,
    value: f64,
    label_values: Vec<String>,
}

impl Sample {
    /// Create a sample, checking label arity against the descriptor
    pub fn new(desc: Arc<MetricDesc>, value: f64, label_values: Vec<String>) -> Result<Self> {
        if label_values.len() != desc.labels.len() {
            return Err(Error::Scan(format!(
                "{} expects {} label values, got {}",
                desc.fq_name,
                desc.labels.len(),
                label_values.len()
            )));
        }

        Ok(Self {
            desc,
            value,
            label_values,
        })
    }

    pub fn desc(&self) -> &Arc<MetricDesc> {
        &self.desc
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Label value for `name`, if the descriptor declares it
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels
            .iter()
            .position(|label| label == name)
            .map(|idx| self.label_values[idx].as_str())
    }

    /// Label name/value pairs in descriptor order
    pub fn label_pairs(&self) -> Vec<(String, String)> {
        self.desc
            .labels
            .iter()
            .cloned()
            .zip(self.label_values.iter().cloned())
            .collect()
    }
}

/// Producer half of the sample conduit; cheap to clone, safe to share across tasks
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::UnboundedSender<Sample>,
}

impl SampleSink {
    /// Send one sample. Returns false if the consumer is gone.
    pub fn emit(&self, sample: Sample) -> bool {
        if self.tx.send(sample).is_err() {
            tracing::debug!("Sample consumer dropped, discarding sample");
            return false;
        }
        true
    }
}

/// Consumer half of the sample conduit
#[derive(Debug)]
pub struct SampleStream {
    rx: mpsc::UnboundedReceiver<Sample>,
}

impl SampleStream {
    /// Receive samples until every [`SampleSink`] clone has been dropped
    pub async fn drain(mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Some(sample) = self.rx.recv().await {
            samples.push(sample);
        }
        samples
    }
}

/// Create a connected sink/stream pair
pub fn sample_channel() -> (SampleSink, SampleStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SampleSink { tx }, SampleStream { rx })
}
