//! ABOUTME: Core types, errors, metric samples, and tracing utilities
//! ABOUTME: Foundation crate used by all other exporter components

pub mod error;
pub mod metric;
pub mod telemetry;

pub use error::{Error, Result};
pub use metric::{
    build_fq_name, sample_channel, MetricDesc, MetricKind, Sample, SampleSink, SampleStream,
};
pub use telemetry::LogFormat;
