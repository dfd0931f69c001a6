//! ABOUTME: Domain collectors that turn PostgreSQL statistics views into samples
//! ABOUTME: Table-driven fan-out over all targets plus the collector registry

pub mod collector;
pub mod domains;
pub mod registry;

pub use collector::{
    DomainCollector, DomainSpec, FieldSpec, ScannedRow, ScrapeStats, StatCollector, TARGET_LABEL,
};
pub use registry::{available, build_collectors, domain, ALL_DOMAINS};
