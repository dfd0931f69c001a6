//! ABOUTME: HTTP exposition for the PostgreSQL statistics exporter
//! ABOUTME: Serves /metrics, /healthz, and /readyz over actix-web

use actix_web::{
    dev::{ServiceRequest, ServiceResponse},
    middleware::Logger,
    web, App, HttpResponse, HttpServer, Result as ActixResult,
};
use prometheus_client::{
    collector::Collector,
    encoding::{text::encode, DescriptorEncoder, EncodeMetric},
    metrics::{counter::ConstCounter, gauge::ConstGauge, histogram::Histogram, MetricType},
    registry::Registry,
};
use pse_core::{sample_channel, Error, MetricDesc, MetricKind, Result, Sample};
use pse_exporter::Exporter;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Metrics about the exposition endpoint itself
#[derive(Debug)]
pub struct ObsMetrics {
    scrape_duration_seconds: Histogram,
}

impl ObsMetrics {
    pub fn new() -> Self {
        Self {
            scrape_duration_seconds: Histogram::new(
                [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0].into_iter(),
            ),
        }
    }

    pub fn observe_scrape(&self, seconds: f64) {
        self.scrape_duration_seconds.observe(seconds);
    }

    /// Encode one cycle's samples plus the endpoint metrics as text exposition
    pub fn encode(&self, samples: Vec<Sample>) -> Result<String> {
        let mut registry = Registry::default();
        registry.register(
            "pg_stat_exporter_scrape_duration_seconds",
            "Duration of /metrics scrapes in seconds",
            self.scrape_duration_seconds.clone(),
        );
        registry.register_collector(Box::new(SampleFamilies::from_samples(samples)));

        let mut buffer = String::new();
        encode(&mut buffer, &registry)
            .map_err(|e| Error::Encoding(format!("Failed to encode metrics: {}", e)))?;

        Ok(buffer)
    }
}

impl Default for ObsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples of one cycle grouped by metric family, in first-seen order
#[derive(Debug)]
struct SampleFamilies {
    families: Vec<(Arc<MetricDesc>, Vec<(Vec<(String, String)>, f64)>)>,
}

impl SampleFamilies {
    fn from_samples(samples: Vec<Sample>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut families: Vec<(Arc<MetricDesc>, Vec<(Vec<(String, String)>, f64)>)> = Vec::new();

        for sample in samples {
            let slot = *index
                .entry(sample.desc().fq_name().to_string())
                .or_insert_with(|| {
                    families.push((Arc::clone(sample.desc()), Vec::new()));
                    families.len() - 1
                });
            let labels = sample
                .label_pairs()
                .into_iter()
                .map(|(name, value)| (name, escape_label_value(&value)))
                .collect();
            families[slot].1.push((labels, sample.value()));
        }

        Self { families }
    }
}

/// The text encoder writes label values verbatim
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// The text encoder appends `_total` to counter samples itself
fn exposition_name(desc: &MetricDesc) -> &str {
    match desc.kind() {
        MetricKind::Counter => desc
            .fq_name()
            .strip_suffix("_total")
            .unwrap_or(desc.fq_name()),
        MetricKind::Gauge => desc.fq_name(),
    }
}

impl Collector for SampleFamilies {
    fn encode(&self, mut encoder: DescriptorEncoder) -> std::result::Result<(), std::fmt::Error> {
        for (desc, samples) in &self.families {
            let metric_type = match desc.kind() {
                MetricKind::Gauge => MetricType::Gauge,
                MetricKind::Counter => MetricType::Counter,
            };
            let mut family_encoder = encoder.encode_descriptor(
                exposition_name(desc),
                desc.help(),
                None,
                metric_type,
            )?;

            for (labels, value) in samples {
                let metric_encoder = family_encoder.encode_family(labels)?;
                match desc.kind() {
                    MetricKind::Gauge => ConstGauge::new(*value).encode(metric_encoder)?,
                    MetricKind::Counter => ConstCounter::new(*value).encode(metric_encoder)?,
                }
            }
        }
        Ok(())
    }
}

/// Application state for the exposition endpoints
#[derive(Debug, Clone)]
pub struct ObsState {
    pub exporter: Arc<Exporter>,
    pub metrics: Arc<ObsMetrics>,
}

impl ObsState {
    pub fn new(exporter: Arc<Exporter>) -> Self {
        Self {
            exporter,
            metrics: Arc::new(ObsMetrics::new()),
        }
    }
}

/// Health endpoint handler
async fn health() -> ActixResult<HttpResponse> {
    tracing::debug!("Health check requested");
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}

/// Readiness endpoint handler; ready only when every target answers a ping
async fn readiness(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    match state.exporter.health_check().await {
        Ok(()) => {
            tracing::debug!("Readiness check passed");
            Ok(HttpResponse::Ok().json(json!({
                "status": "ready"
            })))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Ok(HttpResponse::ServiceUnavailable().json(json!({
                "status": "not ready",
                "error": e.to_string()
            })))
        }
    }
}

/// Metrics endpoint handler; every request runs one full collect cycle
async fn metrics(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    tracing::debug!("Metrics scrape requested");
    let started = Instant::now();

    let (sink, stream) = sample_channel();
    let status = state.exporter.collect(&sink).await;
    drop(sink);
    let samples = stream.drain().await;

    state.metrics.observe_scrape(started.elapsed().as_secs_f64());
    let sample_count = samples.len();

    match state.metrics.encode(samples) {
        Ok(metrics_text) => {
            tracing::debug!(
                ?status,
                samples = sample_count,
                bytes = metrics_text.len(),
                "Metrics encoded successfully"
            );
            Ok(HttpResponse::Ok()
                .content_type("text/plain; version=0.0.4; charset=utf-8")
                .body(metrics_text))
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to encode metrics"
            })))
        }
    }
}

/// Create exposition service factory
pub fn create_service(
    state: ObsState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(Logger::default())
        .service(
            web::scope("")
                .route("/healthz", web::get().to(health))
                .route("/readyz", web::get().to(readiness))
                .route("/metrics", web::get().to(metrics)),
        )
}

/// Start exposition server; returns when the server stops
pub async fn start_server(bind_addr: &str, state: ObsState) -> Result<()> {
    tracing::info!("Starting exposition server on {}", bind_addr);

    HttpServer::new(move || create_service(state.clone()))
        .bind(bind_addr)?
        .run()
        .await?;

    tracing::info!("Exposition server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use pse_collectors::{domains, DomainCollector, StatCollector};
    use pse_db::Target;
    use std::time::Duration;
    use test_support::{locks_row, FakeTarget};

    fn exporter_with(targets: Vec<Arc<dyn Target>>) -> Arc<Exporter> {
        let locks: Arc<dyn DomainCollector> =
            Arc::new(StatCollector::new(&domains::LOCKS, Duration::from_secs(1)));
        Arc::new(Exporter::new(targets, vec![locks]).unwrap())
    }

    fn locks_target(name: &str) -> FakeTarget {
        FakeTarget::new(name).with_rows("pg_locks", vec![locks_row("app", "sharelock", 3)])
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = ObsState::new(exporter_with(vec![locks_target("db-a").into_arc()]));
        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/healthz").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_readiness_endpoint_ready() {
        let state = ObsState::new(exporter_with(vec![locks_target("db-a").into_arc()]));
        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_readiness_endpoint_not_ready() {
        let replica = Arc::new(locks_target("db-b"));
        replica.set_healthy(false);
        let state = ObsState::new(exporter_with(vec![
            locks_target("db-a").into_arc(),
            replica as Arc<dyn Target>,
        ]));
        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/readyz").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "not ready");
        assert!(body["error"].as_str().unwrap().contains("db-b"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = ObsState::new(exporter_with(vec![locks_target("db-a").into_arc()]));
        let app = test::init_service(create_service(state)).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4; charset=utf-8"
        );

        let body = test::read_body(resp).await;
        let body_str = std::str::from_utf8(&body).unwrap();

        assert!(body_str
            .contains(r#"pg_stat_locks_count{target="db-a",datname="app",mode="sharelock"} 3"#));
        assert!(body_str.contains("pg_stat_up 1"));
        assert!(body_str.contains("# TYPE pg_stat_exporter_scrapes counter"));
        assert!(body_str.contains("pg_stat_exporter_scrapes_total 1"));
        assert!(body_str.contains("pg_stat_exporter_scrape_duration_seconds"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_with_failing_target() {
        let broken = FakeTarget::new("db-b").failing("connection refused");
        let state = ObsState::new(exporter_with(vec![
            locks_target("db-a").into_arc(),
            broken.into_arc(),
        ]));
        let app = test::init_service(create_service(state.clone())).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        let body_str = std::str::from_utf8(&body).unwrap();

        assert!(body_str.contains(r#"target="db-a""#));
        assert!(!body_str.contains(r#"target="db-b""#));
        assert!(body_str.contains("pg_stat_up 0"));
        assert_eq!(state.exporter.scrapes_total(), 1);
    }

    #[::core::prelude::v1::test]
    fn test_counter_names_drop_total_suffix() {
        let scrapes = MetricDesc::new(
            "pg_stat",
            "exporter",
            "scrapes_total",
            "Current total PostgreSQL scrapes",
            MetricKind::Counter,
            Vec::new(),
        );
        assert_eq!(exposition_name(&scrapes), "pg_stat_exporter_scrapes");

        let seq_scan = MetricDesc::new(
            "pg_stat",
            "user_tables",
            "sequential_scan",
            "Number of sequential scans initiated on this table",
            MetricKind::Counter,
            Vec::new(),
        );
        assert_eq!(exposition_name(&seq_scan), "pg_stat_user_tables_sequential_scan");
    }

    #[::core::prelude::v1::test]
    fn test_encode_groups_families() {
        let desc = Arc::new(MetricDesc::new(
            "pg_stat",
            "locks",
            "count",
            "Number of locks",
            MetricKind::Gauge,
            vec!["target".to_string()],
        ));
        let samples = vec![
            Sample::new(desc.clone(), 1.0, vec!["db-a".to_string()]).unwrap(),
            Sample::new(desc, 2.0, vec!["db-b".to_string()]).unwrap(),
        ];

        let text = ObsMetrics::new().encode(samples).unwrap();
        assert_eq!(text.matches("# TYPE pg_stat_locks_count gauge").count(), 1);
        assert!(text.contains(r#"pg_stat_locks_count{target="db-b"} 2"#));
    }

    #[::core::prelude::v1::test]
    fn test_encode_escapes_label_values() {
        let desc = Arc::new(MetricDesc::new(
            "pg_stat",
            "statements",
            "calls",
            "Number of times executed",
            MetricKind::Counter,
            vec!["target".to_string(), "query".to_string()],
        ));
        let query = "SELECT \"name\"\nFROM t WHERE path LIKE 'C:\\%'";
        let samples =
            vec![Sample::new(desc, 4.0, vec!["db-a".to_string(), query.to_string()]).unwrap()];

        let text = ObsMetrics::new().encode(samples).unwrap();

        assert!(text.contains(r#"query="SELECT \"name\"\nFROM t WHERE path LIKE 'C:\\%'""#));
        assert!(text.contains("pg_stat_statements_calls_total{target=\"db-a\""));
        let sample_lines = text
            .lines()
            .filter(|line| line.starts_with("pg_stat_statements_calls"))
            .count();
        assert_eq!(sample_lines, 1);
    }
}
