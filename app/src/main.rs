//! ABOUTME: Entry point for the pg-stat-exporter binary
//! ABOUTME: Loads configuration, connects every target, then serves /metrics

use clap::Parser;
use futures_util::future::join_all;
use pse_collectors::build_collectors;
use pse_config::Config;
use pse_core::telemetry::{self, LogFormat};
use pse_core::{Error, Result};
use pse_db::{Target, TargetConnection};
use pse_exporter::Exporter;
use pse_obs::ObsState;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prometheus exporter for PostgreSQL statistics views
#[derive(Debug, Parser)]
#[command(name = "pg-stat-exporter", version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format: pretty or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format, "pg-stat-exporter");
    tracing::info!("pg-stat-exporter starting");

    // Load configuration - exit with non-zero if invalid
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => {
            tracing::debug!(?config, "Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if cli.check_config {
        tracing::info!(
            targets = config.targets.len(),
            collectors = ?config.exporter.collectors,
            "Configuration is valid"
        );
        return;
    }

    if let Err(e) = run(config).await {
        tracing::error!("Exporter failed: {}", e);
        process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    // Unknown collector names fail before any connection is attempted
    let collectors = build_collectors(
        &config.exporter.collectors,
        config.exporter.query_timeout(),
    )?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling startup");
                cancel.cancel();
            }
        }
    });

    let results = connect_targets(&config, &cancel).await;
    interrupt.abort();
    if cancel.is_cancelled() {
        return Err(Error::Cancelled("startup interrupted".to_string()));
    }

    let connections = select_targets(results, config.exporter.fail_fast)?;
    let targets: Vec<Arc<dyn Target>> = connections
        .into_iter()
        .map(|connection| Arc::new(connection) as Arc<dyn Target>)
        .collect();

    tracing::info!(
        targets = targets.len(),
        collectors = collectors.len(),
        bind_addr = %config.server.bind_addr(),
        "Exporter configured and ready"
    );

    let exporter = Arc::new(Exporter::new(targets, collectors)?);
    let served = pse_obs::start_server(
        &config.server.bind_addr(),
        ObsState::new(Arc::clone(&exporter)),
    )
    .await;

    exporter.close().await;
    tracing::info!("pg-stat-exporter stopped");
    served
}

/// Connect every configured target concurrently; each retries on its own budget
async fn connect_targets(
    config: &Config,
    cancel: &CancellationToken,
) -> Vec<(String, Result<TargetConnection>)> {
    join_all(config.targets.iter().map(|descriptor| async move {
        (
            descriptor.display_name(),
            TargetConnection::connect(descriptor, cancel).await,
        )
    }))
    .await
}

/// Apply the startup policy to per-target connection outcomes.
///
/// With `fail_fast` the first failure aborts startup. Otherwise failed
/// targets are dropped and startup only aborts when none remain.
fn select_targets<T>(results: Vec<(String, Result<T>)>, fail_fast: bool) -> Result<Vec<T>> {
    let mut connected = Vec::with_capacity(results.len());
    let mut first_error = None;

    for (name, result) in results {
        match result {
            Ok(target) => {
                tracing::info!(target_name = %name, "Target connected");
                connected.push(target);
            }
            Err(e) => {
                tracing::warn!(target_name = %name, error = %e, "Target connection failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) if fail_fast => Err(e),
        Some(e) if connected.is_empty() => Err(Error::StartupConnection(format!(
            "no database target could be connected: {}",
            e
        ))),
        _ => Ok(connected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<(String, Result<u8>)> {
        vec![
            ("db-a".to_string(), Ok(1)),
            (
                "db-b".to_string(),
                Err(Error::StartupConnection("db-b: failed after 7 attempt(s)".into())),
            ),
            ("db-c".to_string(), Ok(3)),
        ]
    }

    #[test]
    fn test_fail_fast_aborts_on_any_failure() {
        let err = select_targets(outcomes(), true).unwrap_err();
        assert!(matches!(err, Error::StartupConnection(_)));
        assert!(err.to_string().contains("db-b"));
    }

    #[test]
    fn test_lenient_policy_drops_failed_targets() {
        let connected = select_targets(outcomes(), false).unwrap();
        assert_eq!(connected, vec![1, 3]);
    }

    #[test]
    fn test_lenient_policy_needs_one_target() {
        let results: Vec<(String, Result<u8>)> = vec![(
            "db-a".to_string(),
            Err(Error::StartupConnection("db-a: failed after 1 attempt(s)".into())),
        )];
        let err = select_targets(results, false).unwrap_err();
        assert!(err.to_string().contains("no database target"));
    }

    #[test]
    fn test_all_connected_passes_through() {
        let results: Vec<(String, Result<u8>)> =
            vec![("db-a".to_string(), Ok(1)), ("db-b".to_string(), Ok(2))];
        assert_eq!(select_targets(results, true).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "pg-stat-exporter",
            "--config",
            "/etc/pg-exporter.toml",
            "--log-format",
            "json",
            "--check-config",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/pg-exporter.toml")));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.check_config);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pg-stat-exporter"]).unwrap();
        assert_eq!(cli.config, None);
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert!(!cli.check_config);
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["pg-stat-exporter", "--log-format", "xml"]).is_err());
    }
}
