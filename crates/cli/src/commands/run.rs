//! `run` command implementation.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

use config_loader::{ConfigLoader, FacadeConfig};
use contracts::{ComponentId, DataflowObserver, Subgraph};
use dataflow::DataflowStatus;
use facade::AdvancedFacade;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::stats::RunStats;

/// Logs every topology change
struct LoggingObserver;

impl DataflowObserver for LoggingObserver {
    fn notify_add_component(&self, pattern: &str, id: &ComponentId, subgraph: &Subgraph) {
        let class = subgraph.component.as_ref().map(|c| c.class.as_str()).unwrap_or_default();
        info!(pattern, id = %id, class, "Component added");
    }

    fn notify_delete_component(&self, pattern: &str, id: &ComponentId) {
        info!(pattern, id = %id, "Component removed");
    }
}

/// Execute the `run` command
pub async fn run_dataflow(args: &RunArgs) -> Result<()> {
    if !args.dataflow.exists() {
        return Err(CliError::file_not_found(&args.dataflow).into());
    }

    let config = load_config(args)?;
    if let Some(port) = config.observability.metrics_port {
        observability::init_metrics_only(port).map_err(CliError::Observability)?;
    }

    let facade = AdvancedFacade::with_config(config).map_err(CliError::Dataflow)?;
    facade
        .add_observer(Arc::new(LoggingObserver))
        .map_err(CliError::Dataflow)?;

    info!(dataflow = %args.dataflow.display(), "Loading dataflow");
    facade
        .load_dataflow(&args.dataflow, true)
        .map_err(CliError::Dataflow)?;
    facade.start_dataflow().map_err(CliError::Dataflow)?;

    let initial = facade.status();
    info!(
        components = initial.component_count(),
        generation = initial.generation,
        "Dataflow started"
    );

    if let Some(ref server) = args.server {
        facade.connect_to_server(server).map_err(CliError::Server)?;
    }

    let started_at = Instant::now();
    let mut status = facade.dataflow().subscribe();
    let deadline = async {
        if args.duration == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        }
    };

    tokio::select! {
        _ = watch_status(&mut status) => {
            warn!("Dataflow control loop stopped");
        }
        _ = deadline => {
            info!(seconds = args.duration, "Run duration elapsed");
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping dataflow...");
        }
    }

    let connection = args.server.as_ref().map(|_| facade.connection_state());
    let stats = RunStats::collect(started_at.elapsed(), initial.generation, &facade.status(), connection);
    facade.shutdown();
    stats.print_summary();

    info!("Tracking facade finished");
    Ok(())
}

/// Configuration file (or defaults) with CLI overrides applied
fn load_config(args: &RunArgs) -> Result<FacadeConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::file_not_found(path));
            }
            ConfigLoader::load_from_path(path).map_err(CliError::Config)?
        }
        None => FacadeConfig::default(),
    };

    if let Some(port) = args.metrics_port {
        info!(port, "Overriding metrics port from CLI");
        config.observability.metrics_port = (port != 0).then_some(port);
    }
    Ok(config)
}

/// Log graph changes until the control loop goes away
async fn watch_status(status: &mut watch::Receiver<DataflowStatus>) {
    let mut generation = status.borrow().generation;
    while status.changed().await.is_ok() {
        let (current, components, started) = {
            let snapshot = status.borrow_and_update();
            (snapshot.generation, snapshot.component_count(), snapshot.started)
        };
        if current != generation {
            info!(generation = current, components, started, "Dataflow changed");
            generation = current;
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args(config: Option<PathBuf>, metrics_port: Option<u16>) -> RunArgs {
        RunArgs {
            dataflow: PathBuf::from("flow.json"),
            server: None,
            config,
            duration: 0,
            metrics_port,
        }
    }

    #[test]
    fn test_default_config_without_file() {
        let config = load_config(&args(None, None)).unwrap();
        assert_eq!(config, FacadeConfig::default());
    }

    #[test]
    fn test_metrics_port_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[observability]\nmetrics_port = 9100\n").unwrap();

        let config = load_config(&args(Some(file.path().to_path_buf()), None)).unwrap();
        assert_eq!(config.observability.metrics_port, Some(9100));

        let config = load_config(&args(Some(file.path().to_path_buf()), Some(0))).unwrap();
        assert_eq!(config.observability.metrics_port, None);
    }

    #[test]
    fn test_missing_config_file() {
        let result = load_config(&args(Some(PathBuf::from("/nonexistent/facade.toml")), None));
        assert!(matches!(result, Err(CliError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_watch_status_ends_with_control_loop() {
        let (tx, mut rx) = watch::channel(DataflowStatus::default());
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), watch_status(&mut rx))
            .await
            .unwrap();
    }
}
