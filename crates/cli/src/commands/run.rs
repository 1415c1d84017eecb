//! `run` command implementation.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use broker::{InMemoryBroker, StompTransport};
use config_loader::ConfigLoader;
use contracts::{BrokerTransport, ErrorHandler, ForwarderConfig};
use dispatcher::{OnlyOnceErrorHandler, TracingErrorHandler};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{ForwardStats, Forwarder};

/// Execute the `run` command
pub async fn run_forwarder(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    ConfigLoader::validate(&config).map_err(CliError::ConfigValidation)?;

    info!(
        uri = %config.connection.uri,
        topic_prefix = %config.publish.topic_prefix,
        format = ?config.publish.format,
        buffer_size = config.dispatch.buffer_size,
        max_in_flight = config.dispatch.max_in_flight,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        println!("{}", ConfigLoader::to_toml(&config)?);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let error_handler: Arc<dyn ErrorHandler> = if args.report_once {
        Arc::new(OnlyOnceErrorHandler::new())
    } else {
        Arc::new(TracingErrorHandler)
    };

    let stats = if args.in_memory {
        info!("Running against the in-memory broker; events stay in this process");
        forward(&InMemoryBroker::new(), &config, error_handler, args).await?
    } else {
        forward(&StompTransport::new(), &config, error_handler, args).await?
    };

    stats.print_summary();
    info!("Log forwarder finished");
    Ok(())
}

/// File values when a path is given, defaults otherwise
fn load_config(path: Option<&Path>) -> Result<ForwarderConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(ForwarderConfig::default());
    };
    info!(config = %path.display(), "Loading configuration");

    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn forward<T: BrokerTransport>(
    transport: &T,
    config: &ForwarderConfig,
    error_handler: Arc<dyn ErrorHandler>,
    args: &RunArgs,
) -> Result<ForwardStats> {
    let forwarder = Forwarder::connect(transport, config, error_handler).await?;
    let stats = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            forwarder.run(BufReader::new(file), shutdown_signal()).await?
        }
        None => {
            forwarder
                .run(BufReader::new(tokio::io::stdin()), shutdown_signal())
                .await?
        }
    };
    Ok(stats)
}

/// Resolves on Ctrl+C or SIGTERM
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
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
                    warn!(error = %e, "Failed to install SIGTERM handler");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_no_file_means_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.publish.topic_prefix, "LOG4NET");
    }

    #[test]
    fn test_file_values_load() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[publish]\ntopic_prefix = \"APP\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.publish.topic_prefix, "APP");
    }

    #[tokio::test]
    async fn test_forward_reads_input_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"source\":\"A\",\"message\":\"one\"}}").unwrap();
        writeln!(file, "{{\"source\":\"B\",\"message\":\"two\"}}").unwrap();

        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe("LOG4NET.>").unwrap();
        let args = RunArgs {
            config: None,
            input: Some(file.path().to_path_buf()),
            uri: None,
            topic_prefix: None,
            format: None,
            buffer_size: None,
            max_in_flight: None,
            drain_timeout_ms: None,
            in_memory: true,
            report_once: false,
            dry_run: false,
            metrics_port: 0,
        };

        let stats = forward(
            &broker,
            &ForwarderConfig::default(),
            Arc::new(TracingErrorHandler),
            &args,
        )
        .await
        .unwrap();
        assert_eq!(stats.dispatch.events_published, 2);
        assert_eq!(sub.drain().len(), 2);
    }
}
