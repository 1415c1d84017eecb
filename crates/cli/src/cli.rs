//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::{ForwarderConfig, MessageFormat};
use std::path::PathBuf;
use tracing::info;

/// Log Forwarder - fire-and-forget publishing of log events to a message broker
#[derive(Parser, Debug)]
#[command(
    name = "log-forwarder",
    author,
    version,
    about = "Forward structured log events to a message broker",
    long_about = "Reads JSON-lines log events, groups them into batches and publishes\n\
                  every event to the topic '<prefix>.<source>' without blocking the\n\
                  producer. Pending batches are drained before the connection closes."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LOG_FORWARDER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LOG_FORWARDER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Forward events read from stdin (or a file) until EOF or Ctrl-C
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "LOG_FORWARDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Read events from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Override the broker endpoint
    #[arg(long, env = "LOG_FORWARDER_URI")]
    pub uri: Option<String>,

    /// Override the topic prefix
    #[arg(long, env = "LOG_FORWARDER_TOPIC_PREFIX")]
    pub topic_prefix: Option<String>,

    /// Override the wire format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Override events per batch
    #[arg(long, env = "LOG_FORWARDER_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Override the concurrent batch limit (0 = unbounded)
    #[arg(long, env = "LOG_FORWARDER_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    /// Override the shutdown drain timeout in milliseconds
    #[arg(long)]
    pub drain_timeout_ms: Option<u64>,

    /// Publish to a process-local broker instead of the network
    #[arg(long)]
    pub in_memory: bool,

    /// Log only the first delivery failure
    #[arg(long)]
    pub report_once: bool,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOG_FORWARDER_METRICS_PORT")]
    pub metrics_port: u16,
}

impl RunArgs {
    /// Apply command-line overrides on top of file values
    pub fn apply_overrides(&self, config: &mut ForwarderConfig) {
        if let Some(ref uri) = self.uri {
            info!(uri = %uri, "Overriding broker endpoint from CLI");
            config.connection.uri = uri.clone();
        }
        if let Some(ref prefix) = self.topic_prefix {
            info!(prefix = %prefix, "Overriding topic prefix from CLI");
            config.publish.topic_prefix = prefix.clone();
        }
        if let Some(format) = self.format {
            config.publish.format = format.into();
        }
        if let Some(buffer_size) = self.buffer_size {
            config.dispatch.buffer_size = buffer_size;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.dispatch.max_in_flight = max_in_flight;
        }
        if let Some(drain_timeout_ms) = self.drain_timeout_ms {
            config.dispatch.drain_timeout_ms = drain_timeout_ms;
        }
    }
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "forwarder.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "forwarder.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Output as TOML (with every default filled in)
    #[arg(long, conflicts_with = "json")]
    pub toml: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Wire format selectable from the command line
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    Json,
    Bincode,
}

impl From<FormatArg> for MessageFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => MessageFormat::Json,
            FormatArg::Bincode => MessageFormat::Bincode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "log-forwarder",
            "run",
            "--uri",
            "tcp://broker:61613",
            "--topic-prefix",
            "APP",
            "--format",
            "bincode",
            "--buffer-size",
            "10",
            "--max-in-flight",
            "0",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut config = ForwarderConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.connection.uri, "tcp://broker:61613");
        assert_eq!(config.publish.topic_prefix, "APP");
        assert_eq!(config.publish.format, MessageFormat::Bincode);
        assert_eq!(config.dispatch.buffer_size, 10);
        assert_eq!(config.dispatch.max_in_flight(), None);
        assert_eq!(config.dispatch.drain_timeout_ms, 5000);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["log-forwarder", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_format_reaches_observability() {
        let cli = Cli::try_parse_from([
            "log-forwarder",
            "--log-format",
            "compact",
            "-vv",
            "validate",
            "--config",
            "forwarder.toml",
        ])
        .unwrap();
        let config = observability::ObservabilityConfig::from_verbosity(cli.verbose, cli.quiet)
            .with_log_format(cli.log_format.into());
        assert_eq!(config.log_format, observability::LogFormat::Compact);
        assert_eq!(config.default_filter, "trace");
    }
}
