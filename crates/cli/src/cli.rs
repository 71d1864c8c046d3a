//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tracking Facade - run and reconfigure tracking dataflows
#[derive(Parser, Debug)]
#[command(
    name = "tracking-facade",
    author,
    version,
    about = "Tracking dataflow runner",
    long_about = "Loads a tracking dataflow document, starts it and keeps it running.\n\n\
                  Optionally connects to a reconfiguration server whose documents \n\
                  are applied to the running dataflow."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRACKING_FACADE_VERBOSE")]
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
        env = "TRACKING_FACADE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a dataflow and run it
    Run(RunArgs),

    /// Validate a dataflow document or a facade configuration without running
    Validate(ValidateArgs),

    /// Send a dataflow document to a server
    Send(SendArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Dataflow document to load (TOML or JSON)
    #[arg(short, long, env = "TRACKING_FACADE_DATAFLOW")]
    pub dataflow: PathBuf,

    /// Reconfiguration server, `host` or `host:port`
    #[arg(short, long, env = "TRACKING_FACADE_SERVER")]
    pub server: Option<String>,

    /// Facade configuration file (TOML or JSON)
    #[arg(short, long, env = "TRACKING_FACADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "TRACKING_FACADE_DURATION")]
    pub duration: u64,

    /// Metrics server port, overrides the configuration (0 = disabled)
    #[arg(long, env = "TRACKING_FACADE_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// File to validate
    pub file: PathBuf,

    /// Treat the file as a facade configuration instead of a dataflow
    #[arg(long)]
    pub config: bool,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `send` command
#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Server address, `host` or `host:port`
    #[arg(short, long, env = "TRACKING_FACADE_SERVER")]
    pub server: String,

    /// Document to send
    pub file: PathBuf,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "tracking-facade",
            "run",
            "--dataflow",
            "flow.json",
            "--server",
            "localhost:4000",
            "--duration",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.dataflow, PathBuf::from("flow.json"));
                assert_eq!(args.server.as_deref(), Some("localhost:4000"));
                assert_eq!(args.duration, 5);
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_validate_args() {
        let cli = Cli::try_parse_from(["tracking-facade", "validate", "flow.toml", "--json"]).unwrap();
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.file, PathBuf::from("flow.toml"));
                assert!(args.json);
                assert!(!args.config);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_send_args() {
        let cli = Cli::try_parse_from(["tracking-facade", "send", "--server", "host:1", "flow.json"]).unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.server, "host:1");
                assert_eq!(args.file, PathBuf::from("flow.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["tracking-facade", "-q", "-v", "validate", "x.json"]).is_err());
    }
}
