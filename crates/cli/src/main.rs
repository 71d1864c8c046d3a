//! # Tracking Facade CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 数据流加载、运行与统计
//! - 数据流文档与配置校验
//! - 向重配置服务器发送文档

mod cli;
mod commands;
mod error;
mod stats;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_dataflow, run_send, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Tracking facade CLI starting");

    let result = match &cli.command {
        Commands::Run(args) => run_dataflow(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Send(args) => run_send(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// Metrics are set up later by `run`, which knows the configured port.
fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.clone().into(),
        metrics_port: None,
        default_log_level: level.to_string(),
    })
}
