//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Input file not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Configuration loading or validation error
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ContractError),

    /// Dataflow loading or lifecycle error
    #[error("Dataflow operation failed: {0}")]
    Dataflow(#[source] ContractError),

    /// Server connection error
    #[error("Server connection failed: {0}")]
    Server(#[source] ContractError),

    /// Observability setup error
    #[error("Failed to initialize observability: {0}")]
    Observability(#[from] anyhow::Error),
}

impl CliError {
    pub fn file_not_found(path: &std::path::Path) -> Self {
        Self::FileNotFound {
            path: path.display().to_string(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
