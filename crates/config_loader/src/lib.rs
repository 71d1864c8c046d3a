//! # Config Loader
//!
//! Configuration and dataflow document loading.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files into `FacadeConfig`
//! - Parse TOML/JSON dataflow documents into `GraphDocument`
//! - Validate both
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("facade.toml")).unwrap();
//! println!("Default port: {}", config.network.default_port);
//! ```

mod config;
mod parser;
mod validator;

pub use config::{DispatchSection, FacadeConfig, NetworkSection, PolicyOverride};
pub use parser::{ConfigFormat, SerdeDocumentParser};
pub use validator::validate_document;

use contracts::{ContractError, GraphDocument};
use std::path::Path;
use tracing::debug;

/// Configuration loader
///
/// Provides static methods to load configuration and documents from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<FacadeConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        debug!(path = %path.display(), ?format, "Loading configuration");
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<FacadeConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Load a dataflow document from file path
    ///
    /// The format comes from the extension when known, from the content otherwise.
    pub fn load_document_from_path(path: &Path) -> Result<GraphDocument, ContractError> {
        let content = Self::read_file(path)?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ConfigFormat::from_extension)
            .unwrap_or_else(|| ConfigFormat::sniff(&content));
        debug!(path = %path.display(), ?format, "Loading dataflow document");
        Self::load_document_from_str(&content, format)
    }

    /// Load a dataflow document from string
    pub fn load_document_from_str(content: &str, format: ConfigFormat) -> Result<GraphDocument, ContractError> {
        let doc = parser::parse_document(content, format)?;
        validator::validate_document(&doc)?;
        Ok(doc)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(config: &FacadeConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::parse_with_source(format!("TOML serialize error: {e}"), e))
    }

    /// Serialize configuration to JSON string
    pub fn to_json(config: &FacadeConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::parse_with_source(format!("JSON serialize error: {e}"), e))
    }

    /// Serialize a dataflow document to JSON string
    pub fn document_to_json(doc: &GraphDocument) -> Result<String, ContractError> {
        serde_json::to_string_pretty(doc)
            .map_err(|e| ContractError::parse_with_source(format!("JSON serialize error: {e}"), e))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ContractError::parse("cannot determine file format from extension"))?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| ContractError::parse(format!("unsupported config format: .{ext}")))
    }

    /// Read file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
