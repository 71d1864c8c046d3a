//! 配置与数据流文档解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use serde::de::DeserializeOwned;

use contracts::{ContractError, DocumentParser, GraphDocument};

use crate::FacadeConfig;

/// 文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 从内容推断格式：以 `{` 开头视为 JSON，否则为 TOML
    pub fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Toml
        }
    }
}

fn parse_as<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content)
            .map_err(|e| ContractError::parse_with_source(format!("TOML parse error: {e}"), e)),
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| ContractError::parse_with_source(format!("JSON parse error: {e}"), e)),
    }
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<FacadeConfig, ContractError> {
    parse_as(content, format)
}

/// 根据格式解析数据流文档
pub fn parse_document(content: &str, format: ConfigFormat) -> Result<GraphDocument, ContractError> {
    parse_as(content, format)
}

/// 基于 serde 的文档解析器
///
/// 未指定格式时按内容推断。
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeDocumentParser {
    format: Option<ConfigFormat>,
}

impl SerdeDocumentParser {
    /// 按内容推断格式
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定格式
    pub fn with_format(format: ConfigFormat) -> Self {
        Self {
            format: Some(format),
        }
    }
}

impl DocumentParser for SerdeDocumentParser {
    fn parse(&self, bytes: &[u8]) -> Result<GraphDocument, ContractError> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| ContractError::parse_with_source("document is not valid UTF-8", e))?;
        let format = self.format.unwrap_or_else(|| ConfigFormat::sniff(content));
        parse_document(content, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MeasurementKind;

    #[test]
    fn test_parse_toml_config() {
        let content = r#"
[network]
default_port = 4000

[[dispatch.policies]]
kind = "image"
max_queue_length = 2

[[dispatch.policies]]
kind = "pose"

[observability]
log_format = "pretty"
"#;
        let config = parse(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.network.default_port, 4000);
        assert_eq!(config.network.max_frame_length, 8 * 1024 * 1024);
        assert_eq!(config.dispatch.policies.len(), 2);
        assert_eq!(config.dispatch.policies[0].kind, MeasurementKind::Image);
        assert_eq!(config.dispatch.policies[0].max_queue_length, Some(2));
        assert_eq!(config.dispatch.policies[1].max_queue_length, None);
    }

    #[test]
    fn test_parse_empty_config_is_default() {
        assert_eq!(parse("", ConfigFormat::Toml).unwrap(), FacadeConfig::default());
        assert_eq!(parse("{}", ConfigFormat::Json).unwrap(), FacadeConfig::default());
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse("invalid toml [[[", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ContractError::Parse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("xml"), None);
    }

    #[test]
    fn test_document_parser_sniffs_format() {
        let json = br#"{"subgraphs": [{"name": "P", "id": "a", "component": {"class": "ApplicationPushSinkPose"}}]}"#;
        let toml = br#"
[[subgraphs]]
name = "P"
id = "a"
[subgraphs.component]
class = "ApplicationPushSinkPose"
"#;
        let parser = SerdeDocumentParser::new();
        assert_eq!(parser.parse(json).unwrap(), parser.parse(toml).unwrap());
    }

    #[test]
    fn test_document_parser_rejects_invalid_utf8() {
        let err = SerdeDocumentParser::new().parse(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ContractError::Parse { .. }));
    }
}
