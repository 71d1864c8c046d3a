//! 配置校验模块
//!
//! 校验规则：
//! - 字段取值范围 (validator derive)
//! - 每种测量类型至多一条分发策略
//! - metrics_port 非 0
//! - 文档组件类名与端口名非空

use std::collections::HashSet;

use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use contracts::{ContractError, GraphDocument};

use crate::FacadeConfig;

/// 校验 FacadeConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &FacadeConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| first_error(&errors))?;
    validate_policy_kinds(config)?;
    validate_metrics_port(config)?;
    Ok(())
}

/// 校验分发策略唯一性
fn validate_policy_kinds(config: &FacadeConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, policy) in config.dispatch.policies.iter().enumerate() {
        if !seen.insert(policy.kind) {
            return Err(ContractError::config_validation(
                format!("dispatch.policies[{idx}].kind"),
                format!("duplicate policy for kind '{}'", policy.kind),
            ));
        }
    }
    Ok(())
}

/// 校验 Prometheus 端口
fn validate_metrics_port(config: &FacadeConfig) -> Result<(), ContractError> {
    if config.observability.metrics_port == Some(0) {
        return Err(ContractError::config_validation(
            "observability.metrics_port",
            "metrics_port must be > 0",
        ));
    }
    Ok(())
}

/// 校验数据流文档
///
/// 结构校验之外，要求组件类名与端口名非空；类名是否已注册在加载时检查。
pub fn validate_document(doc: &GraphDocument) -> Result<(), ContractError> {
    doc.validate()?;
    for subgraph in doc.additions() {
        if let Some(spec) = &subgraph.component {
            if spec.class.trim().is_empty() {
                return Err(ContractError::invalid_document(
                    subgraph.id.as_str(),
                    "component class cannot be empty",
                ));
            }
        }
        for edge in &subgraph.inputs {
            if edge.port.is_empty() || edge.source_port.is_empty() {
                return Err(ContractError::invalid_document(
                    subgraph.id.as_str(),
                    format!("edge from '{}' has an empty port name", edge.source),
                ));
            }
        }
    }
    Ok(())
}

/// 将 validator 错误转换为第一条带路径的 ConfigValidation
fn first_error(errors: &ValidationErrors) -> ContractError {
    collect(errors, "")
        .unwrap_or_else(|| ContractError::config_validation("config", errors.to_string()))
}

fn collect(errors: &ValidationErrors, prefix: &str) -> Option<ContractError> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed '{}' check", e.code));
                ContractError::config_validation(path.clone(), message)
            }),
            ValidationErrorsKind::Struct(inner) => collect(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| collect(inner, &format!("{path}[{idx}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}
