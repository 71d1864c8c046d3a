//! `validate` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::{ConfigLoader, FacadeConfig};
use contracts::GraphDocument;
use dataflow::ComponentRegistry;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Summary {
    Dataflow {
        is_request: bool,
        additions: usize,
        removals: usize,
        edges: usize,
    },
    Config {
        default_port: u16,
        max_frame_length: usize,
        policy_overrides: usize,
        metrics_port: Option<u16>,
    },
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(file = %args.file.display(), config = args.config, "Validating");

    let result = validate_file(&args.file, args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Validation failed")
    }
}

fn validate_file(path: &Path, as_config: bool) -> ValidationResult {
    let display = path.display().to_string();

    if !path.exists() {
        return invalid(display, format!("File not found: {}", path.display()));
    }

    if as_config {
        match ConfigLoader::load_from_path(path) {
            Ok(config) => valid(display, Vec::new(), config_summary(&config)),
            Err(e) => invalid(display, e.to_string()),
        }
    } else {
        match ConfigLoader::load_document_from_path(path) {
            Ok(doc) => {
                let warnings = collect_warnings(&doc, &ComponentRegistry::with_builtins());
                valid(display, warnings, document_summary(&doc))
            }
            Err(e) => invalid(display, e.to_string()),
        }
    }
}

fn valid(path: String, warnings: Vec<String>, summary: Summary) -> ValidationResult {
    ValidationResult {
        valid: true,
        path,
        error: None,
        warnings: if warnings.is_empty() { None } else { Some(warnings) },
        summary: Some(summary),
    }
}

fn invalid(path: String, error: String) -> ValidationResult {
    ValidationResult {
        valid: false,
        path,
        error: Some(error),
        warnings: None,
        summary: None,
    }
}

fn document_summary(doc: &GraphDocument) -> Summary {
    Summary::Dataflow {
        is_request: doc.is_request,
        additions: doc.additions().count(),
        removals: doc.removals().count(),
        edges: doc.additions().map(|s| s.inputs.len()).sum(),
    }
}

fn config_summary(config: &FacadeConfig) -> Summary {
    Summary::Config {
        default_port: config.network.default_port,
        max_frame_length: config.network.max_frame_length,
        policy_overrides: config.dispatch.policies.len(),
        metrics_port: config.observability.metrics_port,
    }
}

/// Non-fatal issues: classes that only a custom registry could provide
fn collect_warnings(doc: &GraphDocument, registry: &ComponentRegistry) -> Vec<String> {
    let mut warnings = Vec::new();

    for subgraph in doc.additions() {
        if let Some(spec) = &subgraph.component {
            if !registry.contains(&spec.class) {
                warnings.push(format!(
                    "Subgraph '{}' uses class '{}' which is not a built-in component",
                    subgraph.id, spec.class
                ));
            }
        }
    }

    if doc.is_request {
        warnings.push("Document is a pattern request and needs a resolver to be loaded".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Valid: {}", result.path);

        match &result.summary {
            Some(Summary::Dataflow {
                is_request,
                additions,
                removals,
                edges,
            }) => {
                println!("\n  Request: {}", is_request);
                println!("  Additions: {}", additions);
                println!("  Removals: {}", removals);
                println!("  Edges: {}", edges);
            }
            Some(Summary::Config {
                default_port,
                max_frame_length,
                policy_overrides,
                metrics_port,
            }) => {
                println!("\n  Default port: {}", default_port);
                println!("  Max frame length: {}", max_frame_length);
                println!("  Policy overrides: {}", policy_overrides);
                println!("  Metrics port: {:?}", metrics_port);
            }
            None => {}
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Invalid: {}", result.path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
