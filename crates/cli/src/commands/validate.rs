//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{Endpoint, ForwarderConfig, MessageFormat};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    uri: String,
    broker_addresses: usize,
    topic_prefix: String,
    format: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let broker_addresses = Endpoint::parse(&config.connection.uri)
                .map(|e| e.addresses().len())
                .unwrap_or(0);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    uri: config.connection.uri.clone(),
                    broker_addresses,
                    topic_prefix: config.publish.topic_prefix.clone(),
                    format: format!("{:?}", config.publish.format),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ForwarderConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.dispatch.max_in_flight == 0 {
        warnings.push(
            "dispatch.max_in_flight is 0 - concurrent batches are unbounded".to_string(),
        );
    }

    if let Ok(endpoint) = Endpoint::parse(&config.connection.uri) {
        if !endpoint.is_failover() {
            warnings.push(
                "connection.uri has no failover list - a lost broker drops batches".to_string(),
            );
        }
    }

    if config.dispatch.drain_timeout_ms < config.publish.send_timeout_ms {
        warnings.push(format!(
            "dispatch.drain_timeout_ms ({}) is shorter than publish.send_timeout_ms ({}) - \
             shutdown may not wait for a stalled send",
            config.dispatch.drain_timeout_ms, config.publish.send_timeout_ms
        ));
    }

    if config.publish.format == MessageFormat::Bincode {
        warnings.push(
            "publish.format is bincode - consumers must decode application/x-bincode".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Broker: {}", summary.uri);
            println!("  Addresses: {}", summary.broker_addresses);
            println!("  Topic prefix: {}", summary.topic_prefix);
            println!("  Format: {}", summary.format);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{content}").unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_defaults_are_valid_with_warnings() {
        let (_file, args) = args_for("");
        let result = validate_config(&args);
        assert!(result.valid);
        // default uri is a single-address failover list
        let warnings = result.warnings.unwrap_or_default();
        assert!(warnings.iter().all(|w| !w.contains("failover")));
    }

    #[test]
    fn test_plain_tcp_uri_warns() {
        let (_file, args) = args_for(
            "[connection]\nuri = \"tcp://broker:61613\"\n[dispatch]\nmax_in_flight = 0\n",
        );
        let result = validate_config(&args);
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("failover")));
        assert!(warnings.iter().any(|w| w.contains("unbounded")));
    }

    #[test]
    fn test_invalid_file() {
        let (_file, args) = args_for("[publish]\ntopic_prefix = \"LOG4NET.\"\n");
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("topic_prefix"));
        assert!(run_validate(&args).is_err());
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/definitely/not/here.toml".into(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
