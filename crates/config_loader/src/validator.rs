//! Config validation
//!
//! Rules:
//! - field length checks declared on the config types
//! - connection.uri parses as an endpoint descriptor
//! - publish.topic_prefix does not end with '.'
//! - 0 < publish.send_timeout_ms < 1000
//! - dispatch.drain_timeout_ms > 0
//! - dispatch.buffer_size > 0

use ::validator::Validate;

use contracts::{ContractError, Endpoint, ForwarderConfig};

/// Upper bound for a single publish; keeps a stalled broker from wedging a worker
const MAX_SEND_TIMEOUT_MS: u64 = 1000;

/// Validate ForwarderConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &ForwarderConfig) -> Result<(), ContractError> {
    validate_declared(config)?;
    validate_endpoint(config)?;
    validate_topic_prefix(config)?;
    validate_send_timeout(config)?;
    validate_dispatch(config)?;
    Ok(())
}

/// Run the derive-declared checks
fn validate_declared(config: &ForwarderConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))
}

fn validate_endpoint(config: &ForwarderConfig) -> Result<(), ContractError> {
    Endpoint::parse(&config.connection.uri)
        .map(|_| ())
        .map_err(|e| ContractError::config_validation("connection.uri", e.to_string()))
}

fn validate_topic_prefix(config: &ForwarderConfig) -> Result<(), ContractError> {
    let prefix = &config.publish.topic_prefix;
    if prefix.ends_with('.') {
        return Err(ContractError::config_validation(
            "publish.topic_prefix",
            format!("topic_prefix '{prefix}' must not end with '.'"),
        ));
    }
    if prefix.chars().any(char::is_whitespace) {
        return Err(ContractError::config_validation(
            "publish.topic_prefix",
            format!("topic_prefix '{prefix}' must not contain whitespace"),
        ));
    }
    Ok(())
}

fn validate_send_timeout(config: &ForwarderConfig) -> Result<(), ContractError> {
    let ms = config.publish.send_timeout_ms;
    if ms == 0 || ms >= MAX_SEND_TIMEOUT_MS {
        return Err(ContractError::config_validation(
            "publish.send_timeout_ms",
            format!("send_timeout_ms must be in 1..{MAX_SEND_TIMEOUT_MS}, got {ms}"),
        ));
    }
    Ok(())
}

fn validate_dispatch(config: &ForwarderConfig) -> Result<(), ContractError> {
    let dispatch = &config.dispatch;

    if dispatch.drain_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "dispatch.drain_timeout_ms",
            "drain_timeout_ms must be > 0",
        ));
    }

    if dispatch.buffer_size == 0 {
        return Err(ContractError::config_validation(
            "dispatch.buffer_size",
            "buffer_size must be > 0",
        ));
    }

    Ok(())
}
