//! Event <-> transport message encoding

use contracts::{ContractError, LogEvent, MessageFormat, TransportMessage};

/// Serialize one event for the wire
pub fn encode(format: MessageFormat, event: &LogEvent) -> Result<TransportMessage, ContractError> {
    let body = match format {
        MessageFormat::Json => serde_json::to_vec(event)
            .map_err(|e| ContractError::encode(format!("json error: {e}")))?,
        MessageFormat::Bincode => bincode::serialize(event)
            .map_err(|e| ContractError::encode(format!("bincode error: {e}")))?,
    };
    Ok(TransportMessage::new(format.content_type(), body))
}

/// Deserialize a message produced by `encode` (format taken from its content type)
pub fn decode(message: &TransportMessage) -> Result<LogEvent, ContractError> {
    let format = MessageFormat::from_content_type(message.content_type).ok_or_else(|| {
        ContractError::encode(format!("unknown content type '{}'", message.content_type))
    })?;
    match format {
        MessageFormat::Json => serde_json::from_slice(&message.body)
            .map_err(|e| ContractError::encode(format!("json error: {e}"))),
        MessageFormat::Bincode => bincode::deserialize(&message.body)
            .map_err(|e| ContractError::encode(format!("bincode error: {e}"))),
    }
}
