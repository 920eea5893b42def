// Queue Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_QUEUE_NAME_LEN: usize = 64;

/// Network address of a broker node serving a queue (e.g. `10.0.0.5:6000`)
pub type Address = String;

/// Validated queue name
///
/// Allowed: ASCII alphanumerics, `-` and `_`, at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(name: &str) -> Result<()> {
    let invalid = |reason: &str| DomainError::InvalidQueueName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("queue name cannot be empty"));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(invalid("queue name too long (max 64 characters)"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "queue name must be alphanumeric with optional '-' or '_'",
        ));
    }
    Ok(())
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueueName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for QueueName {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(queue: QueueName) -> Self {
        queue.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_queue_names() {
        for name in ["orders", "order-events", "order_events_v2", "Q1"] {
            assert!(QueueName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_empty_queue_name() {
        let err = QueueName::new("").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_queue_name_too_long() {
        let err = QueueName::new("a".repeat(65)).unwrap_err();
        assert!(err.to_string().contains("too long"));
        assert!(QueueName::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn test_queue_name_invalid_chars() {
        let err = QueueName::new("orders!").unwrap_err();
        assert!(err.to_string().contains("alphanumeric"));
        assert!(QueueName::new("orders.v2").is_err());
        assert!(QueueName::new("orders v2").is_err());
    }

    #[test]
    fn test_queue_name_serde_validates() {
        let ok: QueueName = serde_json::from_str("\"orders\"").unwrap();
        assert_eq!(ok.as_str(), "orders");

        let bad: std::result::Result<QueueName, _> = serde_json::from_str("\"bad name\"");
        assert!(bad.is_err());
    }
}
