//! Error types for the entry model

use crate::ids::CorrelationKey;

/// Errors raised by figure collection operations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// No record with this key
    #[error("figure not found: {0}")]
    UnknownRecord(CorrelationKey),

    /// Record is tombstoned and cannot be edited
    #[error("figure {0} is marked for deletion")]
    RecordDeleted(CorrelationKey),

    /// Two records share a key
    #[error("duplicate correlation key: {0}")]
    DuplicateKey(CorrelationKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_display() {
        let key = CorrelationKey::new();
        let err = ModelError::UnknownRecord(key);
        assert!(err.to_string().contains("figure not found"));
        assert!(err.to_string().contains(&key.to_string()));
    }
}
