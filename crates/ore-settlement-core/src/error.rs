use thiserror::Error;

#[derive(Debug, Error)]
pub enum OreSettlementError {
    #[error("Invalid input: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("No fee configuration for {category}: {reason}")]
    Configuration { category: String, reason: String },

    /// Raised when a commit finds records that are no longer eligible, or
    /// whose amounts differ from the preview being committed. Always
    /// reported as one failure; the caller must re-preview.
    #[error("Selection is stale, re-preview required (changed or no longer eligible: {})", stale_ids.join(", "))]
    Consistency { stale_ids: Vec<String> },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Missing capability: {capability}")]
    Unauthorized { capability: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl OreSettlementError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        OreSettlementError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Arithmetic left the representable decimal range.
    pub(crate) fn overflow(field: impl Into<String>) -> Self {
        OreSettlementError::Validation {
            field: field.into(),
            reason: "Amount overflows the supported decimal range".into(),
        }
    }
}

impl From<serde_json::Error> for OreSettlementError {
    fn from(e: serde_json::Error) -> Self {
        OreSettlementError::SerializationError(e.to_string())
    }
}
