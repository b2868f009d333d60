use thiserror::Error;

/// Errors raised while validating or persisting runtime settings.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
