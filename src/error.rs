use thiserror::Error;

/// Failures surfaced by provider adapters.
///
/// Per-line decode problems inside a stream never show up here; only a
/// broken read does, as `Transport`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model '{model}' not found - {hint}")]
    ModelNotFound { model: String, hint: String },

    #[error("request failed (status {status}): {body}")]
    RequestFailed { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Transport(String),
}

impl ProviderError {
    pub fn model_not_found(model: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
            hint: hint.into(),
        }
    }
}
