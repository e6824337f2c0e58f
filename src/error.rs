use crate::llm_client::BoxError;

/// Errors surfaced by the generation pipeline.
///
/// Only hard failures live here. A malformed event or a change rejected by
/// the document is logged and skipped instead.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// Transport or provider failure while calling the model.
    #[error("model call failed: {0}")]
    Model(#[source] BoxError),
    /// The model output could not be parsed as JSON.
    #[error("model returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The response envelope did not match the expected shape.
    #[error("response failed validation: {0}")]
    Schema(String),
    /// Another turn is still pending on this session.
    #[error("a turn is already in progress")]
    Busy,
    /// The model stream stopped without signalling completion.
    #[error("model stream ended before completion")]
    Interrupted,
    /// The user message template could not be rendered.
    #[error("failed to render prompt: {0}")]
    Template(String),
}

impl AiError {
    /// Whether this failure came from the model transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, AiError::Model(_) | AiError::Interrupted)
    }
}
