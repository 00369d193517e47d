//! The completion seam between orchestration and any LLM provider.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// A single prompt-completion exchange.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Optional system framing for the exchange.
    pub system: Option<String>,
    /// The user-visible prompt body.
    pub prompt: String,
    /// JSON schema the provider should constrain its answer to, when it
    /// supports structured output.
    pub response_schema: Option<Value>,
    /// Model override; providers fall back to their configured default.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Unrecoverable completion failures.
#[derive(Debug, Error, Diagnostic)]
pub enum CompletionError {
    /// The provider could not be reached.
    #[error("completion transport failed: {message}")]
    #[diagnostic(code(statesman::analysis::transport))]
    Transport { message: String },

    /// The provider answered with an error or an unusable body.
    #[error("completion provider error: {message}")]
    #[diagnostic(code(statesman::analysis::provider))]
    Provider { message: String },
}

/// Provider-agnostic completion interface.
///
/// Implementations must be shareable across concurrent orchestrations;
/// the engine holds one behind an `Arc`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}
