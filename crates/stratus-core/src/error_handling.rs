//! Error types for the orchestration loop and the command executor seam.
//!
//! Guard rejections are not errors: the dispatcher reports them as
//! `ToolResponse` values. What lives here is what can actually fail:
//! model selection, the provider stream, and command execution.

use thiserror::Error;

/// Errors that end a chat early
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("No suitable model found for vendor '{vendor}' and family '{family}'")]
    NoSuitableModel { vendor: String, family: String },

    #[error("Model '{0}' is not configured")]
    UnknownModel(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl AgentError {
    /// Model selection failures are terminal and shown to the user as is
    pub fn is_model_selection(&self) -> bool {
        matches!(
            self,
            AgentError::NoSuitableModel { .. } | AgentError::UnknownModel(_)
        )
    }
}

/// Failure raised by a command executor. The dispatcher turns it into a
/// failure envelope carrying `name`, `message` and `statusCode`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{name}: {message}")]
pub struct ToolExecutionError {
    pub name: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ToolExecutionError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// Markdown shown when an unexpected error escapes the loop
pub fn apology_message(error: &AgentError, issue_url: &str) -> String {
    format!(
        "\n\nSorry, something went wrong while handling your request: {}\n\n\
         If this keeps happening, please [report an issue]({}).\n",
        error, issue_url
    )
}
