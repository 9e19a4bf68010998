//! Executor trait and the output shapes flowing through tool execution.

use serde_json::Value;

use crate::error_handling::ToolExecutionError;
use crate::resource_context::ResourceRecord;

/// Raw result of one service command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub data: Value,
    pub request_id: Option<String>,
    pub http_status_code: Option<u16>,
}

impl CommandOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            request_id: None,
            http_status_code: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_http_status_code(mut self, status: u16) -> Self {
        self.http_status_code = Some(status);
        self
    }
}

/// Runs a single command for a tool. Implementations own their clients.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        tool: &str,
        command: &str,
        params: &Value,
    ) -> Result<CommandOutput, ToolExecutionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutputPart {
    Text(String),
    Reference(ResourceRecord),
}

/// What a tool invocation hands back to the loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub parts: Vec<ToolOutputPart>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ToolOutputPart::Text(text.into())],
        }
    }

    pub fn push(&mut self, part: ToolOutputPart) {
        self.parts.push(part);
    }

    /// Text parts joined by newlines; this is what the model sees
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ToolOutputPart::Text(text) => Some(text.as_str()),
                ToolOutputPart::Reference(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn references(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.parts.iter().filter_map(|part| match part {
            ToolOutputPart::Reference(record) => Some(record),
            ToolOutputPart::Text(_) => None,
        })
    }
}
