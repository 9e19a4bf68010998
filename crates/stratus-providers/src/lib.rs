mod streaming;
pub mod mock;
pub mod openai;

pub use mock::{MockChunk, MockProvider, MockResponse};
pub use openai::OpenAIProvider;
pub use streaming::{decode_utf8_streaming, make_final_chunk, make_text_chunk, make_tool_chunk};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stream a completion for the given messages
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream>;

    /// Get the provider name (the registry key)
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Vendor the model is served by (e.g. "openai", "anthropic")
    fn vendor(&self) -> &str;

    /// Model family, used for context-window lookup and auto selection
    fn family(&self) -> &str {
        self.model()
    }

    /// Get the configured max_tokens for this provider
    fn max_tokens(&self) -> u32;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One part of a message. A `ToolResult` always answers a `ToolCall`
/// issued earlier in the conversation by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult { call_id: String, content: String },
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentPart>) -> Self {
        Self { role, content }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(
            MessageRole::Assistant,
            vec![ContentPart::Text { text: text.into() }],
        )
    }

    /// Assistant turn that requested tools. Leading text is kept when the
    /// model produced any alongside the calls.
    pub fn assistant_tool_calls(text: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut content = Vec::with_capacity(tool_calls.len() + 1);
        if !text.trim().is_empty() {
            content.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        content.extend(tool_calls.into_iter().map(ContentPart::ToolCall));
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            MessageRole::User,
            vec![ContentPart::ToolResult {
                call_id: call_id.into(),
                content: content.into(),
            }],
        )
    }

    /// Concatenated plain text of this message (tool parts excluded)
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

pub type CompletionStream = tokio_stream::wrappers::ReceiverStream<Result<CompletionChunk>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub content: String,
    pub finished: bool,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage: Option<Usage>,
    /// Stop reason from the API (e.g., "stop", "tool_calls", "length")
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub tool: String,
    pub args: serde_json::Value,
}

/// A tool descriptor as advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Provider registry for managing multiple LLM providers.
///
/// Registration order is kept so that auto selection is deterministic:
/// the first registered provider matching a vendor/family wins.
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn LLMProvider>>,
    order: Vec<String>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
            default_provider: String::new(),
        }
    }

    pub fn register<P: LLMProvider + 'static>(&mut self, provider: P) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), Box::new(provider)).is_none() {
            self.order.push(name.clone());
        }

        if self.default_provider.is_empty() {
            self.default_provider = name;
        }
    }

    pub fn set_default(&mut self, provider_name: &str) -> Result<()> {
        if !self.providers.contains_key(provider_name) {
            anyhow::bail!("Provider '{}' not found", provider_name);
        }
        self.default_provider = provider_name.to_string();
        Ok(())
    }

    pub fn get(&self, provider_name: Option<&str>) -> Result<&dyn LLMProvider> {
        let name = provider_name.unwrap_or(&self.default_provider);
        self.providers
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| anyhow::anyhow!("Provider '{}' not found", name))
    }

    /// First provider (in registration order) served by `vendor` whose
    /// family contains `family`. Both comparisons ignore case.
    pub fn select(&self, vendor: &str, family: &str) -> Option<&dyn LLMProvider> {
        let vendor = vendor.to_lowercase();
        let family = family.to_lowercase();
        self.order
            .iter()
            .filter_map(|name| self.providers.get(name))
            .map(|p| p.as_ref())
            .find(|p| {
                p.vendor().to_lowercase() == vendor && p.family().to_lowercase().contains(&family)
            })
    }

    pub fn list_providers(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
