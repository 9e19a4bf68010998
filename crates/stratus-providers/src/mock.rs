//! Mock LLM Provider for Testing
//!
//! A configurable provider that replays scripted streaming responses and
//! records every request it receives, so the orchestration loop can be
//! exercised end to end without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratus_providers::mock::{MockProvider, MockResponse};
//!
//! // Round 1 asks for a tool, round 2 answers in text
//! let provider = MockProvider::new().with_responses(vec![
//!     MockResponse::native_tool_call("s3", json!({"command": "ListBuckets", "params": {}})),
//!     MockResponse::text("You have 3 buckets."),
//! ]);
//! ```

use crate::streaming::{make_final_chunk, make_text_chunk, make_tool_chunk};
use crate::{CompletionChunk, CompletionRequest, CompletionStream, LLMProvider, ToolCall, Usage};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Global counter for generating unique tool call IDs
static TOOL_CALL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_tool_call_id() -> String {
    format!("tool_{}", TOOL_CALL_COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock response that can be configured for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub chunks: Vec<MockChunk>,
    pub usage: Usage,
}

/// A single chunk in a mock streaming response
#[derive(Debug, Clone)]
pub enum MockChunk {
    Content(String),
    ToolCalls(Vec<ToolCall>),
    Finished(String),
    /// Fail the stream at this point
    Error(String),
}

impl MockChunk {
    pub fn content(text: &str) -> Self {
        Self::Content(text.to_string())
    }

    pub fn finished(stop_reason: &str) -> Self {
        Self::Finished(stop_reason.to_string())
    }

    pub fn tool_call(tool: &str, args: serde_json::Value) -> Self {
        Self::ToolCalls(vec![ToolCall {
            id: next_tool_call_id(),
            tool: tool.to_string(),
            args,
        }])
    }
}

fn estimated_usage(completion_chars: usize) -> Usage {
    let completion_tokens = completion_chars as u32 / 4;
    Usage {
        prompt_tokens: 100,
        completion_tokens,
        total_tokens: 100 + completion_tokens,
    }
}

impl MockResponse {
    /// Create a simple text-only response (single chunk + finish)
    pub fn text(content: &str) -> Self {
        Self {
            chunks: vec![MockChunk::content(content), MockChunk::finished("stop")],
            usage: estimated_usage(content.len()),
        }
    }

    /// Create a streaming text response with multiple chunks
    pub fn streaming(chunks: Vec<&str>) -> Self {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut mock_chunks: Vec<MockChunk> = chunks.into_iter().map(MockChunk::content).collect();
        mock_chunks.push(MockChunk::finished("stop"));

        Self {
            chunks: mock_chunks,
            usage: estimated_usage(total),
        }
    }

    /// Create a response with a native tool call
    pub fn native_tool_call(tool: &str, args: serde_json::Value) -> Self {
        Self {
            chunks: vec![
                MockChunk::tool_call(tool, args),
                MockChunk::finished("tool_calls"),
            ],
            usage: estimated_usage(200),
        }
    }

    /// Create a response with text followed by a native tool call
    pub fn text_then_native_tool(text: &str, tool: &str, args: serde_json::Value) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(text),
                MockChunk::tool_call(tool, args),
                MockChunk::finished("tool_calls"),
            ],
            usage: estimated_usage(200 + text.len()),
        }
    }

    /// Create a response requesting several tools in one round
    pub fn native_tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        let mut chunks: Vec<MockChunk> = calls
            .into_iter()
            .map(|(tool, args)| MockChunk::tool_call(tool, args))
            .collect();
        chunks.push(MockChunk::finished("tool_calls"));
        Self {
            chunks,
            usage: estimated_usage(400),
        }
    }

    /// Create a response whose stream fails after some text
    pub fn failing(partial: &str, error: &str) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(partial),
                MockChunk::Error(error.to_string()),
            ],
            usage: estimated_usage(partial.len()),
        }
    }

    /// Create a custom response with explicit chunks
    pub fn custom(chunks: Vec<MockChunk>, usage: Usage) -> Self {
        Self { chunks, usage }
    }
}

/// A mock LLM provider for testing
///
/// The provider maintains a queue of responses that are returned in order.
/// It also tracks all requests made for verification in tests. Clones share
/// the queue and the request log, so a test can keep a handle after
/// registering the provider.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    vendor: String,
    family: String,
    max_tokens: u32,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    default_response: Option<MockResponse>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            vendor: "mock".to_string(),
            family: "mock".to_string(),
            max_tokens: 4096,
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_vendor(mut self, vendor: &str) -> Self {
        self.vendor = vendor.to_string();
        self
    }

    pub fn with_family(mut self, family: &str) -> Self {
        self.family = family.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Add a response to the queue
    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push(response);
        self
    }

    /// Add multiple responses to the queue
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        lock(&self.responses).extend(responses);
        self
    }

    /// Set a default response when queue is empty
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Get all requests that were made to this provider
    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = lock(&self.responses);
        if responses.is_empty() {
            self.default_response
                .clone()
                .unwrap_or_else(|| MockResponse::text("Mock response (no responses configured)"))
        } else {
            responses.remove(0)
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        lock(&self.requests).push(request);

        let response = self.next_response();
        let usage = response.usage.clone();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            for chunk in response.chunks {
                let item: Result<CompletionChunk> = match chunk {
                    MockChunk::Content(text) => Ok(make_text_chunk(text)),
                    MockChunk::ToolCalls(calls) => Ok(make_tool_chunk(calls)),
                    MockChunk::Finished(reason) => {
                        Ok(make_final_chunk(vec![], Some(usage.clone()), Some(reason)))
                    }
                    MockChunk::Error(message) => Err(anyhow::anyhow!(message)),
                };
                let stop = item.is_err();
                if tx.send(item).await.is_err() || stop {
                    break;
                }
                // Small delay between chunks to simulate streaming
                tokio::time::sleep(tokio::time::Duration::from_micros(100)).await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn vendor(&self) -> &str {
        &self.vendor
    }

    fn family(&self) -> &str {
        &self.family
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
