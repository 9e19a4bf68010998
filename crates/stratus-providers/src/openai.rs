use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::streaming::{decode_utf8_streaming, make_final_chunk, make_text_chunk};
use crate::{
    CompletionChunk, CompletionRequest, CompletionStream, ContentPart, LLMProvider, Message,
    MessageRole, Tool, ToolCall, Usage,
};

/// Chat-completions provider for OpenAI and OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    family: String,
    base_url: String,
    max_tokens: Option<u32>,
    name: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self::new_with_name("openai".to_string(), api_key, model, base_url, None, None)
    }

    pub fn new_with_name(
        name: String,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        family: Option<String>,
    ) -> Self {
        let model = model.unwrap_or_else(|| "gpt-4o".to_string());
        Self {
            client: Client::new(),
            api_key,
            family: family.unwrap_or_else(|| model.clone()),
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_tokens,
            name,
        }
    }

    fn create_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(&request.messages),
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_completion_tokens"] = json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(convert_tools(&request.tools));
        }

        body
    }

    async fn parse_streaming_response(
        mut stream: impl futures_util::Stream<Item = reqwest::Result<Bytes>> + Unpin,
        tx: mpsc::Sender<Result<CompletionChunk>>,
    ) -> Option<Usage> {
        let mut byte_buffer: Vec<u8> = Vec::new();
        let mut buffer = String::new();
        let mut accumulated_usage: Option<Usage> = None;
        let mut stop_reason: Option<String> = None;
        let mut current_tool_calls: Vec<OpenAIStreamingToolCall> = Vec::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("Stream error: {}", e);
                    let _ = tx.send(Err(anyhow::anyhow!("Stream error: {}", e))).await;
                    return accumulated_usage;
                }
            };

            byte_buffer.extend_from_slice(&chunk);
            let Some(decoded) = decode_utf8_streaming(&mut byte_buffer) else {
                continue;
            };
            buffer.push_str(&decoded);

            // Process complete lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..line_end + 1);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                if data == "[DONE]" {
                    debug!("Received stream completion marker");
                    let final_chunk = make_final_chunk(
                        finish_tool_calls(&current_tool_calls),
                        accumulated_usage.clone(),
                        stop_reason.take(),
                    );
                    let _ = tx.send(Ok(final_chunk)).await;
                    return accumulated_usage;
                }

                let chunk_data = match serde_json::from_str::<OpenAIStreamChunk>(data) {
                    Ok(chunk_data) => chunk_data,
                    Err(e) => {
                        debug!("Failed to parse stream chunk: {} - Data: {}", e, data);
                        continue;
                    }
                };

                for choice in &chunk_data.choices {
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty()
                            && tx.send(Ok(make_text_chunk(content.clone()))).await.is_err()
                        {
                            debug!("Receiver dropped, stopping stream");
                            return accumulated_usage;
                        }
                    }

                    for delta in choice.delta.tool_calls.iter().flatten() {
                        let Some(index) = delta.index else { continue };
                        while current_tool_calls.len() <= index {
                            current_tool_calls.push(OpenAIStreamingToolCall::default());
                        }
                        let tool_call = &mut current_tool_calls[index];
                        if let Some(id) = &delta.id {
                            tool_call.id = Some(id.clone());
                        }
                        if let Some(function) = &delta.function {
                            if let Some(name) = &function.name {
                                tool_call.name = Some(name.clone());
                            }
                            if let Some(arguments) = &function.arguments {
                                tool_call.arguments.push_str(arguments);
                            }
                        }
                    }

                    if let Some(reason) = &choice.finish_reason {
                        stop_reason = Some(reason.clone());
                    }
                }

                if let Some(usage) = chunk_data.usage {
                    accumulated_usage = Some(Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                    });
                }
            }
        }

        // Connection closed without a [DONE] marker
        let final_chunk = make_final_chunk(
            finish_tool_calls(&current_tool_calls),
            accumulated_usage.clone(),
            stop_reason,
        );
        let _ = tx.send(Ok(final_chunk)).await;

        accumulated_usage
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        debug!(
            "Processing OpenAI streaming request with {} messages",
            request.messages.len()
        );

        let body = self.create_request_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "OpenAI API error {}: {}",
                status,
                error_text
            ));
        }

        let stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            if let Some(usage) = Self::parse_streaming_response(stream, tx).await {
                debug!(
                    "Stream completed with usage - prompt: {}, completion: {}, total: {}",
                    usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                );
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
        "openai"
    }

    fn family(&self) -> &str {
        &self.family
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(16000)
    }
}

/// Convert conversation messages to chat-completions messages.
///
/// Tool results whose call id was never issued by an earlier assistant
/// message (the call was pruned away) are sent as plain user text, since
/// the API rejects a `tool` message without its call.
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut issued: HashSet<&str> = HashSet::new();
    let mut converted = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            MessageRole::Assistant => {
                let text = msg.text();
                let calls: Vec<serde_json::Value> = msg
                    .tool_calls()
                    .map(|call| {
                        issued.insert(call.id.as_str());
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.tool,
                                "arguments": call.args.to_string(),
                            }
                        })
                    })
                    .collect();

                let mut value = json!({ "role": "assistant" });
                value["content"] = if text.is_empty() { json!(null) } else { json!(text) };
                if !calls.is_empty() {
                    value["tool_calls"] = json!(calls);
                }
                converted.push(value);
            }
            MessageRole::User => {
                for part in &msg.content {
                    match part {
                        ContentPart::Text { text } => {
                            converted.push(json!({ "role": "user", "content": text }));
                        }
                        ContentPart::ToolResult { call_id, content } => {
                            if issued.contains(call_id.as_str()) {
                                converted.push(json!({
                                    "role": "tool",
                                    "tool_call_id": call_id,
                                    "content": content,
                                }));
                            } else {
                                debug!("Sending orphaned tool result for call {} as user text", call_id);
                                converted.push(json!({
                                    "role": "user",
                                    "content": format!("Result of tool call {}:\n{}", call_id, content),
                                }));
                            }
                        }
                        ContentPart::ToolCall(_) => {}
                    }
                }
            }
        }
    }

    converted
}

fn convert_tools(tools: &[Tool]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

fn finish_tool_calls(calls: &[OpenAIStreamingToolCall]) -> Vec<ToolCall> {
    calls.iter().filter_map(|tc| tc.to_tool_call()).collect()
}

// Streaming tool call accumulator
#[derive(Debug, Default)]
struct OpenAIStreamingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl OpenAIStreamingToolCall {
    fn to_tool_call(&self) -> Option<ToolCall> {
        let id = self.id.as_ref()?;
        let name = self.name.as_ref()?;

        let args = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.arguments).unwrap_or(serde_json::Value::Null)
        };

        Some(ToolCall {
            id: id.clone(),
            tool: name.clone(),
            args,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDeltaToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAIDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}
