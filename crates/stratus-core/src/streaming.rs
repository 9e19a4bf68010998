//! Consumption of one model round.
//!
//! Text is forwarded to the UI as it arrives; tool calls are collected in
//! delivery order and handed back once the stream ends.

use anyhow::Result;
use stratus_providers::{CompletionStream, ToolCall, Usage};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::ui_writer::UiWriter;

/// Everything a single round produced
#[derive(Debug, Default)]
pub struct RoundResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

pub async fn collect_round(
    mut stream: CompletionStream,
    ui: &dyn UiWriter,
) -> Result<RoundResponse> {
    let mut round = RoundResponse::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;

        if !chunk.content.is_empty() {
            ui.print_markdown(&chunk.content);
            round.text.push_str(&chunk.content);
        }

        if let Some(tool_calls) = chunk.tool_calls {
            round.tool_calls.extend(tool_calls);
        }

        if chunk.usage.is_some() {
            round.usage = chunk.usage;
        }

        if chunk.finished {
            round.stop_reason = chunk.stop_reason;
            break;
        }
    }

    debug!(
        "Round complete: {} chars, {} tool calls, stop reason {:?}",
        round.text.len(),
        round.tool_calls.len(),
        round.stop_reason
    );
    Ok(round)
}
