//! Tool dispatch module - gates, executes and audits tool calls.
//!
//! Every call walks the same path: access checks, confirmation for
//! commands that change things, resource tracking, execution through the
//! `CommandExecutor`, and finally one audit record. Guard rejections and
//! execution failures both come back as a `ToolResponse` envelope so the
//! model can read them like any other result.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use stratus_config::Config;
use stratus_providers::ToolCall;
use tracing::{debug, info, warn};

use crate::audit::ToolInvocationRecord;
use crate::error_handling::ToolExecutionError;
use crate::pagination::detect_pagination;
use crate::prompts::UPGRADE_NOTICE;
use crate::resource_context::detect_resources;
use crate::session::ConversationSession;
use crate::tools::{CommandExecutor, CommandOutput, ToolOutput, ToolOutputPart};
use crate::truncation::truncate_tool_result;
use crate::ui_writer::UiWriter;

/// Command name prefixes that need the user's go-ahead (lowercase)
pub const MUTATING_PREFIXES: [&str; 17] = [
    "put", "post", "upload", "download", "delete", "copy", "create", "update", "insert", "commit",
    "rollback", "send", "publish", "invoke", "start", "execute", "receive",
];

pub const CONFIRM_OPTIONS: [&str; 2] = ["Proceed", "Cancel"];

const PREVIEW_VALUE_LIMIT: usize = 100;
const PREVIEW_KEEP: usize = 10;

/// Result-side continuation fields and the key used in the envelope
const PAGINATION_FIELDS: [(&str, &str); 3] = [
    ("NextContinuationToken", "nextContinuationToken"),
    ("NextToken", "nextToken"),
    ("NextMarker", "nextMarker"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub request_id: Option<String>,
    pub http_status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Uniform envelope for every tool outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    pub command: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorInfo>,
}

impl ToolResponse {
    pub fn success(command: &str, data: Value) -> Self {
        let pagination = pagination_block(&data);
        Self {
            success: true,
            command: command.to_string(),
            message: format!("Successfully executed {}", command),
            data: Some(data),
            metadata: None,
            pagination,
            error: None,
        }
    }

    fn from_output(command: &str, output: CommandOutput) -> Self {
        let mut response = Self::success(command, output.data);
        response.metadata = Some(ResponseMetadata {
            request_id: output.request_id,
            http_status_code: output.http_status_code,
        });
        response
    }

    pub fn failure(command: &str, error: ToolExecutionError) -> Self {
        Self {
            success: false,
            command: command.to_string(),
            message: error.message.clone(),
            data: None,
            metadata: None,
            pagination: None,
            error: Some(ToolErrorInfo {
                name: error.name,
                message: error.message,
                status_code: error.status_code,
            }),
        }
    }

    /// A guard rejection; nothing was executed
    pub fn rejected(command: &str, name: &str, message: impl Into<String>) -> Self {
        Self::failure(command, ToolExecutionError::new(name, message))
    }

    pub fn error_name(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.name.as_str())
    }
}

/// `{hasMore: true, <key>: token}` for the first continuation field present
fn pagination_block(data: &Value) -> Option<Value> {
    PAGINATION_FIELDS.iter().find_map(|(field, key)| {
        let token = data.get(*field)?;
        if token.is_null() || token.as_str().is_some_and(str::is_empty) {
            return None;
        }
        let mut block = Map::new();
        block.insert("hasMore".to_string(), Value::Bool(true));
        block.insert((*key).to_string(), token.clone());
        Some(Value::Object(block))
    })
}

/// Whether `command` needs confirmation before it runs
pub fn requires_confirmation(command: &str) -> bool {
    let lower = command.to_lowercase();
    MUTATING_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Params as shown in the confirmation prompt: `Body` hidden, long values
/// cut to their first characters.
pub fn redact_params(params: &Value) -> Value {
    let Value::Object(map) = params else {
        return params.clone();
    };

    let redacted = map
        .iter()
        .map(|(key, value)| {
            let shown = if key == "Body" {
                Value::String("[...]".to_string())
            } else {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if text.chars().count() > PREVIEW_VALUE_LIMIT {
                    let head: String = text.chars().take(PREVIEW_KEEP).collect();
                    Value::String(format!("{}...", head))
                } else {
                    value.clone()
                }
            };
            (key.clone(), shown)
        })
        .collect();
    Value::Object(redacted)
}

fn confirmation_message(tool: &str, command: &str, params: &Value) -> String {
    let preview = serde_json::to_string_pretty(&redact_params(params))
        .unwrap_or_else(|_| params.to_string());
    format!(
        "Stratus wants to run {} ({}) with these parameters:\n{}\n\nDo you want to proceed?",
        command, tool, preview
    )
}

/// The `{command, params}` input every tool takes
struct ToolInput {
    command: String,
    params: Value,
}

impl ToolInput {
    fn parse(args: &Value) -> Result<Self, String> {
        let Value::Object(args) = args else {
            return Err("Tool input must be an object".to_string());
        };
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "Tool input is missing a 'command' string".to_string())?;
        let params = match args.get("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(_) => return Err("'params' must be an object".to_string()),
        };
        Ok(Self {
            command: command.to_string(),
            params,
        })
    }
}

pub struct ToolDispatcher {
    executor: Arc<dyn CommandExecutor>,
    config: Config,
    known_tools: HashSet<String>,
    max_result_chars: usize,
}

impl ToolDispatcher {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        config: Config,
        known_tools: impl IntoIterator<Item = String>,
    ) -> Self {
        let max_result_chars = config.agent.max_tool_result_chars;
        Self {
            executor,
            config,
            known_tools: known_tools.into_iter().collect(),
            max_result_chars,
        }
    }

    /// Run a model-issued tool call end to end and produce what goes back
    /// into the conversation: the bounded envelope text plus references to
    /// the resources the call touched.
    pub async fn invoke_tool(
        &self,
        call: &ToolCall,
        session: &mut ConversationSession,
        ui: &dyn UiWriter,
    ) -> ToolOutput {
        let (response, touched) = match ToolInput::parse(&call.args) {
            Ok(input) => {
                let response = self
                    .invoke(&call.tool, &input.command, &input.params, session, ui)
                    .await;
                let touched = if response.success {
                    detect_resources(&input.params)
                } else {
                    Vec::new()
                };
                (response, touched)
            }
            Err(reason) => {
                let command = call
                    .args
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let response = ToolResponse::rejected(command, "InvalidInput", reason);
                self.record(session, &call.tool, command, &call.args, &response, Utc::now(), 0);
                (response, Vec::new())
            }
        };

        let raw = serde_json::to_string(&response).unwrap_or_else(|e| {
            warn!("Could not serialize response for {}: {}", call.tool, e);
            serde_json::json!({"success": response.success, "message": response.message}).to_string()
        });

        if let Some(context) = detect_pagination(&raw, call) {
            debug!(
                "More results available for {} {} ({})",
                context.tool_name, context.command, context.token_type
            );
            session.pagination = Some(context);
        }

        let mut output = ToolOutput::text(truncate_tool_result(&raw, self.max_result_chars));
        for resource in touched {
            output.push(ToolOutputPart::Reference(resource));
        }
        output
    }

    /// Gate, execute and audit one command. Exactly one audit record is
    /// appended whatever the outcome.
    pub async fn invoke(
        &self,
        tool: &str,
        command: &str,
        params: &Value,
        session: &mut ConversationSession,
        ui: &dyn UiWriter,
    ) -> ToolResponse {
        let started_at = Utc::now();
        let start = Instant::now();

        let response = self.run(tool, command, params, session, ui).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Tool {} {} finished: success={} in {}ms",
            tool, command, response.success, duration_ms
        );
        self.record(session, tool, command, params, &response, started_at, duration_ms);
        response
    }

    async fn run(
        &self,
        tool: &str,
        command: &str,
        params: &Value,
        session: &mut ConversationSession,
        ui: &dyn UiWriter,
    ) -> ToolResponse {
        if !self.config.is_entitled() {
            info!("Rejected {} {}: requires upgrade", tool, command);
            return ToolResponse::rejected(
                command,
                "RequiresUpgrade",
                format!("{} Upgrade to let Stratus run {}.", UPGRADE_NOTICE, command),
            );
        }

        if !self.known_tools.contains(tool) {
            warn!("Model requested unknown tool '{}'", tool);
            return ToolResponse::rejected(
                command,
                "UnknownTool",
                format!("There is no tool named '{}'", tool),
            );
        }

        if !self.config.is_tool_enabled(tool) {
            info!("Rejected {} {}: tool disabled", tool, command);
            return ToolResponse::rejected(
                command,
                "ToolDisabled",
                format!(
                    "The {} tool is disabled. Set `enabled = true` under [tools.{}] in the Stratus configuration to use it.",
                    tool, tool
                ),
            );
        }

        if self.config.is_command_disabled(tool, command) {
            info!("Rejected {} {}: command disabled", tool, command);
            return ToolResponse::rejected(
                command,
                "CommandDisabled",
                format!(
                    "The {} command is disabled for {}. Remove it from `disabled_commands` under [tools.{}] to allow it.",
                    command, tool, tool
                ),
            );
        }

        if requires_confirmation(command) {
            let message = confirmation_message(tool, command, params);
            if ui.prompt_user_choice(&message, &CONFIRM_OPTIONS) != Some(0) {
                info!("User cancelled {} {}", tool, command);
                return ToolResponse::rejected(
                    command,
                    "CancelledByUser",
                    format!("The user cancelled {}. It was not executed.", command),
                );
            }
        }

        for resource in detect_resources(params) {
            session.resources.record(resource);
        }

        match self.executor.execute(tool, command, params).await {
            Ok(output) => ToolResponse::from_output(command, output),
            Err(error) => {
                warn!("{} {} failed: {}", tool, command, error);
                ToolResponse::failure(command, error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        session: &mut ConversationSession,
        tool: &str,
        command: &str,
        params: &Value,
        response: &ToolResponse,
        timestamp: chrono::DateTime<Utc>,
        duration_ms: u64,
    ) {
        session.audit.append(ToolInvocationRecord {
            timestamp,
            tool: tool.to_string(),
            command: command.to_string(),
            params: params.clone(),
            response: response.clone(),
            success: response.success,
            duration_ms,
        });
    }
}
