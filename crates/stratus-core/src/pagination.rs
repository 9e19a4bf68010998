//! Detection of "more results available" in tool results, and the
//! follow-up call that fetches the next page.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stratus_providers::ToolCall;

/// Everything needed to repeat a listing call for its next page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationContext {
    pub tool_name: String,
    pub command: String,
    pub params: Value,
    pub pagination_token: String,
    /// Key the token was found under, e.g. `nextContinuationToken`
    pub token_type: String,
}

impl PaginationContext {
    /// Request parameter that carries the token back to the service
    pub fn request_field(&self) -> String {
        match self.token_type.as_str() {
            "nextContinuationToken" => "ContinuationToken".to_string(),
            "nextToken" => "NextToken".to_string(),
            "nextMarker" => "Marker".to_string(),
            other => {
                let stem = other.strip_prefix("next").unwrap_or(other);
                let mut chars = stem.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => other.to_string(),
                }
            }
        }
    }

    /// Original params with the continuation token filled in
    pub fn next_page_params(&self) -> Value {
        let mut params = match &self.params {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        params.insert(
            self.request_field(),
            Value::String(self.pagination_token.clone()),
        );
        Value::Object(params)
    }

    /// A tool call for the next page, shaped like the model's own calls
    pub fn next_page_call(&self, id: impl Into<String>) -> ToolCall {
        ToolCall {
            id: id.into(),
            tool: self.tool_name.clone(),
            args: serde_json::json!({
                "command": self.command,
                "params": self.next_page_params(),
            }),
        }
    }
}

/// Look for `pagination.hasMore` in `result_text` and, when set, the first
/// non-empty `...Token` entry next to it. Unparseable text yields nothing.
pub fn detect_pagination(result_text: &str, call: &ToolCall) -> Option<PaginationContext> {
    let parsed: Value = serde_json::from_str(result_text).ok()?;
    let pagination = parsed.get("pagination")?.as_object()?;

    if !pagination.get("hasMore").is_some_and(is_truthy) {
        return None;
    }

    let (token_type, token) = pagination.iter().find_map(|(key, value)| {
        if key == "hasMore" || !key.ends_with("Token") {
            return None;
        }
        let token = value.as_str().filter(|t| !t.is_empty())?;
        Some((key.clone(), token.to_string()))
    })?;

    let command = call
        .args
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .args
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    Some(PaginationContext {
        tool_name: call.tool.clone(),
        command,
        params,
        pagination_token: token,
        token_type,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
