//! Append-only record of every tool invocation attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::tool_dispatch::ToolResponse;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationRecord {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub command: String,
    pub params: Value,
    pub response: ToolResponse,
    pub success: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    records: Vec<ToolInvocationRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ToolInvocationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ToolInvocationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}
