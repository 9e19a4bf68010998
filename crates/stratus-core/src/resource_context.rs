//! Recently seen AWS resources, one per resource type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratus_providers::Message;

/// Records included in the summary message
pub const SUMMARY_LIMIT: usize = 5;

/// Parameter names that locate a resource, and the resource type they name
const RESOURCE_PARAMS: [(&str, &str); 7] = [
    ("Bucket", "s3 bucket"),
    ("logGroupName", "log group"),
    ("QueueUrl", "sqs queue"),
    ("FunctionName", "lambda function"),
    ("TableName", "dynamodb table"),
    ("TopicArn", "sns topic"),
    ("StateMachineArn", "step function"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
}

impl ResourceRecord {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            arn: None,
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = Some(arn.into());
        self
    }

    /// `type: name (arn)`, without the parenthesised part when there is no ARN
    pub fn label(&self) -> String {
        match &self.arn {
            Some(arn) => format!("{}: {} ({})", self.resource_type, self.name, arn),
            None => format!("{}: {}", self.resource_type, self.name),
        }
    }
}

/// Resources mentioned in a command's parameters
pub fn detect_resources(params: &Value) -> Vec<ResourceRecord> {
    RESOURCE_PARAMS
        .iter()
        .filter_map(|(field, resource_type)| {
            let value = params.get(*field)?.as_str()?.trim();
            if value.is_empty() {
                return None;
            }
            Some(record_for(resource_type, value))
        })
        .collect()
}

fn record_for(resource_type: &str, value: &str) -> ResourceRecord {
    if value.starts_with("arn:") {
        let name = value.rsplit([':', '/']).next().unwrap_or(value);
        ResourceRecord::new(resource_type, name).with_arn(value)
    } else if value.starts_with("https://") || value.starts_with("http://") {
        let name = value.trim_end_matches('/').rsplit('/').next().unwrap_or(value);
        ResourceRecord::new(resource_type, name)
    } else {
        ResourceRecord::new(resource_type, value)
    }
}

/// Keeps the latest record per resource type, in update order
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    records: Vec<ResourceRecord>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `resource`, replacing any record of the same type. The record
    /// becomes the most recent one.
    pub fn record(&mut self, resource: ResourceRecord) {
        self.records
            .retain(|r| r.resource_type != resource.resource_type);
        self.records.push(resource);
    }

    /// All records, oldest update first
    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn get(&self, resource_type: &str) -> Option<&ResourceRecord> {
        self.records.iter().find(|r| r.resource_type == resource_type)
    }

    pub fn recent(&self, limit: usize) -> &[ResourceRecord] {
        let start = self.records.len().saturating_sub(limit);
        &self.records[start..]
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// A user message listing the most recent resources, if there are any
    pub fn summary_message(&self) -> Option<Message> {
        if self.records.is_empty() {
            return None;
        }
        let listed: Vec<String> = self
            .recent(SUMMARY_LIMIT)
            .iter()
            .map(ResourceRecord::label)
            .collect();
        Some(Message::user(format!(
            "Recent AWS resources: {}",
            listed.join("; ")
        )))
    }
}
