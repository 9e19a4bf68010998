//! Runs tool commands through the AWS CLI.
//!
//! Each command becomes one `aws <service> <operation> --cli-input-json ...`
//! invocation. The CLI version check runs once per service and its result is cached
//! until the profile or region changes.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use stratus_core::{ClientCache, CommandExecutor, CommandOutput, ToolExecutionError};
use tokio::process::Command;
use tracing::{debug, warn};

static CLI_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"An error occurred \(([A-Za-z0-9.]+)\)(?: when calling the \w+ operation)?(?: \(reached max retries: \d+\))?: (.*)").unwrap()
});

/// A verified AWS CLI installation for one service
#[derive(Debug)]
pub struct AwsCliClient {
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsTarget {
    pub profile: Option<String>,
    pub region: Option<String>,
}

pub struct AwsCliExecutor {
    cli_path: String,
    target: Mutex<AwsTarget>,
    clients: ClientCache<AwsCliClient>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AwsCliExecutor {
    pub fn new(cli_path: impl Into<String>, target: AwsTarget) -> Self {
        let clients = ClientCache::new(target.profile.as_deref(), target.region.as_deref());
        Self {
            cli_path: cli_path.into(),
            target: Mutex::new(target),
            clients,
        }
    }

    pub fn target(&self) -> AwsTarget {
        lock(&self.target).clone()
    }

    /// Switch profile and/or region. Cached clients are dropped when the
    /// effective target changes.
    pub fn set_target(&self, target: AwsTarget) -> bool {
        let changed = self
            .clients
            .invalidate_if_changed(target.profile.as_deref(), target.region.as_deref());
        *lock(&self.target) = target;
        changed
    }

    async fn client(&self, service: &str) -> Result<std::sync::Arc<AwsCliClient>, ToolExecutionError> {
        let cli_path = self.cli_path.clone();
        let owned_service = service.to_string();
        self.clients
            .get_client(service, move || check_cli(cli_path, owned_service))
            .await
            .map_err(|e| ToolExecutionError::new("ClientUnavailable", e.to_string()))
    }
}

async fn check_cli(cli_path: String, service: String) -> anyhow::Result<AwsCliClient> {
    let output = Command::new(&cli_path).arg("--version").output().await?;
    if !output.status.success() {
        anyhow::bail!("'{} --version' exited with {}", cli_path, output.status);
    }
    // aws-cli prints its version on stdout (v2) or stderr (v1)
    let mut version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        version = String::from_utf8_lossy(&output.stderr).trim().to_string();
    }
    debug!("Using {} for {}", version, service);
    Ok(AwsCliClient { service, version })
}

/// CLI service name for a tool name
pub fn service_name(tool: &str) -> String {
    let tool = tool.trim().to_lowercase();
    let tool = tool.strip_prefix("aws_").unwrap_or(&tool);
    match tool {
        "s3" => "s3api".to_string(),
        other => other.to_string(),
    }
}

/// `DescribeDBInstances` -> `describe-db-instances`
pub fn operation_name(command: &str) -> String {
    let chars: Vec<char> = command.chars().collect();
    let mut out = String::with_capacity(command.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_is_lower) {
                out.push('-');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

pub fn build_args(service: &str, command: &str, params: &Value, target: &AwsTarget) -> Vec<String> {
    let mut args = vec![service.to_string(), operation_name(command)];
    let has_params = params.as_object().is_some_and(|p| !p.is_empty());
    if has_params {
        args.push("--cli-input-json".to_string());
        args.push(params.to_string());
    }
    args.push("--output".to_string());
    args.push("json".to_string());
    if let Some(profile) = &target.profile {
        args.push("--profile".to_string());
        args.push(profile.clone());
    }
    if let Some(region) = &target.region {
        args.push("--region".to_string());
        args.push(region.clone());
    }
    args
}

/// Turn CLI stderr into a named error
pub fn parse_cli_error(stderr: &str) -> ToolExecutionError {
    if let Some(caps) = CLI_ERROR.captures(stderr) {
        return ToolExecutionError::new(&caps[1], caps[2].trim());
    }
    let message = stderr.trim();
    if message.is_empty() {
        ToolExecutionError::new("CommandFailed", "The AWS CLI exited with an error")
    } else {
        ToolExecutionError::new("CommandFailed", message)
    }
}

/// Parse CLI stdout, lifting `ResponseMetadata` out of the payload
pub fn parse_cli_output(stdout: &str) -> Result<CommandOutput, ToolExecutionError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(CommandOutput::new(Value::Object(Map::new())));
    }
    let mut data: Value = serde_json::from_str(trimmed)
        .map_err(|e| ToolExecutionError::new("InvalidResponse", format!("AWS CLI output was not JSON: {}", e)))?;

    let metadata = data
        .as_object_mut()
        .and_then(|obj| obj.remove("ResponseMetadata"));
    let mut output = CommandOutput::new(data);
    if let Some(metadata) = metadata {
        if let Some(request_id) = metadata.get("RequestId").and_then(Value::as_str) {
            output = output.with_request_id(request_id);
        }
        if let Some(status) = metadata
            .get("HTTPStatusCode")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
        {
            output = output.with_http_status_code(status);
        }
    }
    Ok(output)
}

#[async_trait]
impl CommandExecutor for AwsCliExecutor {
    async fn execute(
        &self,
        tool: &str,
        command: &str,
        params: &Value,
    ) -> Result<CommandOutput, ToolExecutionError> {
        let service = service_name(tool);
        let client = self.client(&service).await?;
        let args = build_args(&client.service, command, params, &self.target());
        debug!("Running {} {}", self.cli_path, args[..2].join(" "));

        let output = Command::new(&self.cli_path)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolExecutionError::new("ExecutionFailed", e.to_string()))?;

        if output.status.success() {
            parse_cli_output(&String::from_utf8_lossy(&output.stdout))
        } else {
            let error = parse_cli_error(&String::from_utf8_lossy(&output.stderr));
            warn!("{} {} failed: {}", service, command, error);
            Err(error)
        }
    }
}
