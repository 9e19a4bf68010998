//! Shared fixtures for stratus-core integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use stratus_config::Config;
use stratus_core::{
    Agent, Button, CommandExecutor, CommandOutput, ResourceRecord, ToolDescriptor,
    ToolExecutionError, ToolManifest, UiWriter,
};
use stratus_providers::{MockProvider, ProviderRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Markdown(String),
    Progress(String),
    Button(Button),
    Reference(ResourceRecord),
    Prompt(String),
    WorkFinished,
}

/// Records everything the loop sends to the UI and answers prompts from a
/// script (None once the script runs out).
#[derive(Default)]
pub struct RecordingUiWriter {
    events: Mutex<Vec<UiEvent>>,
    answers: Mutex<VecDeque<Option<usize>>>,
}

impl RecordingUiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answers(answers: Vec<Option<usize>>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            answers: Mutex::new(answers.into()),
        }
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn markdown(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Markdown(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Prompt(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn buttons(&self) -> Vec<Button> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Button(button) => Some(button),
                _ => None,
            })
            .collect()
    }

    pub fn work_finished_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, UiEvent::WorkFinished))
            .count()
    }

    fn push(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl UiWriter for RecordingUiWriter {
    fn print_markdown(&self, text: &str) {
        self.push(UiEvent::Markdown(text.to_string()));
    }

    fn print_progress(&self, message: &str) {
        self.push(UiEvent::Progress(message.to_string()));
    }

    fn print_button(&self, button: &Button) {
        self.push(UiEvent::Button(button.clone()));
    }

    fn print_reference(&self, resource: &ResourceRecord) {
        self.push(UiEvent::Reference(resource.clone()));
    }

    fn prompt_user_choice(&self, message: &str, _options: &[&str]) -> Option<usize> {
        self.push(UiEvent::Prompt(message.to_string()));
        self.answers.lock().unwrap().pop_front().flatten()
    }

    fn work_finished(&self) {
        self.push(UiEvent::WorkFinished);
    }

    fn flush(&self) {}
}

/// Executor returning scripted results per command and recording calls
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    results: Arc<Mutex<HashMap<String, VecDeque<Result<CommandOutput, ToolExecutionError>>>>>,
    calls: Arc<Mutex<Vec<(String, String, Value)>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, command: &str, result: Result<CommandOutput, ToolExecutionError>) -> Self {
        self.results
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        tool: &str,
        command: &str,
        params: &Value,
    ) -> Result<CommandOutput, ToolExecutionError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), command.to_string(), params.clone()));
        self.results
            .lock()
            .unwrap()
            .get_mut(command)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(CommandOutput::new(json!({}))))
    }
}

pub fn manifest() -> ToolManifest {
    let tool = |name: &str, description: &str| ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({"type": "object"}),
    };
    ToolManifest::new(vec![
        tool("s3", "Amazon S3"),
        tool("logs", "CloudWatch Logs"),
        tool("lambda", "AWS Lambda"),
    ])
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.providers.default_model = "mock".to_string();
    config
}

pub fn agent(config: Config, provider: &MockProvider, executor: &ScriptedExecutor) -> Agent {
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());
    Agent::new(config, registry, &manifest(), Arc::new(executor.clone()))
}

/// A listing big enough to be truncated
pub fn big_listing(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"Key": format!("reports/{i:04}.csv"), "ETag": "e".repeat(300)}))
        .collect()
}
