pub mod audit;
pub mod client_cache;
pub mod context_window;
pub mod error_handling;
pub mod pagination;
pub mod prompts;
pub mod resource_context;
pub mod session;
pub mod streaming;
pub mod tool_definitions;
pub mod tool_dispatch;
pub mod tools;
pub mod truncation;
pub mod ui_writer;

pub use client_cache::ClientCache;
pub use error_handling::{AgentError, ToolExecutionError};
pub use pagination::PaginationContext;
pub use resource_context::{ResourceRecord, ResourceTracker};
pub use session::ConversationSession;
pub use tool_definitions::{ToolDescriptor, ToolManifest};
pub use tool_dispatch::{ToolDispatcher, ToolResponse};
pub use tools::{CommandExecutor, CommandOutput, ToolOutput, ToolOutputPart};
pub use ui_writer::{Button, NullUiWriter, TranscriptWriter, UiWriter};

// Re-export the provider types the loop speaks in
pub use stratus_providers::{ContentPart, Message, MessageRole, ToolCall};

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stratus_config::{Config, AUTO_MODEL};
use stratus_providers::{CompletionRequest, LLMProvider, ProviderRegistry, Tool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context_window::{budget_for, prune};
use crate::error_handling::apology_message;
use crate::prompts::{expresses_gratitude, load_more_prompt, GOODWILL_MESSAGE, SYSTEM_INSTRUCTION};
use crate::streaming::collect_round;

pub const UPGRADE_COMMAND: &str = "stratus.upgrade";
pub const OPEN_RESOURCE_COMMAND: &str = "stratus.openResource";
pub const LOAD_MORE_COMMAND: &str = "stratus.loadMore";

/// A single user request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    /// Registry key or "auto"; falls back to the configured default
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub family: Option<String>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            vendor: None,
            family: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_family(mut self, vendor: impl Into<String>, family: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self.family = Some(family.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Done,
    Cancelled,
    Failed,
    NoModel,
}

/// How a chat ended and what it produced
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub status: ChatStatus,
    pub rounds: usize,
    /// Conversation as last sent to (and answered by) the model
    pub messages: Vec<Message>,
    /// All markdown streamed to the UI during the chat
    pub transcript: String,
}

/// One-shot "end of work" signal; only the first `fire` reaches the UI
#[derive(Debug, Default)]
pub struct EndOfWork {
    fired: AtomicBool,
}

impl EndOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the call that actually fired
    pub fn fire(&self, ui: &dyn UiWriter) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        ui.work_finished();
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

struct ModelSelection {
    model: String,
    vendor: String,
    family: String,
}

/// What starts a run of the loop
struct Kickoff {
    prompt: String,
    selection: ModelSelection,
    next_page: Option<PaginationContext>,
}

#[derive(Default)]
struct LoopState {
    messages: Vec<Message>,
    rounds: usize,
}

pub struct Agent {
    providers: ProviderRegistry,
    dispatcher: ToolDispatcher,
    tools: Vec<Tool>,
    config: Config,
}

impl Agent {
    pub fn new(
        config: Config,
        providers: ProviderRegistry,
        manifest: &ToolManifest,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let known_tools = manifest.tools().iter().map(|t| t.name.clone());
        let dispatcher = ToolDispatcher::new(executor, config.clone(), known_tools);
        Self {
            providers,
            dispatcher,
            tools: manifest.to_provider_tools(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Named provider, or for "auto" the first one matching vendor/family
    pub fn resolve_provider(
        &self,
        model: &str,
        vendor: &str,
        family: &str,
    ) -> Result<&dyn LLMProvider, AgentError> {
        if model == AUTO_MODEL {
            return self
                .providers
                .select(vendor, family)
                .ok_or_else(|| AgentError::NoSuitableModel {
                    vendor: vendor.to_string(),
                    family: family.to_string(),
                });
        }
        self.providers
            .get(Some(model))
            .map_err(|_| AgentError::UnknownModel(model.to_string()))
    }

    /// Answer `request`, calling tools as the model asks for them.
    ///
    /// Never returns an error: failures are rendered to `ui` and reported
    /// through the outcome's status.
    pub async fn chat<W: UiWriter>(
        &self,
        request: ChatRequest,
        session: &mut ConversationSession,
        ui: &W,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        let selection = self.selection_for(&request);
        let kickoff = Kickoff {
            prompt: request.prompt,
            selection,
            next_page: None,
        };
        self.execute(kickoff, session, ui, cancel).await
    }

    /// Fetch the next page of the last paginated listing and let the model
    /// summarise it. The stored continuation is consumed only when the chat
    /// completes; after a failure or cancellation it stays available.
    pub async fn load_more<W: UiWriter>(
        &self,
        session: &mut ConversationSession,
        ui: &W,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        let Some(context) = session.pagination.take() else {
            let transcript = TranscriptWriter::new(ui);
            transcript.print_markdown("There are no more results to load.\n");
            EndOfWork::new().fire(&transcript);
            transcript.flush();
            return ChatOutcome {
                status: ChatStatus::Done,
                rounds: 0,
                messages: Vec::new(),
                transcript: transcript.into_transcript(),
            };
        };

        let selection = self.selection_for(&ChatRequest::new(""));
        let kickoff = Kickoff {
            prompt: load_more_prompt(&context.tool_name, &context.command),
            selection,
            next_page: Some(context.clone()),
        };
        let outcome = self.execute(kickoff, session, ui, cancel).await;

        if outcome.status != ChatStatus::Done && session.pagination.is_none() {
            debug!(
                "Keeping continuation for {} {} after {:?}",
                context.tool_name, context.command, outcome.status
            );
            session.pagination = Some(context);
        }
        outcome
    }

    fn selection_for(&self, request: &ChatRequest) -> ModelSelection {
        let providers = &self.config.providers;
        ModelSelection {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| providers.default_model.clone()),
            vendor: request
                .vendor
                .clone()
                .unwrap_or_else(|| providers.vendor.clone()),
            family: request
                .family
                .clone()
                .unwrap_or_else(|| providers.family.clone()),
        }
    }

    async fn execute<W: UiWriter>(
        &self,
        kickoff: Kickoff,
        session: &mut ConversationSession,
        ui: &W,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        let transcript = TranscriptWriter::new(ui);
        let end_of_work = EndOfWork::new();
        let mut state = LoopState::default();

        let result = {
            let run = self.run(&kickoff, session, &transcript, cancel, &mut state);
            tokio::pin!(run);
            tokio::select! {
                result = &mut run => result,
                _ = cancel.cancelled() => {
                    debug!("Cancellation requested; stopping at the next round boundary");
                    end_of_work.fire(&transcript);
                    run.await
                }
            }
        };

        let status = match result {
            Ok(()) => {
                self.render_affordances(&kickoff.prompt, session, &transcript);
                ChatStatus::Done
            }
            Err(AgentError::Cancelled) => {
                info!("Chat cancelled after {} rounds", state.rounds);
                transcript.print_markdown("\n\n_Cancelled._\n");
                ChatStatus::Cancelled
            }
            Err(e) if e.is_model_selection() => {
                warn!("{}", e);
                transcript.print_markdown(&format!("{}\n", e));
                ChatStatus::NoModel
            }
            Err(e) => {
                error!("Chat failed: {:#}", e);
                transcript.print_markdown(&apology_message(&e, &self.config.agent.issue_url));
                ChatStatus::Failed
            }
        };

        end_of_work.fire(&transcript);
        transcript.flush();

        ChatOutcome {
            status,
            rounds: state.rounds,
            messages: state.messages,
            transcript: transcript.into_transcript(),
        }
    }

    async fn run(
        &self,
        kickoff: &Kickoff,
        session: &mut ConversationSession,
        ui: &dyn UiWriter,
        cancel: &CancellationToken,
        state: &mut LoopState,
    ) -> Result<(), AgentError> {
        state.messages.push(Message::user(SYSTEM_INSTRUCTION));
        if let Some(summary) = session.resources.summary_message() {
            state.messages.push(summary);
        }
        state.messages.push(Message::user(kickoff.prompt.clone()));

        let selection = &kickoff.selection;
        let provider =
            self.resolve_provider(&selection.model, &selection.vendor, &selection.family)?;
        debug!(
            "Using provider {} ({} / {})",
            provider.name(),
            provider.vendor(),
            provider.model()
        );
        let budget = budget_for(provider.family());

        if let Some(context) = &kickoff.next_page {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let call = context.next_page_call(format!("load_more_{}", uuid::Uuid::new_v4()));
            state
                .messages
                .push(Message::assistant_tool_calls("", vec![call.clone()]));
            self.run_tool_call(&call, session, ui, state).await;
        }

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            if let Some(max_rounds) = self.config.agent.max_rounds {
                if state.rounds >= max_rounds {
                    warn!("Stopping after {} rounds", max_rounds);
                    ui.print_markdown(&format!(
                        "\n\n_Stopped after {} rounds of tool use._\n",
                        max_rounds
                    ));
                    return Ok(());
                }
            }

            state.messages = prune(
                std::mem::take(&mut state.messages),
                budget,
                self.config.agent.history_window,
            );

            let request = CompletionRequest {
                messages: state.messages.clone(),
                max_tokens: Some(provider.max_tokens()),
                tools: self.tools.clone(),
            };
            let stream = provider.stream(request).await?;
            let round = collect_round(stream, ui).await?;
            state.rounds += 1;

            if round.tool_calls.is_empty() {
                if !round.text.trim().is_empty() {
                    state.messages.push(Message::assistant(round.text));
                }
                debug!("Model finished after {} rounds", state.rounds);
                return Ok(());
            }

            state.messages.push(Message::assistant_tool_calls(
                &round.text,
                round.tool_calls.clone(),
            ));
            for call in &round.tool_calls {
                self.run_tool_call(call, session, ui, state).await;
            }
        }
    }

    async fn run_tool_call(
        &self,
        call: &ToolCall,
        session: &mut ConversationSession,
        ui: &dyn UiWriter,
        state: &mut LoopState,
    ) {
        ui.print_progress(&progress_label(call));
        let output = self.dispatcher.invoke_tool(call, session, ui).await;
        for resource in output.references() {
            ui.print_reference(resource);
        }
        state
            .messages
            .push(Message::tool_result(call.id.clone(), output.joined_text()));
    }

    fn render_affordances(&self, prompt: &str, session: &ConversationSession, ui: &dyn UiWriter) {
        if !self.config.is_entitled() {
            ui.print_button(&Button::new(UPGRADE_COMMAND, "Upgrade to Stratus Pro"));
        }

        for resource in session.resources.records() {
            let argument = serde_json::to_value(resource).unwrap_or(Value::Null);
            ui.print_button(
                &Button::new(
                    OPEN_RESOURCE_COMMAND,
                    format!("Open {} {}", resource.resource_type, resource.name),
                )
                .with_argument(argument),
            );
        }

        if let Some(context) = &session.pagination {
            let argument = serde_json::to_value(context).unwrap_or(Value::Null);
            ui.print_button(&Button::new(LOAD_MORE_COMMAND, "Load more").with_argument(argument));
        }

        if expresses_gratitude(prompt) {
            ui.print_markdown(GOODWILL_MESSAGE);
        }
    }
}

fn progress_label(call: &ToolCall) -> String {
    match call.args.get("command").and_then(Value::as_str) {
        Some(command) => format!("Running {} {}", call.tool, command),
        None => format!("Running {}", call.tool),
    }
}
