//! Interactive mode for the Stratus CLI.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use stratus_core::prompts::DEFAULT_EXAMPLE_PROMPT;
use stratus_core::{Agent, ChatOutcome, ChatRequest, ConversationSession, UiWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::aws_executor::{AwsCliExecutor, AwsTarget};

const HELP: &str = "\
Commands:
  /more              load the next page of the last listing
  /resources         show recently used AWS resources
  /audit             print the tool invocation log as JSON
  /clear             forget resources and pagination state
  /model [name]      show or switch the model ('auto' to select by family)
  /profile [name]    show or switch the AWS profile
  /region [name]     show or switch the AWS region
  /help              show this help
  /exit              leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    More,
    Resources,
    Audit,
    Clear,
    Model(Option<String>),
    Profile(Option<String>),
    Region(Option<String>),
    Help,
    Exit,
    Unknown(String),
}

/// Parse a slash command. Plain questions return None.
pub fn parse_command(input: &str) -> Option<ReplCommand> {
    let input = input.trim();
    if input == "exit" || input == "quit" {
        return Some(ReplCommand::Exit);
    }
    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    Some(match name.as_str() {
        "more" => ReplCommand::More,
        "resources" => ReplCommand::Resources,
        "audit" => ReplCommand::Audit,
        "clear" => ReplCommand::Clear,
        "model" => ReplCommand::Model(arg),
        "profile" => ReplCommand::Profile(arg),
        "region" => ReplCommand::Region(arg),
        "help" => ReplCommand::Help,
        "exit" | "quit" => ReplCommand::Exit,
        _ => ReplCommand::Unknown(name),
    })
}

/// Cancellation token that trips on the next Ctrl-C
fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (token, watcher)
}

struct Repl<'a, W: UiWriter> {
    agent: &'a Agent,
    executor: Arc<AwsCliExecutor>,
    ui: &'a W,
    session: ConversationSession,
    model: Option<String>,
}

impl<W: UiWriter> Repl<'_, W> {
    async fn ask(&mut self, prompt: &str) -> ChatOutcome {
        let mut request = ChatRequest::new(prompt);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        let (cancel, watcher) = cancel_on_ctrl_c();
        let outcome = self
            .agent
            .chat(request, &mut self.session, self.ui, &cancel)
            .await;
        watcher.abort();
        outcome
    }

    async fn load_more(&mut self) -> ChatOutcome {
        let (cancel, watcher) = cancel_on_ctrl_c();
        let outcome = self
            .agent
            .load_more(&mut self.session, self.ui, &cancel)
            .await;
        watcher.abort();
        outcome
    }

    /// Returns false when the loop should stop
    async fn handle(&mut self, command: ReplCommand) -> Result<bool> {
        match command {
            ReplCommand::Exit => return Ok(false),
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::More => {
                let outcome = self.load_more().await;
                debug!("load more finished: {:?} after {} rounds", outcome.status, outcome.rounds);
            }
            ReplCommand::Resources => {
                let records = self.session.resources.records();
                if records.is_empty() {
                    println!("No AWS resources used yet.");
                }
                for record in records {
                    println!("  {}", record.label());
                }
            }
            ReplCommand::Audit => println!("{}", self.session.audit.to_json()?),
            ReplCommand::Clear => {
                self.session.reset_context();
                println!("Context cleared.");
            }
            ReplCommand::Model(None) => {
                let current = self
                    .model
                    .clone()
                    .unwrap_or_else(|| self.agent.config().providers.default_model.clone());
                println!("model: {}", current);
                println!("available: {}", self.agent.providers().list_providers().join(", "));
            }
            ReplCommand::Model(Some(model)) => {
                println!("Switched model to {}", model);
                self.model = Some(model);
            }
            ReplCommand::Profile(profile) => {
                let mut target = self.executor.target();
                if profile.is_some() {
                    target.profile = profile;
                    self.retarget(target.clone());
                }
                println!("profile: {}", target.profile.as_deref().unwrap_or("(default)"));
            }
            ReplCommand::Region(region) => {
                let mut target = self.executor.target();
                if region.is_some() {
                    target.region = region;
                    self.retarget(target.clone());
                }
                println!("region: {}", target.region.as_deref().unwrap_or("(default)"));
            }
            ReplCommand::Unknown(name) => {
                println!("Unknown command '/{}'. Type /help for the list.", name);
            }
        }
        Ok(true)
    }

    fn retarget(&mut self, target: AwsTarget) {
        if self.executor.set_target(target) {
            // Resources and continuations belong to the old account or region
            self.session.reset_context();
        }
    }
}

/// Run interactive mode until the user exits
pub async fn run_interactive<W: UiWriter>(
    agent: &Agent,
    executor: Arc<AwsCliExecutor>,
    ui: &W,
) -> Result<()> {
    println!();
    println!("{}Stratus{} AWS assistant", SetForegroundColor(Color::Cyan), ResetColor);
    println!("      >> try \"{}\" or /help", DEFAULT_EXAMPLE_PROMPT);
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir().map(|mut path| {
        path.push(".stratus_history");
        path
    });
    if let Some(ref history_path) = history_file {
        let _ = rl.load_history(history_path);
    }

    let mut repl = Repl {
        agent,
        executor,
        ui,
        session: ConversationSession::new(),
        model: None,
    };

    loop {
        match rl.readline("stratus> ") {
            Ok(line) => {
                let input = line.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(&input)?;

                let keep_going = match parse_command(&input) {
                    Some(command) => repl.handle(command).await?,
                    None => {
                        let outcome = repl.ask(&input).await;
                        debug!("chat finished: {:?} after {} rounds", outcome.status, outcome.rounds);
                        true
                    }
                };
                if !keep_going {
                    break;
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(ref history_path) = history_file {
        let _ = rl.save_history(history_path);
    }
    Ok(())
}
