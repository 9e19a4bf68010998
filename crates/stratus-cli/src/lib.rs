//! Stratus CLI: wires configuration, providers and the AWS CLI executor
//! into an agent and runs it once or interactively.

pub mod aws_executor;
pub mod cli_args;
pub mod interactive;
pub mod ui_writer_impl;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stratus_config::Config;
use stratus_core::{Agent, ChatRequest, ChatStatus, ConversationSession, ToolManifest};
use stratus_providers::{OpenAIProvider, ProviderRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aws_executor::{AwsCliExecutor, AwsTarget};
pub use cli_args::Cli;
use interactive::run_interactive;
use ui_writer_impl::ConsoleUiWriter;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli);

    let config = Config::load_with_overrides(cli.config.as_deref(), cli.model.clone())?;
    let providers = build_providers(&config)?;
    if providers.is_empty() {
        warn!(
            "No model providers configured; add an [providers.openai.<name>] section to {}",
            Config::default_config_file().display()
        );
    }

    let manifest_path = cli
        .manifest
        .clone()
        .or_else(|| config.agent.manifest_path.as_deref().map(expand_path));
    let manifest = ToolManifest::load(manifest_path.as_deref());
    info!("{} AWS tools available", manifest.tools().len());

    let target = AwsTarget {
        profile: cli.profile.clone().or_else(|| config.aws.profile.clone()),
        region: cli.region.clone().or_else(|| config.aws.region.clone()),
    };
    let executor = Arc::new(AwsCliExecutor::new(config.aws.cli_path.clone(), target));

    let agent = Agent::new(config, providers, &manifest, executor.clone());
    let ui = ConsoleUiWriter::new();

    match cli.task {
        Some(task) => run_single_shot(&agent, &ui, task).await,
        None => run_interactive(&agent, executor, &ui).await,
    }
}

/// One provider per `[providers.openai.<name>]` section, registered as
/// `openai.<name>` in name order.
pub fn build_providers(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    let mut names: Vec<&String> = config.providers.openai.keys().collect();
    names.sort();

    for name in names {
        let openai = &config.providers.openai[name];
        let provider_name = format!("openai.{}", name);
        debug!("Registering provider {} ({})", provider_name, openai.model);
        registry.register(OpenAIProvider::new_with_name(
            provider_name,
            openai.api_key.clone(),
            Some(openai.model.clone()),
            openai.base_url.clone(),
            openai.max_tokens,
            openai.family.clone(),
        ));
    }

    let default_model = &config.providers.default_model;
    if default_model != stratus_config::AUTO_MODEL {
        registry.set_default(default_model)?;
    }
    Ok(registry)
}

async fn run_single_shot(agent: &Agent, ui: &ConsoleUiWriter, task: String) -> Result<()> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut session = ConversationSession::new();
    let outcome = agent
        .chat(ChatRequest::new(task), &mut session, ui, &cancel)
        .await;
    watcher.abort();
    println!();

    match outcome.status {
        ChatStatus::Done | ChatStatus::Cancelled => Ok(()),
        ChatStatus::Failed => anyhow::bail!("The request failed"),
        ChatStatus::NoModel => anyhow::bail!("No usable model is configured"),
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in [
        "stratus",
        "stratus_core",
        "stratus_cli",
        "stratus_providers",
        "stratus_config",
    ] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
