//! CLI argument parsing for Stratus.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(name = "stratus")]
#[command(about = "Ask questions about your AWS account in plain language")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the configured model (e.g. 'openai.default' or 'auto')
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Capability manifest listing the AWS tools offered to the model
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// AWS profile to run commands with
    #[arg(long)]
    pub profile: Option<String>,

    /// AWS region to run commands in
    #[arg(long)]
    pub region: Option<String>,

    /// Question to answer (if provided, runs once instead of interactively)
    pub task: Option<String>,
}
