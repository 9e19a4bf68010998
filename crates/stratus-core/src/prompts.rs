//! Fixed texts used by the orchestration loop.

/// First message of every conversation
pub const SYSTEM_INSTRUCTION: &str = "\
You are Stratus, an assistant that helps developers inspect and operate \
their AWS account. Use the provided tools to look up real data instead of \
guessing. Each tool takes a `command` (the AWS API operation name, e.g. \
`ListObjectsV2`) and a `params` object with that operation's request \
parameters. Commands that change resources ask the user for confirmation \
first; if the user cancels, say so and do not retry. Keep answers short \
and format lists as markdown tables where it helps.";

/// The example prompt offered to new users
pub const DEFAULT_EXAMPLE_PROMPT: &str = "What S3 buckets do I have?";

/// Shown when the user says thanks or ran the example prompt
pub const GOODWILL_MESSAGE: &str = "\n\nGlad I could help! If Stratus saves you time, \
a star on GitHub goes a long way.\n";

pub const UPGRADE_NOTICE: &str = "AWS tool access requires Stratus Pro.";

/// Prompt used when fetching the next page of a previous listing
pub fn load_more_prompt(tool: &str, command: &str) -> String {
    format!("Show me the next page of results for {} {}.", tool, command)
}

/// Whether a prompt earns the goodwill message
pub fn expresses_gratitude(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    lower.contains("thank") || lower.contains("appreciate") || prompt.trim() == DEFAULT_EXAMPLE_PROMPT
}
