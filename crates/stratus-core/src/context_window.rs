//! Token budgeting for outgoing conversation history.
//!
//! Token counts are estimated from character counts, the budget comes
//! from a per-family context window, and pruning keeps the first message
//! plus a sliding window of the most recent ones.

use stratus_providers::{ContentPart, Message};
use tracing::{debug, warn};

/// Fraction of the context window reserved for outgoing history
pub const BUDGET_RATIO_NUMERATOR: usize = 3;
pub const BUDGET_RATIO_DENOMINATOR: usize = 4;

/// Number of most recent messages kept when pruning
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const DEFAULT_CONTEXT_WINDOW: usize = 8_000;

/// Context window sizes by family substring, checked in order
const CONTEXT_WINDOWS: [(&str, usize); 3] = [
    ("claude", 200_000),
    ("gpt-4", 128_000),
    ("gpt-3.5", 16_000),
];

/// Estimate the token cost of `messages`: characters of text-bearing parts
/// divided by 4, scaled by 1.1, rounded up. Tool call requests are ignored.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages
        .iter()
        .flat_map(|m| m.content.iter())
        .map(|part| match part {
            ContentPart::Text { text } => text.chars().count(),
            ContentPart::ToolResult { content, .. } => content.chars().count(),
            ContentPart::ToolCall(_) => 0,
        })
        .sum();

    // ceil(chars / 4 * 1.1) in integer arithmetic
    (chars * 11).div_ceil(40)
}

/// Total context window for a model family (case-insensitive substring match)
pub fn context_window_for(family: &str) -> usize {
    let family = family.to_lowercase();
    CONTEXT_WINDOWS
        .iter()
        .find(|(needle, _)| family.contains(needle))
        .map(|(_, window)| *window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Usable token budget for a model family
pub fn budget_for(family: &str) -> usize {
    context_window_for(family) * BUDGET_RATIO_NUMERATOR / BUDGET_RATIO_DENOMINATOR
}

/// Fit `messages` into `budget`.
///
/// Under budget the list is returned untouched. Over budget, the first
/// message and the last `keep_last` messages are kept in their original
/// order. This runs once; the result may still exceed the budget when the
/// retained messages alone are too large.
pub fn prune(messages: Vec<Message>, budget: usize, keep_last: usize) -> Vec<Message> {
    let estimated = estimate_tokens(&messages);
    if estimated <= budget {
        return messages;
    }

    if messages.len() <= keep_last + 1 {
        warn!(
            "History of {} messages is over budget ({} > {}) but too short to prune",
            messages.len(),
            estimated,
            budget
        );
        return messages;
    }

    let original_len = messages.len();
    let mut iter = messages.into_iter();
    let mut pruned = Vec::with_capacity(keep_last + 1);
    pruned.extend(iter.next());
    pruned.extend(iter.skip(original_len - 1 - keep_last));

    let after = estimate_tokens(&pruned);
    debug!(
        "Pruned history from {} to {} messages ({} -> {} tokens, budget {})",
        original_len,
        pruned.len(),
        estimated,
        after,
        budget
    );
    if after > budget {
        warn!(
            "History still over budget after pruning ({} > {}); sending as is",
            after, budget
        );
    }

    pruned
}
