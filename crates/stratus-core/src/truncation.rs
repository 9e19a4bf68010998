//! Size bounding for tool results before they go back to the model.
//!
//! Long JSON listings keep their first items and stay valid JSON; anything
//! else is cut by characters with a note about the original length. The
//! whole output, note included, never exceeds `max_chars`, so running the
//! truncator over its own output changes nothing.

use serde_json::{Map, Value};

pub const DEFAULT_MAX_RESULT_CHARS: usize = 8000;

/// Items kept when a listing is shortened
pub const ITEMS_KEPT: usize = 10;

/// Room left at the end of a hard cut for the length note
const SUFFIX_RESERVE: usize = 96;

pub fn truncate_tool_result(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let Ok(mut value) = serde_json::from_str::<Value>(text) else {
        return hard_truncate(text, max_chars);
    };

    if let Some(total) = truncate_items(&mut value) {
        let compact = value.to_string();
        let shortened = format!(
            "{}\n[Showing {} of {} items]",
            compact, ITEMS_KEPT, total
        );
        if shortened.chars().count() <= max_chars {
            return shortened;
        }
        return hard_truncate(&compact, max_chars);
    }

    let compact = value.to_string();
    if compact.chars().count() <= max_chars {
        return compact;
    }
    hard_truncate(&compact, max_chars)
}

/// Shorten the `items` array of the top-level object, or of its `data`
/// object when results are wrapped in a response envelope. Returns the
/// original item count when anything was cut.
fn truncate_items(value: &mut Value) -> Option<usize> {
    let object = value.as_object_mut()?;
    if has_long_items(object) {
        return Some(shorten_items(object));
    }

    let data = object.get_mut("data")?.as_object_mut()?;
    if has_long_items(data) {
        return Some(shorten_items(data));
    }
    None
}

fn has_long_items(object: &Map<String, Value>) -> bool {
    object
        .get("items")
        .and_then(Value::as_array)
        .is_some_and(|items| items.len() > ITEMS_KEPT)
}

fn shorten_items(object: &mut Map<String, Value>) -> usize {
    let mut total = 0;
    if let Some(Value::Array(items)) = object.get_mut("items") {
        total = items.len();
        items.truncate(ITEMS_KEPT);
    }
    object.insert("truncated".to_string(), Value::Bool(true));
    object.insert("totalItems".to_string(), Value::from(total));
    object.insert("showingItems".to_string(), Value::from(ITEMS_KEPT));
    total
}

fn hard_truncate(text: &str, max_chars: usize) -> String {
    if max_chars <= SUFFIX_RESERVE {
        return text.chars().take(max_chars).collect();
    }

    let total = text.chars().count();
    let keep = max_chars - SUFFIX_RESERVE;
    let head: String = text.chars().take(keep).collect();
    format!(
        "{}\n[Truncated: showing first {} of {} characters]",
        head, keep, total
    )
}
