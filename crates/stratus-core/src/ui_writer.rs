use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;

use crate::resource_context::ResourceRecord;

/// An actionable button rendered after a response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    /// Command id the front end dispatches on click
    pub command: String,
    pub title: String,
    pub arguments: Vec<Value>,
}

impl Button {
    pub fn new(command: &str, title: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            title: title.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: Value) -> Self {
        self.arguments.push(argument);
        self
    }
}

/// Interface for UI output operations
/// This trait abstracts all output of a chat so the orchestration loop
/// is not coupled to a console, an editor panel or a test recorder.
/// Output is push-only; nothing waits for an acknowledgement.
pub trait UiWriter: Send + Sync {
    /// Print streamed response text (markdown)
    fn print_markdown(&self, text: &str);

    /// Print a short progress notice, e.g. which tool is running
    fn print_progress(&self, message: &str);

    fn print_button(&self, button: &Button);

    /// Print a citation for a resource a tool touched
    fn print_reference(&self, resource: &ResourceRecord);

    /// Ask the user to pick one of `options`.
    /// Returns None when the prompt was dismissed without an answer.
    fn prompt_user_choice(&self, message: &str, options: &[&str]) -> Option<usize>;

    /// Called once when a chat is over (finished, cancelled or failed)
    fn work_finished(&self) {}

    /// Flush any buffered output
    fn flush(&self);
}

/// A UiWriter that discards output and declines every prompt
pub struct NullUiWriter;

impl UiWriter for NullUiWriter {
    fn print_markdown(&self, _text: &str) {}
    fn print_progress(&self, _message: &str) {}
    fn print_button(&self, _button: &Button) {}
    fn print_reference(&self, _resource: &ResourceRecord) {}
    fn prompt_user_choice(&self, _message: &str, _options: &[&str]) -> Option<usize> {
        None
    }
    fn flush(&self) {}
}

/// Forwards everything to an inner writer and keeps a copy of the
/// markdown text that went through it.
pub struct TranscriptWriter<'a, W: UiWriter + ?Sized> {
    inner: &'a W,
    transcript: Mutex<String>,
}

impl<'a, W: UiWriter + ?Sized> TranscriptWriter<'a, W> {
    pub fn new(inner: &'a W) -> Self {
        Self {
            inner,
            transcript: Mutex::new(String::new()),
        }
    }

    pub fn transcript(&self) -> String {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn into_transcript(self) -> String {
        self.transcript
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: UiWriter + ?Sized> UiWriter for TranscriptWriter<'_, W> {
    fn print_markdown(&self, text: &str) {
        self.inner.print_markdown(text);
        match self.transcript.lock() {
            Ok(mut t) => t.push_str(text),
            Err(poisoned) => poisoned.into_inner().push_str(text),
        }
    }

    fn print_progress(&self, message: &str) {
        self.inner.print_progress(message);
    }

    fn print_button(&self, button: &Button) {
        self.inner.print_button(button);
    }

    fn print_reference(&self, resource: &ResourceRecord) {
        self.inner.print_reference(resource);
    }

    fn prompt_user_choice(&self, message: &str, options: &[&str]) -> Option<usize> {
        self.inner.prompt_user_choice(message, options)
    }

    fn work_finished(&self) {
        self.inner.work_finished();
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
