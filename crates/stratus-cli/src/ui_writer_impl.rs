use crossterm::style::{Color, ResetColor, SetForegroundColor};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use stratus_core::{Button, ResourceRecord, UiWriter};
use termimad::MadSkin;

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Splits streamed markdown into complete lines.
///
/// Fragments arrive at arbitrary boundaries, so a partial line is held back
/// until its newline shows up (or the writer is flushed).
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.pending.push_str(fragment);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches('\n').to_string());
        }
        lines
    }

    /// Whatever is left after the last newline
    pub fn take_rest(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

struct RenderState {
    lines: LineBuffer,
    in_code_block: bool,
}

/// Console implementation of UiWriter that prints to stdout
pub struct ConsoleUiWriter {
    skin: MadSkin,
    render: Mutex<RenderState>,
    spinner: Mutex<Option<ProgressBar>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConsoleUiWriter {
    pub fn new() -> Self {
        let mut skin = MadSkin::default();
        skin.bold.set_fg(termimad::crossterm::style::Color::Green);
        skin.italic.set_fg(termimad::crossterm::style::Color::Cyan);
        skin.inline_code.set_fg(termimad::crossterm::style::Color::Yellow);
        Self {
            skin,
            render: Mutex::new(RenderState {
                lines: LineBuffer::default(),
                in_code_block: false,
            }),
            spinner: Mutex::new(None),
        }
    }

    fn stop_spinner(&self) {
        if let Some(spinner) = lock(&self.spinner).take() {
            spinner.finish_and_clear();
        }
    }

    fn render_line(&self, line: &str, state: &mut RenderState) {
        if line.trim_start().starts_with("```") {
            state.in_code_block = !state.in_code_block;
            return;
        }
        if state.in_code_block {
            println!("{}    {}{}", SetForegroundColor(Color::Yellow), line, ResetColor);
        } else if let Some(heading) = line.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim();
            println!("{}{}{}", SetForegroundColor(Color::Magenta), heading, ResetColor);
        } else {
            println!("{}", self.skin.inline(line));
        }
    }
}

impl Default for ConsoleUiWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl UiWriter for ConsoleUiWriter {
    fn print_markdown(&self, text: &str) {
        self.stop_spinner();
        let mut state = lock(&self.render);
        let lines = state.lines.push(text);
        for line in lines {
            self.render_line(&line, &mut state);
        }
    }

    fn print_progress(&self, message: &str) {
        let mut spinner = lock(&self.spinner);
        match spinner.as_ref() {
            Some(bar) => bar.set_message(message.to_string()),
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(SPINNER_FRAMES),
                );
                bar.set_message(message.to_string());
                bar.enable_steady_tick(Duration::from_millis(100));
                *spinner = Some(bar);
            }
        }
    }

    fn print_button(&self, button: &Button) {
        self.stop_spinner();
        println!(
            "{}[{}]{} ({})",
            SetForegroundColor(Color::Cyan),
            button.title,
            ResetColor,
            button.command
        );
    }

    fn print_reference(&self, resource: &ResourceRecord) {
        self.stop_spinner();
        println!(
            "{}  ↳ {}{}",
            SetForegroundColor(Color::DarkGrey),
            resource.label(),
            ResetColor
        );
    }

    fn prompt_user_choice(&self, message: &str, options: &[&str]) -> Option<usize> {
        self.stop_spinner();
        self.flush();
        println!("{}", message);
        for (i, option) in options.iter().enumerate() {
            println!("  [{}] {}", i + 1, option);
        }

        loop {
            print!("Select an option (1-{}, empty to dismiss): ", options.len());
            let _ = io::stdout().flush();

            let mut input = String::new();
            match io::stdin().read_line(&mut input) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
            let trimmed = input.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Ok(choice) = trimmed.parse::<usize>() {
                if choice > 0 && choice <= options.len() {
                    return Some(choice - 1);
                }
            }
            println!("Invalid choice.");
        }
    }

    fn work_finished(&self) {
        self.stop_spinner();
    }

    fn flush(&self) {
        let mut state = lock(&self.render);
        if let Some(rest) = state.lines.take_rest() {
            self.render_line(&rest, &mut state);
        }
        state.in_code_block = false;
        let _ = io::stdout().flush();
    }
}
