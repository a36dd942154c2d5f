//! Terminal rendering for live replies and stored transcripts

use std::io::{self, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::conversation::{Message, MessageId, Role, Session, SessionId};
use crate::streaming::MessageView;
use crate::styling::STYLER;

/// Default content width for separators.
pub const WIDTH: usize = 70;

/// Thin horizontal rule.
pub fn hr() -> String {
    STYLER.separator_style("─".repeat(WIDTH)).to_string()
}

/// Titled block:
/// ─────────────
/// Title
/// <body>
/// ─────────────
pub fn panel(title: &str, body: &str) -> String {
    let mut out = String::new();
    out.push_str(&hr());
    out.push('\n');
    out.push_str(&STYLER.header_style(title).to_string());
    if !body.trim().is_empty() {
        out.push('\n');
        out.push_str(body);
    }
    out.push('\n');
    out.push_str(&hr());
    out
}

fn role_label(message: &Message) -> String {
    let label = format!("#{}", message.id);
    match message.role {
        Role::User => format!("{} {}", STYLER.user_style("You"), STYLER.dim_gray_style(label)),
        Role::Assistant => format!("{} {}", STYLER.assistant_style("Assistant"), STYLER.dim_gray_style(label)),
        Role::Notice => format!("{} {}", STYLER.warning_style("Notice"), STYLER.dim_gray_style(label)),
    }
}

fn collapsed_marker(id: MessageId) -> String {
    STYLER
        .dim_gray_style(format!("▸ reasoning hidden (!think {} to show)", id))
        .to_string()
}

/// Full rendering of a stored message, reasoning before content.
pub fn render_message(message: &Message) -> String {
    let mut out = role_label(message);
    if let Some(reasoning) = message.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
        out.push('\n');
        if message.reasoning_collapsed {
            out.push_str(&collapsed_marker(message.id));
        } else {
            out.push_str(&STYLER.dim_gray_style(reasoning.trim_end()).to_string());
        }
    }
    out.push('\n');
    match message.role {
        Role::Notice => out.push_str(&STYLER.warning_style(&message.content).to_string()),
        _ => out.push_str(&message.content),
    }
    out
}

pub fn render_transcript(session: &Session) -> String {
    let body = session
        .messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n\n");
    panel(&session.title, &body)
}

/// Numbered session list, most recent first, current session marked.
pub fn render_session_list(sessions: &[&Session], current: &SessionId) -> String {
    sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            let marker = if &session.id == current { "*" } else { " " };
            let model = session.model_used.as_deref().unwrap_or("-");
            format!(
                "{} {:>2}. {} {} {}",
                STYLER.success_style(marker),
                index + 1,
                session.title,
                STYLER.dim_gray_style(format!("({} messages, {})", session.messages.len(), model)),
                STYLER.dim_gray_style(session.timestamp.format("%Y-%m-%d %H:%M")),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Reasoning,
    Content,
}

/// Prints a streaming reply incrementally: only text not yet on screen is written.
pub struct TerminalView<W: Write> {
    out: W,
    message: Option<MessageId>,
    printed_reasoning: usize,
    printed_content: String,
    section: Section,
    spinner: Option<ProgressBar>,
    show_spinner: bool,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        let mut view = Self::new(io::stdout());
        view.show_spinner = true;
        view
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            message: None,
            printed_reasoning: 0,
            printed_content: String::new(),
            section: Section::None,
            spinner: None,
            show_spinner: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn start_spinner(&mut self) {
        if !self.show_spinner || self.spinner.is_some() {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.blue.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message("Thinking...");
        self.spinner = Some(spinner);
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn begin(&mut self, message: &Message) -> io::Result<()> {
        self.stop_spinner();
        self.message = Some(message.id);
        self.printed_reasoning = 0;
        self.printed_content.clear();
        self.section = Section::None;
        writeln!(self.out, "{}", role_label(message))
    }

    fn enter(&mut self, section: Section) -> io::Result<()> {
        if self.section != section && self.section != Section::None {
            writeln!(self.out)?;
        }
        self.section = section;
        Ok(())
    }

    fn render_delta(&mut self, message: &Message) -> io::Result<()> {
        if self.message != Some(message.id) {
            self.begin(message)?;
        }

        let reasoning = message.reasoning.as_deref().unwrap_or("");
        if reasoning.is_empty() && message.content.is_empty() {
            self.start_spinner();
            return Ok(());
        }
        self.stop_spinner();

        // Finalization can strip inline tags, so what is on screen is no longer a prefix.
        if !message.content.starts_with(&self.printed_content) {
            writeln!(self.out)?;
            writeln!(self.out, "{}", hr())?;
            self.printed_content.clear();
            self.section = Section::None;
        }

        if reasoning.len() > self.printed_reasoning {
            if message.reasoning_collapsed {
                if self.printed_reasoning == 0 {
                    self.enter(Section::Reasoning)?;
                    write!(self.out, "{}", collapsed_marker(message.id))?;
                }
            } else {
                self.enter(Section::Reasoning)?;
                let fresh = reasoning.get(self.printed_reasoning..).unwrap_or(reasoning);
                write!(self.out, "{}", STYLER.dim_gray_style(fresh))?;
            }
            self.printed_reasoning = reasoning.len();
        }

        if message.content.len() > self.printed_content.len() {
            self.enter(Section::Content)?;
            let fresh = &message.content[self.printed_content.len()..];
            match message.role {
                Role::Notice => write!(self.out, "{}", STYLER.warning_style(fresh))?,
                _ => write!(self.out, "{}", fresh)?,
            }
            self.printed_content.push_str(fresh);
        }

        self.out.flush()
    }

    /// Close out the current reply, if any.
    pub fn finish(&mut self) {
        self.stop_spinner();
        if self.message.take().is_some() {
            if let Err(err) = writeln!(self.out).and_then(|_| self.out.flush()) {
                debug!(error = %err, "failed to write to terminal");
            }
        }
    }

    /// Print a stored message in full, outside of any stream.
    pub fn show(&mut self, message: &Message) {
        self.finish();
        if let Err(err) = writeln!(self.out, "{}", render_message(message)) {
            debug!(error = %err, "failed to write to terminal");
        }
    }
}

impl<W: Write> MessageView for TerminalView<W> {
    fn message_changed(&mut self, message: &Message) {
        if let Err(err) = self.render_delta(message) {
            debug!(error = %err, "failed to write to terminal");
        }
    }
}
