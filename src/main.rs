// main.rs
// Entry point for the sidechat terminal client

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use console::Style;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::task::JoinHandle;
use tracing::info;

mod chat;
mod config;
mod conversation;
mod display;
mod error;
mod logging;
mod storage;
mod streaming;
mod styling;
mod terminal_ui;

use chat::Chat;
use conversation::{ConversationStore, MessageId, SessionId};
use display::TerminalView;
use error::{CancelReason, ChatError};
use storage::JsonFileStore;
use streaming::{HttpTransport, StreamHandle, StreamOutcome, StreamPhase};
use terminal_ui::ChatHelper;

const APP_NAME: &str = "sidechat";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const CONNECTIVITY_PROBE_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    println!();

    let header_style = Style::new().blue().bright().bold();
    let separator_style = Style::new().black().bright();
    let info_style = Style::new().black();
    let bar_char = "━";

    println!("{}", header_style.apply_to(bar_char.repeat(70)));
    println!("  {} {} {} {}",
        header_style.apply_to(APP_NAME),
        info_style.apply_to(format!("v{}", VERSION)),
        separator_style.apply_to("│"),
        info_style.apply_to("Chat with any OpenAI-compatible model")
    );
    println!("{}\n", header_style.apply_to(bar_char.repeat(70)));

    let mut app = match init_app() {
        Ok(app) => app,
        Err(e) => {
            let error_style = Style::new().red();
            eprintln!("{} {}",
                error_style.apply_to("[ERROR]"),
                error_style.apply_to(format!("Initialization error: {:#}", e))
            );
            process::exit(1);
        }
    };

    match app.run().await {
        Ok(_) => {
            let success_style = Style::new().green();
            println!("{} {}",
                success_style.apply_to("[OK]"),
                success_style.apply_to("Conversations saved")
            );
            Ok(())
        },
        Err(e) => {
            let error_style = Style::new().red();
            eprintln!("{} {}",
                error_style.apply_to("[ERROR]"),
                error_style.apply_to(format!("Runtime error: {:#}", e))
            );
            process::exit(1);
        }
    }
}

fn init_app() -> Result<App> {
    let config = config::load_config()?;
    let data_dir = config::get_sidechat_dir()?;
    logging::init_logging(&data_dir, config.log_level)?;

    let backend = JsonFileStore::new(data_dir.clone())?;
    let sessions_path = backend.path();
    let store = ConversationStore::open(Box::new(backend), config.session_tag())
        .with_context(|| format!("Failed to load conversations from {}", sessions_path.display()))?;

    let arrow_style = Style::new().black();
    let label_style = Style::new().bold();
    let value_style = Style::new().cyan();
    let separator_style = Style::new().black().bright();

    let (provider, model) = match config.selection() {
        Ok(selection) => (selection.endpoint.base_url, selection.model),
        Err(_) => ("not configured".to_string(), "-".to_string()),
    };
    for (label, value) in [
        ("Using model:", model),
        ("API endpoint:", provider),
        ("Data directory:", data_dir.display().to_string()),
    ] {
        println!("  {} {:<18} {}",
            arrow_style.apply_to("»"),
            label_style.apply_to(label),
            value_style.apply_to(value)
        );
    }
    println!("{}\n", separator_style.apply_to("━".repeat(70)));

    info!(data_dir = %data_dir.display(), "sidechat starting");
    let chat = Chat::new(config, store, HttpTransport::new()?);

    Ok(App {
        chat,
        view: TerminalView::stdout(),
    })
}

/// Cancel `handle` with [`CancelReason::User`] on Ctrl-C.
fn spawn_interrupt_watcher(handle: StreamHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = handle.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    handle.cancel(CancelReason::User);
                }
            }
        }
    })
}

/// The interactive client
pub struct App {
    chat: Chat<HttpTransport>,
    view: TerminalView<io::Stdout>,
}

impl App {
    fn helper(&self) -> ChatHelper {
        let config = self.chat.config();
        ChatHelper::new(
            config.system_prompts.iter().map(|p| p.id.clone()).collect(),
            config.providers.iter().map(|p| p.id.clone()).collect(),
        )
    }

    pub async fn run(&mut self) -> Result<()> {
        let success_style = Style::new().green();
        println!("Type a message to chat. {} lists commands, {} stops a reply, {} quits.",
            success_style.apply_to("!help"),
            success_style.apply_to("Ctrl-C"),
            success_style.apply_to("!exit")
        );
        println!("{}", display::render_transcript(self.chat.current_session()));

        let mut editor: Editor<ChatHelper, DefaultHistory> = Editor::new()?;
        editor.set_helper(Some(self.helper()));

        loop {
            let prompt_style = Style::new().cyan().bright().bold();
            let arrow_style = Style::new().black().bright();
            let prompt = format!("{} {} ",
                prompt_style.apply_to(APP_NAME),
                arrow_style.apply_to("»")
            );

            match editor.readline(&prompt) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(input);

                    if let Some(command) = input.strip_prefix('!') {
                        match self.handle_special_command(command).await {
                            Ok(true) => {
                                editor.set_helper(Some(self.helper()));
                                continue;
                            },
                            Ok(false) => break,
                            Err(e) => {
                                let error_style = Style::new().red();
                                eprintln!("{} {}",
                                    error_style.apply_to("[ERROR]"),
                                    error_style.apply_to(format!("Command error: {:#}", e))
                                );
                                continue;
                            }
                        }
                    }

                    if let Err(e) = self.send(input).await {
                        let error_style = Style::new().red();
                        eprintln!("{} {}",
                            error_style.apply_to("[ERROR]"),
                            error_style.apply_to(format!("Error sending message: {:#}", e))
                        );
                    }
                },
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted. Type !exit to quit.");
                },
                Err(ReadlineError::Eof) => {
                    println!("End of input. Goodbye!");
                    break;
                },
                Err(err) => {
                    let error_style = Style::new().red();
                    eprintln!("{} {}",
                        error_style.apply_to("[ERROR]"),
                        error_style.apply_to(format!("Input error: {}", err))
                    );
                    break;
                }
            }
        }

        Ok(())
    }

    /// Start the Ctrl-C and connectivity watchers for one stream.
    fn watch(&self, handle: &StreamHandle) -> Vec<JoinHandle<()>> {
        let mut watchers = vec![spawn_interrupt_watcher(handle.clone())];
        if let Ok(selection) = self.chat.config().selection() {
            watchers.extend(streaming::connectivity::watch(
                &selection.endpoint.base_url,
                handle.clone(),
                CONNECTIVITY_PROBE_INTERVAL,
            ));
        }
        watchers
    }

    fn report(&mut self, outcome: Option<StreamOutcome>) {
        self.view.finish();
        let Some(outcome) = outcome else {
            return;
        };
        if outcome.phase == StreamPhase::Aborted
            && matches!(outcome.error, Some(ChatError::Cancelled(CancelReason::User)))
        {
            let dim = Style::new().dim();
            let note = if outcome.kept { "[stopped]" } else { "[cancelled]" };
            println!("{}", dim.apply_to(note));
        }
    }

    async fn send(&mut self, input: &str) -> Result<()> {
        let handle = StreamHandle::new();
        let watchers = self.watch(&handle);
        let result = self.chat.send_message(input, handle, &mut self.view).await;
        watchers.iter().for_each(JoinHandle::abort);
        self.report(result?);
        Ok(())
    }

    async fn regenerate(&mut self, id: MessageId) -> Result<()> {
        let handle = StreamHandle::new();
        let watchers = self.watch(&handle);
        let result = self.chat.regenerate(id, handle, &mut self.view).await;
        watchers.iter().for_each(JoinHandle::abort);
        match result? {
            None => {
                self.view.finish();
                if self.chat.config().selection().is_ok() {
                    println!("Nothing to regenerate: no user message before #{}.", id);
                }
            },
            outcome => self.report(outcome),
        }
        Ok(())
    }

    /// Resolve a 1-based index from `!sessions` to a session id.
    fn session_at(&self, args: &str) -> Result<SessionId> {
        let index: usize = args
            .parse()
            .map_err(|_| anyhow!("Expected a session number from !sessions, got '{}'", args))?;
        self.chat
            .store()
            .sessions_by_recency()
            .get(index.wrapping_sub(1))
            .map(|session| session.id.clone())
            .ok_or_else(|| anyhow!("No session number {}", index))
    }

    fn parse_message_id(args: &str) -> Result<MessageId> {
        args.trim_start_matches('#')
            .parse::<u64>()
            .map(MessageId)
            .map_err(|_| anyhow!("Invalid message id: {}", args))
    }

    fn print_help(&self) {
        let title_style = Style::new().cyan().bright().bold();
        let success_style = Style::new().green();
        let separator_style = Style::new().black();
        let line_len: usize = 50;
        let title = "sidechat Help";

        println!("\n{} {}",
            title_style.apply_to(title),
            title_style.apply_to("━".repeat(line_len.saturating_sub(title.len() + 1)))
        );
        println!("Regular input: send a message to the selected model");
        println!("Ctrl-C while a reply streams: stop it, keeping what arrived");
        println!("\nSpecial commands:");
        for (usage, description) in [
            ("!new", "Start a new conversation"),
            ("!sessions", "List conversations, most recent first"),
            ("!switch <n>", "Open conversation number n"),
            ("!delete <n>", "Delete conversation number n"),
            ("!list", "Show the current conversation"),
            ("!regen [message_id]", "Answer again (defaults to the last reply)"),
            ("!think <message_id>", "Show or hide a reply's reasoning"),
            ("!models", "List providers and models"),
            ("!use <provider> <model>", "Select a provider and model"),
            ("!prompt [prompt_id]", "List or select the system prompt"),
            ("!clear", "Clear the screen"),
            ("!help", "Show this help"),
            ("!exit, !quit", "Exit sidechat"),
        ] {
            println!("  {:<28} {}", success_style.apply_to(usage), description);
        }
        println!("{}", separator_style.apply_to("━".repeat(line_len)));
    }

    fn print_models(&self) {
        let config = self.chat.config();
        let selected_style = Style::new().green().bold();
        let dim = Style::new().dim();

        if config.providers.is_empty() {
            println!("No providers configured. Add a [[providers]] entry to config.toml or set OPENAI_API_KEY.");
            return;
        }
        for provider in &config.providers {
            println!("{} {}", Style::new().bold().apply_to(&provider.id), dim.apply_to(&provider.base_url));
            for model in &provider.models {
                let selected = config.selected_provider.as_deref() == Some(provider.id.as_str())
                    && config.selected_model.as_deref() == Some(model.id.as_str());
                let line = format!("  {} {}", model.id, dim.apply_to(&model.name));
                if selected {
                    println!("{} {}", selected_style.apply_to("*"), line.trim_start());
                } else {
                    println!("{}", line);
                }
            }
        }
    }

    fn print_prompts(&self) {
        let config = self.chat.config();
        let selected_style = Style::new().green().bold();
        for prompt in &config.system_prompts {
            let marker = if prompt.id == config.system_prompt_id { "*" } else { " " };
            println!("{} {:<12} {}", selected_style.apply_to(marker), prompt.id, prompt.name);
        }
    }

    async fn handle_special_command(&mut self, cmd: &str) -> Result<bool> {
        let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
        let command = parts[0].to_lowercase();
        let args = parts.get(1).map_or("", |s| s.trim());
        let success_style = Style::new().green();

        match command.as_str() {
            "help" => self.print_help(),
            "new" => {
                self.chat.new_session()?;
                println!("{}", success_style.apply_to("Started a new conversation."));
            },
            "sessions" => {
                let store = self.chat.store();
                println!("{}", display::render_session_list(&store.sessions_by_recency(), store.current_id()));
            },
            "switch" => {
                let id = self.session_at(args)?;
                self.chat.switch_session(&id)?;
                println!("{}", display::render_transcript(self.chat.current_session()));
            },
            "delete" => {
                let id = self.session_at(args)?;
                self.chat.delete_session(&id)?;
                println!("{}", success_style.apply_to("Conversation deleted."));
            },
            "list" => println!("{}", display::render_transcript(self.chat.current_session())),
            "regen" => {
                let id = if args.is_empty() {
                    self.chat
                        .last_regenerable()
                        .ok_or_else(|| anyhow!("Nothing to regenerate in this conversation"))?
                } else {
                    Self::parse_message_id(args)?
                };
                self.regenerate(id).await?;
            },
            "think" => {
                if args.is_empty() {
                    println!("Usage: !think <message_id>");
                    return Ok(true);
                }
                let id = Self::parse_message_id(args)?;
                self.chat.toggle_reasoning(id)?;
                let session = self.chat.store().current_id().clone();
                if let Some(message) = self.chat.store().message(&session, id) {
                    self.view.show(message);
                }
            },
            "models" => self.print_models(),
            "use" => {
                let mut words = args.split_whitespace();
                let (Some(provider), Some(model)) = (words.next(), words.next()) else {
                    println!("Usage: !use <provider> <model>");
                    return Ok(true);
                };
                self.chat.select_model(provider, model)?;
                config::save_config(self.chat.config())?;
                println!("{} {}/{}", success_style.apply_to("Now using"), provider, model);
            },
            "prompt" => {
                if args.is_empty() {
                    self.print_prompts();
                    return Ok(true);
                }
                self.chat.select_prompt(args)?;
                config::save_config(self.chat.config())?;
                println!("{} {}", success_style.apply_to("System prompt set to"), args);
            },
            "clear" | "cls" => {
                print!("\x1B[2J\x1B[1;1H");
                io::stdout().flush()?;
            },
            "exit" | "quit" => {
                let info_style = Style::new().dim();
                println!("{}", info_style.apply_to("Exiting sidechat..."));
                return Ok(false);
            },
            _ => println!("Unknown command: !{}. Type !help for available commands.", command),
        }
        Ok(true)
    }
}
