use std::fmt::Write as _;
use std::io::Write as _;
use std::time::Duration;

use anyhow::Result;
use colored::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::{
    CompletionType, Config, Context, Editor, ExternalPrinter, Helper, Highlighter, Validator,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;

use crate::config::{AppConfig, TransportMode};
use crate::dashboard::{Dashboard, Event};
use crate::model::{Message, Role};
use crate::transport::channel::{self, ChannelConnection};
use crate::transport::{CommandSink, HttpSink, StatusPoller};
use crate::ui::{StatusBoard, Transcript, UiState};

/// Available slash commands for tab-completion.
const COMMANDS: &[&str] = &["/help", "/quit", "/exit", "/status", "/history", "/stats"];

/// Rustyline helper providing slash-command tab-completion and inline hints.
#[derive(Helper, Validator, Highlighter)]
struct CommandCompleter;

impl Hinter for CommandCompleter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        // Only hint when cursor is at end and line starts with '/'
        if pos != line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }

        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];
        if !prefix.starts_with('/') || prefix.contains(' ') {
            return Ok((0, vec![]));
        }

        let matches: Vec<Pair> = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

/// Local commands handled by the terminal rather than sent to the backend.
#[derive(Debug, Clone, PartialEq)]
enum ReplCommand {
    Help,
    Quit,
    Status,
    History,
    Stats,
    Unknown(String),
}

/// `None` means the line is a command for the backend.
fn parse_repl_command(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    let cmd = match line.split_whitespace().next().unwrap_or(line) {
        "/help" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        "/status" => ReplCommand::Status,
        "/history" => ReplCommand::History,
        "/stats" => ReplCommand::Stats,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Some(cmd)
}

pub fn print_banner(mode: TransportMode, url: &str) {
    println!("{}", "====================================".bright_cyan());
    println!("{}", "        HOME DASHBOARD v0.1.0       ".bright_cyan().bold());
    println!("{}", "====================================".bright_cyan());
    println!(
        "{} {} → {}",
        "✓ Transport:".green(),
        mode.display_name().bright_white(),
        url.dimmed()
    );
    println!("{}\n", " Type a command for the assistant, /help for more, /quit to exit".dimmed());
}

fn render_help() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", "━━━━━━━━━━━━━━ Commands ━━━━━━━━━━━━━━".bright_cyan().bold());
    let _ = writeln!(out, "  {}     show this help", "/help".bright_white());
    let _ = writeln!(out, "  {}   show the device status board", "/status".bright_white());
    let _ = writeln!(out, "  {}  reprint the conversation", "/history".bright_white());
    let _ = writeln!(out, "  {}    session and connection counters", "/stats".bright_white());
    let _ = writeln!(out, "  {}     leave the dashboard", "/quit".bright_white());
    let _ = writeln!(out, "  Anything else is sent to the assistant, e.g. \"turn the lights on\".");
    let _ = writeln!(out, "{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
    out
}

/// Plain-text form of a transcript line: `[HH:MM:SS] ROLE: text`.
pub fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.received_at.format("%H:%M:%S"),
        message.role.label(),
        message.text
    )
}

fn render_message(message: &Message) -> String {
    let line = format_message(message);
    let line = match message.role {
        Role::User => line.bright_white(),
        Role::Ai => line.bright_green(),
        Role::System => line.yellow(),
    };
    format!("{line}\n")
}

fn render_board(board: &StatusBoard) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "─────────── Device Status ───────────".bright_blue());
    if board.is_empty() {
        let _ = writeln!(out, "{}", "  (no status received yet)".dimmed());
    }
    for (indicator, value) in board.entries() {
        let value = match value {
            "ON" => value.green().bold(),
            "OFF" => value.red(),
            _ => value.bright_white(),
        };
        let _ = writeln!(out, "  {:<24} {}", indicator.label(), value);
    }
    let _ = writeln!(out, "{}", "─────────────────────────────────────".bright_blue());
    out
}

fn render_history(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return format!("{}\n", "No messages yet.".dimmed());
    }
    transcript.iter().map(render_message).collect()
}

/// Output handle the line editor repaints around, so text printed while the
/// user is typing does not land inside the prompt.
pub type Printer = Box<dyn ExternalPrinter + Send>;

/// Prints what changed in the UI state since the last flush.
#[derive(Default)]
pub struct Terminal {
    printed: usize,
    printer: Option<Printer>,
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_printer(printer: Option<Printer>) -> Self {
        Self {
            printed: 0,
            printer,
        }
    }

    /// Write a block of output, through the line editor when one is active.
    pub fn emit(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(printer) = self.printer.as_mut() {
            if let Err(e) = printer.print(text) {
                tracing::warn!(error = %e, "line editor printer failed, using stdout");
                self.printer = None;
            }
            return;
        }
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    pub fn flush(&mut self, ui: &mut UiState) {
        let mut out: String = ui
            .transcript
            .since(self.printed)
            .iter()
            .map(render_message)
            .collect();
        self.printed = ui.transcript.len();
        if ui.take_board_dirty() {
            out.push_str(&render_board(&ui.board));
        }
        self.emit(out);
    }
}

/// The running transport, kept for stats and shutdown.
enum Link {
    Poller(StatusPoller),
    Channel(ChannelConnection),
}

impl Link {
    fn render_stats(&self) -> String {
        match self {
            Link::Poller(poller) => {
                let s = poller.stats();
                format!(
                    "Status polls: {} ({} ok, {} failed, {} failing in a row, {} skipped)\n",
                    s.ticks,
                    s.successes.to_string().green(),
                    s.failures.to_string().red(),
                    s.consecutive_failures,
                    s.skipped
                )
            }
            Link::Channel(connection) => format!(
                "Channel {}: {} frames received, {} commands written{}\n",
                connection.url(),
                connection.frames_received(),
                connection.commands_sent(),
                if connection.is_running() { "" } else { " (closed)" }
            ),
        }
    }

    async fn shutdown(self) {
        match self {
            Link::Poller(poller) => poller.stop().await,
            Link::Channel(connection) => connection.close().await,
        }
    }
}

/// Read lines on a blocking thread and forward them to the event loop. The
/// sender is dropped on Ctrl-C / Ctrl-D, which ends the loop.
///
/// `ready` receives the editor's external printer (if the terminal supports
/// one) before the first prompt is shown.
fn spawn_input_thread(lines: UnboundedSender<String>, ready: oneshot::Sender<Option<Printer>>) {
    std::thread::spawn(move || {
        let rl_config = Config::builder()
            .auto_add_history(true)
            .completion_type(CompletionType::List)
            .build();
        let mut rl: Editor<CommandCompleter, DefaultHistory> = match Editor::with_config(rl_config) {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("{} {}", "✗ Cannot open line editor:".red(), e);
                return;
            }
        };
        rl.set_helper(Some(CommandCompleter));

        let printer = match rl.create_external_printer() {
            Ok(printer) => Some(Box::new(printer) as Printer),
            Err(e) => {
                tracing::debug!(error = %e, "no external printer, output goes to stdout");
                None
            }
        };
        let _ = ready.send(printer);

        loop {
            match rl.readline(&"> ".bright_cyan().bold().to_string()) {
                Ok(line) => {
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "input error");
                    break;
                }
            }
        }
    });
}

/// Connect the configured transport and run the dashboard until the user
/// quits.
pub async fn start(config: &AppConfig) -> Result<()> {
    let mode = TransportMode::from_config(&config.transport)?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();
    let client = reqwest::Client::new();

    let (sink, link): (Box<dyn CommandSink>, Link) = match mode {
        TransportMode::Http => {
            print_banner(mode, &config.base_url);
            let sink: Box<dyn CommandSink> = Box::new(HttpSink::new(
                client.clone(),
                config.endpoint("/ask/"),
                events_tx.clone(),
            ));
            let poller = StatusPoller::start(
                client,
                config.endpoint("/status/"),
                Duration::from_millis(config.poll_interval_ms),
                events_tx.clone(),
            );
            (sink, Link::Poller(poller))
        }
        TransportMode::Channel => {
            let url = config.channel_url()?;
            print_banner(mode, &url);
            let (sink, connection) =
                channel::connect(url, config.max_pending_commands, events_tx.clone());
            let sink: Box<dyn CommandSink> = Box::new(sink);
            (sink, Link::Channel(connection))
        }
    };
    drop(events_tx);

    tracing::info!(mode = mode.display_name(), "dashboard started");

    let mut dashboard = Dashboard::new(sink);

    let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
    let (ready_tx, ready_rx) = oneshot::channel();
    spawn_input_thread(lines_tx, ready_tx);
    let mut terminal = Terminal::with_printer(ready_rx.await.ok().flatten());

    loop {
        tokio::select! {
            line = lines_rx.recv() => {
                let Some(line) = line else { break };
                match parse_repl_command(&line) {
                    Some(ReplCommand::Quit) => break,
                    Some(ReplCommand::Help) => terminal.emit(render_help()),
                    Some(ReplCommand::Status) => terminal.emit(render_board(&dashboard.ui().board)),
                    Some(ReplCommand::History) => {
                        terminal.emit(render_history(&dashboard.ui().transcript));
                    }
                    Some(ReplCommand::Stats) => {
                        let text = dashboard.metrics().render() + &link.render_stats();
                        terminal.emit(text);
                    }
                    Some(ReplCommand::Unknown(cmd)) => {
                        terminal.emit(format!("{} {} (try /help)\n", "Unknown command:".yellow(), cmd));
                    }
                    None => dashboard.handle(Event::Input(line)),
                }
            }
            Some(event) = events_rx.recv() => dashboard.handle(event),
        }
        terminal.flush(dashboard.ui_mut());
    }

    link.shutdown().await;
    tracing::info!("dashboard stopped");
    println!("Goodbye!");
    Ok(())
}
