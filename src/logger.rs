use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::utils::ensure_dir;

/// Counters for one dashboard session, shown by `/stats`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionMetrics {
    pub commands_sent: usize,
    pub replies_received: usize,
    pub command_errors: usize,
    pub status_updates: usize,
    pub ignored_payloads: usize,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage of sent commands that got a reply back.
    pub fn reply_rate(&self) -> f64 {
        if self.commands_sent == 0 {
            return 0.0;
        }
        (self.replies_received as f64 / self.commands_sent as f64) * 100.0
    }

    /// The `/stats` block, ready to print.
    pub fn render(&self) -> String {
        use colored::Colorize;
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "\n{}", "━━━━━━━━━ Session Statistics ━━━━━━━━━".bright_cyan().bold());
        let _ = writeln!(out, "Commands sent: {}", self.commands_sent);
        let _ = writeln!(out, "Replies received: {}", self.replies_received.to_string().green());
        let _ = writeln!(out, "Command errors: {}", self.command_errors.to_string().red());
        let _ = writeln!(out, "Status updates: {}", self.status_updates);
        let _ = writeln!(out, "Ignored payloads: {}", self.ignored_payloads.to_string().yellow());
        let _ = writeln!(out, "Reply rate: {:.1}%", self.reply_rate());
        let _ = writeln!(out, "{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());
        out
    }
}

/// Path of the log file for a session started at `started`.
pub fn session_log_path(log_dir: &Path, started: DateTime<Local>) -> PathBuf {
    log_dir.join(format!("session_{}.log", started.format("%Y%m%d_%H%M%S")))
}

/// Install the global `tracing` subscriber, writing to a fresh session file
/// under `log_dir`. The terminal is the UI, so nothing is logged to stdout.
///
/// `RUST_LOG` controls the filter; the default is `info`.
pub fn init(log_dir: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(log_dir);
    ensure_dir(&dir)?;

    let path = session_log_path(&dir, Local::now());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    Ok(path)
}
