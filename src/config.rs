use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use url::Url;

/// Application configuration, loaded from `homedash.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub transport: String,
    pub channel_path: String,
    pub poll_interval_ms: u64,
    pub max_pending_commands: usize,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            transport: "http".to_string(),
            channel_path: "/ws".to_string(),
            poll_interval_ms: 1000,
            max_pending_commands: 32,
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration with the chain: `./homedash.toml` -> `~/homedash.toml` -> defaults,
    /// then apply `HOMEDASH_URL` / `HOMEDASH_TRANSPORT` overrides from the environment.
    pub fn load() -> Self {
        let mut cfg = Self::load_file();
        cfg.apply_env();
        cfg
    }

    fn load_file() -> Self {
        for path in &Self::config_paths() {
            if let Ok(contents) = fs::read_to_string(path) {
                match toml::from_str::<AppConfig>(&contents) {
                    Ok(cfg) => return cfg,
                    Err(e) => {
                        eprintln!("Warning: failed to parse {}: {}", path.display(), e);
                    }
                }
            }
        }
        Self::default()
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("HOMEDASH_URL") {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        if let Ok(mode) = std::env::var("HOMEDASH_TRANSPORT") {
            if !mode.trim().is_empty() {
                self.transport = mode.trim().to_string();
            }
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("homedash.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("homedash.toml"));
        }
        paths
    }

    /// Build the absolute URL of an HTTP endpoint such as `/ask/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Derive the push-channel URL from `base_url`: `http` becomes `ws`,
    /// `https` becomes `wss`, and the path is replaced by `channel_path`.
    pub fn channel_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base_url '{}'", self.base_url))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(anyhow!("Unsupported base_url scheme '{}'", other)),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("Cannot switch '{}' to {}", self.base_url, scheme))?;
        url.set_path(&self.channel_path);
        url.set_query(None);
        Ok(url.to_string())
    }
}

/// How commands and status travel between the dashboard and the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportMode {
    /// `POST /ask/` per command plus a fixed-interval `GET /status/` poll.
    Http,
    /// One persistent WebSocket carrying commands, replies and status pushes.
    Channel,
}

impl TransportMode {
    /// Parse the transport string from config into a `TransportMode`.
    pub fn from_config(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" | "poll" | "polling" => Ok(Self::Http),
            "channel" | "ws" | "websocket" => Ok(Self::Channel),
            other => Err(anyhow!(
                "Unknown transport '{}'. Supported: http, channel",
                other
            )),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Http => "HTTP polling",
            Self::Channel => "WebSocket channel",
        }
    }
}
