use anyhow::Result;
use dotenvy::dotenv;

pub mod config;
pub mod dashboard;
pub mod interface;
pub mod logger;
pub mod model;
pub mod payload;
pub mod transport;
pub mod ui;
pub mod utils;

/// Run the application: load `.env`, load config, start logging, and run the
/// dashboard until the user quits.
pub async fn run() -> Result<()> {
    // Load environment overrides (HOMEDASH_URL, HOMEDASH_TRANSPORT, RUST_LOG)
    dotenv().ok();

    let config = config::AppConfig::load();
    let log_path = logger::init(&config.log_dir)?;
    tracing::info!(log = %log_path.display(), base_url = %config.base_url, "session started");

    interface::start(&config).await
}

// Re-exports for library consumers: common useful types
pub use config::{AppConfig, TransportMode};
pub use dashboard::{Dashboard, Event};
pub use model::{ConnectionState, DeviceStatus, Message, Role};
pub use payload::{ChannelFrame, ServerReply, StatusUpdate};
pub use ui::{Indicator, StatusBoard, Transcript, UiState};
