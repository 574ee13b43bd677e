//! Backend transports.
//!
//! The HTTP variant sends one `POST /ask/` per command and polls
//! `GET /status/` on a timer. The channel variant keeps one WebSocket open for
//! both directions. Either way, results come back to the dashboard as
//! [`crate::dashboard::Event`]s; only the outgoing half is seen directly, as a
//! [`CommandSink`].

pub mod channel;
pub mod http;
pub mod poller;

use thiserror::Error;

use crate::model::ConnectionState;

pub use channel::{ChannelConnection, ChannelEvent, ChannelSink};
pub use http::HttpSink;
pub use poller::{PollSnapshot, StatusPoller};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid JSON from server: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("channel error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("not connected")]
    NotConnected,
    #[error("{0} commands are already waiting for the connection")]
    QueueFull(usize),
    #[error("connection task has stopped")]
    ChannelGone,
}

/// What happened to a command handed to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the network.
    Sent,
    /// Held until the channel opens.
    Queued,
}

/// Side effects of a connection state change on the outgoing queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub flushed: usize,
    pub dropped: usize,
}

/// Outgoing half of a transport.
pub trait CommandSink: Send {
    /// Hand `text` to the backend. Must not block; replies arrive later as
    /// events.
    fn transmit(&mut self, text: &str) -> Result<Delivery, TransportError>;

    /// Current connection state, for transports that have one.
    fn state(&self) -> Option<ConnectionState> {
        None
    }

    /// Record a connection state change reported by the connection task.
    fn set_state(&mut self, _state: ConnectionState) -> Transition {
        Transition::default()
    }
}
