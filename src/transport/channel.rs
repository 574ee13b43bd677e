use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{CommandSink, Delivery, Transition, TransportError};
use crate::dashboard::Event;
use crate::model::ConnectionState;

/// What the connection task reports back to the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Frame(String),
    /// The socket closed or never opened; carries the reason when known.
    Closed(Option<String>),
}

/// Outgoing half of the push channel.
///
/// Commands submitted while the socket is still connecting are held, up to
/// `max_pending`, and go out in submission order once it opens. Once closed,
/// every command is rejected.
pub struct ChannelSink {
    state: ConnectionState,
    pending: VecDeque<String>,
    max_pending: usize,
    outgoing: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(max_pending: usize, outgoing: UnboundedSender<String>) -> Self {
        Self {
            state: ConnectionState::Connecting,
            pending: VecDeque::new(),
            max_pending,
            outgoing,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn flush(&mut self) -> Transition {
        let mut transition = Transition::default();
        while let Some(text) = self.pending.pop_front() {
            if self.outgoing.send(text).is_err() {
                transition.dropped = self.pending.len() + 1;
                self.pending.clear();
                break;
            }
            transition.flushed += 1;
        }
        transition
    }
}

impl CommandSink for ChannelSink {
    fn transmit(&mut self, text: &str) -> Result<Delivery, TransportError> {
        match self.state {
            ConnectionState::Open => {
                self.outgoing
                    .send(text.to_string())
                    .map_err(|_| TransportError::ChannelGone)?;
                Ok(Delivery::Sent)
            }
            ConnectionState::Connecting => {
                if self.pending.len() >= self.max_pending {
                    return Err(TransportError::QueueFull(self.pending.len()));
                }
                self.pending.push_back(text.to_string());
                Ok(Delivery::Queued)
            }
            ConnectionState::Closed => Err(TransportError::NotConnected),
        }
    }

    fn state(&self) -> Option<ConnectionState> {
        Some(self.state)
    }

    fn set_state(&mut self, state: ConnectionState) -> Transition {
        self.state = state;
        match state {
            ConnectionState::Open => self.flush(),
            ConnectionState::Closed => {
                let dropped = self.pending.len();
                self.pending.clear();
                Transition {
                    flushed: 0,
                    dropped,
                }
            }
            ConnectionState::Connecting => Transition::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ChannelStats {
    frames_received: AtomicU64,
    commands_sent: AtomicU64,
}

/// Handle on the task that owns the WebSocket.
pub struct ChannelConnection {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    stats: Arc<ChannelStats>,
}

/// Open the push channel at `url` in a background task. The returned sink
/// starts in `Connecting`; the task reports `Opened`/`Frame`/`Closed` through
/// `events`.
pub fn connect(
    url: String,
    max_pending: usize,
    events: UnboundedSender<Event>,
) -> (ChannelSink, ChannelConnection) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let stats = Arc::new(ChannelStats::default());

    let handle = tokio::spawn(run_channel(
        url.clone(),
        outgoing_rx,
        events,
        stats.clone(),
        shutdown_rx,
    ));

    let sink = ChannelSink::new(max_pending, outgoing_tx);
    let connection = ChannelConnection {
        url,
        shutdown: Some(shutdown_tx),
        handle,
        stats,
    };
    (sink, connection)
}

impl ChannelConnection {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn frames_received(&self) -> u64 {
        self.stats.frames_received.load(Ordering::Relaxed)
    }

    pub fn commands_sent(&self) -> u64 {
        self.stats.commands_sent.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Close the socket and wait for the task to finish.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(error = %e, "channel task ended abnormally");
        }
    }
}

async fn run_channel(
    url: String,
    mut outgoing: UnboundedReceiver<String>,
    events: UnboundedSender<Event>,
    stats: Arc<ChannelStats>,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::info!(%url, "connecting push channel");

    let connected = tokio::select! {
        _ = &mut shutdown => return,
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };

    let mut socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::warn!(error = %e, "push channel failed to open");
            let _ = events.send(Event::Channel(ChannelEvent::Closed(Some(e.to_string()))));
            return;
        }
    };

    tracing::info!("push channel open");
    let _ = events.send(Event::Channel(ChannelEvent::Opened));

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = socket.close(None).await;
                break Some("closed by client".to_string());
            }
            command = outgoing.recv() => match command {
                Some(text) => {
                    if let Err(e) = socket.send(Message::Text(text.into())).await {
                        break Some(TransportError::from(e).to_string());
                    }
                    stats.commands_sent.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    let _ = socket.close(None).await;
                    break None;
                }
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    stats.frames_received.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(frame = %text.as_str(), "channel frame");
                    let _ = events.send(Event::Channel(ChannelEvent::Frame(text.as_str().to_owned())));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                }
                // Pings are answered by tungstenite; binary frames are not part of the contract.
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(TransportError::from(e).to_string()),
                None => break None,
            },
        }
    };

    tracing::info!(reason = reason.as_deref().unwrap_or("none"), "push channel closed");
    let _ = events.send(Event::Channel(ChannelEvent::Closed(reason)));
}
