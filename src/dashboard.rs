//! The dashboard client: turns user input and transport events into
//! transcript entries and status-board updates.
//!
//! A [`Dashboard`] owns its [`UiState`] and the outgoing half of the active
//! transport. It is driven by one event loop calling [`Dashboard::handle`], so
//! UI state is never touched from two places at once.

use serde_json::Value;

use crate::logger::SessionMetrics;
use crate::model::{ConnectionState, Message};
use crate::payload::{ChannelFrame, ServerReply, StatusUpdate};
use crate::transport::{ChannelEvent, CommandSink, Delivery};
use crate::ui::UiState;
use crate::utils::preview;

/// Everything that can change what the dashboard shows.
#[derive(Debug)]
pub enum Event {
    /// A line typed by the user.
    Input(String),
    /// Decoded JSON body of an `/ask/` response.
    Reply(Value),
    /// An `/ask/` request failed before a reply could be decoded.
    CommandFailed(String),
    /// Decoded JSON body of a `/status/` poll.
    Status(Value),
    Channel(ChannelEvent),
}

pub struct Dashboard {
    ui: UiState,
    sink: Box<dyn CommandSink>,
    metrics: SessionMetrics,
}

impl Dashboard {
    pub fn new(sink: Box<dyn CommandSink>) -> Self {
        Self {
            ui: UiState::new(),
            sink,
            metrics: SessionMetrics::new(),
        }
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UiState {
        &mut self.ui
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// `None` for transports without a persistent connection.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.sink.state()
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Input(line) => {
                self.ui.input = line;
                self.submit_input();
            }
            Event::Reply(payload) => self.on_transport_reply(&payload),
            Event::CommandFailed(error) => self.on_command_failed(&error),
            Event::Status(payload) => self.on_status_payload(&payload),
            Event::Channel(event) => self.on_channel_event(event),
        }
    }

    /// Submit whatever is in the input draft.
    pub fn submit_input(&mut self) {
        let text = self.ui.input.clone();
        self.submit_command(&text);
    }

    /// Record a user command and hand it to the transport. Blank input is
    /// ignored without a trace.
    pub fn submit_command(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        self.ui.push(Message::user(text));
        self.ui.input.clear();

        match self.sink.transmit(text) {
            Ok(Delivery::Sent) => {
                self.metrics.commands_sent += 1;
                tracing::debug!(command = %text, "command sent");
            }
            Ok(Delivery::Queued) => {
                tracing::debug!(command = %text, "command queued until the channel opens");
            }
            Err(e) => {
                self.metrics.command_errors += 1;
                tracing::warn!(command = %text, error = %e, "command not sent");
                self.ui.push(Message::system(format!("Command not sent: {e}")));
            }
        }
    }

    pub fn on_transport_reply(&mut self, payload: &Value) {
        let reply = ServerReply::from_value(payload);
        if reply.is_empty() {
            self.metrics.ignored_payloads += 1;
            tracing::debug!(payload = %preview(&payload.to_string(), 200), "reply without text");
            return;
        }
        self.apply_reply(reply);
    }

    fn apply_reply(&mut self, reply: ServerReply) {
        match (reply.text, reply.error) {
            (Some(text), _) => {
                self.metrics.replies_received += 1;
                self.ui.push(Message::ai(text));
                if !reply.tools_called.is_empty() {
                    self.ui.push(Message::system(format!(
                        "Tools called: {}",
                        reply.tools_called.join(", ")
                    )));
                }
            }
            (None, Some(error)) => {
                self.metrics.command_errors += 1;
                self.ui.push(Message::system(format!("Error: {error}")));
            }
            (None, None) => {}
        }
    }

    pub fn on_command_failed(&mut self, error: &str) {
        self.metrics.command_errors += 1;
        self.ui.push(Message::system(format!("Error: {error}")));
    }

    pub fn on_status_payload(&mut self, payload: &Value) {
        match StatusUpdate::from_value(payload) {
            Some(update) => self.apply_status(&update),
            None => {
                self.metrics.ignored_payloads += 1;
                tracing::debug!(payload = %preview(&payload.to_string(), 200), "unrecognised status payload");
            }
        }
    }

    fn apply_status(&mut self, update: &StatusUpdate) {
        self.metrics.status_updates += 1;
        if self.ui.apply_status(update) {
            tracing::debug!("status board changed");
        }
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                self.ui.push(Message::system("Connection established"));
                let transition = self.sink.set_state(ConnectionState::Open);
                self.metrics.commands_sent += transition.flushed;
                if transition.dropped > 0 {
                    self.metrics.command_errors += transition.dropped;
                    self.ui.push(Message::system(format!(
                        "{} queued command(s) were not sent",
                        transition.dropped
                    )));
                }
            }
            ChannelEvent::Frame(raw) => self.on_channel_frame(&raw),
            ChannelEvent::Closed(reason) => {
                let transition = self.sink.set_state(ConnectionState::Closed);
                let notice = match reason {
                    Some(reason) => format!("Connection closed: {reason}"),
                    None => "Connection closed".to_string(),
                };
                self.ui.push(Message::system(notice));
                if transition.dropped > 0 {
                    self.metrics.command_errors += transition.dropped;
                    self.ui.push(Message::system(format!(
                        "{} queued command(s) were not sent",
                        transition.dropped
                    )));
                }
            }
        }
    }

    fn on_channel_frame(&mut self, raw: &str) {
        let Some(frame) = ChannelFrame::parse(raw) else {
            self.metrics.ignored_payloads += 1;
            tracing::warn!(frame = %preview(raw, 200), "dropping non-JSON channel frame");
            return;
        };
        if frame.reply.is_empty() && frame.status.is_none() {
            self.metrics.ignored_payloads += 1;
            return;
        }
        self.apply_reply(frame.reply);
        if let Some(update) = frame.status {
            self.apply_status(&update);
        }
    }
}
