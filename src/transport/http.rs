use reqwest::header::{HeaderValue, ACCEPT};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::{CommandSink, Delivery, TransportError};
use crate::dashboard::Event;
use crate::utils::preview;

#[derive(Serialize)]
struct AskRequest<'a> {
    text: &'a str,
}

/// `POST /ask/` with `{"text": ...}` and return the decoded JSON body.
pub async fn ask(
    client: &reqwest::Client,
    url: &str,
    text: &str,
) -> Result<Value, TransportError> {
    let resp = client
        .post(url)
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .json(&AskRequest { text })
        .send()
        .await?;
    read_json(resp).await
}

/// `GET /status/` and return the decoded JSON body.
pub async fn fetch_status(client: &reqwest::Client, url: &str) -> Result<Value, TransportError> {
    let resp = client
        .get(url)
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .send()
        .await?;
    read_json(resp).await
}

async fn read_json(resp: reqwest::Response) -> Result<Value, TransportError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: preview(&body, 200),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Sends each command as its own `/ask/` request. The reply, or the failure,
/// comes back to the dashboard as an event.
pub struct HttpSink {
    client: reqwest::Client,
    ask_url: String,
    events: UnboundedSender<Event>,
}

impl HttpSink {
    pub fn new(client: reqwest::Client, ask_url: String, events: UnboundedSender<Event>) -> Self {
        Self {
            client,
            ask_url,
            events,
        }
    }
}

impl CommandSink for HttpSink {
    fn transmit(&mut self, text: &str) -> Result<Delivery, TransportError> {
        let client = self.client.clone();
        let url = self.ask_url.clone();
        let events = self.events.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            let event = match ask(&client, &url, &text).await {
                Ok(payload) => Event::Reply(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "command request failed");
                    Event::CommandFailed(e.to_string())
                }
            };
            // The dashboard may already be gone during shutdown.
            let _ = events.send(event);
        });

        Ok(Delivery::Sent)
    }
}
