// Integration tests for the HTTP variant: /ask/ commands and /status/ polling
// against a mock backend.

use std::time::Duration;

use home_dashboard::transport::{HttpSink, StatusPoller};
use home_dashboard::{AppConfig, Dashboard, Event, Indicator, Role};
use mockito::Matcher;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};

async fn next_event(rx: &mut UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within 5s")
        .expect("event channel open")
}

fn transcript(dashboard: &Dashboard) -> Vec<(Role, String)> {
    dashboard
        .ui()
        .transcript
        .iter()
        .map(|m| (m.role, m.text.clone()))
        .collect()
}

fn config_for(server: &mockito::Server) -> AppConfig {
    AppConfig {
        base_url: server.url(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_command_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/ask/")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"text": "I'm cold"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "Success! Thermostat set to 25°C.", "tools_called": ["set_temp"]}"#)
        .create_async()
        .await;

    let config = config_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = HttpSink::new(reqwest::Client::new(), config.endpoint("/ask/"), tx);
    let mut dashboard = Dashboard::new(Box::new(sink));

    dashboard.handle(Event::Input("I'm cold".to_string()));
    // The user message is on screen before any reply arrives
    assert_eq!(transcript(&dashboard), vec![(Role::User, "I'm cold".to_string())]);
    assert!(dashboard.ui().input.is_empty());

    let event = next_event(&mut rx).await;
    dashboard.handle(event);

    assert_eq!(
        transcript(&dashboard),
        vec![
            (Role::User, "I'm cold".to_string()),
            (Role::Ai, "Success! Thermostat set to 25°C.".to_string()),
            (Role::System, "Tools called: set_temp".to_string()),
        ]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_blank_command_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/ask/")
        .expect(0)
        .create_async()
        .await;

    let config = config_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = HttpSink::new(reqwest::Client::new(), config.endpoint("/ask/"), tx);
    let mut dashboard = Dashboard::new(Box::new(sink));

    dashboard.handle(Event::Input("   ".to_string()));
    assert!(dashboard.ui().transcript.is_empty());

    // Give a stray request time to show up before checking
    let stray = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(stray.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_command_becomes_system_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/ask/")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let config = config_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = HttpSink::new(reqwest::Client::new(), config.endpoint("/ask/"), tx);
    let mut dashboard = Dashboard::new(Box::new(sink));

    dashboard.submit_command("lights on");
    let event = next_event(&mut rx).await;
    dashboard.handle(event);

    let t = transcript(&dashboard);
    assert_eq!(t.len(), 2);
    assert_eq!(t[1].0, Role::System);
    assert!(t[1].1.starts_with("Error:"));
    assert!(t[1].1.contains("500"));
    assert_eq!(dashboard.metrics().command_errors, 1);
}

#[tokio::test]
async fn test_poller_feeds_status_board() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/status/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"light_on": true, "temperature": 21, "brightness": 70}"#)
        .create_async()
        .await;

    let config = config_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = HttpSink::new(reqwest::Client::new(), config.endpoint("/ask/"), tx.clone());
    let mut dashboard = Dashboard::new(Box::new(sink));
    let poller = StatusPoller::start(
        reqwest::Client::new(),
        config.endpoint("/status/"),
        Duration::from_millis(50),
        tx,
    );

    // Two ticks: the board must look the same after the second
    for _ in 0..2 {
        let event = next_event(&mut rx).await;
        dashboard.handle(event);
        let board = &dashboard.ui().board;
        assert_eq!(board.get(Indicator::Light), Some("ON"));
        assert_eq!(board.get(Indicator::Temperature), Some("21"));
        assert_eq!(board.get(Indicator::Brightness), Some("70"));
    }
    assert!(dashboard.ui().transcript.is_empty());
    assert!(poller.stats().successes >= 2);

    poller.stop().await;
}

#[tokio::test]
async fn test_poller_survives_backend_outage() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/status/")
        .with_status(502)
        .create_async()
        .await;

    let config = config_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let poller = StatusPoller::start(
        reqwest::Client::new(),
        config.endpoint("/status/"),
        Duration::from_millis(20),
        tx,
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while poller.stats().failures < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(poller.stats().failures >= 2);
    assert!(poller.is_running());
    // Failed polls are logged, never delivered
    assert!(rx.try_recv().is_err());

    poller.stop().await;
}
