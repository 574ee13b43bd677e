use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::http::fetch_status;
use crate::dashboard::Event;

const MIN_PERIOD: Duration = Duration::from_millis(10);
/// Requests allowed to be outstanding at once. Ticks past this are counted as
/// skipped, which bounds open sockets against a backend that never answers.
pub const MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Default)]
struct PollStats {
    ticks: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU64,
    skipped: AtomicU64,
}

impl PollStats {
    fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Point-in-time copy of the poller counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    pub ticks: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    /// Ticks that sent nothing because [`MAX_IN_FLIGHT`] requests were pending.
    pub skipped: u64,
}

/// Fixed-interval `GET /status/` loop.
///
/// The first request goes out immediately, then one per period. Each tick runs
/// in its own task, so a slow or hung request never delays the next one. At
/// most [`MAX_IN_FLIGHT`] requests are outstanding; a tick that finds them all
/// still pending sends nothing. A failed tick is logged and counted; the loop
/// keeps going until
/// [`StatusPoller::stop`] is called or the dashboard drops its event receiver.
pub struct StatusPoller {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    stats: Arc<PollStats>,
}

impl StatusPoller {
    pub fn start(
        client: reqwest::Client,
        url: String,
        period: Duration,
        events: UnboundedSender<Event>,
    ) -> Self {
        let stats = Arc::new(PollStats::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(poll_loop(
            client,
            url,
            period.max(MIN_PERIOD),
            events,
            stats.clone(),
            shutdown_rx,
        ));
        Self {
            shutdown: Some(shutdown_tx),
            handle,
            stats,
        }
    }

    pub fn stats(&self) -> PollSnapshot {
        PollSnapshot {
            ticks: self.stats.ticks.load(Ordering::Relaxed),
            successes: self.stats.successes.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            consecutive_failures: self.stats.consecutive_failures.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the timer and abandon any requests still in flight.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(error = %e, "status poller ended abnormally");
        }
    }
}

async fn poll_loop(
    client: reqwest::Client,
    url: String,
    period: Duration,
    events: UnboundedSender<Event>,
    stats: Arc<PollStats>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    tracing::info!(%url, period_ms = period.as_millis() as u64, "status poller started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                if events.is_closed() {
                    break;
                }
                stats.ticks.fetch_add(1, Ordering::Relaxed);
                if in_flight.len() >= MAX_IN_FLIGHT {
                    let skipped = stats.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        pending = in_flight.len(),
                        skipped,
                        "status requests still pending, skipping tick"
                    );
                    continue;
                }
                in_flight.spawn(poll_once(
                    client.clone(),
                    url.clone(),
                    events.clone(),
                    stats.clone(),
                ));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    in_flight.abort_all();
    tracing::info!("status poller stopped");
}

async fn poll_once(
    client: reqwest::Client,
    url: String,
    events: UnboundedSender<Event>,
    stats: Arc<PollStats>,
) {
    match fetch_status(&client, &url).await {
        Ok(payload) => {
            stats.record_success();
            let _ = events.send(Event::Status(payload));
        }
        Err(e) => {
            let consecutive = stats.record_failure();
            tracing::warn!(error = %e, consecutive, "status poll failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_first_tick_is_immediate() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/status/")
            .with_status(200)
            .with_body(r#"{"light_on": true, "temperature": 21}"#)
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        // A long period: only the immediate tick can produce an event in time.
        let poller = StatusPoller::start(
            reqwest::Client::new(),
            format!("{}/status/", server.url()),
            Duration::from_secs(60),
            tx,
        );

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("status event in time");
        assert!(matches!(event, Some(Event::Status(ref v)) if v["temperature"] == 21));
        assert_eq!(poller.stats().successes, 1);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_timer() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/status/")
            .with_status(500)
            .create_async()
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::start(
            reqwest::Client::new(),
            format!("{}/status/", server.url()),
            Duration::from_millis(20),
            tx,
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while poller.stats().failures < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = poller.stats();
        assert!(stats.failures >= 3);
        assert_eq!(stats.successes, 0);
        assert!(stats.consecutive_failures >= 3);
        assert!(poller.is_running());
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let poller = StatusPoller::start(
            reqwest::Client::new(),
            "http://127.0.0.1:9/status/".to_string(),
            Duration::from_millis(10),
            tx,
        );
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while poller.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!poller.is_running());
        assert_eq!(poller.stats().ticks, 0);
    }

    #[tokio::test]
    async fn test_hung_backend_does_not_block_ticks() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let backend = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::start(
            reqwest::Client::new(),
            format!("http://{addr}/status/"),
            Duration::from_millis(10),
            tx,
        );

        let wanted = MAX_IN_FLIGHT as u64 + 4;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while poller.stats().ticks < wanted && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = poller.stats();
        assert!(stats.ticks >= wanted, "ticks stalled at {}", stats.ticks);
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.failures, 0);
        assert!(stats.skipped >= 1);
        assert!(stats.ticks.saturating_sub(stats.skipped) <= MAX_IN_FLIGHT as u64);
        assert!(rx.try_recv().is_err());
        assert!(poller.is_running());

        tokio::time::timeout(Duration::from_secs(1), poller.stop())
            .await
            .expect("stop returns while requests hang");
        backend.abort();
    }

    #[test]
    fn test_record_failure_counts_consecutive() {
        let stats = PollStats::default();
        assert_eq!(stats.record_failure(), 1);
        assert_eq!(stats.record_failure(), 2);
        stats.record_success();
        assert_eq!(stats.consecutive_failures.load(Ordering::Relaxed), 0);
        assert_eq!(stats.record_failure(), 1);
        assert_eq!(stats.failures.load(Ordering::Relaxed), 3);
    }
}
