//! Control-Link Client (spec §2.3, §4.11). A persistent framed-message
//! WebSocket connection to the external recommendation service, with a
//! bounded reconnect loop (spec Q4: iterative, never recursive) and an
//! at-least-once outbound send queue.

pub mod envelope;
pub mod schema;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tprintln;
pub use envelope::{Envelope, InboundMessage, OutboundEvent};

/// Fixed reconnect delay (spec §4.11, §7 "Transport loss").
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Outbound send queue capacity; oldest entry is dropped when full (spec §4.11).
const OUTBOUND_QUEUE_CAP: usize = 256;
/// `getbazaarflips` is re-requested at this cadence while connected (spec §4.11).
const BAZAAR_FLIPS_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Connection parameters for the session URL (spec §6: `<base>?player=
/// <username>&version=<client_version>&SId=<session_id>`).
#[derive(Debug, Clone)]
pub struct ControlLinkConfig {
    pub base_url: String,
    pub player: String,
    pub client_version: String,
    pub session_id: String,
}

impl ControlLinkConfig {
    fn connect_url(&self) -> String {
        format!(
            "{}?player={}&version={}&SId={}",
            self.base_url, self.player, self.client_version, self.session_id
        )
    }
}

/// The Control-Link Client. Cheap to clone via `Arc`; `send` may be called
/// from any task, `run` drives the single persistent connection.
pub struct ControlLinkClient {
    config: ControlLinkConfig,
    outbound: Mutex<VecDeque<Envelope>>,
    notify: Notify,
}

impl ControlLinkClient {
    pub fn new(config: ControlLinkConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            outbound: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    /// Queue an outbound event for delivery (spec §5 "Control-Link send
    /// path"; best-effort, never exactly-once). Drops the oldest queued
    /// envelope if the queue is at capacity.
    pub fn send(&self, event: OutboundEvent) {
        let envelope = event.into_envelope();
        let mut queue = self.outbound.lock();
        if queue.len() >= OUTBOUND_QUEUE_CAP {
            queue.pop_front();
        }
        queue.push_back(envelope);
        drop(queue);
        self.notify.notify_one();
    }

    fn pop_outbound(&self) -> Option<Envelope> {
        self.outbound.lock().pop_front()
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.outbound.lock().len()
    }

    /// Decode a single text frame and, if it parses, forward it downstream.
    /// Parse failures are logged and dropped (spec §7 "Schema rejection").
    /// One bad message never brings the connection down.
    async fn dispatch(&self, text: &str, inbound_tx: &mpsc::Sender<InboundMessage>) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                warn!("control-link: malformed envelope: {e}");
                return;
            }
        };
        match schema::decode(&envelope, std::time::Instant::now(), now_ms()) {
            Ok(message) => {
                let _ = inbound_tx.send(message).await;
            }
            Err(e) => warn!("control-link: rejected {}: {e}", envelope.type_),
        }
    }

    /// Bounded-iterative reconnect loop (spec Q4). Each failed attempt waits
    /// a fixed delay and tries again; there is no recursion and no attempt
    /// cap, since the client is meant to run unattended indefinitely.
    pub async fn run(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.connect_once(&inbound_tx, &mut shutdown).await {
                Ok(()) => {
                    if *shutdown.borrow() {
                        return;
                    }
                    attempt = 0;
                }
                Err(e) => {
                    attempt += 1;
                    warn!("control-link disconnected (attempt {attempt}): {e}");
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn connect_once(
        &self,
        inbound_tx: &mpsc::Sender<InboundMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> OrchestratorResult<()> {
        let url = self.config.connect_url();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|_| OrchestratorError::TransportLost)?;
        tprintln!("[CONTROL-LINK] connected as {}", self.config.player);

        let (mut write, mut read) = ws_stream.split();

        // Flush anything queued while disconnected, then kick off the
        // connect-time getbazaarflips request (spec §4.11).
        while let Some(envelope) = self.pop_outbound() {
            let text = serde_json::to_string(&envelope).unwrap_or_default();
            if write.send(Message::Text(text)).await.is_err() {
                return Err(OrchestratorError::TransportLost);
            }
        }
        self.send(OutboundEvent::GetBazaarFlips);

        let mut bazaar_ticker = tokio::time::interval(BAZAAR_FLIPS_INTERVAL);
        bazaar_ticker.tick().await; // first tick fires immediately; already handled above

        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    while let Some(envelope) = self.pop_outbound() {
                        let text = serde_json::to_string(&envelope).unwrap_or_default();
                        if write.send(Message::Text(text)).await.is_err() {
                            return Err(OrchestratorError::TransportLost);
                        }
                    }
                }
                _ = bazaar_ticker.tick() => {
                    self.send(OutboundEvent::GetBazaarFlips);
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch(&text, inbound_tx).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return Err(OrchestratorError::TransportLost),
                        Some(Err(_)) => return Err(OrchestratorError::TransportLost),
                        Some(Ok(_)) => {} // binary/ping/pong frames carry no domain meaning here
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn test_client() -> Arc<ControlLinkClient> {
        ControlLinkClient::new(ControlLinkConfig {
            base_url: "ws://127.0.0.1:0".to_string(),
            player: "Tester".to_string(),
            client_version: "1.0.0".to_string(),
            session_id: "abc123".to_string(),
        })
    }

    #[test]
    fn connect_url_matches_spec_shape() {
        let config = ControlLinkConfig {
            base_url: "wss://example.invalid/link".to_string(),
            player: "Tester".to_string(),
            client_version: "1.2.3".to_string(),
            session_id: "sess-1".to_string(),
        };
        assert_eq!(
            config.connect_url(),
            "wss://example.invalid/link?player=Tester&version=1.2.3&SId=sess-1"
        );
    }

    #[test]
    fn outbound_queue_drops_oldest_when_full() {
        let client = test_client();
        for i in 0..(OUTBOUND_QUEUE_CAP + 10) {
            client.send(OutboundEvent::ClientError(format!("err-{i}")));
        }
        assert_eq!(client.queue_len(), OUTBOUND_QUEUE_CAP);
        let first = client.pop_outbound().unwrap();
        // the oldest 10 entries (err-0..err-9) should have been evicted
        assert!(first.data.contains("err-10"));
    }

    #[tokio::test]
    async fn round_trips_against_a_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // First message in must be the connect-time getbazaarflips kick.
            let first = ws.next().await.unwrap().unwrap();
            let text = first.into_text().unwrap();
            let env: Envelope = serde_json::from_str(&text).unwrap();
            assert_eq!(env.type_, "getbazaarflips");

            // Push a flip down to the client.
            let flip = Envelope::new(
                "flip",
                serde_json::json!({
                    "id": "A1", "itemName": "Test Sword", "startingBid": 1000,
                    "target": 5000, "finder": "USER", "purchaseAt": 0
                }),
            );
            ws.send(Message::Text(serde_json::to_string(&flip).unwrap()))
                .await
                .unwrap();
            ws.close(None).await.ok();
        });

        let config = ControlLinkConfig {
            base_url: format!("ws://{addr}"),
            player: "Tester".to_string(),
            client_version: "1.0.0".to_string(),
            session_id: "sess".to_string(),
        };
        let client = ControlLinkClient::new(config);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let run_handle = tokio::spawn(client.clone().run(inbound_tx, shutdown_rx));

        let message = tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv())
            .await
            .expect("timed out waiting for inbound flip")
            .expect("channel closed");
        match message {
            InboundMessage::Flip(snipe) => assert_eq!(snipe.auction_id, "A1"),
            other => panic!("unexpected message: {other:?}"),
        }

        server.await.unwrap();
        run_handle.abort();
    }
}
