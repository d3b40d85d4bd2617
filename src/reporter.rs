//! Reporting surface (SPEC_FULL §4.12). The Orchestrator and Profit
//! Ledger only ever depend on this trait, never on the Control-Link
//! directly, so the 30-minute profit snapshot and the "nothing bought for
//! 1 hour" watchdog are testable without a socket.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub enum ReportEvent {
    SnipeSuccess { item_name: String, price: u64, elapsed_ms: u64 },
    SnipePotatoed,
    BuyLatency { elapsed_ms: u64 },
    ProfitSnapshot { trade_count: u64, total_profit: f64, profit_per_hour: f64 },
    ClientError { message: String },
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, event: ReportEvent);
}

/// Forwards every report over the Control-Link's outbound `report` message
/// type (spec §6). Kept separate from `ControlLinkClient` itself so the
/// Orchestrator only ever depends on the `Reporter` trait.
pub struct ControlLinkReporter {
    client: std::sync::Arc<crate::control_link::ControlLinkClient>,
}

impl ControlLinkReporter {
    pub fn new(client: std::sync::Arc<crate::control_link::ControlLinkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Reporter for ControlLinkReporter {
    async fn report(&self, event: ReportEvent) {
        let payload = serde_json::json!({ "event": format!("{event:?}") });
        self.client.send(crate::control_link::OutboundEvent::Report(payload));
    }
}

/// In-memory recorder used by tests (spec §4.12 "in tests by an in-memory
/// recorder").
#[derive(Default)]
pub struct RecordingReporter {
    pub events: parking_lot::Mutex<Vec<ReportEvent>>,
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, event: ReportEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_reporter_keeps_every_event() {
        let reporter = RecordingReporter::default();
        reporter.report(ReportEvent::SnipePotatoed).await;
        reporter
            .report(ReportEvent::SnipeSuccess { item_name: "Sword".into(), price: 1000, elapsed_ms: 12 })
            .await;
        assert_eq!(reporter.events.lock().len(), 2);
    }
}
