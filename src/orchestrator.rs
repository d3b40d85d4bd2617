//! Runtime wiring: the `Ctx` driven by the Command Queue, the Event
//! Router's `OrchestratorHandle`, and the entry points inbound Control-Link
//! messages are routed to (spec §2, §5).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::bot::{BotState, BotStateValue};
use crate::config::Config;
use crate::control_link::envelope::{CreateAuctionSpec, TradeSpec};
use crate::control_link::{ControlLinkClient, InboundMessage};
use crate::events::OrchestratorHandle;
use crate::game_io::GameIo;
use crate::ledger::Ledger;
use crate::price_client::PriceClient;
use crate::protocols::{
    bazaar_claim_cancel, bazaar_place_order, claim_sold, inventory_recovery, sell_inventory, snipe,
    startup_reconcile, thin_routes,
};
use crate::queue::{CommandQueue, HasBotState, Priority};
use crate::reporter::{ReportEvent, Reporter};
use crate::session::SessionStore;
use crate::types::AuctionSnipe;

/// Everything the Queue's executors and the Event Router's handle need
/// shared access to. Cheap to clone (every field is an `Arc`) since the
/// Queue's `run_loop` clones `Ctx` once per popped item.
#[derive(Clone)]
pub struct Runtime {
    pub io: Arc<dyn GameIo>,
    pub control_link: Arc<ControlLinkClient>,
    pub session: Arc<SessionStore>,
    pub ledger: Arc<Ledger>,
    pub reporter: Arc<dyn Reporter>,
    pub price_client: Arc<dyn PriceClient>,
    pub profile_switch: Arc<dyn thin_routes::ProfileSwitch>,
    pub bot_state: Arc<BotState>,
    pub queue: Arc<CommandQueue<Runtime>>,
    pub config: Arc<Config>,
    pub skip_policy: Arc<snipe::SkipPolicyConfig>,
    /// Set when an AH Snipe begins driving a Confirm Purchase window;
    /// read back by the escrow and purchase-succeeded chat handlers to
    /// report buy latency (spec §4.7).
    pub purchase_clock: Arc<Mutex<Option<Instant>>>,
}

impl HasBotState for Runtime {
    fn bot_state(&self) -> &BotState {
        &self.bot_state
    }
}

impl OrchestratorHandle for Runtime {
    fn enqueue_claim_sold_high(&self, reason: &str) {
        let reason = reason.to_string();
        let io = self.io.clone();
        self.queue.enqueue(
            format!("claim-sold ({reason})"),
            Priority::High,
            true,
            Arc::new(move |_ctx: Runtime, _preempt| {
                let io = io.clone();
                Box::pin(async move {
                    claim_sold::run_claim_sold(&io).await?;
                    Ok(())
                })
            }),
        );
    }

    fn enqueue_inventory_recovery(&self) {
        self.queue.enqueue(
            "inventory-recovery",
            Priority::Critical,
            false,
            Arc::new(|ctx: Runtime, _preempt| {
                Box::pin(async move {
                    inventory_recovery::run_inventory_recovery(&ctx.io).await?;
                    Ok(())
                })
            }),
        );
    }

    fn enqueue_order_count_refresh(&self) {
        let io = self.io.clone();
        self.queue.enqueue(
            "order-count-refresh",
            Priority::Low,
            true,
            Arc::new(move |_ctx: Runtime, _preempt| {
                let io = io.clone();
                Box::pin(async move {
                    thin_routes::run_order_count_refresh(&io).await?;
                    Ok(())
                })
            }),
        );
    }

    fn on_snipe_success(&self, item_name: &str, price: u64) {
        let reporter = self.reporter.clone();
        let item_name = item_name.to_string();
        let elapsed_ms = self.purchase_clock.lock().map(|t| t.elapsed().as_millis() as u64).unwrap_or(0);
        self.enqueue_claim_sold_high("snipe purchase succeeded");
        tokio::spawn(async move {
            reporter.report(ReportEvent::SnipeSuccess { item_name, price, elapsed_ms }).await;
        });
    }

    fn on_snipe_abort(&self) {
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            reporter.report(ReportEvent::SnipePotatoed).await;
        });
    }

    fn on_escrow_reported(&self) {
        let elapsed_ms = self.purchase_clock.lock().map(|t| t.elapsed().as_millis() as u64).unwrap_or(0);
        let io = self.io.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            reporter.report(ReportEvent::BuyLatency { elapsed_ms }).await;
            io.close_container().await;
        });
    }
}

impl Runtime {
    /// Route one decoded inbound Control-Link message (spec §6 table). Drops
    /// recommendation-shaped messages while Startup/GracePeriod holds the
    /// token (spec I4); everything else is still accepted so the envelope is
    /// never rejected outright (SPEC_FULL §11.3).
    pub fn route_inbound(&self, message: InboundMessage) {
        let accepting_recommendations =
            !matches!(self.bot_state.get(), BotStateValue::Startup | BotStateValue::GracePeriod);

        match message {
            InboundMessage::Flip(snipe) => {
                if accepting_recommendations {
                    self.enqueue_snipe(snipe);
                } else {
                    info!("dropping flip recommendation: bot is in startup/grace period");
                }
            }
            InboundMessage::BazaarFlip(rec) | InboundMessage::PlaceOrder(rec) | InboundMessage::BzRecommend(rec) => {
                if accepting_recommendations {
                    self.enqueue_place_order(rec);
                } else {
                    info!("dropping bazaar recommendation: bot is in startup/grace period");
                }
            }
            InboundMessage::GetBazaarFlips(_) => {}
            InboundMessage::SwapProfile(payload) => {
                let switcher = self.profile_switch.clone();
                tokio::spawn(async move {
                    thin_routes::run_swap_profile(switcher.as_ref(), payload).await;
                });
            }
            InboundMessage::CreateAuction(spec) => self.enqueue_create_auction(spec),
            InboundMessage::Trade(spec) => self.enqueue_trade(spec),
            InboundMessage::TradeResponse => self.enqueue_trade_response(),
            InboundMessage::ChatMessage(_) | InboundMessage::WriteToChat(_) => {}
            InboundMessage::GetInventory => {}
            InboundMessage::Execute(cmd) => {
                let io = self.io.clone();
                tokio::spawn(async move {
                    io.send_chat(&cmd).await;
                });
            }
            InboundMessage::PrivacySettings(_) => {}
        }
    }

    fn enqueue_snipe(&self, snipe: AuctionSnipe) {
        let io = self.io.clone();
        let skip_policy = self.skip_policy.clone();
        let purchase_clock = self.purchase_clock.clone();
        self.queue.enqueue(
            format!("snipe {}", snipe.item_name),
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, preempt| {
                let io = io.clone();
                let skip_policy = skip_policy.clone();
                let snipe = snipe.clone();
                let purchase_clock = purchase_clock.clone();
                Box::pin(async move {
                    *purchase_clock.lock() = Some(Instant::now());
                    snipe::run_snipe(&io, &snipe, &skip_policy, preempt).await?;
                    Ok(())
                })
            }),
        );
    }

    fn enqueue_place_order(&self, rec: crate::types::BazaarRecommendation) {
        if bazaar_place_order::refuses_due_to_cooldown(&self.session) {
            info!(item = %rec.item_name, "place-order refused at entry: order cooldown active");
            return;
        }
        let io = self.io.clone();
        self.queue.enqueue(
            format!("place-order {}", rec.item_name),
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, preempt| {
                let io = io.clone();
                let rec = rec.clone();
                Box::pin(async move {
                    bazaar_place_order::run_place_order(&io, &rec, false, preempt).await?;
                    Ok(())
                })
            }),
        );
    }

    fn enqueue_create_auction(&self, spec: CreateAuctionSpec) {
        let io = self.io.clone();
        self.queue.enqueue(
            format!("create-auction {}", spec.item_name),
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, _preempt| {
                let io = io.clone();
                let spec = CreateAuctionSpec { item_name: spec.item_name.clone(), price: spec.price, bin: spec.bin };
                Box::pin(async move { thin_routes::run_create_auction(&io, &spec).await })
            }),
        );
    }

    fn enqueue_trade(&self, spec: TradeSpec) {
        let io = self.io.clone();
        self.queue.enqueue(
            format!("trade {}", spec.target),
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, _preempt| {
                let io = io.clone();
                let spec = TradeSpec { target: spec.target.clone(), slots: spec.slots.clone(), coins: spec.coins };
                Box::pin(async move { thin_routes::run_trade_step(&io, &spec).await })
            }),
        );
    }

    fn enqueue_trade_response(&self) {
        let io = self.io.clone();
        self.queue.enqueue(
            "trade-response",
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, _preempt| {
                let io = io.clone();
                Box::pin(async move { thin_routes::run_trade_response(&io).await })
            }),
        );
    }

    /// Enqueue Startup Reconcile at Critical priority, non-interruptible
    /// (spec §4.9: it must run to completion once the realm is joined).
    pub fn enqueue_startup_reconcile(&self) {
        let io = self.io.clone();
        let price_client = self.price_client.clone();
        let ledger = self.ledger.clone();
        let bot_state = self.bot_state.clone();
        let cookie_enabled = self.config.cookie_topup_enabled;
        let cookie_threshold = self.config.cookie_threshold();
        let order_price_drift = self.config.order_price_drift;
        self.queue.enqueue(
            "startup-reconcile",
            Priority::Critical,
            false,
            Arc::new(move |_ctx: Runtime, preempt| {
                let io = io.clone();
                let price_client = price_client.clone();
                let ledger = ledger.clone();
                let bot_state = bot_state.clone();
                Box::pin(async move {
                    startup_reconcile::run_startup_reconcile(
                        &io,
                        price_client.as_ref(),
                        &ledger,
                        &bot_state,
                        cookie_enabled,
                        cookie_threshold,
                        order_price_drift,
                        preempt,
                    )
                    .await;
                    Ok(())
                })
            }),
        );
    }

    pub fn enqueue_sell_inventory(&self) {
        let io = self.io.clone();
        let price_client = self.price_client.clone();
        self.queue.enqueue(
            "sell-inventory",
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, preempt| {
                let io = io.clone();
                let price_client = price_client.clone();
                Box::pin(async move {
                    sell_inventory::run_sell_inventory(&io, price_client.as_ref(), preempt).await?;
                    Ok(())
                })
            }),
        );
    }

    pub fn enqueue_claim_filled(&self) {
        let io = self.io.clone();
        self.queue.enqueue(
            "claim-filled",
            Priority::Normal,
            true,
            Arc::new(move |_ctx: Runtime, _preempt| {
                let io = io.clone();
                Box::pin(async move {
                    bazaar_claim_cancel::run_claim_filled(&io).await?;
                    Ok(())
                })
            }),
        );
    }
}

/// Periodic profit-report timer (SPEC_FULL §4.12): reports `ProfitSnapshot`
/// on `config.profit_report_interval()` until `shutdown` fires.
pub async fn run_profit_report_timer(
    ledger: Arc<Ledger>,
    reporter: Arc<dyn Reporter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = ledger.stats();
                reporter
                    .report(ReportEvent::ProfitSnapshot {
                        trade_count: stats.trade_count,
                        total_profit: stats.total_profit,
                        profit_per_hour: stats.profit_per_hour,
                    })
                    .await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Drains decoded Control-Link inbound messages and routes each one (spec
/// §5 "one Orchestrator inbox").
pub async fn run_inbound_router(runtime: Runtime, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
    while let Some(message) = inbound_rx.recv().await {
        runtime.route_inbound(message);
    }
    warn!("control-link inbound channel closed");
}
