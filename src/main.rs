//! Composition root: loads configuration, wires the Runtime, and spawns the
//! Control-Link client, Event Router, inbound-message router, Command
//! Queue, and profit-report timer as cooperating tasks (spec §2, §5).

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use flip_orchestrator::bot::BotState;
use flip_orchestrator::config::Config;
use flip_orchestrator::control_link::{ControlLinkClient, ControlLinkConfig};
use flip_orchestrator::events::EventRouter;
use flip_orchestrator::game_io::GameIo;
use flip_orchestrator::ledger::Ledger;
use flip_orchestrator::orchestrator::{run_inbound_router, run_profit_report_timer, Runtime};
use flip_orchestrator::price_client::HttpPriceClient;
use flip_orchestrator::protocols::snipe::SkipPolicyConfig;
use flip_orchestrator::protocols::thin_routes::NoopProfileSwitch;
use flip_orchestrator::queue::CommandQueue;
use flip_orchestrator::reporter::ControlLinkReporter;
use flip_orchestrator::session::SessionStore;
use flip_orchestrator::tprintln;

/// The raw game-protocol library (packet framing, encryption, chunk
/// loading) is an external collaborator, not part of this crate (spec §1).
/// Whatever fork of it the operator links against must produce a
/// `GameIo` impl here; there is nothing further for this crate to do.
fn connect_game_io(_config: &Config) -> Arc<dyn GameIo> {
    unimplemented!("wire the operator's game-protocol library adapter here")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load_default()?;
    config.validate()?;
    tprintln!("[STARTUP] loading config for {}", config.player);

    let io = connect_game_io(&config);
    let session_id = uuid::Uuid::new_v4().to_string();
    let control_link = ControlLinkClient::new(ControlLinkConfig {
        base_url: config.control_link_base_url.clone(),
        player: config.player.clone(),
        client_version: config.client_version.clone(),
        session_id,
    });

    let session = Arc::new(SessionStore::new());
    let ledger = Arc::new(Ledger::new());
    let reporter = Arc::new(ControlLinkReporter::new(control_link.clone()));
    let price_client = Arc::new(HttpPriceClient::new(
        format!("{}/prices", config.control_link_base_url.trim_end_matches("/link")),
        format!("{}/cookie", config.control_link_base_url.trim_end_matches("/link")),
    ));
    let bot_state = Arc::new(BotState::new());
    let queue = Arc::new(CommandQueue::new());
    let skip_policy = Arc::new(SkipPolicyConfig::default());

    let runtime = Runtime {
        io: io.clone(),
        control_link: control_link.clone(),
        session: session.clone(),
        ledger: ledger.clone(),
        reporter: reporter.clone(),
        price_client: price_client.clone(),
        profile_switch: Arc::new(NoopProfileSwitch),
        bot_state: bot_state.clone(),
        queue: queue.clone(),
        config: Arc::new(config.clone()),
        skip_policy,
        purchase_clock: Arc::new(parking_lot::Mutex::new(None)),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);

    let control_link_task = {
        let control_link = control_link.clone();
        let inbound_tx = inbound_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { control_link.run(inbound_tx, shutdown_rx).await })
    };

    let router_task = tokio::spawn(run_inbound_router(runtime.clone(), inbound_rx));

    let event_router_task = {
        let chat_rx = io.subscribe_chat();
        let event_router = EventRouter::new(session.clone(), ledger.clone(), Arc::new(runtime.clone()));
        tokio::spawn(async move { event_router.run(chat_rx).await })
    };

    let profit_report_task = tokio::spawn(run_profit_report_timer(
        ledger.clone(),
        reporter.clone(),
        config.profit_report_interval(),
        shutdown_rx.clone(),
    ));

    runtime.enqueue_startup_reconcile();
    let queue_task = {
        let runtime = runtime.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { queue.run_loop(runtime, shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await.ok();
    tprintln!("[SHUTDOWN] signal received, stopping tasks");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(control_link_task, router_task, event_router_task, profit_report_task, queue_task);
    Ok(())
}
