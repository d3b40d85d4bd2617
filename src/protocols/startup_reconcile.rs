//! Startup Reconcile (spec §4.9). Runs once after the session observes
//! having joined the game realm; holds `BotState::Startup` for its whole
//! duration. All recommendations arriving during the window are dropped
//! by the caller (spec I4), not by this module.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::bot::{BotState, BotStateValue};
use crate::error::OrchestratorResult;
use crate::game_io::{ClickMode, GameIo, MouseButton};
use crate::ledger::Ledger;
use crate::price_client::PriceClient;
use crate::protocols::bazaar_claim_cancel::{run_cancel_order, run_claim_filled};
use crate::protocols::bazaar_place_order::run_place_order;
use crate::protocols::claim_sold::run_claim_sold;
use crate::protocols::cookie_topup::run_cookie_topup;
use crate::queue::PreemptSignal;
use crate::types::{BazaarRecommendation, OrderSide};

const GLOBAL_WATCHDOG: Duration = Duration::from_secs(120);
const COOKIE_STEP: Duration = Duration::from_secs(15);
const ORDER_MANAGEMENT_STEP: Duration = Duration::from_secs(90);
const CLAIM_SOLD_STEP: Duration = Duration::from_secs(30);

/// One stale order re-listed at the current market price.
#[derive(Debug, Clone)]
pub struct Relisted {
    pub item_name: String,
    pub old_price: f64,
    pub new_price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub cookie_topped_up: bool,
    pub cancelled: u32,
    pub relisted: Vec<Relisted>,
    pub claimed_sold: u32,
}

/// Drive all four steps (spec §4.9), continuing to the next step whenever
/// one times out, and forcing `Idle` on the global 120 s watchdog.
pub async fn run_startup_reconcile(
    io: &Arc<dyn GameIo>,
    price_client: &dyn PriceClient,
    ledger: &Ledger,
    bot_state: &BotState,
    cookie_enabled: bool,
    cookie_threshold: Duration,
    order_price_drift: f64,
    preempt: PreemptSignal,
) -> ReconcileReport {
    bot_state.set(BotStateValue::Startup);

    let result = tokio::time::timeout(
        GLOBAL_WATCHDOG,
        run_all_steps(io, price_client, ledger, cookie_enabled, cookie_threshold, order_price_drift, preempt),
    )
    .await;

    let report = match result {
        Ok(report) => report,
        Err(_) => {
            warn!("startup reconcile hit the global watchdog, forcing Idle");
            ReconcileReport::default()
        }
    };

    bot_state.set(BotStateValue::Idle);
    info!(?report, "startup reconcile complete");
    report
}

async fn run_all_steps(
    io: &Arc<dyn GameIo>,
    price_client: &dyn PriceClient,
    ledger: &Ledger,
    cookie_enabled: bool,
    cookie_threshold: Duration,
    order_price_drift: f64,
    preempt: PreemptSignal,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    match tokio::time::timeout(COOKIE_STEP, run_cookie_topup(io, price_client, cookie_enabled, cookie_threshold, preempt.clone()))
        .await
    {
        Ok(Ok(topped_up)) => report.cookie_topped_up = topped_up,
        Ok(Err(e)) => warn!(error = %e, "cookie top-up failed"),
        Err(_) => warn!("cookie top-up step timed out"),
    }

    match tokio::time::timeout(
        ORDER_MANAGEMENT_STEP,
        manage_existing_orders(io, price_client, ledger, order_price_drift, preempt.clone()),
    )
    .await
    {
        Ok(Ok((cancelled, relisted))) => {
            report.cancelled = cancelled;
            report.relisted = relisted;
        }
        Ok(Err(e)) => warn!(error = %e, "existing-order management failed"),
        Err(_) => warn!("existing-order management step timed out"),
    }

    match tokio::time::timeout(CLAIM_SOLD_STEP, run_claim_sold(io)).await {
        Ok(Ok(claimed)) => report.claimed_sold = claimed,
        Ok(Err(e)) => warn!(error = %e, "startup claim-sold failed"),
        Err(_) => warn!("startup claim-sold step timed out"),
    }

    report
}

/// Cancel stale buy orders (stored price drifted ≥ `order_price_drift`
/// from the current bazaar) and re-place them at the current price (spec
/// §4.9 step 2).
async fn manage_existing_orders(
    io: &Arc<dyn GameIo>,
    price_client: &dyn PriceClient,
    ledger: &Ledger,
    order_price_drift: f64,
    preempt: PreemptSignal,
) -> OrchestratorResult<(u32, Vec<Relisted>)> {
    io.send_chat("/bz").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let Some(search) = io.current_container() else { return Ok((0, Vec::new())) };
    let Some(manage_slot) = search.find_slot_containing("Manage Orders") else { return Ok((0, Vec::new())) };
    io.click_slot(manage_slot.index, MouseButton::Left, ClickMode::Normal).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let Some(orders) = io.current_container() else { return Ok((0, Vec::new())) };

    let mut cancelled = 0;
    let mut relisted = Vec::new();
    for slot in orders.slots.iter().filter(|s| s.display_name.starts_with("BUY ")) {
        let item_name = slot.display_name.trim_start_matches("BUY ").trim().to_string();
        let Some(old_price) = extract_price_from_lore(&slot.lore) else { continue };
        let item_id = item_name.to_ascii_uppercase().replace(' ', "_");
        let Ok(current) = price_client.price_snapshot(&item_id).await else { continue };
        if current.buy_price <= 0.0 {
            continue;
        }
        let drift = (old_price - current.buy_price).abs();
        if drift < order_price_drift {
            continue;
        }

        run_cancel_order(io, ledger, &item_name, OrderSide::Buy, old_price, 1).await?;
        cancelled += 1;

        let relist = BazaarRecommendation {
            item_name: item_name.clone(),
            amount: 1,
            price_per_unit: current.buy_price,
            is_buy_order: true,
        };
        run_place_order(io, &relist, false, preempt.clone()).await?;
        relisted.push(Relisted { item_name, old_price, new_price: current.buy_price });
    }

    io.close_container().await;
    Ok((cancelled, relisted))
}

fn extract_price_from_lore(lore: &[String]) -> Option<f64> {
    for line in lore {
        if let Some(pos) = line.to_ascii_lowercase().find("price:") {
            let rest = line[pos + "price:".len()..].trim();
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if let Ok(value) = digits.parse::<f64>() {
                return Some(value);
            }
        }
    }
    None
}
