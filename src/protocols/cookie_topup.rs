//! Cookie Top-Up (Startup Reconcile step 1, spec §4.9, 15 s watchdog).

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::OrchestratorResult;
use crate::game_io::GameIo;
use crate::price_client::PriceClient;
use crate::protocols::bazaar_place_order::run_place_order;
use crate::queue::PreemptSignal;
use crate::types::BazaarRecommendation;

const STEP_TIMEOUT: Duration = Duration::from_secs(15);
const BOOSTER_COOKIE_ID: &str = "BOOSTER_COOKIE";

pub async fn run_cookie_topup(
    io: &Arc<dyn GameIo>,
    price_client: &dyn PriceClient,
    enabled: bool,
    threshold: Duration,
    preempt: PreemptSignal,
) -> OrchestratorResult<bool> {
    if !enabled {
        return Ok(false);
    }
    let outcome = tokio::time::timeout(STEP_TIMEOUT, do_topup(io, price_client, threshold, preempt)).await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            info!("cookie top-up timed out, continuing startup reconcile");
            Ok(false)
        }
    }
}

async fn do_topup(
    io: &Arc<dyn GameIo>,
    price_client: &dyn PriceClient,
    threshold: Duration,
    preempt: PreemptSignal,
) -> OrchestratorResult<bool> {
    let remaining = price_client.cookie_remaining_secs().await?;
    if remaining >= threshold.as_secs() {
        return Ok(false);
    }

    let price = price_client.price_snapshot(BOOSTER_COOKIE_ID).await?;
    let rec = BazaarRecommendation {
        item_name: "Booster Cookie".to_string(),
        amount: 1,
        price_per_unit: price.buy_price.max(1.0),
        is_buy_order: true,
    };
    run_place_order(io, &rec, false, preempt).await?;
    io.send_chat("/viewrecipe Booster Cookie").await; // consume from inventory
    Ok(true)
}
