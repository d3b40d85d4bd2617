//! Bazaar Place-Order Protocol (spec §4.3). Each GUI step carries its own
//! 20 s watchdog; firing any one of them closes the container and aborts
//! the whole protocol rather than retrying the step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Deadline;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::game_io::{ClickMode, GameIo, MouseButton};
use crate::protocols::support::{await_event, StepOutcome};
use crate::queue::PreemptSignal;
use crate::session::SessionStore;
use crate::types::{BazaarRecommendation, Order};

const STEP_TIMEOUT: Duration = Duration::from_secs(20);
const SEARCH_RESULT_FALLBACK_SLOT: u32 = 11;
const SLOT_CREATE_BUY_ORDER: u32 = 19;
const SLOT_CREATE_SELL_OFFER: u32 = 20;
const SLOT_CUSTOM_AMOUNT: u32 = 13;
const SLOT_CUSTOM_PRICE: u32 = 13;
const SLOT_CONFIRM: u32 = 11;

/// Refuse at entry if the Event Router has observed an active order
/// cooldown (spec S4): no chat command is sent and no container is opened.
pub fn refuses_due_to_cooldown(session: &SessionStore) -> bool {
    session.snapshot().order_cooldown_active(std::time::Instant::now())
}

/// Drive the protocol to completion and hand back the `Order` for the
/// caller to insert into the open-order table (spec §4.3 step 7; the
/// Event Router records the *trade*, the protocol itself records the
/// *order*).
pub async fn run_place_order(
    io: &Arc<dyn GameIo>,
    rec: &BazaarRecommendation,
    skip_amount_step: bool,
    mut preempt: PreemptSignal,
) -> OrchestratorResult<Order> {
    let mut container_rx = io.subscribe_container_open();
    let mut sign_rx = io.subscribe_sign_open();

    io.send_chat(&format!("/bz {}", rec.item_name)).await;

    // Step 2: search-result window.
    let search = await_step(&mut container_rx, &mut preempt).await?;
    let target_slot = search
        .find_slot_containing(&rec.item_name)
        .map(|s| s.index)
        .unwrap_or(SEARCH_RESULT_FALLBACK_SLOT);
    io.click_slot(target_slot, MouseButton::Left, ClickMode::Normal).await;

    // Step 3: item detail window.
    let _detail = await_step(&mut container_rx, &mut preempt).await?;
    let detail_slot = if rec.is_buy_order { SLOT_CREATE_BUY_ORDER } else { SLOT_CREATE_SELL_OFFER };
    io.click_slot(detail_slot, MouseButton::Left, ClickMode::Normal).await;

    // Step 4: amount sign (buy orders only; sells and the skip-amount variant
    // used by Sell-Inventory place all inventory at once).
    if rec.is_buy_order && !skip_amount_step {
        let _amount_window = await_step(&mut container_rx, &mut preempt).await?;
        io.click_slot(SLOT_CUSTOM_AMOUNT, MouseButton::Left, ClickMode::Normal).await;
        await_sign(&mut sign_rx, &mut preempt).await?;
        io.write_sign_line(0, &rec.amount.to_string()).await;
    }

    // Step 5: price sign.
    let _price_window = await_step(&mut container_rx, &mut preempt).await?;
    io.click_slot(SLOT_CUSTOM_PRICE, MouseButton::Left, ClickMode::Normal).await;
    await_sign(&mut sign_rx, &mut preempt).await?;
    io.write_sign_line(0, &format!("{:.1}", rec.price_per_unit)).await;

    // Step 6: confirmation.
    let _confirm_window = await_step(&mut container_rx, &mut preempt).await?;
    io.click_slot(SLOT_CONFIRM, MouseButton::Left, ClickMode::Normal).await;

    Ok(Order::new(rec, Instant::now()))
}

async fn await_step<T: Clone>(
    rx: &mut tokio::sync::broadcast::Receiver<T>,
    preempt: &mut PreemptSignal,
) -> OrchestratorResult<T> {
    let deadline = Deadline::after(STEP_TIMEOUT);
    match await_container_generic(rx, deadline, preempt).await {
        StepOutcome::Event(v) => Ok(v),
        StepOutcome::Timeout => Err(OrchestratorError::Timeout(STEP_TIMEOUT)),
        StepOutcome::Preempted => Err(OrchestratorError::Preempted),
    }
}

async fn await_container_generic<T: Clone>(
    rx: &mut tokio::sync::broadcast::Receiver<T>,
    deadline: Deadline,
    preempt: &mut PreemptSignal,
) -> StepOutcome<T> {
    await_event(rx, deadline, preempt).await
}

async fn await_sign(rx: &mut tokio::sync::broadcast::Receiver<()>, preempt: &mut PreemptSignal) -> OrchestratorResult<()> {
    await_step(rx, preempt).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_io::fake::FakeGameIo;
    use crate::types::{ContainerSnapshot, Slot};
    use tokio::sync::watch;

    fn rec(name: &str, is_buy: bool) -> BazaarRecommendation {
        BazaarRecommendation { item_name: name.to_string(), amount: 64, price_per_unit: 5.0, is_buy_order: is_buy }
    }

    fn container(title: &str, slots: Vec<Slot>) -> ContainerSnapshot {
        ContainerSnapshot { window_id: 1, title: title.to_string(), slots }
    }

    #[tokio::test]
    async fn drives_full_buy_order_sequence() {
        let fake = Arc::new(FakeGameIo::new());
        let io: Arc<dyn GameIo> = fake.clone();
        let (_tx, preempt) = watch::channel(false);

        let r = rec("Coal", true);
        let handle_io = io.clone();
        let handle_rec = r.clone();
        let run = tokio::spawn(async move { run_place_order(&handle_io, &handle_rec, false, preempt).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.open_container(container(
            "Bazaar",
            vec![Slot { index: 20, kind_tag: crate::types::SlotKind::Other("coal".into()), display_name: "Coal".into(), lore: vec![], item_db_id: None }],
        ));
        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.open_container(container("Coal", vec![]));
        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.open_container(container("How many do you want to buy?", vec![]));
        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.fire_sign_open();
        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.open_container(container("How much do you want to pay?", vec![]));
        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.fire_sign_open();
        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.open_container(container("Confirm Listing", vec![]));

        let order = tokio::time::timeout(Duration::from_secs(1), run).await.unwrap().unwrap().unwrap();
        assert_eq!(order.item_name, "Coal");
        assert_eq!(fake.sign_lines.lock().len(), 2);
        assert_eq!(fake.sign_lines.lock()[0], (0, "64".to_string()));
        assert_eq!(fake.sign_lines.lock()[1], (0, "5.0".to_string()));
    }
}
