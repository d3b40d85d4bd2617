//! Claim-Sold (AH) Protocol (spec §4.5).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::warn;

use crate::clock::Deadline;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::game_io::{ClickMode, GameIo, MouseButton};
use crate::types::ContainerSnapshot;

const SLOT_POLL_BUDGET: Duration = Duration::from_secs(2);
const MAX_ITERATIONS: u32 = 50;
const CLAIMABLE_KEYWORDS: &[&str] = &["sold", "ended", "expired", "click to claim", "claim your"];
const ACTIVE_KEYWORDS: &[&str] = &["ends in", "buy it now", "starting bid"];

/// Drive `/ah` → Manage Auctions → claim every claimable auction (spec
/// §4.5). Returns the number of slots clicked.
pub async fn run_claim_sold(io: &Arc<dyn GameIo>) -> OrchestratorResult<u32> {
    let mut container_rx = io.subscribe_container_open();
    io.send_chat("/ah").await;
    let lobby = wait_for_populated(io, &mut container_rx).await?;

    let Some(manage_slot) = lobby.find_slot_containing("Manage Auctions") else {
        return Err(OrchestratorError::ProtocolDesync {
            expected: "Manage Auctions slot",
            actual: "not found".to_string(),
        });
    };
    io.click_slot(manage_slot.index, MouseButton::Left, ClickMode::Normal).await;
    let mut current = next_container(&mut container_rx).await?;

    let mut processed: HashSet<String> = HashSet::new();
    let mut clicks = 0u32;

    for _ in 0..MAX_ITERATIONS {
        if let Some(claim_all) = current.slots.iter().find(|s| s.kind_tag == crate::types::SlotKind::Cauldron) {
            io.click_slot(claim_all.index, MouseButton::Left, ClickMode::Normal).await;
            clicks += 1;
            break;
        }

        if current.title_is("BIN Auction View") {
            // Accidentally opened an active auction (no "Confirm" followed).
            io.close_container().await;
            io.send_chat("/ah").await;
            let lobby = wait_for_populated(io, &mut container_rx).await?;
            let Some(manage_slot) = lobby.find_slot_containing("Manage Auctions") else { break };
            io.click_slot(manage_slot.index, MouseButton::Left, ClickMode::Normal).await;
            current = next_container(&mut container_rx).await?;
            continue;
        }

        let claimable = current.slots.iter().find(|s| {
            !processed.contains(&s.display_name)
                && s.lore_contains_any(CLAIMABLE_KEYWORDS)
                && s.lore_contains_none(ACTIVE_KEYWORDS)
        });

        let Some(slot) = claimable else { break };
        processed.insert(slot.display_name.clone());
        io.click_slot(slot.index, MouseButton::Left, ClickMode::Normal).await;
        clicks += 1;
        // Re-read in case the claim click updated the window in place
        // (the common case); a full window swap is still observed via
        // `container_rx` on the next loop's cauldron/BIN checks.
        if let Some(refreshed) = io.current_container() {
            current = refreshed;
        }
    }

    if clicks == 0 {
        warn!("claim-sold found nothing claimable");
    }
    io.close_container().await;
    Ok(clicks)
}

/// Wait for a container that already has its slots populated, polling for
/// up to 2 s (spec §4.5 "guard against mineflayer's delayed fill").
async fn wait_for_populated(
    io: &Arc<dyn GameIo>,
    rx: &mut broadcast::Receiver<ContainerSnapshot>,
) -> OrchestratorResult<ContainerSnapshot> {
    let deadline = Deadline::after(SLOT_POLL_BUDGET);
    loop {
        if let Some(c) = io.current_container() {
            if !c.slots.is_empty() {
                return Ok(c);
            }
        }
        if deadline.is_expired() {
            return Err(OrchestratorError::Timeout(SLOT_POLL_BUDGET));
        }
        tokio::select! {
            res = rx.recv() => {
                if let Ok(snapshot) = res {
                    if !snapshot.slots.is_empty() {
                        return Ok(snapshot);
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
}

async fn next_container(rx: &mut broadcast::Receiver<ContainerSnapshot>) -> OrchestratorResult<ContainerSnapshot> {
    let deadline = Deadline::after(SLOT_POLL_BUDGET);
    loop {
        tokio::select! {
            res = rx.recv() => match res {
                Ok(snapshot) => return Ok(snapshot),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(OrchestratorError::TransportLost),
            },
            _ = tokio::time::sleep_until(deadline.instant().into()) => return Err(OrchestratorError::Timeout(SLOT_POLL_BUDGET)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_io::fake::FakeGameIo;
    use crate::types::{Slot, SlotKind};

    fn container(title: &str, slots: Vec<Slot>) -> ContainerSnapshot {
        ContainerSnapshot { window_id: 1, title: title.to_string(), slots }
    }

    fn slot(index: u32, name: &str, lore: Vec<&str>) -> Slot {
        Slot {
            index,
            kind_tag: SlotKind::Other("item".into()),
            display_name: name.to_string(),
            lore: lore.into_iter().map(String::from).collect(),
            item_db_id: None,
        }
    }

    #[tokio::test]
    async fn claims_each_claimable_slot_once_and_skips_active() {
        let fake = Arc::new(FakeGameIo::new());
        let io: Arc<dyn GameIo> = fake.clone();

        let run = tokio::spawn({
            let io = io.clone();
            async move { run_claim_sold(&io).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        fake.open_container(container("Auction House", vec![slot(20, "Manage Auctions", vec![])]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        fake.open_container(container(
            "Manage Auctions",
            vec![
                slot(1, "Hyper Sword", vec!["sold for 1,000,000 coins", "click to claim"]),
                slot(2, "Midas Sword", vec!["ends in 3h", "starting bid"]),
            ],
        ));

        let clicks = tokio::time::timeout(Duration::from_secs(3), run).await.unwrap().unwrap().unwrap();
        assert_eq!(clicks, 1);
        assert!(fake.clicks.lock().iter().any(|c| c.slot == 1));
        assert!(!fake.clicks.lock().iter().any(|c| c.slot == 2));
    }
}
