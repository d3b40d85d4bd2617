//! Inventory-Full Recovery Protocol (SPEC_FULL §4.10). Runs under its own
//! Critical queue slot; no BotState transition is needed since it performs
//! no GUI window operations.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::OrchestratorResult;
use crate::game_io::GameIo;
use crate::types::{Slot, SlotKind};

const WATCHDOG: Duration = Duration::from_secs(10);
const INVENTORY_CAPACITY: usize = 36;
const DROP_MODE: u8 = 4;
const PLAYER_INVENTORY_WINDOW_ID: u8 = 0;

fn is_junk(slot: &Slot) -> bool {
    slot.kind_tag != SlotKind::Air && slot.item_db_id.is_none()
}

/// Returns whether a junk stack was actually dropped (so the caller knows
/// whether to re-enqueue the triggering claim).
pub async fn run_inventory_recovery(io: &Arc<dyn GameIo>) -> OrchestratorResult<bool> {
    tokio::time::timeout(WATCHDOG, do_recovery(io)).await.unwrap_or_else(|_| {
        info!("inventory recovery watchdog fired, exiting without retrying");
        Ok(false)
    })
}

async fn do_recovery(io: &Arc<dyn GameIo>) -> OrchestratorResult<bool> {
    let inventory = io.inventory();
    let occupied = inventory.iter().filter(|s| s.kind_tag != SlotKind::Air).count();
    if occupied < INVENTORY_CAPACITY {
        info!("inventory recovery: stale signal, {occupied} slots occupied");
        return Ok(false);
    }

    let junk = inventory.iter().filter(|s| is_junk(s)).min_by_key(|s| s.index);
    let Some(junk) = junk else {
        info!("inventory recovery: no junk stack found to drop");
        return Ok(false);
    };

    io.write_window_click_packet(PLAYER_INVENTORY_WINDOW_ID, junk.index, 0, DROP_MODE).await;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_io::fake::FakeGameIo;

    fn filled_inventory(n: usize) -> Vec<Slot> {
        (0..n)
            .map(|i| Slot {
                index: i as u32,
                kind_tag: SlotKind::Other("junk".into()),
                display_name: format!("Junk {i}"),
                lore: vec![],
                item_db_id: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn stale_signal_below_capacity_is_a_no_op() {
        let fake = Arc::new(FakeGameIo::new());
        fake.set_inventory(filled_inventory(10));
        let io: Arc<dyn GameIo> = fake.clone();
        let dropped = run_inventory_recovery(&io).await.unwrap();
        assert!(!dropped);
        assert!(fake.window_click_packets.lock().is_empty());
    }

    #[tokio::test]
    async fn full_inventory_drops_lowest_index_junk() {
        let fake = Arc::new(FakeGameIo::new());
        let mut slots = filled_inventory(INVENTORY_CAPACITY);
        slots[5].item_db_id = Some("COAL".to_string());
        fake.set_inventory(slots);
        let io: Arc<dyn GameIo> = fake.clone();
        let dropped = run_inventory_recovery(&io).await.unwrap();
        assert!(dropped);
        let packets = fake.window_click_packets.lock();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].slot, 0);
        assert_eq!(packets[0].mode, DROP_MODE);
    }
}
