//! Sell-Inventory Protocol (spec §4.6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::OrchestratorResult;
use crate::game_io::GameIo;
use crate::price_client::PriceClient;
use crate::protocols::bazaar_claim_cancel::run_claim_filled;
use crate::protocols::bazaar_place_order::run_place_order;
use crate::queue::PreemptSignal;
use crate::types::BazaarRecommendation;

const ITEM_SPACING: Duration = Duration::from_millis(500);

/// Group the player's `ExtraAttributes.id`-bearing items by id, summing
/// counts (spec §4.6 step 1).
fn group_sellable_items(io: &Arc<dyn GameIo>) -> HashMap<String, u32> {
    let mut groups: HashMap<String, u32> = HashMap::new();
    for slot in io.inventory() {
        if let Some(id) = slot.item_db_id {
            *groups.entry(id).or_insert(0) += 1;
        }
    }
    groups
}

/// Drive the whole protocol: claim outstanding fills first, then place one
/// sell offer per grouped item, each skipping the amount step (spec §4.6
/// step 4: sell offers use all inventory at once).
pub async fn run_sell_inventory(
    io: &Arc<dyn GameIo>,
    price_client: &dyn PriceClient,
    preempt: PreemptSignal,
) -> OrchestratorResult<u32> {
    let _ = run_claim_filled(io).await;

    let groups = group_sellable_items(io);
    let mut placed = 0;
    for (item_id, amount) in groups {
        let snapshot = match price_client.price_snapshot(&item_id).await {
            Ok(s) => s,
            Err(e) => {
                info!(item = %item_id, error = %e, "sell-inventory: price lookup failed, skipping");
                continue;
            }
        };
        let price = if snapshot.sell_price > 0.0 {
            snapshot.sell_price - 0.1
        } else {
            snapshot.buy_price
        };
        if price <= 0.0 {
            continue;
        }

        let rec = BazaarRecommendation { item_name: item_id.clone(), amount, price_per_unit: price, is_buy_order: false };
        run_place_order(io, &rec, true, preempt.clone()).await?;
        placed += 1;
        tokio::time::sleep(ITEM_SPACING).await;
    }
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Slot, SlotKind};

    fn tradable_slot(index: u32, id: &str) -> Slot {
        Slot {
            index,
            kind_tag: SlotKind::Other("item".into()),
            display_name: id.to_string(),
            lore: vec![],
            item_db_id: Some(id.to_string()),
        }
    }

    #[test]
    fn groups_and_sums_by_db_id() {
        let fake = Arc::new(crate::game_io::fake::FakeGameIo::new());
        fake.set_inventory(vec![
            tradable_slot(0, "COAL"),
            tradable_slot(1, "COAL"),
            tradable_slot(2, "IRON_INGOT"),
            Slot { index: 3, kind_tag: SlotKind::Air, display_name: String::new(), lore: vec![], item_db_id: None },
        ]);
        let io: Arc<dyn GameIo> = fake;
        let groups = group_sellable_items(&io);
        assert_eq!(groups.get("COAL"), Some(&2));
        assert_eq!(groups.get("IRON_INGOT"), Some(&1));
        assert_eq!(groups.len(), 2);
    }

    #[tokio::test]
    async fn empty_inventory_places_nothing() {
        let io: Arc<dyn GameIo> = Arc::new(crate::game_io::fake::FakeGameIo::new());
        let price_client = crate::price_client::fake::FakePriceClient::default();
        let (_tx, preempt) = tokio::sync::watch::channel(false);
        let placed = run_sell_inventory(&io, &price_client, preempt).await.unwrap();
        assert_eq!(placed, 0);
    }
}
