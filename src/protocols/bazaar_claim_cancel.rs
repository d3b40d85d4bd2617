//! Bazaar Claim-Filled and Cancel Protocols (spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::game_io::{ClickMode, GameIo, MouseButton};
use crate::ledger::Ledger;
use crate::types::{ContainerSnapshot, OrderSide};

const MANAGE_ORDERS_LABEL: &str = "Manage Orders";
const CLICK_SPACING: Duration = Duration::from_millis(300);
const MAX_CLAIM_CLICKS: u32 = 3;

/// Navigate `/bz` → Manage Orders and return the resulting container, or
/// `None` if the "Manage Orders" slot never appears.
async fn open_manage_orders(io: &Arc<dyn GameIo>) -> Option<ContainerSnapshot> {
    io.send_chat("/bz").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let search = io.current_container()?;
    let manage_slot = search.find_slot_containing(MANAGE_ORDERS_LABEL)?.index;
    io.click_slot(manage_slot, MouseButton::Left, ClickMode::Normal).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    io.current_container()
}

/// Scan the open Manage Orders window for filled `BUY `/`SELL ` slots and
/// claim each up to 3 times, ≥300 ms apart (partial fills may need more
/// than one claim click). Returns how many distinct order slots were
/// claimed.
pub async fn run_claim_filled(io: &Arc<dyn GameIo>) -> OrchestratorResult<u32> {
    let Some(container) = open_manage_orders(io).await else {
        return Err(OrchestratorError::ProtocolDesync {
            expected: "Manage Orders window",
            actual: "none".to_string(),
        });
    };

    let filled_slots: Vec<u32> = container
        .slots
        .iter()
        .filter(|s| s.display_name.starts_with("BUY ") || s.display_name.starts_with("SELL "))
        .filter(|s| s.lore_contains_any(&["filled"]))
        .map(|s| s.index)
        .collect();

    let mut claimed_count = 0;
    for slot in filled_slots {
        for _ in 0..MAX_CLAIM_CLICKS {
            io.click_slot(slot, MouseButton::Left, ClickMode::Normal).await;
            tokio::time::sleep(CLICK_SPACING).await;
        }
        claimed_count += 1;
    }

    io.close_container().await;
    Ok(claimed_count)
}

/// Cancel an order identified by `(item_name, side)`: navigate to Manage
/// Orders, open its detail, click Cancel Order, then remove the matching
/// buy lot from the Ledger FIFO (spec §4.4 "Cancel").
pub async fn run_cancel_order(
    io: &Arc<dyn GameIo>,
    ledger: &Ledger,
    item_name: &str,
    side: OrderSide,
    price_per_unit: f64,
    amount: u64,
) -> OrchestratorResult<()> {
    let Some(container) = open_manage_orders(io).await else {
        return Err(OrchestratorError::ProtocolDesync {
            expected: "Manage Orders window",
            actual: "none".to_string(),
        });
    };

    let prefix = if side == OrderSide::Buy { "BUY " } else { "SELL " };
    let Some(slot) = container.find_slot_containing(&format!("{prefix}{item_name}")) else {
        io.close_container().await;
        return Err(OrchestratorError::ProtocolDesync {
            expected: "matching order slot",
            actual: "not found".to_string(),
        });
    };
    let slot_index = slot.index;
    io.click_slot(slot_index, MouseButton::Left, ClickMode::Normal).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let Some(detail) = io.current_container() else {
        return Err(OrchestratorError::ProtocolDesync {
            expected: "order detail window",
            actual: "none".to_string(),
        });
    };
    let Some(cancel_slot) = detail.find_slot_containing("Cancel Order") else {
        io.close_container().await;
        return Err(OrchestratorError::ProtocolDesync {
            expected: "Cancel Order slot",
            actual: "not found".to_string(),
        });
    };
    io.click_slot(cancel_slot.index, MouseButton::Left, ClickMode::Normal).await;
    io.close_container().await;

    ledger.remove_cancelled(item_name, side == OrderSide::Buy, price_per_unit, amount);
    Ok(())
}
