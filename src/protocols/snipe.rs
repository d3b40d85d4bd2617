//! AH Snipe Window Protocol (spec §4.2). Precondition: `BotState = Idle`,
//! AH flips enabled. A 10 s watchdog bounds the whole protocol; the
//! confirm-click path itself is kept free of any sleep that isn't the
//! bounded retry backoff explicitly called for in the algorithm.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::clock::Deadline;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::game_io::{ClickMode, GameIo, MouseButton};
use crate::protocols::support::{await_container, StepOutcome};
use crate::queue::PreemptSignal;
use crate::types::{AuctionSnipe, ContainerSnapshot, SlotKind};

const PROTOCOL_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIRM_RETRY_TIMEOUT: Duration = Duration::from_secs(5);
const BED_SPAM_MISS_LIMIT: u32 = 5;
const SLOT_BUY: u32 = 31;
const SLOT_CONFIRM: u32 = 11;

/// Auction skip policy (spec §4.2 "Skip policy"). Each field mirrors one
/// disjunct of the formula; `None`/`false` means that disjunct never fires.
#[derive(Debug, Clone, Default)]
pub struct SkipPolicyConfig {
    pub always: bool,
    pub min_profit: Option<i64>,
    pub user_finder: Option<String>,
    pub skins_enabled: bool,
    pub min_profit_pct: Option<f64>,
    pub min_price: Option<u64>,
}

impl SkipPolicyConfig {
    pub fn use_skip(&self, snipe: &AuctionSnipe) -> bool {
        self.always
            || self.min_profit.is_some_and(|m| snipe.profit() >= m)
            || self.user_finder.as_deref().is_some_and(|u| snipe.finder_tag == u)
            || (self.skins_enabled && name_is_skin(&snipe.item_name))
            || self.min_profit_pct.is_some_and(|p| snipe.profit_pct() >= p)
            || self.min_price.is_some_and(|p| snipe.starting_bid >= p)
    }
}

fn name_is_skin(name: &str) -> bool {
    name.to_ascii_lowercase().contains("skin")
}

/// Result of a completed snipe attempt, reported by the caller once this
/// function returns (spec §4.2 step 6).
#[derive(Debug, Clone, PartialEq)]
pub enum SnipeOutcome {
    Purchased,
    Claimed,
    Potatoed,
    InsufficientFunds,
    Aborted(&'static str),
}

/// Drive the full protocol (spec §4.2 steps 1–8). The caller is expected to
/// have already claimed `BotState::Purchasing` before invoking this (the
/// Queue's `run_item` owns that transition per I2).
pub async fn run_snipe(
    io: &Arc<dyn GameIo>,
    snipe: &AuctionSnipe,
    skip_policy: &SkipPolicyConfig,
    mut preempt: PreemptSignal,
) -> OrchestratorResult<SnipeOutcome> {
    let use_skip = skip_policy.use_skip(snipe);
    let watchdog = Deadline::after(PROTOCOL_TIMEOUT);
    let mut container_rx = io.subscribe_container_open();

    io.send_chat(&format!("/viewauction {}", snipe.auction_id)).await;

    // Step 3: wait for "BIN Auction View".
    let bin_view = loop {
        match await_container(&mut container_rx, watchdog, &mut preempt).await {
            StepOutcome::Event(snapshot) if snapshot.title_is("BIN Auction View") => break snapshot,
            StepOutcome::Event(snapshot) if snapshot.title.contains("Auction View") => {
                io.close_container().await;
                return Ok(SnipeOutcome::Aborted("non-BIN auction view"));
            }
            StepOutcome::Event(_) => continue,
            StepOutcome::Timeout => return Err(OrchestratorError::Timeout(PROTOCOL_TIMEOUT)),
            StepOutcome::Preempted => {
                io.close_container().await;
                return Err(OrchestratorError::Preempted);
            }
        }
    };
    let t_first_window = Instant::now();
    io.write_transaction_packet(bin_view.window_id, 0, true).await;

    // Step 4: poll slot 31 at 1 ms granularity for up to ~100 ms.
    let mut known_kind = poll_slot_kind(io, SLOT_BUY, Duration::from_millis(100)).await;

    loop {
        let kind = match &known_kind {
            Some(k) => k.clone(),
            None => {
                io.close_container().await;
                return Ok(SnipeOutcome::Aborted("slot 31 never resolved"));
            }
        };
        match kind {
            SlotKind::GoldNugget => {
                io.write_window_click_packet(bin_view.window_id, SLOT_BUY, 2, 3).await;
                io.click_slot(SLOT_BUY, MouseButton::Left, ClickMode::Normal).await;
                if use_skip {
                    let next_window = bin_view.next_window_id();
                    io.write_window_click_packet(next_window, SLOT_CONFIRM, 0, 0).await;
                }
                break;
            }
            SlotKind::Bed => {
                bed_spam(io, watchdog).await;
                break;
            }
            SlotKind::Potato => {
                io.close_container().await;
                info!(auction_id = %snipe.auction_id, "snipe potatoed");
                return Ok(SnipeOutcome::Potatoed);
            }
            SlotKind::Feather => {
                known_kind = poll_slot_kind(io, SLOT_BUY, Duration::from_millis(50)).await;
                match &known_kind {
                    Some(SlotKind::GoldBlock) | Some(SlotKind::GoldNugget) => continue,
                    _ => {
                        io.close_container().await;
                        return Ok(SnipeOutcome::Aborted("feather resolved to unexpected tag"));
                    }
                }
            }
            SlotKind::GoldBlock => {
                io.click_slot(SLOT_BUY, MouseButton::Left, ClickMode::Normal).await;
                info!(auction_id = %snipe.auction_id, "claimed previously sold auction");
                return Ok(SnipeOutcome::Claimed);
            }
            SlotKind::PoisonousPotato => {
                io.close_container().await;
                return Ok(SnipeOutcome::InsufficientFunds);
            }
            _ => {
                io.close_container().await;
                return Ok(SnipeOutcome::Aborted("unexpected slot 31 tag"));
            }
        }
    }

    // Step 5: confirm purchase.
    let confirm = loop {
        match await_container(&mut container_rx, watchdog, &mut preempt).await {
            StepOutcome::Event(snapshot) if snapshot.title_is("Confirm Purchase") => break snapshot,
            StepOutcome::Event(snapshot) if snapshot.title.contains("Auction View") && !snapshot.title_is("BIN Auction View") => {
                io.close_container().await;
                return Ok(SnipeOutcome::Aborted("non-BIN auction view"));
            }
            StepOutcome::Event(_) => continue,
            StepOutcome::Timeout => return Err(OrchestratorError::Timeout(PROTOCOL_TIMEOUT)),
            StepOutcome::Preempted => {
                io.close_container().await;
                return Err(OrchestratorError::Preempted);
            }
        }
    };
    let elapsed = Instant::now().saturating_duration_since(t_first_window);
    info!(auction_id = %snipe.auction_id, ?elapsed, "confirm purchase window opened");

    if !use_skip {
        io.click_slot(SLOT_CONFIRM, MouseButton::Left, ClickMode::Normal).await;
    }
    let confirm_deadline = Deadline::after(CONFIRM_RETRY_TIMEOUT);
    let mut current_title = confirm.title.clone();
    while current_title == "Confirm Purchase" && !confirm_deadline.is_expired() {
        io.click_slot(SLOT_CONFIRM, MouseButton::Left, ClickMode::Normal).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        current_title = io.current_container().map(|c| c.title).unwrap_or_default();
    }

    Ok(SnipeOutcome::Purchased)
}

async fn poll_slot_kind(io: &Arc<dyn GameIo>, slot: u32, budget: Duration) -> Option<SlotKind> {
    let deadline = Deadline::after(budget);
    loop {
        if let Some(container) = io.current_container() {
            if let Some(s) = container.slot(slot) {
                if s.kind_tag != SlotKind::Air {
                    return Some(s.kind_tag.clone());
                }
            }
        }
        if deadline.is_expired() {
            return io
                .current_container()
                .and_then(|c| c.slot(slot).map(|s| s.kind_tag.clone()));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

async fn bed_spam(io: &Arc<dyn GameIo>, watchdog: Deadline) {
    const CLICK_DELAY: Duration = Duration::from_millis(100);
    let mut misses = 0u32;
    while misses < BED_SPAM_MISS_LIMIT && !watchdog.is_expired() {
        tokio::time::sleep(CLICK_DELAY).await;
        let Some(container) = io.current_container() else {
            return; // window closed
        };
        match container.slot(SLOT_BUY).map(|s| s.kind_tag.clone()) {
            Some(SlotKind::GoldNugget) => {
                io.click_slot(SLOT_BUY, MouseButton::Left, ClickMode::Normal).await;
                return;
            }
            _ => misses += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_io::fake::FakeGameIo;
    use crate::types::{ContainerSnapshot, Slot};
    use tokio::sync::watch;

    fn snipe(profit: i64, starting_bid: u64, finder: &str) -> AuctionSnipe {
        AuctionSnipe {
            auction_id: "A".to_string(),
            item_name: "Sword".to_string(),
            starting_bid,
            target_sell_price: starting_bid.saturating_add(profit.max(0) as u64),
            finder_tag: finder.to_string(),
            profit_percentage: 0.0,
            purchase_at: None,
        }
    }

    #[test]
    fn skip_policy_always_short_circuits() {
        let policy = SkipPolicyConfig { always: true, ..Default::default() };
        assert!(policy.use_skip(&snipe(0, 1000, "nobody")));
    }

    #[test]
    fn skip_policy_min_profit_disjunct() {
        let policy = SkipPolicyConfig { min_profit: Some(500), ..Default::default() };
        assert!(policy.use_skip(&snipe(500, 1000, "nobody")));
        assert!(!policy.use_skip(&snipe(100, 1000, "nobody")));
    }

    #[test]
    fn skip_policy_user_finder_disjunct() {
        let policy = SkipPolicyConfig { user_finder: Some("USER".to_string()), ..Default::default() };
        assert!(policy.use_skip(&snipe(0, 1000, "USER")));
        assert!(!policy.use_skip(&snipe(0, 1000, "OTHER")));
    }

    #[test]
    fn skip_policy_skins_disjunct() {
        let policy = SkipPolicyConfig { skins_enabled: true, ..Default::default() };
        let mut s = snipe(0, 1000, "nobody");
        s.item_name = "Wither Skin".to_string();
        assert!(policy.use_skip(&s));
    }

    fn bin_auction_view(window_id: u8, slot31: SlotKind) -> ContainerSnapshot {
        ContainerSnapshot {
            window_id,
            title: "BIN Auction View".to_string(),
            slots: vec![Slot { index: 31, kind_tag: slot31, display_name: String::new(), lore: vec![], item_db_id: None }],
        }
    }

    #[tokio::test]
    async fn potato_exits_without_purchase() {
        let fake = Arc::new(FakeGameIo::new());
        let io: Arc<dyn GameIo> = fake.clone();
        let (_tx, preempt) = watch::channel(false);

        let s = snipe(1000, 1000, "nobody");
        let handle_io = io.clone();
        let run = tokio::spawn(async move { run_snipe(&handle_io, &s, &SkipPolicyConfig::default(), preempt).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        fake.open_container(bin_auction_view(1, SlotKind::Potato));

        let outcome = tokio::time::timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), SnipeOutcome::Potatoed);
    }
}
