//! Event Router (spec §4.7). The single consumer of the game chat stream.
//! Classification is a pure, ordered table (`classify`) so pattern
//! precedence (spec P8: buy-orders before total-orders) is directly
//! testable without a live chat stream; `EventRouter::run` drives the
//! stateful parts (Session Store mutation, Ledger updates, and the 2 s
//! debounce on observed order-limit constants).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::game_io::ChatMessage;
use crate::ledger::Ledger;
use crate::session::SessionStore;

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);
const ORDER_COOLDOWN: Duration = Duration::from_secs(60);
const DAILY_SELL_LIMIT_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// A classified domain event (spec §4.7 table, right-hand column).
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEffect {
    EscrowReported,
    PurchaseSucceeded { item_name: String, price: u64 },
    SnipeAborted,
    AuctionListingSold,
    BazaarBuyFilled { item: String, amount: u32 },
    BazaarSellFilled { item: String, amount: u32 },
    BazaarBuyClaimed { item: String, amount: u32, price: f64 },
    BazaarSellClaimed { item: String, amount: u32, price: f64 },
    DailySellLimitHit,
    OrderCooldownHit,
    InventoryFull,
    StashWarning,
    MaxBuyOrdersObserved(u32),
    MaxTotalOrdersObserved(u32),
}

fn extract_between<'a>(line: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let start = line.find(prefix)? + prefix.len();
    let rest = &line[start..];
    let end = rest.find(suffix)?;
    Some(&rest[..end])
}

fn parse_count_item(segment: &str) -> Option<(u32, String)> {
    let segment = segment.trim();
    let x_pos = segment.find('x')?;
    let count: u32 = segment[..x_pos].trim().parse().ok()?;
    let item = segment[x_pos + 1..].trim().to_string();
    if item.is_empty() {
        return None;
    }
    Some((count, item))
}

fn parse_coins(segment: &str) -> Option<u64> {
    segment.trim().replace(',', "").parse().ok()
}

fn parse_price(segment: &str) -> Option<f64> {
    segment.trim().replace(',', "").parse().ok()
}

/// Find the whitespace-delimited number immediately preceding `target`,
/// skipping over the connective words bazaar chat uses between them
/// ("buy", "bazaar", "of"). This is deliberately permissive: it matches a
/// line like "may only have 7 buy orders" even when hunting for a bare
/// "orders" target, which is exactly the overlap spec P8 guards against:
/// the caller must check the more specific buy-orders phrase first.
fn trailing_number_before(line: &str, target: &str) -> Option<u32> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let idx = tokens
        .iter()
        .rposition(|t| t.trim_end_matches(['!', '.', ',']).eq_ignore_ascii_case(target))?;
    let mut i = idx;
    while i > 0 {
        i -= 1;
        let tok = tokens[i];
        if tok.eq_ignore_ascii_case("buy") || tok.eq_ignore_ascii_case("bazaar") || tok.eq_ignore_ascii_case("of") {
            continue;
        }
        return tok.parse::<u32>().ok();
    }
    None
}

fn is_buy_orders_phrase(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    tokens.windows(2).any(|w| {
        w[0].eq_ignore_ascii_case("buy") && w[1].trim_end_matches(['!', '.', ',']).eq_ignore_ascii_case("orders")
    })
}

fn is_order_limit_line(line: &str) -> bool {
    line.contains("orders")
        && (line.contains("may only have") || line.contains("maximum of") || line.contains("reached"))
}

/// Classify one color-stripped chat line into a domain event (spec §4.7).
/// Pure and order-sensitive: the buy-orders-specific check runs before the
/// generic total-orders check (spec P8).
pub fn classify(line: &str) -> Option<RouterEffect> {
    if line.contains("Putting coins in escrow...") {
        return Some(RouterEffect::EscrowReported);
    }
    if line.starts_with("You purchased ") {
        if let (Some(item), Some(price_str)) = (
            extract_between(line, "You purchased ", " for "),
            extract_between(line, " for ", " coins"),
        ) {
            if let Some(price) = parse_coins(price_str) {
                return Some(RouterEffect::PurchaseSucceeded { item_name: item.to_string(), price });
            }
        }
        return None;
    }
    if line.contains("There was an error with the auction house!") {
        return Some(RouterEffect::SnipeAborted);
    }
    if line.starts_with("[Auction] ") && line.contains("bought") && line.contains("for") {
        return Some(RouterEffect::AuctionListingSold);
    }
    if line.contains("[Bazaar]") {
        if let Some(segment) = extract_between(line, "Buy Order for ", " was filled") {
            if let Some((amount, item)) = parse_count_item(segment) {
                return Some(RouterEffect::BazaarBuyFilled { item, amount });
            }
        }
        if let Some(segment) = extract_between(line, "Sell Offer for ", " was filled") {
            if let Some((amount, item)) = parse_count_item(segment) {
                return Some(RouterEffect::BazaarSellFilled { item, amount });
            }
        }
        if line.contains("Claimed ") {
            let count_item = extract_between(line, "Claimed ", " from your")
                .and_then(parse_count_item);
            let price = extract_between(line, "for ", " coins").and_then(parse_price);
            if let (Some((amount, item)), Some(price)) = (count_item, price) {
                let is_buy_claim = line.to_ascii_lowercase().contains("bought for");
                return Some(if is_buy_claim {
                    RouterEffect::BazaarBuyClaimed { item, amount, price }
                } else {
                    RouterEffect::BazaarSellClaimed { item, amount, price }
                });
            }
        }
        if line.contains("cooldown") {
            return Some(RouterEffect::OrderCooldownHit);
        }
    }
    if line.contains("You reached the daily limit in items value that you may sell") {
        return Some(RouterEffect::DailySellLimitHit);
    }
    if line.contains("You don't have the space required to claim that!") {
        return Some(RouterEffect::InventoryFull);
    }
    if line.contains("stashed away") {
        return Some(RouterEffect::StashWarning);
    }
    if is_order_limit_line(line) {
        if is_buy_orders_phrase(line) {
            if let Some(n) = trailing_number_before(line, "orders") {
                return Some(RouterEffect::MaxBuyOrdersObserved(n));
            }
        } else if let Some(n) = trailing_number_before(line, "orders") {
            return Some(RouterEffect::MaxTotalOrdersObserved(n));
        }
    }
    None
}

/// Everything the Event Router needs to act on a classified effect, kept as
/// a trait so this module is testable without a built Orchestrator/Queue.
/// Implemented on the Runtime context in `orchestrator.rs`.
pub trait OrchestratorHandle: Send + Sync {
    fn enqueue_claim_sold_high(&self, reason: &str);
    fn enqueue_inventory_recovery(&self);
    fn enqueue_order_count_refresh(&self);
    fn on_snipe_success(&self, item_name: &str, price: u64);
    fn on_snipe_abort(&self);
    fn on_escrow_reported(&self);
}

pub struct EventRouter<H: OrchestratorHandle> {
    session: Arc<SessionStore>,
    ledger: Arc<Ledger>,
    handle: Arc<H>,
    debounce_deadline: Mutex<Option<Instant>>,
}

impl<H: OrchestratorHandle> EventRouter<H> {
    pub fn new(session: Arc<SessionStore>, ledger: Arc<Ledger>, handle: Arc<H>) -> Self {
        Self { session, ledger, handle, debounce_deadline: Mutex::new(None) }
    }

    fn arm_debounce(&self) {
        *self.debounce_deadline.lock() = Some(Instant::now() + DEBOUNCE_WINDOW);
    }

    fn apply(&self, effect: RouterEffect) {
        match effect {
            RouterEffect::EscrowReported => self.handle.on_escrow_reported(),
            RouterEffect::PurchaseSucceeded { item_name, price } => {
                self.handle.on_snipe_success(&item_name, price);
            }
            RouterEffect::SnipeAborted => self.handle.on_snipe_abort(),
            RouterEffect::AuctionListingSold => self.handle.enqueue_claim_sold_high("auction listing sold"),
            RouterEffect::BazaarBuyFilled { item, amount } => {
                debug!("bazaar buy order filled: {amount}x {item}");
                self.handle.enqueue_claim_sold_high("bazaar buy order filled");
            }
            RouterEffect::BazaarSellFilled { item, amount } => {
                debug!("bazaar sell offer filled: {amount}x {item}");
                self.handle.enqueue_claim_sold_high("bazaar sell offer filled");
            }
            RouterEffect::BazaarBuyClaimed { item, amount, price } => {
                self.ledger.record_buy(&item, price, amount as u64);
            }
            RouterEffect::BazaarSellClaimed { item, amount, price } => {
                let trade = self.ledger.record_sell(&item, price, amount as u64);
                debug!("trade recorded: {:?}", trade);
            }
            RouterEffect::DailySellLimitHit => {
                self.session.mutate(|facts| {
                    facts.daily_sell_limit_until = Some(Instant::now() + DAILY_SELL_LIMIT_WINDOW);
                });
            }
            RouterEffect::OrderCooldownHit => {
                self.session.mutate(|facts| {
                    facts.order_cooldown_until = Some(Instant::now() + ORDER_COOLDOWN);
                });
            }
            RouterEffect::InventoryFull => self.handle.enqueue_inventory_recovery(),
            RouterEffect::StashWarning => {
                self.session.mutate(|facts| facts.stash_warning = true);
            }
            RouterEffect::MaxBuyOrdersObserved(n) => {
                self.session.mutate(|facts| facts.max_buy_orders = n);
                self.arm_debounce();
            }
            RouterEffect::MaxTotalOrdersObserved(n) => {
                self.session.mutate(|facts| facts.max_total_orders = n);
                self.arm_debounce();
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if let Some(effect) = classify(line) {
            self.apply(effect);
        }
    }

    /// Consume the chat stream until the sender is dropped (spec §5 "one
    /// chat-line consumer, one Orchestrator inbox").
    pub async fn run(&self, mut chat_rx: broadcast::Receiver<ChatMessage>) {
        loop {
            let deadline = *self.debounce_deadline.lock();
            let timer = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                msg = chat_rx.recv() => {
                    match msg {
                        Ok(chat) => self.handle_line(chat.text()),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("event router lagged, skipped {skipped} chat lines");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = timer => {
                    *self.debounce_deadline.lock() = None;
                    self.handle.enqueue_order_count_refresh();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    #[derive(Default)]
    struct RecordingHandle {
        claim_sold_high: AtomicU32,
        inventory_recovery: AtomicU32,
        order_count_refresh: AtomicU32,
        snipe_success: Mutex<Option<(String, u64)>>,
        snipe_abort: AtomicU32,
        escrow_reported: AtomicU32,
    }

    impl OrchestratorHandle for RecordingHandle {
        fn enqueue_claim_sold_high(&self, _reason: &str) {
            self.claim_sold_high.fetch_add(1, Ordering::SeqCst);
        }
        fn enqueue_inventory_recovery(&self) {
            self.inventory_recovery.fetch_add(1, Ordering::SeqCst);
        }
        fn enqueue_order_count_refresh(&self) {
            self.order_count_refresh.fetch_add(1, Ordering::SeqCst);
        }
        fn on_snipe_success(&self, item_name: &str, price: u64) {
            *self.snipe_success.lock() = Some((item_name.to_string(), price));
        }
        fn on_snipe_abort(&self) {
            self.snipe_abort.fetch_add(1, Ordering::SeqCst);
        }
        fn on_escrow_reported(&self) {
            self.escrow_reported.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn buy_orders_limit_wins_over_generic_total_orders_pattern() {
        // P8: this line could be mis-parsed by a naive generic "N orders"
        // matcher, but the buy-specific phrase must be checked first.
        let effect = classify("You may only have 7 buy orders!").unwrap();
        assert_eq!(effect, RouterEffect::MaxBuyOrdersObserved(7));
    }

    #[test]
    fn total_orders_limit_parses_when_not_buy_specific() {
        let effect = classify("You may only have 14 orders!").unwrap();
        assert_eq!(effect, RouterEffect::MaxTotalOrdersObserved(14));
    }

    #[test]
    fn reached_maximum_buy_orders_phrasing_also_prefers_buy() {
        let effect = classify("You have reached the maximum of 7 bazaar buy orders!").unwrap();
        assert_eq!(effect, RouterEffect::MaxBuyOrdersObserved(7));
    }

    #[test]
    fn purchase_line_parses_item_and_price() {
        let effect = classify("You purchased Hyper Sword for 1,000,000 coins!").unwrap();
        assert_eq!(
            effect,
            RouterEffect::PurchaseSucceeded { item_name: "Hyper Sword".to_string(), price: 1_000_000 }
        );
    }

    #[test]
    fn bazaar_buy_filled_parses_count_and_item() {
        let effect = classify("[Bazaar] Your Buy Order for 64x Coal was filled!").unwrap();
        assert_eq!(effect, RouterEffect::BazaarBuyFilled { item: "Coal".to_string(), amount: 64 });
    }

    #[test]
    fn bazaar_claim_lines_route_buy_vs_sell() {
        let buy = classify("[Bazaar] Claimed 64x Coal from your Buy Order! Bought for 5.0 coins each.").unwrap();
        assert_eq!(buy, RouterEffect::BazaarBuyClaimed { item: "Coal".to_string(), amount: 64, price: 5.0 });

        let sell = classify("[Bazaar] Claimed 64x Coal from your Sell Offer! Sold for 6.0 coins each.").unwrap();
        assert_eq!(sell, RouterEffect::BazaarSellClaimed { item: "Coal".to_string(), amount: 64, price: 6.0 });
    }

    #[test]
    fn inventory_full_line_classified() {
        assert_eq!(
            classify("You don't have the space required to claim that!"),
            Some(RouterEffect::InventoryFull)
        );
    }

    #[test]
    fn unrelated_lines_classify_to_nothing() {
        assert_eq!(classify("Welcome to Hypixel Skyblock!"), None);
    }

    #[tokio::test]
    async fn claimed_sell_records_trade_in_ledger() {
        let session = Arc::new(SessionStore::new());
        let ledger = Arc::new(Ledger::new());
        let handle = Arc::new(RecordingHandle::default());
        let router = EventRouter::new(session, ledger.clone(), handle);

        router.handle_line("[Bazaar] Claimed 64x Coal from your Buy Order! Bought for 5.0 coins each.");
        router.handle_line("[Bazaar] Claimed 64x Coal from your Sell Offer! Sold for 6.0 coins each.");

        let stats = ledger.stats();
        assert_eq!(stats.trade_count, 1);
        assert!((stats.total_profit - 59.2).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn order_limit_observation_debounces_before_refresh() {
        let session = Arc::new(SessionStore::new());
        let ledger = Arc::new(Ledger::new());
        let handle = Arc::new(RecordingHandle::default());
        let router = Arc::new(EventRouter::new(session, ledger, handle.clone()));

        let (chat_tx, chat_rx) = broadcast::channel(16);
        let router_clone = router.clone();
        let run_handle = tokio::spawn(async move { router_clone.run(chat_rx).await });

        chat_tx.send(ChatMessage::new("You may only have 7 buy orders!")).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        // a second observation before the debounce window elapses restarts it
        chat_tx.send(ChatMessage::new("You may only have 7 buy orders!")).unwrap();
        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(handle.order_count_refresh.load(Ordering::SeqCst), 0, "debounce should still be armed");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.order_count_refresh.load(Ordering::SeqCst), 1);

        drop(chat_tx);
        let _ = tokio::time::timeout(Duration::from_millis(100), run_handle).await;
    }
}
