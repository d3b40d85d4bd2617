//! Profit Ledger (spec §4.8). FIFO buy/sell matching per item, producing
//! realised-profit trade records and running statistics. Grounded in the
//! teacher's `strategy/opportunity.rs` bps-based profit math, generalised
//! from a single bid/ask spread to FIFO lot matching across arbitrarily many
//! buys per item.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Hypixel Bazaar's flat sell tax (spec §4.8).
pub const TAX_RATE: f64 = 0.0125;
/// Price tolerance used when matching a cancellation against an open lot
/// (spec §4.8 `remove_cancelled`).
const CANCEL_PRICE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
struct Lot {
    price: f64,
    amount: u64,
    placed_at: Instant,
}

/// A realised buy/sell pairing produced by [`Ledger::record_sell`].
#[derive(Debug, Clone)]
pub struct Trade {
    pub item: String,
    pub amount: u64,
    pub buy_cost: f64,
    pub sell_revenue: f64,
    pub profit: f64,
    pub recorded_at: Instant,
}

/// Aggregate figures produced by [`Ledger::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerStats {
    pub trade_count: u64,
    pub total_profit: f64,
    pub average_profit: f64,
    pub profit_per_hour: f64,
}

struct ItemBook {
    open_buys: VecDeque<Lot>,
}

impl ItemBook {
    fn new() -> Self {
        Self { open_buys: VecDeque::new() }
    }
}

/// Writer: Place-Order and the Event Router's bazaar-claim handlers.
/// Reader: the periodic stats snapshot and the CSV export sink.
pub struct Ledger {
    books: Mutex<HashMap<String, ItemBook>>,
    trades: Mutex<Vec<Trade>>,
    bot_start_time: Instant,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            trades: Mutex::new(Vec::new()),
            bot_start_time: Instant::now(),
        }
    }

    #[cfg(test)]
    fn with_start_time(start: Instant) -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            trades: Mutex::new(Vec::new()),
            bot_start_time: start,
        }
    }

    /// Record an opened buy lot (spec §4.8 `record_buy`).
    pub fn record_buy(&self, item: &str, price: f64, amount: u64) {
        let mut books = self.books.lock();
        let book = books.entry(item.to_string()).or_insert_with(ItemBook::new);
        book.open_buys.push_back(Lot { price, amount, placed_at: Instant::now() });
    }

    /// FIFO-match a sell against the item's open buy lots and produce a
    /// [`Trade`] (spec §4.8 `record_sell`). If the open lots are exhausted
    /// before `amount` is satisfied, the unmatched portion is treated as
    /// zero-cost. This only happens if a sell outpaces recorded buys, which
    /// should not occur under normal operation but must not panic.
    pub fn record_sell(&self, item: &str, sell_price: f64, amount: u64) -> Trade {
        let mut remaining = amount;
        let mut buy_cost = 0.0;
        {
            let mut books = self.books.lock();
            if let Some(book) = books.get_mut(item) {
                while remaining > 0 {
                    let Some(front) = book.open_buys.front_mut() else { break };
                    let take = front.amount.min(remaining);
                    buy_cost += front.price * take as f64;
                    front.amount -= take;
                    remaining -= take;
                    if front.amount == 0 {
                        book.open_buys.pop_front();
                    }
                }
            }
        }
        if remaining > 0 {
            debug!("ledger: sell of {amount}x {item} outpaced recorded buys by {remaining}");
        }
        let sell_revenue = sell_price * amount as f64;
        let profit = sell_revenue - buy_cost - sell_revenue * TAX_RATE;
        let trade = Trade {
            item: item.to_string(),
            amount,
            buy_cost,
            sell_revenue,
            profit,
            recorded_at: Instant::now(),
        };
        self.trades.lock().push(trade.clone());
        trade
    }

    /// Remove a cancelled buy lot, matching oldest-first within
    /// `CANCEL_PRICE_TOLERANCE` of `price` (spec §4.8 `remove_cancelled`).
    /// No-op for sells; only buy orders accumulate an open lot to cancel.
    pub fn remove_cancelled(&self, item: &str, is_buy: bool, price: f64, amount: u64) {
        if !is_buy {
            return;
        }
        let mut books = self.books.lock();
        let Some(book) = books.get_mut(item) else { return };
        let mut remaining = amount;
        let mut i = 0;
        while i < book.open_buys.len() && remaining > 0 {
            let matches = (book.open_buys[i].price - price).abs() <= CANCEL_PRICE_TOLERANCE;
            if !matches {
                i += 1;
                continue;
            }
            let take = book.open_buys[i].amount.min(remaining);
            book.open_buys[i].amount -= take;
            remaining -= take;
            if book.open_buys[i].amount == 0 {
                book.open_buys.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Totals, count, average, and per-hour rate since `bot_start_time`
    /// (spec §4.8 `stats`).
    pub fn stats(&self) -> LedgerStats {
        let trades = self.trades.lock();
        let trade_count = trades.len() as u64;
        let total_profit: f64 = trades.iter().map(|t| t.profit).sum();
        let average_profit = if trade_count > 0 { total_profit / trade_count as f64 } else { 0.0 };
        let elapsed_hours = self.bot_start_time.elapsed().as_secs_f64() / 3600.0;
        let profit_per_hour = if elapsed_hours > 0.0 { total_profit / elapsed_hours } else { 0.0 };
        LedgerStats { trade_count, total_profit, average_profit, profit_per_hour }
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().clone()
    }

    /// Append every trade produced so far to a CSV trade log (spec §11.2).
    /// Intended to be called once per new trade, immediately after
    /// `record_sell`, not as a bulk replay. Callers pass just the new trade.
    pub fn append_csv(writer: &mut csv::Writer<impl std::io::Write>, trade: &Trade) -> csv::Result<()> {
        writer.write_record(&[
            trade.item.clone(),
            trade.amount.to_string(),
            format!("{:.2}", trade.buy_cost),
            format!("{:.2}", trade.sell_revenue),
            format!("{:.2}", trade.profit),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_fifo_match_matches_spec_example() {
        // S3: buy 64x COAL @5.0, sell 64x @6.0 -> profit 59.2
        let ledger = Ledger::new();
        ledger.record_buy("COAL", 5.0, 64);
        let trade = ledger.record_sell("COAL", 6.0, 64);
        assert!((trade.profit - 59.2).abs() < 1e-9, "profit was {}", trade.profit);
    }

    #[test]
    fn partial_fifo_match_across_two_lots() {
        let ledger = Ledger::new();
        ledger.record_buy("IRON_INGOT", 2.0, 10);
        ledger.record_buy("IRON_INGOT", 3.0, 10);
        let trade = ledger.record_sell("IRON_INGOT", 4.0, 15);
        // cost = 10*2.0 + 5*3.0 = 35.0, revenue = 15*4.0 = 60.0
        let expected_profit = 60.0 - 35.0 - 60.0 * TAX_RATE;
        assert!((trade.profit - expected_profit).abs() < 1e-9);
    }

    #[test]
    fn remove_cancelled_matches_within_tolerance_oldest_first() {
        let ledger = Ledger::new();
        ledger.record_buy("COAL", 5.00, 10);
        ledger.record_buy("COAL", 5.005, 10);
        ledger.remove_cancelled("COAL", true, 5.0, 12);
        // first lot (10 @ 5.00) fully consumed, second lot reduced by 2
        let trade = ledger.record_sell("COAL", 6.0, 8);
        // remaining lot has 8 @ 5.005
        let expected_cost = 8.0 * 5.005;
        assert!((trade.buy_cost - expected_cost).abs() < 1e-6);
    }

    #[test]
    fn remove_cancelled_ignores_sells() {
        let ledger = Ledger::new();
        ledger.record_buy("COAL", 5.0, 10);
        ledger.remove_cancelled("COAL", false, 5.0, 10);
        let trade = ledger.record_sell("COAL", 6.0, 10);
        assert!(trade.buy_cost > 0.0);
    }

    #[test]
    fn stats_report_totals_and_average() {
        let start = Instant::now() - Duration::from_secs(3600);
        let ledger = Ledger::with_start_time(start);
        ledger.record_buy("COAL", 5.0, 10);
        ledger.record_sell("COAL", 6.0, 10);
        ledger.record_buy("COAL", 5.0, 10);
        ledger.record_sell("COAL", 6.0, 10);
        let stats = ledger.stats();
        assert_eq!(stats.trade_count, 2);
        assert!(stats.total_profit > 0.0);
        assert!((stats.average_profit - stats.total_profit / 2.0).abs() < 1e-9);
        // ~1 hour elapsed, so per-hour rate should be close to total_profit
        assert!((stats.profit_per_hour - stats.total_profit).abs() < 1.0);
    }
}
