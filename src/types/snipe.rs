use std::time::Instant;

/// An auction house snipe recommendation, arriving over the Control-Link as
/// a `flip` message (spec §3, §6).
#[derive(Debug, Clone)]
pub struct AuctionSnipe {
    pub auction_id: String,
    pub item_name: String,
    pub starting_bid: u64,
    pub target_sell_price: u64,
    pub finder_tag: String,
    pub profit_percentage: f64,
    /// Instant to act at; `None` means "now".
    pub purchase_at: Option<Instant>,
}

impl AuctionSnipe {
    pub fn profit(&self) -> i64 {
        self.target_sell_price as i64 - self.starting_bid as i64
    }

    pub fn profit_pct(&self) -> f64 {
        self.profit_percentage
    }
}

/// Wire payload for the `flip` Control-Link message (spec §6). Kept distinct
/// from `AuctionSnipe` because `purchaseAt` arrives as an epoch-millis
/// integer (0 meaning "now") rather than a monotonic `Instant`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AuctionSnipeWire {
    #[serde(rename = "id")]
    pub auction_id: String,
    #[serde(rename = "itemName")]
    pub item_name: String,
    #[serde(rename = "startingBid")]
    pub starting_bid: u64,
    pub target: u64,
    pub finder: String,
    #[serde(rename = "purchaseAt", default)]
    pub purchase_at_ms: u64,
    #[serde(rename = "profitPercentage", default)]
    pub profit_percentage: f64,
}

impl AuctionSnipeWire {
    /// Convert to the internal representation. `now` and `now_ms` let the
    /// caller supply both clock bases without this function touching the
    /// wall clock itself (keeps it unit-testable).
    pub fn into_snipe(self, now: Instant, now_ms: u64) -> AuctionSnipe {
        let purchase_at = if self.purchase_at_ms == 0 || self.purchase_at_ms <= now_ms {
            None
        } else {
            Some(now + std::time::Duration::from_millis(self.purchase_at_ms - now_ms))
        };
        let profit_percentage = if self.profit_percentage != 0.0 {
            self.profit_percentage
        } else if self.starting_bid > 0 {
            (self.target as f64 - self.starting_bid as f64) / self.starting_bid as f64 * 100.0
        } else {
            0.0
        };
        AuctionSnipe {
            auction_id: self.auction_id,
            item_name: self.item_name,
            starting_bid: self.starting_bid,
            target_sell_price: self.target,
            finder_tag: self.finder,
            profit_percentage,
            purchase_at,
        }
    }
}
