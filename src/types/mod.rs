//! Shared domain data types (spec §3).

mod bazaar;
mod container;
mod scoreboard;
mod snipe;

pub use bazaar::{
    BazaarRecommendation, BazaarRecommendationError, BazaarRecommendationWire, Order, OrderSide,
    OrderState,
};
pub use container::{ContainerSnapshot, Slot, SlotKind};
pub use scoreboard::ScoreboardSnapshot;
pub use snipe::{AuctionSnipe, AuctionSnipeWire};
