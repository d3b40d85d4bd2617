//! Window Protocols (spec §4.2-§4.9). One state machine per GUI
//! interaction, all sharing the suspension-point helpers in `support`.

pub mod support;

pub mod bazaar_claim_cancel;
pub mod bazaar_place_order;
pub mod claim_sold;
pub mod cookie_topup;
pub mod inventory_recovery;
pub mod sell_inventory;
pub mod snipe;
pub mod startup_reconcile;
pub mod thin_routes;
