//! Wire envelope and inbound/outbound message shapes (spec §6).

use serde::{Deserialize, Serialize};

use crate::types::{AuctionSnipe, BazaarRecommendation};

/// The bidirectional framed-message envelope (spec §6): `data` is JSON
/// re-encoded as a string rather than a nested object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: String,
}

impl Envelope {
    pub fn new(type_: impl Into<String>, data: impl Serialize) -> Self {
        Self { type_: type_.into(), data: serde_json::to_string(&data).unwrap_or_default() }
    }
}

/// One chat component as sent by `chatMessage`/`writeToChat` (spec §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatComponent {
    pub text: String,
    #[serde(rename = "onClick", default)]
    pub on_click: Option<String>,
    #[serde(default)]
    pub hover: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuctionSpec {
    pub item_name: String,
    pub price: u64,
    #[serde(default)]
    pub bin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeSpec {
    pub target: String,
    #[serde(default)]
    pub slots: Vec<u32>,
    #[serde(default)]
    pub coins: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivacySettings {
    #[serde(rename = "chatRegex")]
    pub chat_pattern: String,
}

/// A parsed, routable inbound Control-Link message (spec §6 table). Both
/// `flip` and the four bazaar-recommendation aliases decode through the
/// schema-tolerant wire types in [`crate::types`] before reaching here;
/// by the time an `InboundMessage` exists it is already well-formed.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Flip(AuctionSnipe),
    ChatMessage(Vec<ChatComponent>),
    WriteToChat(ChatComponent),
    SwapProfile(serde_json::Value),
    CreateAuction(CreateAuctionSpec),
    Trade(TradeSpec),
    TradeResponse,
    GetInventory,
    Execute(String),
    PrivacySettings(PrivacySettings),
    BazaarFlip(BazaarRecommendation),
    PlaceOrder(BazaarRecommendation),
    BzRecommend(BazaarRecommendation),
    GetBazaarFlips(Vec<BazaarRecommendation>),
}

/// Outbound event types (spec §6 "Outbound events").
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Report(serde_json::Value),
    UploadInventory(serde_json::Value),
    UploadTab(serde_json::Value),
    UploadScoreboard(Vec<String>),
    ChatBatch(Vec<String>),
    ClientError(String),
    GetBazaarFlips,
}

impl OutboundEvent {
    pub fn into_envelope(self) -> Envelope {
        match self {
            OutboundEvent::Report(v) => Envelope::new("report", v),
            OutboundEvent::UploadInventory(v) => Envelope::new("uploadInventory", v),
            OutboundEvent::UploadTab(v) => Envelope::new("uploadTab", v),
            OutboundEvent::UploadScoreboard(lines) => Envelope::new("uploadScoreboard", lines),
            OutboundEvent::ChatBatch(lines) => Envelope::new("chatBatch", lines),
            OutboundEvent::ClientError(msg) => Envelope::new("clientError", msg),
            OutboundEvent::GetBazaarFlips => Envelope::new("getbazaarflips", ""),
        }
    }
}
