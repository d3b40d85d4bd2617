//! Envelope → `InboundMessage` decoding (spec §6), including the
//! schema-tolerance rules for `BazaarRecommendation` and the observed
//! JSON-string-wrapping quirk on `bzRecommend` (spec Q3).

use serde::de::DeserializeOwned;

use crate::error::OrchestratorError;
use crate::types::{AuctionSnipeWire, BazaarRecommendationError, BazaarRecommendationWire};

use super::envelope::{
    ChatComponent, CreateAuctionSpec, Envelope, InboundMessage, PrivacySettings, TradeSpec,
};

/// Parse `data` as `T` directly, falling back to treating `data` as a
/// JSON-encoded string that itself contains the JSON for `T` (spec Q3:
/// "raw object vs JSON-string-wrapped").
fn parse_flexible<T: DeserializeOwned>(data: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str::<T>(data) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            if let Ok(inner) = serde_json::from_str::<String>(data) {
                serde_json::from_str::<T>(&inner)
            } else {
                Err(first_err)
            }
        }
    }
}

fn resolve_bazaar(
    data: &str,
) -> Result<crate::types::BazaarRecommendation, OrchestratorError> {
    let wire: BazaarRecommendationWire =
        parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
    wire.resolve().map_err(|e: BazaarRecommendationError| OrchestratorError::SchemaRejected(e.to_string()))
}

/// `getbazaarflips` accepts either a single recommendation object or an
/// array of them (spec §6).
fn resolve_bazaar_many(data: &str) -> Result<Vec<crate::types::BazaarRecommendation>, OrchestratorError> {
    let value: serde_json::Value =
        parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
    let wires: Vec<BazaarRecommendationWire> = if value.is_array() {
        serde_json::from_value(value).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?
    } else {
        vec![serde_json::from_value(value).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?]
    };
    wires
        .into_iter()
        .map(|w| w.resolve().map_err(|e| OrchestratorError::SchemaRejected(e.to_string())))
        .collect()
}

/// Decode a raw envelope into a routable message. Unknown `type` values and
/// malformed payloads are rejected (spec §7 "Schema rejection") rather than
/// causing a panic.
pub fn decode(envelope: &Envelope, now: std::time::Instant, now_ms: u64) -> Result<InboundMessage, OrchestratorError> {
    let data = envelope.data.as_str();
    match envelope.type_.as_str() {
        "flip" => {
            let wire: AuctionSnipeWire =
                parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
            Ok(InboundMessage::Flip(wire.into_snipe(now, now_ms)))
        }
        "chatMessage" => {
            let components: Vec<ChatComponent> =
                parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
            Ok(InboundMessage::ChatMessage(components))
        }
        "writeToChat" => {
            let component: ChatComponent =
                parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
            Ok(InboundMessage::WriteToChat(component))
        }
        "swapProfile" => {
            let value: serde_json::Value = serde_json::from_str(data).unwrap_or(serde_json::Value::Null);
            Ok(InboundMessage::SwapProfile(value))
        }
        "createAuction" => {
            let spec: CreateAuctionSpec =
                parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
            Ok(InboundMessage::CreateAuction(spec))
        }
        "trade" => {
            let spec: TradeSpec =
                parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
            Ok(InboundMessage::Trade(spec))
        }
        "tradeResponse" => Ok(InboundMessage::TradeResponse),
        "getInventory" => Ok(InboundMessage::GetInventory),
        "execute" => {
            let command: String = parse_flexible(data).unwrap_or_else(|_| data.to_string());
            Ok(InboundMessage::Execute(command))
        }
        "privacySettings" => {
            let settings: PrivacySettings =
                parse_flexible(data).map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
            Ok(InboundMessage::PrivacySettings(settings))
        }
        "bazaarFlip" => Ok(InboundMessage::BazaarFlip(resolve_bazaar(data)?)),
        "placeOrder" => Ok(InboundMessage::PlaceOrder(resolve_bazaar(data)?)),
        "bzRecommend" => Ok(InboundMessage::BzRecommend(resolve_bazaar(data)?)),
        "getbazaarflips" => Ok(InboundMessage::GetBazaarFlips(resolve_bazaar_many(data)?)),
        other => Err(OrchestratorError::SchemaRejected(format!("unknown message type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(type_: &str, data: &str) -> Envelope {
        Envelope { type_: type_.to_string(), data: data.to_string() }
    }

    #[test]
    fn decodes_raw_object_bz_recommend() {
        let e = env("bzRecommend", r#"{"item":"COAL","amount":64,"price":5.0,"isBuyOrder":true}"#);
        let msg = decode(&e, std::time::Instant::now(), 0).unwrap();
        assert!(matches!(msg, InboundMessage::BzRecommend(_)));
    }

    #[test]
    fn decodes_json_string_wrapped_bz_recommend() {
        let inner = r#"{"item":"COAL","amount":64,"price":5.0,"isBuyOrder":true}"#;
        let wrapped = serde_json::to_string(inner).unwrap();
        let e = env("bzRecommend", &wrapped);
        let msg = decode(&e, std::time::Instant::now(), 0).unwrap();
        assert!(matches!(msg, InboundMessage::BzRecommend(_)));
    }

    #[test]
    fn getbazaarflips_accepts_single_or_array() {
        let single = env("getbazaarflips", r#"{"item":"COAL","amount":1,"price":1.0,"isBuyOrder":true}"#);
        match decode(&single, std::time::Instant::now(), 0).unwrap() {
            InboundMessage::GetBazaarFlips(v) => assert_eq!(v.len(), 1),
            _ => panic!("wrong variant"),
        }

        let many = env(
            "getbazaarflips",
            r#"[{"item":"COAL","amount":1,"price":1.0,"isBuyOrder":true},{"item":"IRON_INGOT","amount":2,"price":2.0,"isBuyOrder":false}]"#,
        );
        match decode(&many, std::time::Instant::now(), 0).unwrap() {
            InboundMessage::GetBazaarFlips(v) => assert_eq!(v.len(), 2),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let e = env("unknownType", "{}");
        assert!(decode(&e, std::time::Instant::now(), 0).is_err());
    }

    #[test]
    fn flip_parses_full_schema() {
        let e = env(
            "flip",
            r#"{"id":"A","itemName":"Sword","startingBid":1000,"target":5000,"finder":"USER","purchaseAt":0}"#,
        );
        match decode(&e, std::time::Instant::now(), 0).unwrap() {
            InboundMessage::Flip(snipe) => {
                assert_eq!(snipe.auction_id, "A");
                assert_eq!(snipe.profit(), 4000);
            }
            _ => panic!("wrong variant"),
        }
    }
}
