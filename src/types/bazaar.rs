use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Open,
    FilledUnclaimed,
    Claimed,
    Cancelled,
}

/// A recommendation to place a bazaar order (spec §3). Amount and price are
/// validated positive at construction time: `BazaarRecommendation` values
/// in circulation are always well-formed; malformed wire payloads are
/// rejected before they become one (spec §7 "Schema rejection").
#[derive(Debug, Clone)]
pub struct BazaarRecommendation {
    pub item_name: String,
    pub amount: u32,
    pub price_per_unit: f64,
    pub is_buy_order: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BazaarRecommendationError {
    #[error("missing or empty item name")]
    MissingName,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("price must be positive")]
    NonPositivePrice,
}

/// An order the Orchestrator has placed and is tracking (spec §3).
#[derive(Debug, Clone)]
pub struct Order {
    pub item_name: String,
    pub side: OrderSide,
    pub price_per_unit: f64,
    pub amount_total: u32,
    pub amount_filled: u32,
    pub state: OrderState,
    pub placed_at: Instant,
}

impl Order {
    pub fn new(rec: &BazaarRecommendation, now: Instant) -> Self {
        Self {
            item_name: rec.item_name.clone(),
            side: if rec.is_buy_order { OrderSide::Buy } else { OrderSide::Sell },
            price_per_unit: rec.price_per_unit,
            amount_total: rec.amount,
            amount_filled: 0,
            state: OrderState::Open,
            placed_at: now,
        }
    }

    pub fn is_fully_filled(&self) -> bool {
        self.amount_filled >= self.amount_total
    }
}

/// Schema-tolerant wire shape for `bazaarFlip` / `placeOrder` / `bzRecommend`
/// / `getbazaarflips` payloads (spec §6). All four observed field-name
/// variants for the same semantic tuple decode into this one struct via
/// serde aliases; only the order-side encoding genuinely varies in *shape*
/// (bool vs. string) so that resolution happens in `resolve()`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BazaarRecommendationWire {
    #[serde(alias = "itemName", alias = "name")]
    pub item: Option<String>,

    #[serde(alias = "count", alias = "quantity")]
    pub amount: Option<serde_json::Value>,

    #[serde(alias = "price", alias = "unitPrice")]
    pub price_per_unit: Option<serde_json::Value>,

    #[serde(rename = "isBuyOrder")]
    pub is_buy_order: Option<bool>,

    #[serde(rename = "type")]
    pub type_: Option<String>,

    #[serde(rename = "orderType")]
    pub order_type: Option<String>,

    #[serde(rename = "totalPrice")]
    pub total_price: Option<serde_json::Value>,
}

fn as_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => fast_float::parse(s.trim()).ok(),
        _ => None,
    }
}

impl BazaarRecommendationWire {
    /// Resolve the order side across the three observed encodings. `true`
    /// wins on ambiguity since `isBuyOrder` is the most explicit signal;
    /// otherwise falls back to a case-insensitive "buy"/"sell" string match
    /// from whichever of `type`/`orderType` is present.
    fn resolve_side(&self) -> Option<bool> {
        if let Some(b) = self.is_buy_order {
            return Some(b);
        }
        let side_str = self.type_.as_deref().or(self.order_type.as_deref())?;
        match side_str.to_ascii_lowercase().as_str() {
            "buy" => Some(true),
            "sell" => Some(false),
            _ => None,
        }
    }

    pub fn resolve(self) -> Result<BazaarRecommendation, BazaarRecommendationError> {
        let item_name = self
            .item
            .filter(|s| !s.trim().is_empty())
            .ok_or(BazaarRecommendationError::MissingName)?;

        let amount = self
            .amount
            .as_ref()
            .and_then(as_f64)
            .map(|f| f as u32)
            .filter(|&a| a > 0)
            .ok_or(BazaarRecommendationError::NonPositiveAmount)?;

        let price_per_unit = self
            .price_per_unit
            .as_ref()
            .and_then(as_f64)
            .or_else(|| {
                // price absent but totalPrice present: derive per-unit.
                self.total_price.as_ref().and_then(as_f64).map(|t| t / amount as f64)
            })
            .filter(|&p| p > 0.0)
            .ok_or(BazaarRecommendationError::NonPositivePrice)?;

        let is_buy_order = self.resolve_side().unwrap_or(true);

        Ok(BazaarRecommendation { item_name, amount, price_per_unit, is_buy_order })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<BazaarRecommendation, BazaarRecommendationError> {
        let wire: BazaarRecommendationWire = serde_json::from_str(json).unwrap();
        wire.resolve()
    }

    #[test]
    fn all_four_schema_variants_produce_identical_records() {
        let variants = [
            r#"{"item":"COAL","amount":64,"pricePerUnit":5.0,"isBuyOrder":true}"#,
            r#"{"itemName":"COAL","count":64,"price":5.0,"isBuyOrder":true}"#,
            r#"{"name":"COAL","quantity":64,"unitPrice":5.0,"type":"buy"}"#,
            r#"{"name":"COAL","quantity":64,"unitPrice":5.0,"orderType":"buy"}"#,
        ];
        let parsed: Vec<_> = variants.iter().map(|v| parse(v).unwrap()).collect();
        for rec in &parsed[1..] {
            assert_eq!(rec.item_name, parsed[0].item_name);
            assert_eq!(rec.amount, parsed[0].amount);
            assert!((rec.price_per_unit - parsed[0].price_per_unit).abs() < 1e-9);
            assert_eq!(rec.is_buy_order, parsed[0].is_buy_order);
        }
    }

    #[test]
    fn derives_total_price_when_per_unit_absent() {
        let rec = parse(r#"{"item":"IRON_INGOT","amount":10,"totalPrice":50.0,"type":"sell"}"#).unwrap();
        assert!((rec.price_per_unit - 5.0).abs() < 1e-9);
        assert!(!rec.is_buy_order);
    }

    #[test]
    fn rejects_missing_name() {
        let err = parse(r#"{"amount":10,"price":5.0}"#).unwrap_err();
        assert_eq!(err, BazaarRecommendationError::MissingName);
    }

    #[test]
    fn rejects_zero_amount() {
        let err = parse(r#"{"item":"COAL","amount":0,"price":5.0}"#).unwrap_err();
        assert_eq!(err, BazaarRecommendationError::NonPositiveAmount);
    }

    #[test]
    fn rejects_zero_price() {
        let err = parse(r#"{"item":"COAL","amount":10,"price":0}"#).unwrap_err();
        assert_eq!(err, BazaarRecommendationError::NonPositivePrice);
    }
}
