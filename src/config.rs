//! Configuration (spec §6 "Configuration keys (persistent)", SPEC_FULL §10.3).
//! Loaded the way the teacher loads its own `Config`: `dotenv` for secrets,
//! a JSON file for the persisted keys, then `validate()` before the bot
//! proceeds.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Persisted, operator-editable configuration (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub player: String,
    pub client_version: String,
    pub control_link_base_url: String,

    #[serde(default = "default_true")]
    pub bazaar_enabled: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(default)]
    pub cookie_topup_enabled: bool,
    #[serde(default = "default_cookie_threshold_secs")]
    pub cookie_threshold_secs: u64,

    #[serde(default = "default_order_price_drift")]
    pub order_price_drift: f64,

    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,

    #[serde(default = "default_profit_report_interval_secs")]
    pub profit_report_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_cookie_threshold_secs() -> u64 {
    3600
}
fn default_order_price_drift() -> f64 {
    0.05
}
fn default_tax_rate() -> f64 {
    0.0125
}
fn default_profit_report_interval_secs() -> u64 {
    30 * 60
}

impl Config {
    /// Load secrets from the environment (`dotenv`) and persisted settings
    /// from `config.json`, mirroring `XemmBot::new`'s load order.
    pub fn load_default() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load_from(Path::new("config.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Reject an unusable configuration before the bot proceeds (spec §10.3:
    /// "mandatory-key-absent is a hard error with a clear message").
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.player.trim().is_empty(), "player must not be empty");
        anyhow::ensure!(!self.client_version.trim().is_empty(), "client_version must not be empty");
        anyhow::ensure!(
            !self.control_link_base_url.trim().is_empty(),
            "control_link_base_url must not be empty"
        );
        anyhow::ensure!(
            self.control_link_base_url.starts_with("ws://") || self.control_link_base_url.starts_with("wss://"),
            "control_link_base_url must be a ws:// or wss:// URL"
        );
        anyhow::ensure!(self.order_price_drift > 0.0, "order_price_drift must be positive");
        anyhow::ensure!(self.tax_rate >= 0.0 && self.tax_rate < 1.0, "tax_rate must be in [0, 1)");
        Ok(())
    }

    pub fn cookie_threshold(&self) -> Duration {
        Duration::from_secs(self.cookie_threshold_secs)
    }

    pub fn profit_report_interval(&self) -> Duration {
        Duration::from_secs(self.profit_report_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "player": "Tester",
            "client_version": "1.0.0",
            "control_link_base_url": "wss://example.invalid/link"
        })
    }

    #[test]
    fn validates_a_minimal_well_formed_config() {
        let config: Config = serde_json::from_value(base_json()).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.bazaar_enabled);
        assert_eq!(config.cookie_threshold(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_missing_mandatory_key() {
        let mut value = base_json();
        value.as_object_mut().unwrap().remove("player");
        let result: Result<Config, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_websocket_base_url() {
        let mut value = base_json();
        value["control_link_base_url"] = serde_json::json!("https://example.invalid/link");
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(config.validate().is_err());
    }
}
