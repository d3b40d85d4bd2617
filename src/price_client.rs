//! HTTP price collaborators (SPEC_FULL §6 ambient detail). A small trait
//! wrapping `reqwest::Client` so the Cookie Top-Up and Sell-Inventory
//! protocols can be driven against a fake in tests instead of a live
//! endpoint, mirroring the teacher's connector-trait pattern for REST
//! calls.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::util::rate_limit::{is_rate_limit_error, RateLimitTracker};

/// A buy/sell price snapshot for one bazaar product.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PriceSnapshot {
    #[serde(rename = "buyPrice", default)]
    pub buy_price: f64,
    #[serde(rename = "sellPrice", default)]
    pub sell_price: f64,
}

#[async_trait]
pub trait PriceClient: Send + Sync {
    async fn price_snapshot(&self, item_id: &str) -> OrchestratorResult<PriceSnapshot>;
    async fn cookie_remaining_secs(&self) -> OrchestratorResult<u64>;
}

/// Production implementation over a bare `reqwest::Client`, with the same
/// backoff contract the teacher applies to its own HTTP collaborators.
pub struct HttpPriceClient {
    http: reqwest::Client,
    price_base_url: String,
    cookie_base_url: String,
    backoff: parking_lot::Mutex<RateLimitTracker>,
}

impl HttpPriceClient {
    pub fn new(price_base_url: impl Into<String>, cookie_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            price_base_url: price_base_url.into(),
            cookie_base_url: cookie_base_url.into(),
            backoff: parking_lot::Mutex::new(RateLimitTracker::new()),
        }
    }

    fn guard(&self) -> OrchestratorResult<()> {
        let tracker = self.backoff.lock();
        if tracker.should_skip() {
            return Err(OrchestratorError::RateLimited(std::time::Duration::from_secs_f64(
                tracker.remaining_backoff_secs(),
            )));
        }
        Ok(())
    }

    fn record<T>(&self, result: &OrchestratorResult<T>) {
        let mut tracker = self.backoff.lock();
        match result {
            Ok(_) => tracker.record_success(),
            Err(e) if is_rate_limit_error(e) => tracker.record_error(),
            Err(_) => {}
        }
    }
}

#[async_trait]
impl PriceClient for HttpPriceClient {
    async fn price_snapshot(&self, item_id: &str) -> OrchestratorResult<PriceSnapshot> {
        self.guard()?;
        let url = format!("{}/{}", self.price_base_url, item_id);
        let response = self.http.get(&url).send().await.map_err(|_| OrchestratorError::TransportLost);
        let result = match response {
            Ok(resp) => resp
                .json::<PriceSnapshot>()
                .await
                .map_err(|e| OrchestratorError::SchemaRejected(e.to_string())),
            Err(e) => Err(e),
        };
        self.record(&result);
        result
    }

    async fn cookie_remaining_secs(&self) -> OrchestratorResult<u64> {
        self.guard()?;
        #[derive(Deserialize)]
        struct CookieResponse {
            #[serde(rename = "remainingSeconds", default)]
            remaining_seconds: u64,
        }
        let response = self
            .http
            .get(&self.cookie_base_url)
            .send()
            .await
            .map_err(|_| OrchestratorError::TransportLost)?
            .json::<CookieResponse>()
            .await
            .map_err(|e| OrchestratorError::SchemaRejected(e.to_string()))?;
        Ok(response.remaining_seconds)
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakePriceClient {
        pub prices: Mutex<std::collections::HashMap<String, PriceSnapshot>>,
        pub cookie_remaining_secs: Mutex<u64>,
    }

    #[async_trait]
    impl PriceClient for FakePriceClient {
        async fn price_snapshot(&self, item_id: &str) -> OrchestratorResult<PriceSnapshot> {
            Ok(self.prices.lock().get(item_id).copied().unwrap_or_default())
        }

        async fn cookie_remaining_secs(&self) -> OrchestratorResult<u64> {
            Ok(*self.cookie_remaining_secs.lock())
        }
    }
}
