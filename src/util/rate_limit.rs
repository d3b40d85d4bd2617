//! Exponential backoff for the HTTP collaborators Window Protocols call
//! (price snapshot, product-price/cookie endpoints). Grounded in the
//! teacher's `order_monitor.rs` usage (`RateLimitTracker::new`,
//! `should_skip`, `record_success`/`record_error`, `get_backoff_secs`).

use std::time::{Duration, Instant};

use crate::error::OrchestratorError;

const BASE_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

pub struct RateLimitTracker {
    consecutive_errors: u32,
    backoff_until: Option<Instant>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self { consecutive_errors: 0, backoff_until: None }
    }

    pub fn should_skip(&self) -> bool {
        self.backoff_until.map(|until| Instant::now() < until).unwrap_or(false)
    }

    pub fn remaining_backoff_secs(&self) -> f64 {
        match self.backoff_until {
            Some(until) => (until.saturating_duration_since(Instant::now())).as_secs_f64(),
            None => 0.0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.backoff_until = None;
    }

    pub fn record_error(&mut self) {
        self.consecutive_errors += 1;
        let backoff = self.get_backoff_secs();
        self.backoff_until = Some(Instant::now() + Duration::from_secs(backoff));
    }

    pub fn get_backoff_secs(&self) -> u64 {
        let shift = self.consecutive_errors.min(6);
        (BASE_BACKOFF_SECS << shift).min(MAX_BACKOFF_SECS)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_rate_limit_error(err: &OrchestratorError) -> bool {
    matches!(err, OrchestratorError::RateLimited(_))
}
