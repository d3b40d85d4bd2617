//! The BotState mutual-exclusion token (spec §3, invariants I1–I2).
//!
//! Only the Queue mutates this; every other component only reads it. An
//! atomic mirror of the discriminant is kept alongside the authoritative
//! value so latency-sensitive polling loops (the slot-31 poll in the AH
//! Snipe protocol) can check "are we still the one driving a window"
//! without taking a lock, the way the teacher crate keeps `status_atomic`
//! next to `BotStatus` for its own 1kHz hot path.

use std::sync::atomic::{AtomicU8, Ordering};

/// Tagged variant of "what is the client doing right now" (spec §3). At
/// most one of these holds the GUI-window mutual-exclusion token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStateValue {
    GracePeriod,
    Startup,
    Purchasing,
    Claiming,
    SellBz,
    Trading,
    Idle,
}

impl BotStateValue {
    fn discriminant(self) -> u8 {
        match self {
            BotStateValue::GracePeriod => 0,
            BotStateValue::Startup => 1,
            BotStateValue::Purchasing => 2,
            BotStateValue::Claiming => 3,
            BotStateValue::SellBz => 4,
            BotStateValue::Trading => 5,
            BotStateValue::Idle => 6,
        }
    }

    fn from_discriminant(d: u8) -> Self {
        match d {
            0 => BotStateValue::GracePeriod,
            1 => BotStateValue::Startup,
            2 => BotStateValue::Purchasing,
            3 => BotStateValue::Claiming,
            4 => BotStateValue::SellBz,
            5 => BotStateValue::Trading,
            _ => BotStateValue::Idle,
        }
    }

    pub fn is_idle(self) -> bool {
        matches!(self, BotStateValue::Idle)
    }
}

/// Owned mutual-exclusion token. The Queue is the only writer (spec I2);
/// every exit path of a Window Protocol (success, failure, timeout,
/// preemption) must route back through `set(Idle)`.
#[derive(Debug)]
pub struct BotState {
    atomic: AtomicU8,
}

impl BotState {
    pub fn new() -> Self {
        // Clients start in the grace period immediately after login.
        Self { atomic: AtomicU8::new(BotStateValue::GracePeriod.discriminant()) }
    }

    pub fn get(&self) -> BotStateValue {
        BotStateValue::from_discriminant(self.atomic.load(Ordering::Acquire))
    }

    pub fn set(&self, value: BotStateValue) {
        self.atomic.store(value.discriminant(), Ordering::Release);
    }

    pub fn is_idle(&self) -> bool {
        self.get().is_idle()
    }

    /// Atomically transition only if currently in `expected`. Used by the
    /// Queue's `run_loop` to claim the token before running an executor
    /// without a separate lock (spec I2: "BotState transitions from Idle
    /// only via the Queue").
    pub fn try_transition(&self, expected: BotStateValue, next: BotStateValue) -> bool {
        self.atomic
            .compare_exchange(
                expected.discriminant(),
                next.discriminant(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for BotState {
    fn default() -> Self {
        Self::new()
    }
}
