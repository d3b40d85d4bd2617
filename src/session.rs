//! Session Store (spec §2.4, §3). Process-wide mutable facts derived from
//! observed server state. Written by the Event Router, read by everyone
//! else (spec §5 "Shared-resource policy").

use std::time::Instant;

use parking_lot::RwLock;

/// Facts observed about the current game session (spec §3 `SessionFacts`).
#[derive(Debug, Clone)]
pub struct SessionFacts {
    pub in_realm: bool,
    pub purse: u64,
    pub max_total_orders: u32,
    pub max_buy_orders: u32,
    pub order_cooldown_until: Option<Instant>,
    pub daily_sell_limit_until: Option<Instant>,
    pub stash_warning: bool,
    pub premium_tier: Option<String>,
    pub premium_expires: Option<Instant>,
    pub connection_id: Option<String>,
}

impl Default for SessionFacts {
    fn default() -> Self {
        Self {
            in_realm: false,
            purse: 0,
            max_total_orders: 14,
            max_buy_orders: 7,
            order_cooldown_until: None,
            daily_sell_limit_until: None,
            stash_warning: false,
            premium_tier: None,
            premium_expires: None,
            connection_id: None,
        }
    }
}

impl SessionFacts {
    pub fn order_cooldown_active(&self, now: Instant) -> bool {
        self.order_cooldown_until.map_or(false, |until| now < until)
    }

    pub fn daily_sell_limit_active(&self, now: Instant) -> bool {
        self.daily_sell_limit_until.map_or(false, |until| now < until)
    }
}

/// Process-wide mutable store. `grace_period` and `joined_realm` gate
/// whether the Orchestrator accepts any work at all (spec I4); the rest of
/// `SessionFacts` governs individual Window Protocol preconditions.
pub struct SessionStore {
    inner: RwLock<SessionFacts>,
    grace_period: std::sync::atomic::AtomicBool,
    joined_realm: std::sync::atomic::AtomicBool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SessionFacts::default()),
            grace_period: std::sync::atomic::AtomicBool::new(true),
            joined_realm: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> SessionFacts {
        self.inner.read().clone()
    }

    pub fn mutate(&self, f: impl FnOnce(&mut SessionFacts)) {
        f(&mut self.inner.write());
    }

    pub fn is_grace_period(&self) -> bool {
        self.grace_period.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn end_grace_period(&self) {
        self.grace_period.store(false, std::sync::atomic::Ordering::Release);
    }

    pub fn has_joined_realm(&self) -> bool {
        self.joined_realm.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn mark_joined_realm(&self) {
        self.joined_realm.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Reset per-login facts on reconnect, preserving the persistent ones
    /// (spec §3 "Lifecycles": "reset except for persistent facts").
    pub fn reset_for_new_login(&self) {
        let connection_id = self.inner.read().connection_id.clone();
        let mut facts = self.inner.write();
        *facts = SessionFacts { connection_id, ..SessionFacts::default() };
        self.grace_period.store(true, std::sync::atomic::Ordering::Release);
        self.joined_realm.store(false, std::sync::atomic::Ordering::Release);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_grace_period_and_not_joined() {
        let store = SessionStore::new();
        assert!(store.is_grace_period());
        assert!(!store.has_joined_realm());
    }

    #[test]
    fn reset_preserves_connection_id_only() {
        let store = SessionStore::new();
        store.mutate(|f| {
            f.purse = 500;
            f.connection_id = Some("abc".to_string());
            f.max_buy_orders = 9;
        });
        store.end_grace_period();
        store.mark_joined_realm();
        store.reset_for_new_login();

        let snap = store.snapshot();
        assert_eq!(snap.purse, 0);
        assert_eq!(snap.max_buy_orders, 7);
        assert_eq!(snap.connection_id, Some("abc".to_string()));
        assert!(store.is_grace_period());
        assert!(!store.has_joined_realm());
    }

    #[test]
    fn cooldown_active_respects_instant() {
        let facts = SessionFacts {
            order_cooldown_until: Some(Instant::now() + std::time::Duration::from_secs(60)),
            ..SessionFacts::default()
        };
        assert!(facts.order_cooldown_active(Instant::now()));
        assert!(!facts.order_cooldown_active(Instant::now() + std::time::Duration::from_secs(61)));
    }
}
