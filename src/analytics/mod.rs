use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub sign_ins: u64,
    pub proxied: u64,
    pub upstream_failures: u64,
    pub events_delivered: u64,
    pub events_malformed: u64,
}

static SIGN_IN: AtomicU64 = AtomicU64::new(0);
static PROXIED: AtomicU64 = AtomicU64::new(0);
static UPSTREAM_FAILURE: AtomicU64 = AtomicU64::new(0);
static EVENT_DELIVERED: AtomicU64 = AtomicU64::new(0);
static EVENT_MALFORMED: AtomicU64 = AtomicU64::new(0);

pub fn inc_sign_in() {
    SIGN_IN.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_proxied() {
    PROXIED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_upstream_failure() {
    UPSTREAM_FAILURE.fetch_add(1, Ordering::Relaxed);
}

pub fn add_events_delivered(n: u64) {
    EVENT_DELIVERED.fetch_add(n, Ordering::Relaxed);
}

pub fn inc_event_malformed() {
    EVENT_MALFORMED.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> GatewayStats {
    GatewayStats {
        sign_ins: SIGN_IN.load(Ordering::Relaxed),
        proxied: PROXIED.load(Ordering::Relaxed),
        upstream_failures: UPSTREAM_FAILURE.load(Ordering::Relaxed),
        events_delivered: EVENT_DELIVERED.load(Ordering::Relaxed),
        events_malformed: EVENT_MALFORMED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-wide and other tests bump them too, so only
    // check that each increment is visible.
    #[test]
    fn counters_move_forward() {
        let before = snapshot();

        inc_sign_in();
        inc_proxied();
        inc_proxied();
        inc_upstream_failure();
        add_events_delivered(3);
        inc_event_malformed();

        let after = snapshot();
        assert!(after.sign_ins >= before.sign_ins + 1);
        assert!(after.proxied >= before.proxied + 2);
        assert!(after.upstream_failures >= before.upstream_failures + 1);
        assert!(after.events_delivered >= before.events_delivered + 3);
        assert!(after.events_malformed >= before.events_malformed + 1);
    }
}
