use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use axum::http::uri::{Authority, Scheme};
use serde::Serialize;
use thiserror::Error;

use crate::config::RouteRecord;

// -----------------------------------------------------------------------------
// ----- GatewayPools ----------------------------------------------------------

/// Every route's target pool, keyed by route name.
#[derive(Debug, Default)]
pub struct GatewayPools {
    pools: HashMap<String, Arc<TargetPool>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub targets: Vec<String>,
    pub dispatched: u64,
}

impl GatewayPools {
    pub fn new(routes: &[RouteRecord]) -> Result<Self, PoolError> {
        let mut pools = HashMap::with_capacity(routes.len());
        for route in routes {
            let pool = TargetPool::new(route.name.clone(), route.targets.clone())?;
            pools.insert(route.name.clone(), Arc::new(pool));
        }

        Ok(Self { pools })
    }

    pub fn get(&self, route_name: &str) -> Option<Arc<TargetPool>> {
        self.pools.get(route_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn snapshot(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools.values().map(|p| p.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

// -----------------------------------------------------------------------------
// ----- TargetPool ------------------------------------------------------------

/// A route's backend replicas plus the round-robin cursor.
///
/// Selection never blocks: the cursor is a single atomic increment, so
/// concurrent dispatches each get a distinct slot.
#[derive(Debug)]
pub struct TargetPool {
    name: String,
    targets: Vec<BackendTarget>,
    cursor: AtomicUsize,
    dispatched: AtomicU64,
}

impl TargetPool {
    pub fn new(name: impl Into<String>, targets: Vec<BackendTarget>) -> Result<Self, PoolError> {
        let name = name.into();
        if targets.is_empty() {
            return Err(PoolError::EmptyPool { name });
        }

        Ok(Self {
            name,
            targets,
            cursor: AtomicUsize::new(0),
            dispatched: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[BackendTarget] {
        &self.targets
    }

    /// Next target in rotation. Advances the cursor by exactly one.
    pub fn next(&self) -> &BackendTarget {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        &self.targets[slot % self.targets.len()]
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.name.clone(),
            targets: self.targets.iter().map(ToString::to_string).collect(),
            dispatched: self.dispatched.load(Ordering::Relaxed),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- BackendTarget ---------------------------------------------------------

/// One backend replica: `[scheme://]host[:port]`, scheme defaulting to http.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub scheme: Scheme,
    pub authority: Authority,
}

impl FromStr for BackendTarget {
    type Err = PoolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PoolError::InvalidTarget {
            target: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim().trim_end_matches('/');
        let (scheme, rest) = match trimmed.split_once("://") {
            Some(("http", rest)) => (Scheme::HTTP, rest),
            Some(("https", rest)) => (Scheme::HTTPS, rest),
            Some((other, _)) => return Err(invalid(&format!("unsupported scheme {other:?}"))),
            None => (Scheme::HTTP, trimmed),
        };

        if rest.is_empty() {
            return Err(invalid("missing host"));
        }
        if rest.contains(['/', '?', '#']) {
            return Err(invalid("targets carry no path"));
        }

        let authority = rest
            .parse::<Authority>()
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self { scheme, authority })
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("route '{name}' has no backend targets")]
    EmptyPool { name: String },

    #[error("invalid backend target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
