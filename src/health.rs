use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub cooldown_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            opened_at: None,
        }
    }
}

impl CircuitBreakerState {
    /// `OPEN → HALF_OPEN` happens lazily on read once the cooldown elapses,
    /// checked lazily on read, not on a background timer.
    fn settled(&self, now: DateTime<Utc>) -> BreakerState {
        if self.state == BreakerState::Open {
            if let Some(opened_at) = self.opened_at {
                if (now - opened_at).num_seconds() >= self.cooldown_seconds {
                    return BreakerState::HalfOpen;
                }
            }
        }
        self.state
    }

    fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.settled(now),
            BreakerState::Closed | BreakerState::HalfOpen
        )
    }
}

/// Provider health bit (operator-set) and circuit breaker state, per
/// Two independent `DashMap`s so readers (every scheduling
/// call) never block behind the other map's writer, matching the
/// `HealthStore` shape and §5's "each lock taken independently" guarantee.
#[derive(Clone)]
pub struct ProviderHealth {
    health_bits: std::sync::Arc<DashMap<String, bool>>,
    breakers: std::sync::Arc<DashMap<String, CircuitBreakerState>>,
}

impl ProviderHealth {
    pub fn new() -> Self {
        Self {
            health_bits: std::sync::Arc::new(DashMap::new()),
            breakers: std::sync::Arc::new(DashMap::new()),
        }
    }

    pub fn is_healthy(&self, provider: &str) -> bool {
        self.health_bits
            .get(provider)
            .map(|entry| *entry)
            .unwrap_or(true)
    }

    pub fn set_healthy(&self, provider: &str, healthy: bool) {
        self.health_bits.insert(provider.to_string(), healthy);
    }

    /// Eligible iff health=true AND breaker ∈ {CLOSED, HALF_OPEN}.
    pub fn is_eligible(&self, provider: &str) -> bool {
        if !self.is_healthy(provider) {
            return false;
        }
        let now = Utc::now();
        self.breakers
            .get(provider)
            .map(|entry| entry.is_eligible(now))
            .unwrap_or(true)
    }

    pub fn breaker_snapshot(&self, provider: &str) -> CircuitBreakerState {
        let now = Utc::now();
        let mut state = self
            .breakers
            .get(provider)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        state.state = state.settled(now);
        state
    }

    pub fn record_success(&self, provider: &str) {
        let mut entry = self.breakers.entry(provider.to_string()).or_default();
        let now = Utc::now();
        entry.state = entry.settled(now);
        match entry.state {
            BreakerState::HalfOpen => {
                entry.state = BreakerState::Closed;
                entry.failure_count = 0;
                entry.opened_at = None;
            }
            BreakerState::Closed => {
                entry.failure_count = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let mut entry = self.breakers.entry(provider.to_string()).or_default();
        let now = Utc::now();
        entry.state = entry.settled(now);
        match entry.state {
            BreakerState::HalfOpen => {
                entry.state = BreakerState::Open;
                entry.opened_at = Some(now);
            }
            BreakerState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= entry.failure_threshold {
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(now);
                    tracing::warn!(provider, "circuit breaker opened");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn snapshot_all(&self) -> std::collections::HashMap<String, ProviderHealthView> {
        let mut out = std::collections::HashMap::new();
        for entry in self.health_bits.iter() {
            out.entry(entry.key().clone())
                .or_insert_with(|| ProviderHealthView {
                    healthy: *entry.value(),
                    breaker: self.breaker_snapshot(entry.key()),
                });
        }
        for entry in self.breakers.iter() {
            out.entry(entry.key().clone())
                .or_insert_with(|| ProviderHealthView {
                    healthy: self.is_healthy(entry.key()),
                    breaker: self.breaker_snapshot(entry.key()),
                });
        }
        out
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthView {
    pub healthy: bool,
    pub breaker: CircuitBreakerState,
}
