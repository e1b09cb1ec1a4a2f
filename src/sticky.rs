use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::types::{Claim, Placement, PlacementReason, ServiceRequest};

/// Everything a `status`/`failover` call needs to recover, keyed by
/// `{product, namespace, name}` — the originating request (so failover can
/// re-run the scheduler against the same cell/tier/ha), the placement it
/// produced, the audit reason, and the emitted Claim itself.
#[derive(Debug, Clone)]
pub struct StickyRecord {
    pub product: String,
    pub request: ServiceRequest,
    pub placement: Placement,
    pub reason: PlacementReason,
    pub claim: Claim,
}

/// Pluggable persistence boundary for sticky placements, mirrored on the
/// an `async_trait`-based pluggable backend: callers depend on this
/// trait, never on a concrete store, so an external database-backed
/// implementation can replace the in-memory default without touching the
/// scheduler or the API layer. All lookups are scoped by
/// `{product, namespace, name}` — the same product name never collides
/// with another product's claim for an identical `{namespace, name}` pair.
#[async_trait]
pub trait StickyStore: Send + Sync {
    async fn get_record(&self, product: &str, namespace: &str, name: &str) -> Option<StickyRecord>;
    async fn apply_record(&self, record: StickyRecord);
    async fn delete_record(&self, product: &str, namespace: &str, name: &str) -> bool;
    async fn connection_secret_exists(&self, product: &str, namespace: &str, name: &str) -> bool;
}

/// Default standalone-mode backend (a "return-only" posture:
/// the control plane does not itself own orchestrator state, it only
/// remembers the last Claim it emitted so repeat requests for the same
/// product/namespace/name stay on their original placement).
#[derive(Clone, Default)]
pub struct InMemoryStickyStore {
    records: Arc<DashMap<(String, String, String), StickyRecord>>,
}

impl InMemoryStickyStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl StickyStore for InMemoryStickyStore {
    async fn get_record(&self, product: &str, namespace: &str, name: &str) -> Option<StickyRecord> {
        self.records
            .get(&(product.to_string(), namespace.to_string(), name.to_string()))
            .map(|entry| entry.clone())
    }

    async fn apply_record(&self, record: StickyRecord) {
        let key = (
            record.product.clone(),
            record.claim.metadata.namespace.clone(),
            record.claim.metadata.name.clone(),
        );
        self.records.insert(key, record);
    }

    async fn delete_record(&self, product: &str, namespace: &str, name: &str) -> bool {
        self.records
            .remove(&(product.to_string(), namespace.to_string(), name.to_string()))
            .is_some()
    }

    async fn connection_secret_exists(&self, product: &str, namespace: &str, name: &str) -> bool {
        self.records
            .contains_key(&(product.to_string(), namespace.to_string(), name.to_string()))
    }
}
