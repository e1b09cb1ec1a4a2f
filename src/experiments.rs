use parking_lot::RwLock;

use crate::types::{ExperimentArm, ExperimentAssignment, ExperimentSpec};

/// FNV-1a 64-bit, fixed offset basis and prime — deliberately not a
/// language/crate default hasher, because arm assignment is part of the
/// externally observable contract (the bucket
/// must reproduce identically across processes and releases).
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn bucket_for(experiment_id: &str, request_name: &str) -> f64 {
    let key = format!("{experiment_id}:{request_name}");
    let hash = fnv1a64(key.as_bytes());
    (hash % 10_000) as f64 / 10_000.0
}

/// Mutable registry of active experiments, exposed via the admin API
/// (experiments and flags are mutable via the admin API).
pub struct ExperimentRegistry {
    experiments: RwLock<Vec<ExperimentSpec>>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self {
            experiments: RwLock::new(Vec::new()),
        }
    }

    pub fn upsert(&self, spec: ExperimentSpec) {
        let mut guard = self.experiments.write();
        if let Some(existing) = guard.iter_mut().find(|e| e.id == spec.id) {
            *existing = spec;
        } else {
            guard.push(spec);
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.experiments.write();
        let before = guard.len();
        guard.retain(|e| e.id != id);
        guard.len() != before
    }

    pub fn get(&self, id: &str) -> Option<ExperimentSpec> {
        self.experiments.read().iter().find(|e| e.id == id).cloned()
    }

    pub fn list(&self) -> Vec<ExperimentSpec> {
        self.experiments.read().clone()
    }

    /// Iterates experiments in creation order (stable:
    /// "First matching experiment wins"). Returns the matching spec (for
    /// its variant weights) alongside the assignment.
    pub fn assign(&self, request_tier: &str, request_name: &str) -> Option<(ExperimentSpec, ExperimentAssignment)> {
        let mut candidates = self.experiments.read().clone();
        candidates.sort_by_key(|e| e.created_at);
        for experiment in candidates {
            if let Some(scope) = &experiment.tier {
                if scope != request_tier {
                    continue;
                }
            }
            let bucket = bucket_for(&experiment.id, request_name);
            if bucket < experiment.traffic_percentage {
                let arm = ExperimentArm::Variant;
                return Some((
                    experiment.clone(),
                    ExperimentAssignment {
                        experiment_id: experiment.id.clone(),
                        arm,
                    },
                ));
            }
        }
        None
    }
}

impl Default for ExperimentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn spec(id: &str, traffic: f64, tier: Option<&str>) -> ExperimentSpec {
        ExperimentSpec {
            id: id.to_string(),
            description: String::new(),
            variant_weights: crate::types::Weights {
                latency: 0.1,
                dr: 0.1,
                maturity: 0.2,
                cost: 0.6,
            },
            traffic_percentage: traffic,
            tier: tier.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn zero_traffic_never_assigns_variant() {
        let registry = ExperimentRegistry::new();
        registry.upsert(spec("exp-a", 0.0, Some("critical")));
        for i in 0..200 {
            assert!(registry
                .assign("critical", &format!("req-{i}"))
                .is_none());
        }
    }

    #[test]
    fn full_traffic_always_assigns_variant() {
        let registry = ExperimentRegistry::new();
        registry.upsert(spec("exp-b", 1.0, Some("critical")));
        for i in 0..200 {
            let (_, assignment) = registry.assign("critical", &format!("req-{i}")).unwrap();
            assert_eq!(assignment.arm, ExperimentArm::Variant);
        }
    }

    #[test]
    fn bucketing_is_deterministic_across_calls() {
        let registry = ExperimentRegistry::new();
        registry.upsert(spec("exp-c", 0.5, None));
        let a = registry.assign("critical", "stable-name");
        let b = registry.assign("critical", "stable-name");
        assert_eq!(a.is_some(), b.is_some());
    }

    #[test]
    fn tier_scope_is_respected() {
        let registry = ExperimentRegistry::new();
        registry.upsert(spec("exp-d", 1.0, Some("low")));
        assert!(registry.assign("critical", "req-1").is_none());
        assert!(registry.assign("low", "req-1").is_some());
    }

    #[test]
    fn roughly_half_bucket_at_fifty_percent_over_many_names() {
        let registry = ExperimentRegistry::new();
        registry.upsert(spec("exp-e", 0.5, None));
        let total = 10_000;
        let hits = (0..total)
            .filter(|i| registry.assign("any", &format!("name-{i}")).is_some())
            .count();
        let ratio = hits as f64 / total as f64;
        assert!((ratio - 0.5).abs() < 0.02, "ratio was {ratio}");
    }
}
