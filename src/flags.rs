use dashmap::DashMap;
use std::sync::Arc;

/// Process-wide named boolean switches consulted by the scheduler
/// Read-mostly; `DashMap` keeps reads lock-free against
/// the rare operator write.
#[derive(Clone)]
pub struct FeatureFlags {
    flags: Arc<DashMap<String, bool>>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self {
            flags: Arc::new(DashMap::new()),
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).map(|entry| *entry).unwrap_or(false)
    }

    pub fn set(&self, name: &str, enabled: bool) {
        self.flags.insert(name.to_string(), enabled);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.flags.remove(name).is_some()
    }

    pub fn list(&self) -> Vec<(String, bool)> {
        let mut out: Vec<_> = self
            .flags
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::new()
    }
}

pub const PREFER_COST_OPTIMIZATION: &str = "prefer_cost_optimization";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_disabled() {
        let flags = FeatureFlags::new();
        assert!(!flags.is_enabled("anything"));
    }

    #[test]
    fn set_and_remove_round_trip() {
        let flags = FeatureFlags::new();
        flags.set(PREFER_COST_OPTIMIZATION, true);
        assert!(flags.is_enabled(PREFER_COST_OPTIMIZATION));
        assert!(flags.remove(PREFER_COST_OPTIMIZATION));
        assert!(!flags.is_enabled(PREFER_COST_OPTIMIZATION));
    }
}
