use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Welford's online algorithm: tracks a running mean without retaining
/// samples. No unbounded accumulation, no matter how long the process runs.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningMean {
    pub count: u64,
    pub mean: f64,
    pub variance: f64,
}

impl From<Welford> for RunningMean {
    fn from(w: Welford) -> Self {
        Self {
            count: w.count,
            mean: w.mean,
            variance: w.variance(),
        }
    }
}

/// In-memory counters per provider/region/tier/experiment-arm, per
/// Process-local; resets at restart.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    total_requests: Arc<std::sync::atomic::AtomicU64>,
    total_placements: Arc<std::sync::atomic::AtomicU64>,
    gate_rejections: Arc<std::sync::atomic::AtomicU64>,
    provider_distribution: Arc<DashMap<String, u64>>,
    region_distribution: Arc<DashMap<String, u64>>,
    tier_distribution: Arc<DashMap<String, u64>>,
    score_by_provider: Arc<DashMap<String, Mutex<Welford>>>,
    experiment_arms: Arc<DashMap<(String, String), ExperimentArmStats>>,
}

#[derive(Debug, Default)]
struct ExperimentArmStats {
    count: u64,
    score: Mutex<Welford>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionEntry {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentArmSnapshot {
    pub count: u64,
    pub mean_score: RunningMean,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_placements: u64,
    pub total_requests: u64,
    pub gate_rejection_rate: f64,
    pub provider_distribution: HashMap<String, DistributionEntry>,
    pub region_distribution: HashMap<String, DistributionEntry>,
    pub tier_distribution: HashMap<String, DistributionEntry>,
    pub avg_score_by_provider: HashMap<String, RunningMean>,
    pub experiments: HashMap<String, HashMap<String, ExperimentArmSnapshot>>,
}

impl AnalyticsRecorder {
    pub fn new() -> Self {
        Self {
            total_requests: Arc::new(Default::default()),
            total_placements: Arc::new(Default::default()),
            gate_rejections: Arc::new(Default::default()),
            provider_distribution: Arc::new(DashMap::new()),
            region_distribution: Arc::new(DashMap::new()),
            tier_distribution: Arc::new(DashMap::new()),
            score_by_provider: Arc::new(DashMap::new()),
            experiment_arms: Arc::new(DashMap::new()),
        }
    }

    pub fn record_request(&self, gate_rejected: bool) {
        self.total_requests
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if gate_rejected {
            self.gate_rejections
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_placement(
        &self,
        provider: &str,
        region: &str,
        tier: &str,
        score: f64,
        experiment: Option<(&str, &str)>,
    ) {
        self.total_placements
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        *self.provider_distribution.entry(provider.to_string()).or_insert(0) += 1;
        *self.region_distribution.entry(region.to_string()).or_insert(0) += 1;
        *self.tier_distribution.entry(tier.to_string()).or_insert(0) += 1;
        self.score_by_provider
            .entry(provider.to_string())
            .or_default()
            .lock()
            .push(score);

        if let Some((experiment_id, arm)) = experiment {
            let key = (experiment_id.to_string(), arm.to_string());
            let mut entry = self.experiment_arms.entry(key).or_default();
            entry.count += 1;
            entry.score.lock().push(score);
        }
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let total_requests = self.total_requests.load(std::sync::atomic::Ordering::Relaxed);
        let total_placements = self.total_placements.load(std::sync::atomic::Ordering::Relaxed);
        let gate_rejections = self.gate_rejections.load(std::sync::atomic::Ordering::Relaxed);

        let to_distribution = |map: &DashMap<String, u64>, total: u64| -> HashMap<String, DistributionEntry> {
            map.iter()
                .map(|entry| {
                    let count = *entry.value();
                    let percentage = if total == 0 {
                        0.0
                    } else {
                        count as f64 / total as f64
                    };
                    (entry.key().clone(), DistributionEntry { count, percentage })
                })
                .collect()
        };

        let mut experiments: HashMap<String, HashMap<String, ExperimentArmSnapshot>> = HashMap::new();
        for entry in self.experiment_arms.iter() {
            let (experiment_id, arm) = entry.key();
            let stats = entry.value();
            experiments
                .entry(experiment_id.clone())
                .or_default()
                .insert(
                    arm.clone(),
                    ExperimentArmSnapshot {
                        count: stats.count,
                        mean_score: (*stats.score.lock()).into(),
                    },
                );
        }

        AnalyticsSnapshot {
            total_placements,
            total_requests,
            gate_rejection_rate: if total_requests == 0 {
                0.0
            } else {
                gate_rejections as f64 / total_requests as f64
            },
            provider_distribution: to_distribution(&self.provider_distribution, total_placements),
            region_distribution: to_distribution(&self.region_distribution, total_placements),
            tier_distribution: to_distribution(&self.tier_distribution, total_placements),
            avg_score_by_provider: self
                .score_by_provider
                .iter()
                .map(|entry| (entry.key().clone(), (*entry.value().lock()).into()))
                .collect(),
            experiments,
        }
    }
}

impl Default for AnalyticsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_placements() {
        let recorder = AnalyticsRecorder::new();
        recorder.record_request(false);
        recorder.record_placement("aws", "us-east-1", "medium", 0.8, None);
        recorder.record_request(true);
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_placements, 1);
        assert_eq!(snapshot.total_requests, 2);
        assert!((snapshot.gate_rejection_rate - 0.5).abs() < 1e-9);
        assert_eq!(
            snapshot.provider_distribution.get("aws").unwrap().count,
            1
        );
    }

    #[test]
    fn running_mean_matches_simple_average() {
        let recorder = AnalyticsRecorder::new();
        recorder.record_placement("aws", "us-east-1", "medium", 1.0, None);
        recorder.record_placement("aws", "us-east-1", "medium", 2.0, None);
        recorder.record_placement("aws", "us-east-1", "medium", 3.0, None);
        let snapshot = recorder.snapshot();
        let mean = snapshot.avg_score_by_provider.get("aws").unwrap();
        assert!((mean.mean - 2.0).abs() < 1e-9);
        assert_eq!(mean.count, 3);
    }

    #[test]
    fn experiment_arm_counts_tracked() {
        let recorder = AnalyticsRecorder::new();
        recorder.record_placement("aws", "us-east-1", "critical", 0.9, Some(("exp-1", "variant")));
        recorder.record_placement("gcp", "us-central1", "critical", 0.7, Some(("exp-1", "control")));
        let snapshot = recorder.snapshot();
        let arms = snapshot.experiments.get("exp-1").unwrap();
        assert_eq!(arms.get("variant").unwrap().count, 1);
        assert_eq!(arms.get("control").unwrap().count, 1);
    }
}
