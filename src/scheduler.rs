use std::cmp::Ordering;
use std::collections::HashSet;

use crate::experiments::ExperimentRegistry;
use crate::flags::{FeatureFlags, PREFER_COST_OPTIMIZATION};
use crate::health::ProviderHealth;
use crate::policy;
use crate::types::{
    Candidate, CapabilitySet, ExcludedCandidate, Placement, PlacementReason, ScoreDimension,
    ScoredCandidate, SelectedCandidate, TierSpec, Weights,
};

pub struct ScheduleInput<'a> {
    pub request_name: &'a str,
    pub tier: &'a TierSpec,
    pub ha: bool,
    pub candidates: Vec<Candidate>,
    pub health: &'a ProviderHealth,
    pub experiments: &'a ExperimentRegistry,
    pub flags: &'a FeatureFlags,
    pub exclude_providers: &'a HashSet<String>,
}

#[derive(Debug, Clone, Copy)]
struct Survivor<'c> {
    candidate: &'c Candidate,
    total_score: f64,
}

/// Filter → gate → score → rank → select primary → select failover →
/// produce `PlacementReason`. Pure function of its inputs (
/// §5: "holds no mutable state across invocations").
pub fn schedule(input: ScheduleInput<'_>) -> Result<PlacementReason, Vec<ExcludedCandidate>> {
    let candidates_evaluated = input.candidates.len();

    let healthy: Vec<&Candidate> = input
        .candidates
        .iter()
        .filter(|c| {
            c.healthy
                && input.health.is_eligible(&c.provider)
                && !input.exclude_providers.contains(&c.provider)
        })
        .collect();
    let candidates_healthy = healthy.len();

    let assignment = input.experiments.assign(&input.tier.id, input.request_name);
    let (experiment_arm, variant_weights) = match &assignment {
        Some((spec, assignment)) => (Some(assignment.clone()), Some(spec.variant_weights)),
        None => (None, None),
    };
    let prefer_cost = input.flags.is_enabled(PREFER_COST_OPTIMIZATION);
    let weights = policy::effective_weights(
        input.tier,
        variant_weights.as_ref(),
        experiment_arm.as_ref().map(|a| a.arm),
        prefer_cost,
    );

    let gates = policy::effective_gates(input.tier, input.ha);

    let mut excluded = Vec::new();
    let mut survivors: Vec<Survivor> = Vec::new();
    for candidate in &healthy {
        let missing = candidate.capabilities.missing(gates);
        if !missing.is_empty() {
            excluded.push(ExcludedCandidate {
                provider: candidate.provider.clone(),
                region: candidate.region.clone(),
                gate_failures: missing,
            });
            continue;
        }
        let total_score = score(candidate, &weights);
        survivors.push(Survivor {
            candidate,
            total_score,
        });
    }
    let candidates_passed_gates = survivors.len();

    survivors.sort_by(|a, b| rank_cmp(a, b));

    let winner = match survivors.first() {
        Some(w) => *w,
        None => return Err(excluded),
    };

    let top3: Vec<ScoredCandidate> = survivors
        .iter()
        .take(3)
        .map(|s| ScoredCandidate {
            provider: s.candidate.provider.clone(),
            region: s.candidate.region.clone(),
            sub_scores: s.candidate.baseline_scores,
            total_score: s.total_score,
        })
        .collect();

    let (failover, failover_unavailable) = if input.tier.failover_required {
        match survivors
            .iter()
            .find(|s| s.candidate.provider != winner.candidate.provider)
        {
            Some(alt) => (Some(placement_of(alt.candidate)), false),
            None => (None, true),
        }
    } else {
        (None, false)
    };

    Ok(PlacementReason {
        tier: input.tier.id.clone(),
        rto_minutes: input.tier.rto_minutes,
        rpo_minutes: input.tier.rpo_minutes,
        gates: gates.iter_capabilities(),
        ha_enforced: input.ha,
        weights,
        experiment_arm,
        selected: SelectedCandidate {
            provider: winner.candidate.provider.clone(),
            region: winner.candidate.region.clone(),
            total_score: winner.total_score,
        },
        top3,
        excluded,
        candidates_evaluated,
        candidates_healthy,
        candidates_passed_gates,
        failover,
        failover_unavailable,
    })
}

fn placement_of(candidate: &Candidate) -> Placement {
    Placement {
        provider: candidate.provider.clone(),
        region: candidate.region.clone(),
        runtime_cluster: candidate.runtime_cluster.clone(),
        network: candidate.network.clone(),
    }
}

fn score(candidate: &Candidate, weights: &Weights) -> f64 {
    [
        ScoreDimension::Latency,
        ScoreDimension::Dr,
        ScoreDimension::Maturity,
        ScoreDimension::Cost,
    ]
    .iter()
    .map(|dim| candidate.baseline_scores.get(*dim) * weights.get(*dim))
    .sum()
}

/// Descending by total score; tie-break (a) higher `dr` sub-score, (b)
/// lexicographic `(provider, region)` ascending — deterministic per
/// the gate and scoring pipeline.
fn rank_cmp(a: &Survivor, b: &Survivor) -> Ordering {
    b.total_score
        .partial_cmp(&a.total_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.candidate
                .baseline_scores
                .dr
                .partial_cmp(&a.candidate.baseline_scores.dr)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.candidate.provider.cmp(&b.candidate.provider))
        .then_with(|| a.candidate.region.cmp(&b.candidate.region))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselineScores, Capability};
    use std::collections::BTreeMap;

    fn candidate(provider: &str, region: &str, caps: CapabilitySet, scores: BaselineScores) -> Candidate {
        Candidate {
            provider: provider.into(),
            region: region.into(),
            runtime_cluster: format!("{provider}-cluster"),
            network: BTreeMap::new(),
            capabilities: caps,
            baseline_scores: scores,
            healthy: true,
        }
    }

    fn equal_scores(v: f64) -> BaselineScores {
        BaselineScores {
            latency: v,
            dr: v,
            maturity: v,
            cost: v,
        }
    }

    fn medium_tier() -> TierSpec {
        TierSpec {
            id: "medium".into(),
            rto_minutes: 60,
            rpo_minutes: 30,
            required_capabilities: vec![Capability::Pitr, Capability::PrivateNetworking],
            weights: Weights {
                latency: 0.25,
                dr: 0.25,
                maturity: 0.25,
                cost: 0.25,
            },
            failover_required: false,
        }
    }

    fn business_critical_tier() -> TierSpec {
        TierSpec {
            id: "business_critical".into(),
            rto_minutes: 5,
            rpo_minutes: 1,
            required_capabilities: vec![
                Capability::Pitr,
                Capability::PrivateNetworking,
                Capability::CrossRegionReplication,
            ],
            weights: Weights {
                latency: 0.25,
                dr: 0.25,
                maturity: 0.25,
                cost: 0.25,
            },
            failover_required: true,
        }
    }

    fn full_caps() -> CapabilitySet {
        CapabilitySet::PITR | CapabilitySet::PRIVATE_NETWORKING | CapabilitySet::MULTI_AZ
    }

    fn scenario_pool() -> Vec<Candidate> {
        vec![
            candidate(
                "aws",
                "us-east-1",
                full_caps() | CapabilitySet::CROSS_REGION_REPLICATION,
                BaselineScores { latency: 0.9, dr: 0.8, maturity: 0.9, cost: 0.6 },
            ),
            candidate(
                "aws",
                "eu-west-1",
                full_caps() | CapabilitySet::CROSS_REGION_REPLICATION,
                BaselineScores { latency: 0.7, dr: 0.75, maturity: 0.85, cost: 0.65 },
            ),
            candidate(
                "aws",
                "ap-southeast-1",
                full_caps(),
                equal_scores(0.5),
            ),
            candidate(
                "gcp",
                "us-central1",
                full_caps(),
                BaselineScores { latency: 0.8, dr: 0.7, maturity: 0.75, cost: 0.7 },
            ),
            candidate(
                "gcp",
                "europe-west1",
                full_caps(),
                equal_scores(0.55),
            ),
            candidate(
                "oci",
                "us-ashburn-1",
                CapabilitySet::PITR | CapabilitySet::PRIVATE_NETWORKING,
                BaselineScores { latency: 0.6, dr: 0.5, maturity: 0.4, cost: 0.95 },
            ),
            candidate(
                "oci",
                "uk-london-1",
                CapabilitySet::PITR | CapabilitySet::PRIVATE_NETWORKING,
                BaselineScores { latency: 0.55, dr: 0.45, maturity: 0.4, cost: 0.9 },
            ),
        ]
    }

    #[test]
    fn scenario_medium_ha_oci_excluded_no_failover() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        let exclude = HashSet::new();
        let reason = schedule(ScheduleInput {
            request_name: "orders-db",
            tier: &medium_tier(),
            ha: true,
            candidates: scenario_pool(),
            health: &health,
            experiments: &experiments,
            flags: &flags,
            exclude_providers: &exclude,
        })
        .expect("expected a viable placement");

        assert_eq!(reason.candidates_passed_gates, 5);
        assert!(["aws", "gcp"].contains(&reason.selected.provider.as_str()));
        assert!(reason.failover.is_none());
        assert!(!reason.failover_unavailable);
    }

    #[test]
    fn scenario_business_critical_only_aws_qualifies() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        let exclude = HashSet::new();
        let reason = schedule(ScheduleInput {
            request_name: "orders-db",
            tier: &business_critical_tier(),
            ha: true,
            candidates: scenario_pool(),
            health: &health,
            experiments: &experiments,
            flags: &flags,
            exclude_providers: &exclude,
        })
        .expect("expected a viable placement");

        assert_eq!(reason.candidates_passed_gates, 2);
        assert_eq!(reason.selected.provider, "aws");
        assert!(reason.failover.is_none());
        assert!(reason.failover_unavailable);
    }

    #[test]
    fn empty_pool_yields_no_viable_candidate() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        let exclude = HashSet::new();
        let result = schedule(ScheduleInput {
            request_name: "empty",
            tier: &medium_tier(),
            ha: false,
            candidates: vec![],
            health: &health,
            experiments: &experiments,
            flags: &flags,
            exclude_providers: &exclude,
        });
        assert!(result.is_err());
    }

    #[test]
    fn all_unhealthy_yields_no_viable_candidate() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        let exclude = HashSet::new();
        let mut pool = scenario_pool();
        for c in pool.iter_mut() {
            c.healthy = false;
        }
        let result = schedule(ScheduleInput {
            request_name: "all-down",
            tier: &medium_tier(),
            ha: false,
            candidates: pool,
            health: &health,
            experiments: &experiments,
            flags: &flags,
            exclude_providers: &exclude,
        });
        assert!(result.is_err());
    }

    #[test]
    fn determinism_same_inputs_same_output() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        let exclude = HashSet::new();
        let run = || {
            schedule(ScheduleInput {
                request_name: "orders-db",
                tier: &medium_tier(),
                ha: true,
                candidates: scenario_pool(),
                health: &health,
                experiments: &experiments,
                flags: &flags,
                exclude_providers: &exclude,
            })
            .unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn selected_is_always_top_of_top3() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        let exclude = HashSet::new();
        let reason = schedule(ScheduleInput {
            request_name: "orders-db",
            tier: &medium_tier(),
            ha: true,
            candidates: scenario_pool(),
            health: &health,
            experiments: &experiments,
            flags: &flags,
            exclude_providers: &exclude,
        })
        .unwrap();
        assert_eq!(reason.selected.provider, reason.top3[0].provider);
        assert_eq!(reason.selected.total_score, reason.top3[0].total_score);
    }

    #[test]
    fn weights_always_sum_to_one() {
        let health = ProviderHealth::new();
        let experiments = ExperimentRegistry::new();
        let flags = FeatureFlags::new();
        flags.set(PREFER_COST_OPTIMIZATION, true);
        let exclude = HashSet::new();
        let reason = schedule(ScheduleInput {
            request_name: "orders-db",
            tier: &medium_tier(),
            ha: false,
            candidates: scenario_pool(),
            health: &health,
            experiments: &experiments,
            flags: &flags,
            exclude_providers: &exclude,
        })
        .unwrap();
        assert!((reason.weights.sum() - 1.0).abs() < 1e-9);
    }
}
