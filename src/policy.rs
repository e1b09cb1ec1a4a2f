use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::ControlPlaneError;
use crate::types::{Capability, CapabilitySet, ExperimentArm, TierSpec, Weights};

const COST_BOOST_DELTA: f64 = 0.20;
const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierTableDocument {
    pub tiers: HashMap<String, TierSpec>,
}

/// Canonical tier table. Read-only after process start.
pub struct TierTable {
    tiers: HashMap<String, TierSpec>,
}

impl TierTable {
    pub fn load(doc: TierTableDocument) -> Self {
        Self { tiers: doc.tiers }
    }

    pub fn tier_spec(&self, tier_id: &str) -> Result<&TierSpec, ControlPlaneError> {
        self.tiers
            .get(tier_id)
            .ok_or_else(|| ControlPlaneError::UnknownTier(tier_id.to_string()))
    }
}

/// `tier.requiredCapabilities ∪ (ha ? {multi_az} : ∅)`.
pub fn effective_gates(tier: &TierSpec, ha: bool) -> CapabilitySet {
    let mut gates = tier
        .required_capabilities
        .iter()
        .copied()
        .fold(CapabilitySet::empty(), |set, cap| set | cap.into());
    if ha {
        gates.insert(Capability::MultiAz.into());
    }
    gates
}

/// Starts from `tier.weights`; substitutes the experiment's variant weights
/// on a `variant` arm; then applies the `prefer_cost_optimization` boost
/// (+0.20 cost, redistributed proportionally across the other three,
/// clamped at zero and renormalized).
pub fn effective_weights(
    tier: &TierSpec,
    experiment_variant_weights: Option<&Weights>,
    experiment_arm: Option<ExperimentArm>,
    prefer_cost_optimization: bool,
) -> Weights {
    let mut weights = match (experiment_arm, experiment_variant_weights) {
        (Some(ExperimentArm::Variant), Some(variant)) => *variant,
        _ => tier.weights,
    };

    if prefer_cost_optimization {
        weights = boost_cost(weights);
    }

    debug_assert!((weights.sum() - 1.0).abs() < 1e-6);
    weights
}

fn boost_cost(weights: Weights) -> Weights {
    let others_total = weights.latency + weights.dr + weights.maturity;
    let target_delta = COST_BOOST_DELTA.min(1.0 - weights.cost);
    if others_total <= 0.0 {
        return Weights {
            cost: (weights.cost + target_delta).min(1.0),
            ..weights
        };
    }

    let shrink = |component: f64| -> f64 {
        (component - target_delta * (component / others_total)).max(0.0)
    };

    let mut latency = shrink(weights.latency);
    let mut dr = shrink(weights.dr);
    let mut maturity = shrink(weights.maturity);
    let mut cost = weights.cost + target_delta;

    let total = latency + dr + maturity + cost;
    if (total - 1.0).abs() > WEIGHT_EPSILON && total > 0.0 {
        let scale = 1.0 / total;
        latency *= scale;
        dr *= scale;
        maturity *= scale;
        cost *= scale;
    }

    Weights {
        latency,
        dr,
        maturity,
        cost,
    }
}
