use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::products::ParamValue;

bitflags::bitflags! {
    /// Closed capability vocabulary. Extend by adding a bit,
    /// never by accepting an arbitrary string past the parse boundary.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilitySet: u32 {
        const PITR = 1 << 0;
        const MULTI_AZ = 1 << 1;
        const PRIVATE_NETWORKING = 1 << 2;
        const CROSS_REGION_REPLICATION = 1 << 3;
    }
}

impl CapabilitySet {
    pub fn from_names<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = CapabilitySet::empty();
        for name in names {
            set.insert(Capability::parse(name.as_ref())?.into());
        }
        Some(set)
    }

    pub fn missing(self, required: CapabilitySet) -> Vec<Capability> {
        (required - self).iter_capabilities()
    }

    pub fn iter_capabilities(self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|cap| self.contains((*cap).into()))
            .collect()
    }
}

/// Config files spell capabilities as a JSON array of names (e.g.
/// `["pitr", "multi_az"]`), not a raw bitmask, so the candidate pool stays
/// human-editable. Used via `#[serde(with = "capability_set_serde")]`.
mod capability_set_serde {
    use super::{Capability, CapabilitySet};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(set: &CapabilitySet, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        set.iter_capabilities().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<CapabilitySet, D::Error>
    where
        D: Deserializer<'de>,
    {
        let names = Vec::<Capability>::deserialize(deserializer)?;
        let mut set = CapabilitySet::empty();
        for cap in names {
            set.insert(cap.into());
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Pitr,
    MultiAz,
    PrivateNetworking,
    CrossRegionReplication,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Pitr,
        Capability::MultiAz,
        Capability::PrivateNetworking,
        Capability::CrossRegionReplication,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pitr" => Some(Capability::Pitr),
            "multi_az" => Some(Capability::MultiAz),
            "private_networking" => Some(Capability::PrivateNetworking),
            "cross_region_replication" => Some(Capability::CrossRegionReplication),
            _ => None,
        }
    }
}

impl From<Capability> for CapabilitySet {
    fn from(cap: Capability) -> Self {
        match cap {
            Capability::Pitr => CapabilitySet::PITR,
            Capability::MultiAz => CapabilitySet::MULTI_AZ,
            Capability::PrivateNetworking => CapabilitySet::PRIVATE_NETWORKING,
            Capability::CrossRegionReplication => CapabilitySet::CROSS_REGION_REPLICATION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub namespace: String,
    pub name: String,
    pub cell: String,
    pub tier: String,
    pub environment: String,
    #[serde(default)]
    pub ha: bool,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

/// Keys the inbound request is forbidden from carrying — these are decided
/// by the scheduler, never supplied by the caller.
pub const FORBIDDEN_REQUEST_KEYS: [&str; 4] = ["provider", "region", "runtimeCluster", "network"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    #[serde(default)]
    pub network: BTreeMap<String, Value>,
    #[serde(with = "capability_set_serde")]
    pub capabilities: CapabilitySet,
    pub baseline_scores: BaselineScores,
    #[serde(default = "default_true")]
    pub healthy: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaselineScores {
    pub latency: f64,
    pub dr: f64,
    pub maturity: f64,
    pub cost: f64,
}

impl BaselineScores {
    pub fn get(&self, dimension: ScoreDimension) -> f64 {
        match dimension {
            ScoreDimension::Latency => self.latency,
            ScoreDimension::Dr => self.dr,
            ScoreDimension::Maturity => self.maturity,
            ScoreDimension::Cost => self.cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDimension {
    Latency,
    Dr,
    Maturity,
    Cost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Weights {
    pub latency: f64,
    pub dr: f64,
    pub maturity: f64,
    pub cost: f64,
}

impl Weights {
    pub fn get(&self, dimension: ScoreDimension) -> f64 {
        match dimension {
            ScoreDimension::Latency => self.latency,
            ScoreDimension::Dr => self.dr,
            ScoreDimension::Maturity => self.maturity,
            ScoreDimension::Cost => self.cost,
        }
    }

    pub fn sum(&self) -> f64 {
        self.latency + self.dr + self.maturity + self.cost
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSpec {
    pub id: String,
    pub rto_minutes: u32,
    pub rpo_minutes: u32,
    #[serde(default)]
    pub required_capabilities: Vec<Capability>,
    pub weights: Weights,
    pub failover_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub variant_weights: Weights,
    pub traffic_percentage: f64,
    #[serde(default)]
    pub tier: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Placement {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub network: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentArm {
    Control,
    Variant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub arm: ExperimentArm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub provider: String,
    pub region: String,
    pub sub_scores: BaselineScores,
    pub total_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub provider: String,
    pub region: String,
    pub gate_failures: Vec<Capability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedCandidate {
    pub provider: String,
    pub region: String,
    pub total_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementReason {
    pub tier: String,
    pub rto_minutes: u32,
    pub rpo_minutes: u32,
    pub gates: Vec<Capability>,
    pub ha_enforced: bool,
    pub weights: Weights,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_arm: Option<ExperimentAssignment>,
    pub selected: SelectedCandidate,
    pub top3: Vec<ScoredCandidate>,
    pub excluded: Vec<ExcludedCandidate>,
    pub candidates_evaluated: usize,
    pub candidates_healthy: usize,
    pub candidates_passed_gates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover: Option<Placement>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(default)]
    pub failover_unavailable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Int,
    Bool,
    Choice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDefinition {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub api_version: String,
    pub kind: String,
    pub composition_class: String,
    pub composition_group: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub api_version: String,
    pub kind: String,
    pub metadata: ClaimMetadata,
    pub spec: ClaimSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMetadata {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSpec {
    pub composition_selector: CompositionSelector,
    pub parameters: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionSelector {
    pub match_labels: BTreeMap<String, String>,
}

pub(crate) fn param_value_to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::String(s) => Value::String(s.clone()),
        ParamValue::Int(i) => Value::from(*i),
        ParamValue::Bool(b) => Value::Bool(*b),
    }
}
