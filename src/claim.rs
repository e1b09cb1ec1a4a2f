use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::products::ParamValue;
use crate::types::{
    Claim, ClaimMetadata, ClaimSpec, CompositionSelector, Placement, PlacementReason,
    ProductDefinition, param_value_to_json,
};

const PLACEMENT_REASON_ANNOTATION: &str = "platform.example.org/placement-reason";
const API_VERSION_PREFIX: &str = "platform.example.org";

/// Assembles the Claim document the orchestrator consumes: one composition
/// selector keyed on the product's class/group (scoped under
/// `product.compositionGroup`), the validated parameters, the scheduler's
/// chosen placement folded in under `provider`/`region`/`runtimeCluster`/
/// `network`, and the full scheduling decision recorded verbatim as a
/// canonicalized-JSON annotation for audit.
pub fn build_claim(
    product: &ProductDefinition,
    namespace: &str,
    name: &str,
    params: &HashMap<String, ParamValue>,
    placement: &Placement,
    reason: &PlacementReason,
) -> Claim {
    let mut parameters: BTreeMap<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), param_value_to_json(v)))
        .collect();

    parameters.insert("provider".to_string(), Value::String(placement.provider.clone()));
    parameters.insert("region".to_string(), Value::String(placement.region.clone()));
    parameters.insert(
        "runtimeCluster".to_string(),
        Value::String(placement.runtime_cluster.clone()),
    );
    parameters.insert(
        "network".to_string(),
        serde_json::to_value(&placement.network).expect("BTreeMap<String, Value> always serializes"),
    );

    let mut match_labels = BTreeMap::new();
    match_labels.insert(
        format!("{}/provider", product.composition_group),
        placement.provider.clone(),
    );
    match_labels.insert(
        format!("{}/class", product.composition_group),
        product.composition_class.clone(),
    );

    let mut annotations = BTreeMap::new();
    annotations.insert(
        PLACEMENT_REASON_ANNOTATION.to_string(),
        canonicalize(reason),
    );

    Claim {
        api_version: format!("{API_VERSION_PREFIX}/v1alpha1"),
        kind: product.kind.clone(),
        metadata: ClaimMetadata {
            namespace: namespace.to_string(),
            name: name.to_string(),
            annotations,
        },
        spec: ClaimSpec {
            composition_selector: CompositionSelector { match_labels },
            parameters,
        },
    }
}

/// Re-sorts the serialized `PlacementReason` through a `BTreeMap` so the
/// annotation's key order is guaranteed ascending regardless of how any
/// nested `serde_json::Value` (e.g. `network`) was originally constructed.
fn canonicalize(reason: &PlacementReason) -> String {
    let value = serde_json::to_value(reason).expect("PlacementReason always serializes");
    let sorted = sort_keys(value);
    serde_json::to_string(&sorted).expect("sorted Value always serializes")
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
