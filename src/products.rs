use std::collections::HashMap;

use arc_swap::ArcSwap;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::ControlPlaneError;
use crate::types::{ParameterSpec, ParameterType, ProductDefinition};

/// Runtime-typed parameter value: per the "dynamic parameter typing"
/// design note: the wire boundary stays `serde_json::Value`, validation
/// narrows it into this closed sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Bool(bool),
}

/// Declarative product catalog. Registration is write-once at startup;
/// duplicate names are a configuration error.
pub struct ProductRegistry {
    products: ArcSwap<HashMap<String, Arc<ProductDefinition>>>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self {
            products: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn register(&self, product: ProductDefinition) -> Result<(), ControlPlaneError> {
        let current = self.products.load();
        if current.contains_key(&product.name) {
            return Err(ControlPlaneError::DuplicateProduct(product.name));
        }
        let mut next = (**current).clone();
        next.insert(product.name.clone(), Arc::new(product));
        self.products.store(Arc::new(next));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<ProductDefinition>, ControlPlaneError> {
        self.products
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| ControlPlaneError::UnknownProduct(name.to_string()))
    }

    pub fn list(&self) -> Vec<Arc<ProductDefinition>> {
        let mut defs: Vec<_> = self.products.load().values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

impl Default for ProductRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates `raw` against `product.parameters`. Total:
/// every spec either resolves a (type/range/choice-checked) value from the
/// request or its default; missing-required-without-default,
/// unknown-parameter-name, and type mismatches are all rejected.
pub fn validate_params(
    product: &ProductDefinition,
    raw: &HashMap<String, Value>,
) -> Result<HashMap<String, ParamValue>, ControlPlaneError> {
    let known: std::collections::HashSet<&str> =
        product.parameters.iter().map(|p| p.name.as_str()).collect();
    for key in raw.keys() {
        if !known.contains(key.as_str()) {
            return Err(ControlPlaneError::UnknownParameter(key.clone()));
        }
    }

    let mut resolved = HashMap::with_capacity(product.parameters.len());
    for spec in &product.parameters {
        let value = match raw.get(&spec.name) {
            Some(value) => validate_value(spec, value)?,
            None => match &spec.default {
                Some(default) => validate_value(spec, default)?,
                None if spec.required => {
                    return Err(ControlPlaneError::MissingParameter(spec.name.clone()))
                }
                None => continue,
            },
        };
        resolved.insert(spec.name.clone(), value);
    }
    Ok(resolved)
}

fn validate_value(spec: &ParameterSpec, value: &Value) -> Result<ParamValue, ControlPlaneError> {
    let parsed = match spec.kind {
        ParameterType::String => value
            .as_str()
            .map(|s| ParamValue::String(s.to_string()))
            .ok_or_else(|| type_error(spec, "string"))?,
        ParameterType::Bool => value
            .as_bool()
            .map(ParamValue::Bool)
            .ok_or_else(|| type_error(spec, "bool"))?,
        ParameterType::Int => value
            .as_i64()
            .map(ParamValue::Int)
            .ok_or_else(|| type_error(spec, "int"))?,
        ParameterType::Choice => {
            let s = value.as_str().ok_or_else(|| type_error(spec, "choice"))?;
            let choices = spec.choices.as_deref().unwrap_or_default();
            if !choices.iter().any(|c| c == s) {
                return Err(ControlPlaneError::InvalidParameterRange {
                    name: spec.name.clone(),
                    detail: format!("{s} not in {choices:?}"),
                });
            }
            ParamValue::String(s.to_string())
        }
    };

    if let ParamValue::Int(n) = parsed {
        if let Some(min) = spec.min {
            if (n as f64) < min {
                return Err(ControlPlaneError::InvalidParameterRange {
                    name: spec.name.clone(),
                    detail: format!("{n} < min {min}"),
                });
            }
        }
        if let Some(max) = spec.max {
            if (n as f64) > max {
                return Err(ControlPlaneError::InvalidParameterRange {
                    name: spec.name.clone(),
                    detail: format!("{n} > max {max}"),
                });
            }
        }
    }

    Ok(parsed)
}

fn type_error(spec: &ParameterSpec, expected: &str) -> ControlPlaneError {
    ControlPlaneError::InvalidParameterType {
        name: spec.name.clone(),
        expected: expected.to_string(),
    }
}
