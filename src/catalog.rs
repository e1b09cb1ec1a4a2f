use std::collections::HashMap;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::errors::ControlPlaneError;
use crate::types::Candidate;

/// Static, config-loaded pool of candidates per cell, read-only for the
/// lifetime of the process. A candidate's own `healthy` bit is fixed at
/// load time; per-provider eligibility that actually changes at runtime is
/// tracked separately by `ProviderHealth` (see `health.rs`), which the
/// scheduler consults alongside this catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CellCatalogDocument {
    pub cells: HashMap<String, Vec<Candidate>>,
}

pub struct CellCatalog {
    cells: ArcSwap<HashMap<String, Vec<Candidate>>>,
}

impl CellCatalog {
    pub fn load(doc: CellCatalogDocument) -> Self {
        Self {
            cells: ArcSwap::from_pointee(doc.cells),
        }
    }

    pub fn candidates_for(&self, cell: &str) -> Result<Vec<Candidate>, ControlPlaneError> {
        self.cells
            .load()
            .get(cell)
            .cloned()
            .ok_or_else(|| ControlPlaneError::UnknownCell(cell.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaselineScores;
    use std::collections::BTreeMap;

    fn candidate(provider: &str) -> Candidate {
        Candidate {
            provider: provider.into(),
            region: "r1".into(),
            runtime_cluster: "rc1".into(),
            network: BTreeMap::new(),
            capabilities: Default::default(),
            baseline_scores: BaselineScores {
                latency: 0.5,
                dr: 0.5,
                maturity: 0.5,
                cost: 0.5,
            },
            healthy: true,
        }
    }

    #[test]
    fn unknown_cell_errors() {
        let catalog = CellCatalog::load(CellCatalogDocument::default());
        let err = catalog.candidates_for("nope").unwrap_err();
        assert!(matches!(err, ControlPlaneError::UnknownCell(_)));
    }

    #[test]
    fn candidates_for_known_cell_are_returned() {
        let mut cells = HashMap::new();
        cells.insert("cell-a".to_string(), vec![candidate("aws"), candidate("gcp")]);
        let catalog = CellCatalog::load(CellCatalogDocument { cells });
        let candidates = catalog.candidates_for("cell-a").unwrap();
        assert_eq!(candidates.len(), 2);
    }
}
