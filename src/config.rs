use anyhow::{Context, Result};
use std::{env, path::PathBuf};

use crate::catalog::CellCatalogDocument;
use crate::policy::TierTableDocument;
use crate::types::ProductDefinition;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub workers: usize,
}

/// Process-start configuration: bind address plus the three read-only
/// documents, loaded once at startup and held fixed for the life of the
/// process ("tier specs, cells, product definitions are loaded at process
/// start from configuration and are read-only"). There is no admin route to
/// reload them; a new value requires a process restart.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub server: ServerConfig,
    pub cells: CellCatalogDocument,
    pub tiers: TierTableDocument,
    pub products: Vec<ProductDefinition>,
}

impl ControlPlaneConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("IDP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("IDP_PORT").unwrap_or_else(|_| "8080".to_string());
        let workers = env::var("IDP_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(num_cpus::get_physical);

        let cells_path = PathBuf::from(
            env::var("IDP_CELLS_PATH").unwrap_or_else(|_| "./configs/cells.json".into()),
        );
        let tiers_path = PathBuf::from(
            env::var("IDP_TIERS_PATH").unwrap_or_else(|_| "./configs/tiers.json".into()),
        );
        let products_path = PathBuf::from(
            env::var("IDP_PRODUCTS_PATH").unwrap_or_else(|_| "./configs/products.json".into()),
        );

        let cells =
            load_document::<CellCatalogDocument>(&cells_path).context("load cell catalog")?;
        let tiers = load_document::<TierTableDocument>(&tiers_path).context("load tier table")?;
        let products = load_document::<Vec<ProductDefinition>>(&products_path)
            .context("load product registry")?;

        Ok(Self {
            server: ServerConfig {
                bind_addr: format!("{host}:{port}"),
                workers,
            },
            cells,
            tiers,
            products,
        })
    }
}

/// Accepts JSON first, falling back to YAML — config format is
/// implementation-free, matching the
/// `RouterConfig::from_env` fallback behavior.
fn load_document<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read config file at {path:?}"))?;
    serde_json::from_str(&raw)
        .or_else(|_| serde_yaml::from_str(&raw))
        .with_context(|| format!("parse config document at {path:?}"))
}
