use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idp_control_plane::analytics::AnalyticsRecorder;
use idp_control_plane::api;
use idp_control_plane::catalog::CellCatalog;
use idp_control_plane::config::ControlPlaneConfig;
use idp_control_plane::context::ControlPlane;
use idp_control_plane::experiments::ExperimentRegistry;
use idp_control_plane::flags::FeatureFlags;
use idp_control_plane::health::ProviderHealth;
use idp_control_plane::policy::TierTable;
use idp_control_plane::products::ProductRegistry;
use idp_control_plane::sticky::InMemoryStickyStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idp_control_plane=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ControlPlaneConfig::from_env().context("load control plane config")?;

    let products = ProductRegistry::new();
    for product in cfg.products.clone() {
        products
            .register(product)
            .context("register product from configuration")?;
    }

    let control_plane = Arc::new(ControlPlane {
        catalog: CellCatalog::load(cfg.cells.clone()),
        tiers: TierTable::load(cfg.tiers.clone()),
        products,
        health: ProviderHealth::new(),
        experiments: ExperimentRegistry::new(),
        flags: FeatureFlags::new(),
        analytics: AnalyticsRecorder::new(),
        sticky: Arc::new(InMemoryStickyStore::new()),
    });

    let bind_addr: SocketAddr = cfg.server.bind_addr.parse().with_context(|| {
        format!(
            "invalid bind address '{}': expected host:port",
            cfg.server.bind_addr
        )
    })?;

    tracing::info!(bind_addr = %bind_addr, workers = cfg.server.workers, "starting idp-control-plane");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::AUTHORIZATION,
            ])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::from(control_plane.clone()))
            .configure(api::configure)
    })
    .bind(bind_addr)?
    .workers(cfg.server.workers)
    .run()
    .await?;

    Ok(())
}
