use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::context::ControlPlane;
use crate::errors::ControlPlaneError;
use crate::types::{ExperimentSpec, ServiceRequest};

const MYSQL_PRODUCT: &str = "mysql";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_liveness)
        .service(list_products)
        .service(create_service)
        .service(get_service_status)
        .service(post_service_failover)
        .service(create_mysql)
        .service(get_mysql_status)
        .service(post_mysql_failover)
        .service(get_providers_health)
        .service(get_provider_health)
        .service(put_provider_health)
        .service(list_experiments)
        .service(get_experiment)
        .service(put_experiment)
        .service(delete_experiment)
        .service(list_flags)
        .service(get_flag)
        .service(put_flag)
        .service(delete_flag)
        .service(get_analytics);
}

#[get("/health")]
async fn get_liveness() -> impl Responder {
    #[derive(Serialize)]
    struct Liveness {
        status: &'static str,
        timestamp: String,
    }
    HttpResponse::Ok().json(Liveness {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[get("/api/products")]
async fn list_products(plane: web::Data<Arc<ControlPlane>>) -> impl Responder {
    HttpResponse::Ok().json(plane.products.list())
}

/// `201` on a fresh placement, `200` when an existing sticky Claim is
/// returned unchanged.
fn create_response(outcome: crate::context::CreateResponse) -> HttpResponse {
    if outcome.sticky {
        HttpResponse::Ok().json(outcome)
    } else {
        HttpResponse::Created().json(outcome)
    }
}

#[post("/api/services/{product}")]
async fn create_service(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
    payload: web::Json<ServiceRequest>,
) -> Result<HttpResponse, ControlPlaneError> {
    let product = path.into_inner();
    let outcome = plane.create(&product, payload.into_inner()).await?;
    Ok(create_response(outcome))
}

#[get("/api/services/{product}/{namespace}/{name}")]
async fn get_service_status(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<(String, String, String)>,
) -> Result<impl Responder, ControlPlaneError> {
    let (product, namespace, name) = path.into_inner();
    let status = plane.status(&product, &namespace, &name).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[derive(Debug, Default, Deserialize)]
struct FailoverRequestBody {
    #[serde(default)]
    exclude_providers: Vec<String>,
}

#[post("/api/services/{product}/{namespace}/{name}/failover")]
async fn post_service_failover(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<(String, String, String)>,
    payload: Option<web::Json<FailoverRequestBody>>,
) -> Result<impl Responder, ControlPlaneError> {
    let (product, namespace, name) = path.into_inner();
    let exclude: HashSet<String> = payload
        .map(|body| body.into_inner().exclude_providers.into_iter().collect())
        .unwrap_or_default();
    let outcome = plane.failover(&product, &namespace, &name, exclude).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/api/mysql")]
async fn create_mysql(
    plane: web::Data<Arc<ControlPlane>>,
    payload: web::Json<ServiceRequest>,
) -> Result<HttpResponse, ControlPlaneError> {
    let outcome = plane.create(MYSQL_PRODUCT, payload.into_inner()).await?;
    Ok(create_response(outcome))
}

#[get("/api/status/mysql/{namespace}/{name}")]
async fn get_mysql_status(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<(String, String)>,
) -> Result<impl Responder, ControlPlaneError> {
    let (namespace, name) = path.into_inner();
    let status = plane.status(MYSQL_PRODUCT, &namespace, &name).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[post("/api/mysql/{namespace}/{name}/failover")]
async fn post_mysql_failover(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<(String, String)>,
    payload: Option<web::Json<FailoverRequestBody>>,
) -> Result<impl Responder, ControlPlaneError> {
    let (namespace, name) = path.into_inner();
    let exclude: HashSet<String> = payload
        .map(|body| body.into_inner().exclude_providers.into_iter().collect())
        .unwrap_or_default();
    let outcome = plane
        .failover(MYSQL_PRODUCT, &namespace, &name, exclude)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/api/providers/health")]
async fn get_providers_health(plane: web::Data<Arc<ControlPlane>>) -> impl Responder {
    HttpResponse::Ok().json(plane.health.snapshot_all())
}

#[get("/api/providers/{provider}/health")]
async fn get_provider_health(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
) -> impl Responder {
    let provider = path.into_inner();
    HttpResponse::Ok().json(crate::health::ProviderHealthView {
        healthy: plane.health.is_healthy(&provider),
        breaker: plane.health.breaker_snapshot(&provider),
    })
}

#[derive(Debug, Deserialize)]
struct SetHealthBody {
    healthy: bool,
}

#[put("/api/providers/{provider}/health")]
async fn put_provider_health(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
    payload: web::Json<SetHealthBody>,
) -> impl Responder {
    let provider = path.into_inner();
    plane.health.set_healthy(&provider, payload.healthy);
    HttpResponse::NoContent()
}

#[get("/api/experiments")]
async fn list_experiments(plane: web::Data<Arc<ControlPlane>>) -> impl Responder {
    HttpResponse::Ok().json(plane.experiments.list())
}

#[get("/api/experiments/{id}")]
async fn get_experiment(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ControlPlaneError> {
    let id = path.into_inner();
    match plane.experiments.get(&id) {
        Some(spec) => Ok(HttpResponse::Ok().json(spec)),
        None => Err(ControlPlaneError::ResourceNotFound {
            resource: "experiment",
            id,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct UpsertExperimentBody {
    id: String,
    #[serde(default)]
    description: String,
    variant_weights: crate::types::Weights,
    traffic_percentage: f64,
    #[serde(default)]
    tier: Option<String>,
}

/// Experiment creation/update is one idempotent endpoint; an update against
/// an existing id keeps its original `createdAt` so the stable
/// creation-order iteration in `experiments::assign` ("first
/// matching experiment wins") doesn't reshuffle on every edit.
#[post("/api/experiments")]
async fn put_experiment(
    plane: web::Data<Arc<ControlPlane>>,
    payload: web::Json<UpsertExperimentBody>,
) -> Result<impl Responder, ControlPlaneError> {
    let body = payload.into_inner();
    let created_at = plane
        .experiments
        .get(&body.id)
        .map(|existing| existing.created_at)
        .unwrap_or_else(Utc::now);
    let spec = ExperimentSpec {
        id: body.id,
        description: body.description,
        variant_weights: body.variant_weights,
        traffic_percentage: body.traffic_percentage,
        tier: body.tier,
        created_at,
    };
    plane.experiments.upsert(spec.clone());
    Ok(HttpResponse::Ok().json(spec))
}

#[delete("/api/experiments/{id}")]
async fn delete_experiment(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ControlPlaneError> {
    let id = path.into_inner();
    if plane.experiments.remove(&id) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ControlPlaneError::ResourceNotFound {
            resource: "experiment",
            id,
        })
    }
}

#[derive(Debug, Serialize)]
struct FlagView {
    name: String,
    enabled: bool,
}

#[get("/api/flags")]
async fn list_flags(plane: web::Data<Arc<ControlPlane>>) -> impl Responder {
    let flags: Vec<FlagView> = plane
        .flags
        .list()
        .into_iter()
        .map(|(name, enabled)| FlagView { name, enabled })
        .collect();
    HttpResponse::Ok().json(flags)
}

#[get("/api/flags/{name}")]
async fn get_flag(plane: web::Data<Arc<ControlPlane>>, path: web::Path<String>) -> impl Responder {
    let name = path.into_inner();
    let enabled = plane.flags.is_enabled(&name);
    HttpResponse::Ok().json(FlagView { name, enabled })
}

#[derive(Debug, Deserialize)]
struct SetFlagBody {
    enabled: bool,
}

#[put("/api/flags/{name}")]
async fn put_flag(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
    payload: web::Json<SetFlagBody>,
) -> impl Responder {
    let name = path.into_inner();
    plane.flags.set(&name, payload.enabled);
    HttpResponse::NoContent()
}

#[delete("/api/flags/{name}")]
async fn delete_flag(
    plane: web::Data<Arc<ControlPlane>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ControlPlaneError> {
    let name = path.into_inner();
    if plane.flags.remove(&name) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ControlPlaneError::ResourceNotFound {
            resource: "flag",
            id: name,
        })
    }
}

#[get("/api/analytics")]
async fn get_analytics(plane: web::Data<Arc<ControlPlane>>) -> impl Responder {
    HttpResponse::Ok().json(plane.analytics.snapshot())
}
