use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::analytics::AnalyticsRecorder;
use crate::catalog::CellCatalog;
use crate::claim::build_claim;
use crate::errors::ControlPlaneError;
use crate::experiments::ExperimentRegistry;
use crate::flags::FeatureFlags;
use crate::health::ProviderHealth;
use crate::policy::TierTable;
use crate::products::{self, ProductRegistry};
use crate::scheduler::{schedule, ScheduleInput};
use crate::sticky::{StickyRecord, StickyStore};
use crate::types::{Candidate, Claim, ExcludedCandidate, ExperimentArm, Placement, PlacementReason, ServiceRequest};
use uuid::Uuid;

/// Per-attempt budget for a sticky-store round trip ("every
/// outbound sticky-store call carries a deadline"). The in-memory adapter
/// never actually blocks, but the call sites still go through this so an
/// orchestrator-backed adapter can be dropped in without touching callers.
const STICKY_STORE_CALL_TIMEOUT: Duration = Duration::from_secs(3);

async fn with_sticky_timeout<F, T>(future: F) -> Result<T, ControlPlaneError>
where
    F: std::future::Future<Output = T>,
{
    timeout(STICKY_STORE_CALL_TIMEOUT, future)
        .await
        .map_err(|_| ControlPlaneError::UpstreamTransient("sticky store call timed out".into()))
}

/// Wires the eleven components into the handler-facing orchestration layer
/// described above. Holds no request-local state; every method is
/// safe to call concurrently from any number of Actix worker threads.
pub struct ControlPlane {
    pub catalog: CellCatalog,
    pub tiers: TierTable,
    pub products: ProductRegistry,
    pub health: ProviderHealth,
    pub experiments: ExperimentRegistry,
    pub flags: FeatureFlags,
    pub analytics: AnalyticsRecorder,
    pub sticky: Arc<dyn StickyStore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub status: &'static str,
    pub sticky: bool,
    pub placement: Placement,
    pub reason: PlacementReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSecretInfo {
    pub namespace: String,
    pub name: String,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub claim: Claim,
    pub connection_secret: ConnectionSecretInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailoverResponse {
    pub status: &'static str,
    pub previous_provider: String,
    pub placement: Placement,
    pub reason: PlacementReason,
    pub claim: Claim,
}

impl ControlPlane {
    /// Create (or return the existing sticky placement for) a service.
    /// A sticky hit short-circuits before the scheduler is
    /// ever invoked (tested by the "sticky ⇒ scheduler not invoked"
    /// invariant).
    pub async fn create(
        &self,
        product_name: &str,
        request: ServiceRequest,
    ) -> Result<CreateResponse, ControlPlaneError> {
        for key in request.params.keys() {
            if crate::types::FORBIDDEN_REQUEST_KEYS.contains(&key.as_str()) {
                return Err(ControlPlaneError::ForbiddenKey(key.clone()));
            }
        }

        let request_id = Uuid::new_v4();
        let product = self.products.get(product_name)?;
        let validated_params = products::validate_params(&product, &request.params)?;
        let tier = self.tiers.tier_spec(&request.tier)?;

        if let Some(existing) = with_sticky_timeout(self.sticky.get_record(
            product_name,
            &request.namespace,
            &request.name,
        ))
        .await?
        {
            tracing::info!(
                %request_id,
                product = product_name,
                tier = %request.tier,
                sticky = true,
                "returned existing sticky placement"
            );
            return Ok(CreateResponse {
                status: "exists",
                sticky: true,
                placement: existing.placement,
                reason: existing.reason,
                claim: None,
                applied: None,
            });
        }

        let candidates = self.catalog.candidates_for(&request.cell)?;
        let exclude = HashSet::new();
        let outcome = schedule(ScheduleInput {
            request_name: &request.name,
            tier,
            ha: request.ha,
            candidates: candidates.clone(),
            health: &self.health,
            experiments: &self.experiments,
            flags: &self.flags,
            exclude_providers: &exclude,
        });

        let reason = match outcome {
            Ok(reason) => reason,
            Err(excluded) => {
                self.analytics.record_request(true);
                return Err(no_viable_candidate(excluded));
            }
        };

        let placement = placement_for(&candidates, &reason.selected.provider, &reason.selected.region)?;
        let claim = build_claim(
            &product,
            &request.namespace,
            &request.name,
            &validated_params,
            &placement,
            &reason,
        );

        with_sticky_timeout(self.sticky.apply_record(StickyRecord {
            product: product_name.to_string(),
            request: request.clone(),
            placement: placement.clone(),
            reason: reason.clone(),
            claim: claim.clone(),
        }))
        .await?;

        self.health.record_success(&placement.provider);
        self.analytics.record_request(false);
        self.analytics.record_placement(
            &placement.provider,
            &placement.region,
            &tier.id,
            reason.selected.total_score,
            experiment_arm_label(&reason),
        );

        tracing::info!(
            %request_id,
            product = product_name,
            tier = %tier.id,
            candidates_evaluated = reason.candidates_evaluated,
            selected_provider = %placement.provider,
            selected_region = %placement.region,
            "placed service"
        );

        Ok(CreateResponse {
            status: "created",
            sticky: false,
            placement,
            reason,
            claim: Some(claim),
            applied: Some(true),
        })
    }

    /// Fetch the Claim for an existing service. Never returns secret data,
    /// only whether a connection secret exists.
    pub async fn status(
        &self,
        product: &str,
        namespace: &str,
        name: &str,
    ) -> Result<StatusResponse, ControlPlaneError> {
        let record = with_sticky_timeout(self.sticky.get_record(product, namespace, name))
            .await?
            .ok_or_else(|| ControlPlaneError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        let exists = with_sticky_timeout(
            self.sticky
                .connection_secret_exists(product, namespace, name),
        )
        .await?;
        Ok(StatusResponse {
            claim: record.claim,
            connection_secret: ConnectionSecretInfo {
                namespace: namespace.to_string(),
                name: name.to_string(),
                exists,
            },
        })
    }

    /// Forced reschedule, overriding stickiness: deletes the existing Claim,
    /// reschedules against `excludeProviders`, and applies the new one. The
    /// only operation permitted to un-stick an already-placed service.
    pub async fn failover(
        &self,
        product: &str,
        namespace: &str,
        name: &str,
        exclude_providers: HashSet<String>,
    ) -> Result<FailoverResponse, ControlPlaneError> {
        let request_id = Uuid::new_v4();
        let existing = with_sticky_timeout(self.sticky.get_record(product, namespace, name))
            .await?
            .ok_or_else(|| ControlPlaneError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        let product_def = self.products.get(&existing.product)?;
        let tier = self.tiers.tier_spec(&existing.request.tier)?;
        let candidates = self.catalog.candidates_for(&existing.request.cell)?;

        let outcome = schedule(ScheduleInput {
            request_name: &existing.request.name,
            tier,
            ha: existing.request.ha,
            candidates: candidates.clone(),
            health: &self.health,
            experiments: &self.experiments,
            flags: &self.flags,
            exclude_providers: &exclude_providers,
        });

        let reason = match outcome {
            Ok(reason) => reason,
            Err(excluded) => {
                self.analytics.record_request(true);
                return Err(no_viable_candidate(excluded));
            }
        };

        let placement = placement_for(&candidates, &reason.selected.provider, &reason.selected.region)?;
        let validated_params = products::validate_params(&product_def, &existing.request.params)?;
        let claim = build_claim(
            &product_def,
            namespace,
            name,
            &validated_params,
            &placement,
            &reason,
        );

        with_sticky_timeout(self.sticky.delete_record(product, namespace, name)).await?;
        with_sticky_timeout(self.sticky.apply_record(StickyRecord {
            product: existing.product.clone(),
            request: existing.request.clone(),
            placement: placement.clone(),
            reason: reason.clone(),
            claim: claim.clone(),
        }))
        .await?;

        self.health.record_success(&placement.provider);
        self.analytics.record_request(false);
        self.analytics.record_placement(
            &placement.provider,
            &placement.region,
            &tier.id,
            reason.selected.total_score,
            experiment_arm_label(&reason),
        );

        tracing::info!(
            %request_id,
            product = %existing.product,
            tier = %tier.id,
            candidates_evaluated = reason.candidates_evaluated,
            previous_provider = %existing.placement.provider,
            selected_provider = %placement.provider,
            selected_region = %placement.region,
            "failover placed service"
        );

        Ok(FailoverResponse {
            status: "failover_complete",
            previous_provider: existing.placement.provider,
            placement,
            reason,
            claim,
        })
    }
}

fn no_viable_candidate(excluded: Vec<ExcludedCandidate>) -> ControlPlaneError {
    ControlPlaneError::NoViableCandidate { excluded }
}

/// The scheduler's `PlacementReason.selected` carries only
/// `{provider, region, totalScore}`; the full `Placement` (with
/// `runtimeCluster`/`network`) is recovered by re-locating the winning
/// candidate in the pool that was actually scored. A miss here means the
/// scheduler selected a candidate outside its own input, which is a bug,
/// not a caller error.
fn placement_for(candidates: &[Candidate], provider: &str, region: &str) -> Result<Placement, ControlPlaneError> {
    candidates
        .iter()
        .find(|c| c.provider == provider && c.region == region)
        .map(|c| Placement {
            provider: c.provider.clone(),
            region: c.region.clone(),
            runtime_cluster: c.runtime_cluster.clone(),
            network: c.network.clone(),
        })
        .ok_or_else(|| {
            ControlPlaneError::Unexpected(anyhow::anyhow!(
                "scheduler selected {provider}/{region} which is not in its own candidate pool"
            ))
        })
}

fn experiment_arm_label(reason: &PlacementReason) -> Option<(&str, &str)> {
    reason.experiment_arm.as_ref().map(|assignment| {
        (
            assignment.experiment_id.as_str(),
            match assignment.arm {
                ExperimentArm::Control => "control",
                ExperimentArm::Variant => "variant",
            },
        )
    })
}
