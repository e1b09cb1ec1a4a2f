use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::ExcludedCandidate;

/// Error taxonomy. Validation and dependency errors are
/// returned verbatim as `{error, kind, details}`; only truly unexpected
/// errors collapse to a generic 500.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("forbidden inbound key: {0}")]
    ForbiddenKey(String),
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("invalid type for parameter {name}: expected {expected}")]
    InvalidParameterType { name: String, expected: String },
    #[error("parameter {name} out of range: {detail}")]
    InvalidParameterRange { name: String, detail: String },
    #[error("unknown tier: {0}")]
    UnknownTier(String),
    #[error("unknown product: {0}")]
    UnknownProduct(String),
    #[error("unknown cell: {0}")]
    UnknownCell(String),
    #[error("duplicate product registration: {0}")]
    DuplicateProduct(String),
    #[error("orchestrator dependency missing: {0}")]
    DependencyMissing(String),
    #[error("no viable candidate for placement")]
    NoViableCandidate { excluded: Vec<ExcludedCandidate> },
    #[error("claim not found for {namespace}/{name}")]
    NotFound { namespace: String, name: String },
    #[error("{resource} not found: {id}")]
    ResourceNotFound { resource: &'static str, id: String },
    #[error("upstream transient failure: {0}")]
    UpstreamTransient(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    details: Value,
}

impl ControlPlaneError {
    fn kind(&self) -> &'static str {
        match self {
            ControlPlaneError::ForbiddenKey(_) => "ValidationError",
            ControlPlaneError::MissingParameter(_) => "ValidationError",
            ControlPlaneError::UnknownParameter(_) => "ValidationError",
            ControlPlaneError::InvalidParameterType { .. } => "ValidationError",
            ControlPlaneError::InvalidParameterRange { .. } => "ValidationError",
            ControlPlaneError::UnknownTier(_) => "UnknownTier",
            ControlPlaneError::UnknownProduct(_) => "UnknownProduct",
            ControlPlaneError::UnknownCell(_) => "UnknownCell",
            ControlPlaneError::DuplicateProduct(_) => "ValidationError",
            ControlPlaneError::DependencyMissing(_) => "DependencyMissing",
            ControlPlaneError::NoViableCandidate { .. } => "NoViableCandidate",
            ControlPlaneError::NotFound { .. } => "NotFound",
            ControlPlaneError::ResourceNotFound { .. } => "NotFound",
            ControlPlaneError::UpstreamTransient(_) => "UpstreamTransient",
            ControlPlaneError::Io(_) => "Internal",
            ControlPlaneError::Unexpected(_) => "Internal",
        }
    }

    fn details(&self) -> Value {
        match self {
            ControlPlaneError::NoViableCandidate { excluded } => {
                serde_json::json!({ "excluded": excluded })
            }
            _ => Value::Null,
        }
    }
}

impl ResponseError for ControlPlaneError {
    fn status_code(&self) -> StatusCode {
        match self {
            ControlPlaneError::ForbiddenKey(_)
            | ControlPlaneError::MissingParameter(_)
            | ControlPlaneError::UnknownParameter(_)
            | ControlPlaneError::InvalidParameterType { .. }
            | ControlPlaneError::InvalidParameterRange { .. }
            | ControlPlaneError::UnknownTier(_)
            | ControlPlaneError::UnknownProduct(_)
            | ControlPlaneError::UnknownCell(_)
            | ControlPlaneError::DuplicateProduct(_) => StatusCode::BAD_REQUEST,
            ControlPlaneError::DependencyMissing(_) => StatusCode::FAILED_DEPENDENCY,
            ControlPlaneError::NoViableCandidate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ControlPlaneError::NotFound { .. } | ControlPlaneError::ResourceNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ControlPlaneError::UpstreamTransient(_) => StatusCode::BAD_GATEWAY,
            ControlPlaneError::Io(_) | ControlPlaneError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(
            self,
            ControlPlaneError::Io(_) | ControlPlaneError::Unexpected(_)
        ) {
            tracing::error!(error = %self, "unexpected control-plane error");
            return HttpResponse::build(self.status_code()).json(ErrorBody {
                error: "internal error".into(),
                kind: "Internal",
                details: Value::Null,
            });
        }
        let mut response = HttpResponse::build(self.status_code());
        if matches!(self, ControlPlaneError::UpstreamTransient(_)) {
            response.append_header(("Retry-After", "1"));
        }
        response.json(ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            details: self.details(),
        })
    }
}
