use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::delivery::DeliveryError;
use crate::models::{ContentKind, Id};
use crate::policy::PolicyError;
use crate::repo::RepoError;

/// Failures that abort an engine operation. Guard and quota refusals are not errors.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("store: {0}")]
    Store(#[from] RepoError),
    #[error("delivery: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),
    #[error("unsupported content kind: {0}")]
    UnsupportedKind(ContentKind),
    #[error("post {0} has no stored attachment")]
    MissingAttachment(Id),
    #[error("post not found")]
    NotFound,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("{0}")] Unprocessable(String),
    #[error("action failed")] ActionFailed,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict | RepoError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound => ApiError::NotFound,
            EngineError::UnsupportedKind(_) | EngineError::MissingAttachment(_) => ApiError::Unprocessable(e.to_string()),
            EngineError::Delivery(_) | EngineError::Policy(_) => ApiError::ActionFailed,
            EngineError::Store(inner) => ApiError::from(inner),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ActionFailed => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
