use std::sync::Arc;

use actix_web::{web, HttpResponse};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::Intake;
use crate::error::{ApiError, EngineError};
use crate::lifecycle::{Engine, Outcome, PostRef, ReviewerAction, SubmitterAction};
use crate::models::*;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/items").route(web::post().to(submit_item)))
            .service(web::resource("/submitter-actions").route(web::post().to(submitter_action)))
            .service(web::resource("/reviewer-actions").route(web::post().to(reviewer_action)))
            .service(web::resource("/scheduled/publish").route(web::post().to(publish_scheduled)))
            .service(web::resource("/posts/{id}").route(web::get().to(get_post))),
    );
    cfg.route("/metrics", web::get().to(render_metrics));
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Bearer token the dispatcher must present; `None` leaves intake open.
    pub intake_token: Option<String>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitItemRequest {
    pub submitter: UserId,
    pub item: IncomingItem,
    /// Set when the item belongs to a media group.
    #[serde(default)]
    pub bundle_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitterActionRequest {
    pub submitter: UserId,
    #[schema(value_type = Object)]
    pub post: PostRef,
    #[schema(value_type = Object)]
    pub action: SubmitterAction,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewerActionRequest {
    pub reviewer: UserId,
    #[schema(value_type = Object)]
    pub post: PostRef,
    #[schema(value_type = Object)]
    pub action: ReviewerAction,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OutcomeBody {
    /// `done` or `refused`.
    pub outcome: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Outcome> for OutcomeBody {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Done(message) => OutcomeBody { outcome: "done".into(), message, reason: None },
            Outcome::Refused(r) => OutcomeBody {
                outcome: "refused".into(),
                message: r.to_string(),
                reason: Some(r.reason().to_string()),
            },
        }
    }
}

fn failed(e: EngineError) -> ApiError {
    error!(error = %e, "engine operation failed");
    e.into()
}

#[utoipa::path(
    post,
    tag = "intake",
    path = "/api/v1/items",
    request_body = SubmitItemRequest,
    responses(
        (status = 200, description = "Item handled or refused", body = OutcomeBody),
        (status = 401, description = "Missing or wrong intake token"),
        (status = 502, description = "Bot API call failed", body = crate::error::ApiErrorBody)
    )
)]
pub async fn submit_item(
    _: Intake,
    data: web::Data<AppState>,
    payload: web::Json<SubmitItemRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let outcome = match req.bundle_id.as_deref() {
        Some(bundle) => data.engine.on_bundle_item(req.submitter, req.item, bundle).await,
        None => data.engine.on_single_item(req.submitter, req.item).await,
    }
    .map_err(failed)?;
    Ok(HttpResponse::Ok().json(OutcomeBody::from(outcome)))
}

#[utoipa::path(
    post,
    tag = "intake",
    path = "/api/v1/submitter-actions",
    request_body = SubmitterActionRequest,
    responses(
        (status = 200, description = "Action applied or refused", body = OutcomeBody),
        (status = 401, description = "Missing or wrong intake token"),
        (status = 404, description = "No post matches the reference", body = crate::error::ApiErrorBody)
    )
)]
pub async fn submitter_action(
    _: Intake,
    data: web::Data<AppState>,
    payload: web::Json<SubmitterActionRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let outcome = data
        .engine
        .on_submitter_action(req.submitter, &req.post, req.action)
        .await
        .map_err(failed)?;
    Ok(HttpResponse::Ok().json(OutcomeBody::from(outcome)))
}

#[utoipa::path(
    post,
    tag = "intake",
    path = "/api/v1/reviewer-actions",
    request_body = ReviewerActionRequest,
    responses(
        (status = 200, description = "Action applied or refused", body = OutcomeBody),
        (status = 401, description = "Missing or wrong intake token"),
        (status = 404, description = "No post matches the reference", body = crate::error::ApiErrorBody),
        (status = 422, description = "Stored content cannot be rebuilt", body = crate::error::ApiErrorBody)
    )
)]
pub async fn reviewer_action(
    _: Intake,
    data: web::Data<AppState>,
    payload: web::Json<ReviewerActionRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let outcome = data
        .engine
        .on_reviewer_action(req.reviewer, &req.post, req.action)
        .await
        .map_err(failed)?;
    Ok(HttpResponse::Ok().json(OutcomeBody::from(outcome)))
}

#[utoipa::path(
    post,
    tag = "intake",
    path = "/api/v1/scheduled/publish",
    responses(
        (status = 200, description = "Oldest scheduled post published, if any", body = OutcomeBody),
        (status = 401, description = "Missing or wrong intake token")
    )
)]
pub async fn publish_scheduled(_: Intake, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let published = data.engine.run_scheduled_publication().await.map_err(failed)?;
    let msg = match published {
        Some(id) => format!("published post {id}"),
        None => "nothing scheduled".to_string(),
    };
    Ok(HttpResponse::Ok().json(OutcomeBody::from(Outcome::done(msg))))
}

#[utoipa::path(
    get,
    tag = "posts",
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Stored post", body = Post),
        (status = 404, description = "Not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_post(_: Intake, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.engine.repo().get_post(path.into_inner()).await?.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn render_metrics(data: web::Data<AppState>) -> HttpResponse {
    match &data.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
