//! Route table and handlers for the submission pipeline API.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use vellum_core::types::{JobId, VersionId};
use vellum_engine::{
    safe_json_update, EngineError, JobCreateRequest, JobPatch, RequestContext, TransitionOutcome,
};

use crate::error::WebError;
use crate::model::{
    CreateJobRequest, DeferredResponse, JobPatchBody, JobView, StatusWriteRequest,
    TransitionRequest, VersionView,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(create_job))
        .route("/jobs/{job_id}", get(get_job).patch(update_job))
        .route(
            "/submissions/{version_id}/transitions",
            post(execute_transition),
        )
        .route("/submissions/{version_id}/metadata", put(update_metadata))
        .route(
            "/sites/{site}/submissions/{version_id}/status",
            put(write_status),
        )
        .with_state(state)
}

/// Caller identity assembled from gateway-provided headers. A request is
/// trusted only when the gateway stamped it as an internal service call.
fn request_context(headers: &HeaderMap) -> RequestContext {
    if headers.contains_key("x-trusted-service") {
        return RequestContext::trusted_service();
    }
    let user = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous");
    let scopes: Vec<String> = headers
        .get("x-scopes")
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    RequestContext::user(user, scopes)
}

fn handshake(headers: &HeaderMap) -> Result<String, WebError> {
    headers
        .get("x-handshake")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(WebError::Engine(EngineError::Unauthorized))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, WebError> {
    let job = state
        .orchestrator
        .jobs()
        .get_job(&JobId::new(job_id.clone()))
        .map_err(EngineError::from)?
        .ok_or(EngineError::NotFound {
            resource: format!("job '{job_id}'"),
        })?;
    Ok(Json(JobView::from(&job)))
}

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> Result<Response, WebError> {
    let ctx = request_context(&headers);
    if !ctx.trusted {
        tracing::warn!("job creation rejected: caller is not a trusted service");
        return Err(EngineError::Unauthorized.into());
    }

    let job_type = vellum_core::types::JobType::parse(&request.job_type);
    let job = state
        .orchestrator
        .create(
            &ctx,
            JobCreateRequest {
                job_type,
                payload: request.payload,
                submission_version_id: request.submission_version_id.map(VersionId::new),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(JobView::from(&job))).into_response())
}

async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JobPatchBody>,
) -> Result<Json<JobView>, WebError> {
    let ctx = request_context(&headers);
    let token = headers
        .get("x-handshake")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let status = body
        .status
        .map(|raw| {
            raw.parse()
                .map_err(|message: String| WebError::BadRequest(message))
        })
        .transpose()?;
    let patch = JobPatch {
        status,
        message: body.message,
        results: body.results,
        submission_version_id: body.submission_version_id.map(VersionId::new),
    };

    let job = state
        .callback
        .update(&ctx, token.as_deref(), &JobId::new(job_id), patch)?;
    Ok(Json(JobView::from(&job)))
}

async fn execute_transition(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Result<Response, WebError> {
    let ctx = request_context(&headers);
    let workflow = state
        .config
        .workflow_for_collection(request.collection.as_deref())
        .ok_or_else(|| {
            WebError::BadRequest(format!(
                "no workflow configured for collection {:?}",
                request.collection
            ))
        })?;

    let outcome = state
        .executor
        .execute(&ctx, &VersionId::new(version_id), workflow, &request.target)
        .await?;
    Ok(match outcome {
        TransitionOutcome::Applied(version) => {
            (StatusCode::OK, Json(VersionView::from(&version))).into_response()
        }
        TransitionOutcome::Deferred { job_id } => (
            StatusCode::ACCEPTED,
            Json(DeferredResponse { job_id: job_id.0 }),
        )
            .into_response(),
    })
}

async fn update_metadata(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<VersionView>, WebError> {
    let patch = body
        .as_object()
        .cloned()
        .ok_or_else(|| WebError::BadRequest("metadata patch must be a JSON object".to_string()))?;

    let version = safe_json_update(
        state.versions.as_ref(),
        &VersionId::new(version_id),
        state.config.jobs.occ_max_retries,
        move |metadata| {
            if !metadata.is_object() {
                *metadata = serde_json::json!({});
            }
            for (key, value) in &patch {
                metadata[key] = value.clone();
            }
        },
    )?;
    Ok(Json(VersionView::from(&version)))
}

async fn write_status(
    State(state): State<AppState>,
    Path((site, version_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<StatusWriteRequest>,
) -> Result<Json<VersionView>, WebError> {
    let token = handshake(&headers)?;
    tracing::info!(
        site = %site,
        version_id = %version_id,
        user_id = request.user_id.as_deref().unwrap_or("-"),
        "status write requested"
    );
    let version =
        state
            .callback
            .set_status(&token, &VersionId::new(version_id), &request.status)?;
    Ok(Json(VersionView::from(&version)))
}
