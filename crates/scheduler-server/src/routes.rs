//! HTTP Surface (spec §4.8): the three endpoints plus health, and the
//! translation from [`SchedulerError`] to status codes. Logging discipline
//! (spec §7) lives here too — this is the one place a status event's
//! outcome becomes a structured log line tagged with a closed `event_type`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post};
use scheduler_auth::AuthGate;
use scheduler_retry::BackoffConfig;
use scheduler_store::StoreGateway;
use scheduler_types::{IngestOutcome, KernelOutcome, PlanInput, SchedulerError};
use scheduler_webhook::TriggerClient;
use serde::{Deserialize, Serialize};

pub struct AppState {
    pub store: Arc<dyn StoreGateway>,
    pub trigger: TriggerClient,
    pub auth: AuthGate,
    pub retry: BackoffConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/plans", post(create_plan))
        .route("/plans/{plan_id}", get(get_plan))
        .route("/pubsub/spec-status", post(pubsub_spec_status))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

fn error_body(detail: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody { detail: detail.into() })
}

/// Every `bad_input` is 400 except on `POST /plans`, where it is 422 (spec
/// §4.8). Everything else maps the same way regardless of endpoint.
fn error_response(err: SchedulerError, bad_input_status: StatusCode) -> Response {
    match err {
        SchedulerError::BadInput(msg) => (bad_input_status, error_body(msg)).into_response(),
        SchedulerError::Unauthorized => (StatusCode::UNAUTHORIZED, error_body("unauthorized")).into_response(),
        SchedulerError::NotFound(id) => (StatusCode::NOT_FOUND, error_body(format!("plan {id} not found"))).into_response(),
        SchedulerError::Conflict(id) => {
            (StatusCode::CONFLICT, error_body(format!("plan {id} already exists with a different payload"))).into_response()
        }
        SchedulerError::Transient(msg) => {
            tracing::warn!(event_type = "transient_error", detail = %msg, "store transaction did not land");
            (StatusCode::SERVICE_UNAVAILABLE, error_body(msg)).into_response()
        }
        SchedulerError::Internal(msg) => {
            tracing::error!(event_type = "internal", detail = %msg, "invariant violation");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg)).into_response()
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Serialize)]
struct CreatePlanResponse {
    plan_id: String,
    status: &'static str,
}

async fn create_plan(State(state): State<Arc<AppState>>, Json(input): Json<PlanInput>) -> Response {
    match scheduler_core::ingest_plan(state.store.as_ref(), input).await {
        Ok(IngestOutcome::Created { plan_id }) => {
            tracing::info!(event_type = "plan_created", plan_id = %plan_id, "plan created");
            (StatusCode::CREATED, Json(CreatePlanResponse { plan_id, status: "running" })).into_response()
        }
        Ok(IngestOutcome::Idempotent { plan_id }) => {
            tracing::info!(event_type = "plan_idempotent", plan_id = %plan_id, "plan ingestion replayed");
            (StatusCode::OK, Json(CreatePlanResponse { plan_id, status: "running" })).into_response()
        }
        Err(SchedulerError::Conflict(id)) => {
            tracing::warn!(event_type = "plan_conflict", plan_id = %id, "plan digest mismatch");
            error_response(SchedulerError::Conflict(id), StatusCode::UNPROCESSABLE_ENTITY)
        }
        Err(err) => error_response(err, StatusCode::UNPROCESSABLE_ENTITY),
    }
}

#[derive(Debug, Deserialize)]
struct GetPlanQuery {
    #[serde(default = "default_include_stage")]
    include_stage: bool,
}

fn default_include_stage() -> bool {
    true
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
    Query(query): Query<GetPlanQuery>,
) -> Response {
    match scheduler_core::project_plan(state.store.as_ref(), &plan_id).await {
        Ok(mut projection) => {
            if !query.include_stage {
                for spec in &mut projection.specs {
                    spec.stage = None;
                }
            }
            (StatusCode::OK, Json(projection)).into_response()
        }
        Err(err) => error_response(err, StatusCode::BAD_REQUEST),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn pubsub_spec_status(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let verification_token = headers
        .get("x-goog-pubsub-verification-token")
        .and_then(|v| v.to_str().ok());
    let bearer = bearer_token(&headers);

    if !state.auth.verify(verification_token, bearer) {
        tracing::warn!(event_type = "unauthorized", "push request failed authentication");
        return error_response(SchedulerError::Unauthorized, StatusCode::BAD_REQUEST);
    }

    let event = match scheduler_core::decode_event(&body) {
        Ok(event) => event,
        Err(err) => return error_response(err, StatusCode::BAD_REQUEST),
    };

    let plan_id = event.plan_id.clone();
    let spec_index = event.spec_index;
    let message_id = event.message_id.clone();

    match scheduler_core::apply_event(state.store.as_ref(), &state.trigger, &state.retry, event).await {
        Ok(outcome) => {
            log_outcome(outcome, &plan_id, spec_index, &message_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(err, StatusCode::BAD_REQUEST),
    }
}

fn log_outcome(outcome: KernelOutcome, plan_id: &str, spec_index: u32, message_id: &str) {
    match outcome {
        KernelOutcome::Applied => {
            tracing::info!(event_type = "non_terminal_update", plan_id, spec_index, message_id, "status event applied");
        }
        KernelOutcome::Duplicate => {
            tracing::info!(event_type = "duplicate_message", plan_id, spec_index, message_id, "duplicate status event ignored");
        }
        KernelOutcome::OutOfOrder => {
            tracing::error!(event_type = "out_of_order", plan_id, spec_index, message_id, "status event for a non-current spec");
        }
        KernelOutcome::TerminalIgnored => {
            tracing::warn!(event_type = "terminal_spec_finished", plan_id, spec_index, message_id, "status event for an already-terminal spec ignored");
        }
        KernelOutcome::MissingPlan => {
            tracing::warn!(event_type = "missing_plan", plan_id, spec_index, message_id, "status event for an unknown plan");
        }
        KernelOutcome::MissingSpec => {
            tracing::warn!(event_type = "missing_spec", plan_id, spec_index, message_id, "status event for an unknown spec index");
        }
    }
}
