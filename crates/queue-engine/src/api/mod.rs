//! HTTP API for the queue
//!
//! Axum router over [`QueueEngine`] plus the escalation administration helpers
//! of [`SqliteQueueStore`]. Callers identify the employee and workstation
//! explicitly in each request. Observers subscribe to the push channel as a
//! server-sent-events stream and receive `updated` whenever the queue changed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::assignment::CallOutcome;
use crate::database::{QueueStore, SqliteQueueStore};
use crate::engine::QueueEngine;
use crate::error::QueueEngineError;
use crate::escalation::{EscalationRecipient, EscalationTier, TierId};
use crate::signal::{PushChannel, UPDATED};
use crate::ticket::{
    ArchivedTicket, EmployeeId, EmployeeStatus, EmployeeStatusEntry, Ticket, TicketId,
    WorkstationId,
};

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<QueueEngine>,
    pub store: Arc<SqliteQueueStore>,
    pub push: PushChannel,
}

impl ApiState {
    pub fn new(engine: Arc<QueueEngine>, store: Arc<SqliteQueueStore>, push: PushChannel) -> Self {
        Self { engine, store, push }
    }
}

/// Create the HTTP router
pub fn create_router(state: ApiState) -> Router {
    let push_path = state.push.path().to_string();

    Router::new()
        .route("/health", get(health_check))
        // Tickets
        .route("/api/v1/tickets", post(create_ticket))
        .route("/api/v1/tickets/:id/confirm", post(confirm_ticket))
        .route("/api/v1/tickets/:id/not-come", post(not_come))
        .route("/api/v1/tickets/:id/complete", post(complete_ticket))
        .route("/api/v1/tickets/:id/quality", post(rate_quality))
        .route("/api/v1/call", post(call_next))
        // Queue views and resets
        .route("/api/v1/queue", get(public_queue).delete(clear_queue))
        .route("/api/v1/queue/all", get(admin_queue))
        .route("/api/v1/queue/restart", post(restart_numbering))
        .route("/api/v1/log", get(completed_log).delete(clear_log))
        // Workstations and employees
        .route("/api/v1/workstations/:id/ticket", get(workstation_ticket))
        .route("/api/v1/workstations/:id/employee-status", get(workstation_employee_status))
        .route("/api/v1/employees/status", get(employee_statuses))
        .route("/api/v1/employees/:id/status", put(set_employee_status))
        // Escalation setup
        .route("/api/v1/escalation/tiers", get(list_tiers).post(add_tier))
        .route("/api/v1/escalation/tiers/:id", put(update_tier).delete(remove_tier))
        .route("/api/v1/escalation/tiers/:id/toggle", post(toggle_tier))
        .route("/api/v1/escalation/recipients", get(list_recipients).post(add_recipient))
        .route("/api/v1/escalation/recipients/:id", delete(remove_recipient))
        // Push channel
        .route(&push_path, get(push_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response wrapper
#[derive(Debug)]
pub struct ApiError(QueueEngineError);

impl From<QueueEngineError> for ApiError {
    fn from(err: QueueEngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            QueueEngineError::InvalidTransition { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            QueueEngineError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            QueueEngineError::UnknownService(_) | QueueEngineError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ==================== Health ====================

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let database = state.store.health_check().await;
    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({ "status": if database { "ok" } else { "degraded" }, "database": database })))
}

// ==================== Tickets ====================

#[derive(Debug, Deserialize)]
struct CreateTicketRequest {
    service_type: String,
}

#[derive(Debug, Serialize)]
struct TicketIssued {
    ticket_id: TicketId,
    service_type: String,
    priority: i64,
    created_at: i64,
}

async fn create_ticket(
    State(state): State<ApiState>,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<TicketIssued>)> {
    let ticket = state.engine.create_ticket(&req.service_type).await?;
    Ok((
        StatusCode::CREATED,
        Json(TicketIssued {
            ticket_id: ticket.id,
            service_type: ticket.service_type,
            priority: ticket.priority,
            created_at: ticket.created_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct CallRequest {
    employee_id: EmployeeId,
    workstation_id: WorkstationId,
}

async fn call_next(State(state): State<ApiState>, Json(req): Json<CallRequest>) -> ApiResult<Json<CallOutcome>> {
    let outcome = state.engine.call_next(req.employee_id, req.workstation_id).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct EmployeeRequest {
    employee_id: EmployeeId,
}

async fn confirm_ticket(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(req): Json<EmployeeRequest>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.confirm(id, req.employee_id).await?))
}

async fn not_come(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(req): Json<EmployeeRequest>,
) -> ApiResult<StatusCode> {
    state.engine.not_come(id, req.employee_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_ticket(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(req): Json<EmployeeRequest>,
) -> ApiResult<Json<ArchivedTicket>> {
    Ok(Json(state.engine.complete(id, req.employee_id).await?))
}

#[derive(Debug, Deserialize)]
struct QualityRequest {
    quality: i64,
}

async fn rate_quality(
    State(state): State<ApiState>,
    Path(id): Path<TicketId>,
    Json(req): Json<QualityRequest>,
) -> ApiResult<StatusCode> {
    state.engine.rate_quality(id, req.quality).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Queue ====================

async fn public_queue(State(state): State<ApiState>) -> ApiResult<Json<Vec<Ticket>>> {
    Ok(Json(state.engine.public_queue().await?))
}

async fn admin_queue(State(state): State<ApiState>) -> ApiResult<Json<Vec<Ticket>>> {
    Ok(Json(state.engine.admin_queue().await?))
}

async fn clear_queue(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.engine.clear_queue().await?;
    Ok(Json(json!({ "removed": removed })))
}

async fn restart_numbering(State(state): State<ApiState>) -> ApiResult<StatusCode> {
    state.engine.restart_numbering().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn completed_log(State(state): State<ApiState>) -> ApiResult<Json<Vec<ArchivedTicket>>> {
    Ok(Json(state.engine.completed_log().await?))
}

async fn clear_log(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.engine.clear_log().await?;
    Ok(Json(json!({ "removed": removed })))
}

// ==================== Workstations / employees ====================

async fn workstation_ticket(
    State(state): State<ApiState>,
    Path(id): Path<WorkstationId>,
) -> ApiResult<Json<Option<Ticket>>> {
    Ok(Json(state.engine.ticket_for_workstation(id).await?))
}

async fn workstation_employee_status(
    State(state): State<ApiState>,
    Path(id): Path<WorkstationId>,
) -> ApiResult<Json<EmployeeStatusEntry>> {
    state
        .engine
        .employee_status_for_workstation(id)
        .await?
        .map(Json)
        .ok_or_else(|| QueueEngineError::not_found(format!("no employee seated at workstation {}", id)).into())
}

async fn employee_statuses(State(state): State<ApiState>) -> ApiResult<Json<Vec<EmployeeStatusEntry>>> {
    Ok(Json(state.engine.employee_statuses().await?))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: EmployeeStatus,
}

async fn set_employee_status(
    State(state): State<ApiState>,
    Path(id): Path<EmployeeId>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<StatusCode> {
    state.engine.set_employee_status(id, req.status).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Escalation ====================

#[derive(Debug, Deserialize)]
struct TierRequest {
    threshold_secs: i64,
    name: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

async fn list_tiers(State(state): State<ApiState>) -> ApiResult<Json<Vec<EscalationTier>>> {
    Ok(Json(state.store.list_tiers().await?))
}

async fn add_tier(
    State(state): State<ApiState>,
    Json(req): Json<TierRequest>,
) -> ApiResult<(StatusCode, Json<EscalationTier>)> {
    let tier = state.store.add_tier(req.threshold_secs, &req.name, req.active).await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

async fn update_tier(
    State(state): State<ApiState>,
    Path(id): Path<TierId>,
    Json(req): Json<TierRequest>,
) -> ApiResult<Json<EscalationTier>> {
    let tier = EscalationTier {
        id,
        threshold_secs: req.threshold_secs,
        name: req.name,
        active: req.active,
    };
    if !state.store.update_tier(&tier).await? {
        return Err(QueueEngineError::not_found(format!("escalation tier {}", id)).into());
    }
    Ok(Json(tier))
}

async fn remove_tier(State(state): State<ApiState>, Path(id): Path<TierId>) -> ApiResult<StatusCode> {
    if !state.store.remove_tier(id).await? {
        return Err(QueueEngineError::not_found(format!("escalation tier {}", id)).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_tier(
    State(state): State<ApiState>,
    Path(id): Path<TierId>,
) -> ApiResult<Json<serde_json::Value>> {
    let active = state
        .store
        .toggle_tier(id)
        .await?
        .ok_or_else(|| QueueEngineError::not_found(format!("escalation tier {}", id)))?;
    Ok(Json(json!({ "id": id, "active": active })))
}

#[derive(Debug, Deserialize)]
struct RecipientRequest {
    email: String,
    tier_id: TierId,
}

async fn list_recipients(State(state): State<ApiState>) -> ApiResult<Json<Vec<EscalationRecipient>>> {
    Ok(Json(state.store.list_recipients().await?))
}

async fn add_recipient(
    State(state): State<ApiState>,
    Json(req): Json<RecipientRequest>,
) -> ApiResult<(StatusCode, Json<EscalationRecipient>)> {
    let id = state.store.add_recipient(&req.email, req.tier_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(EscalationRecipient {
            id,
            email: req.email,
            tier_id: req.tier_id,
        }),
    ))
}

async fn remove_recipient(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    if !state.store.remove_recipient(id).await? {
        return Err(QueueEngineError::not_found(format!("escalation recipient {}", id)).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Push ====================

/// Server-sent events: one `updated` event per observed change. A subscriber
/// that fell behind gets a single `updated` in place of the events it missed.
async fn push_events(State(state): State<ApiState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.push.subscribe()).map(|message| {
        let event = match message {
            Ok(push) => Event::default().id(push.id.to_string()).data(push.data),
            Err(BroadcastStreamRecvError::Lagged(_)) => Event::default().data(UPDATED),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
