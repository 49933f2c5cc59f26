//! HTTP endpoint handlers

use std::{convert::Infallible, sync::Arc};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::{
    error::TimerError,
    state::{AppState, Reconciliation, StartOutcome, TimerId},
};
use super::responses::{
    ApiResponse, CreateTimerRequest, HandoffResponse, HealthResponse, RemainingRequest,
    StatusResponse, SuspendRequest, TimerView, TimersResponse,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiResponse>)>;

/// Map a failed command to its HTTP answer; unknown ids are ignored, not failed
fn reject(command: &str, e: TimerError) -> ApiResult<ApiResponse> {
    let status = match &e {
        TimerError::UnknownId(_) => {
            debug!("{} ignored: {}", command, e);
            return Ok(Json(ApiResponse::ignored(e.to_string(), None)));
        }
        TimerError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
        TimerError::AlreadyRunning { .. } => StatusCode::CONFLICT,
        TimerError::StatePoisoned(_) => {
            error!("{} failed: {}", command, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status != StatusCode::INTERNAL_SERVER_ERROR {
        warn!("{} rejected: {}", command, e);
    }
    Err((status, Json(ApiResponse::error(e.to_string()))))
}

fn internal_error(e: TimerError) -> (StatusCode, Json<ApiResponse>) {
    error!("Failed to read timer state: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error(e.to_string())),
    )
}

/// Handle POST /timers - Create a timer
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTimerRequest>,
) -> ApiResult<ApiResponse> {
    match state.create(request.period_ms()) {
        Ok(timer) => {
            info!("Create endpoint called - timer {} created", timer.id);
            Ok(Json(ApiResponse::ok(
                format!("Timer {} created", timer.id),
                Some(timer),
            )))
        }
        Err(e) => reject("create", e),
    }
}

/// Handle GET /timers - List timers in creation order
pub async fn list_handler(State(state): State<Arc<AppState>>) -> ApiResult<TimersResponse> {
    let timers = state.list().map_err(internal_error)?;
    let running = state.running().map_err(internal_error)?;
    let suspended = state.is_suspended().map_err(internal_error)?;

    Ok(Json(TimersResponse {
        timers: timers.into_iter().map(TimerView::from).collect(),
        running,
        suspended,
    }))
}

/// Handle GET /timers/:id - Show one timer
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<TimerView>, (StatusCode, Json<ApiResponse>)> {
    match state.get(TimerId(id)) {
        Ok(timer) => Ok(Json(TimerView::from(timer))),
        Err(e @ TimerError::UnknownId(_)) => {
            Err((StatusCode::NOT_FOUND, Json(ApiResponse::error(e.to_string()))))
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// Handle POST /timers/:id/start - Start or resume a timer
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<ApiResponse> {
    let id = TimerId(id);
    match state.start(id) {
        Ok(outcome) => {
            let timer = state.get(id).ok();
            match outcome {
                StartOutcome::Started { .. } => {
                    info!("Start endpoint called - timer {} running", id);
                    Ok(Json(ApiResponse::ok(format!("Timer {} started", id), timer)))
                }
                StartOutcome::Ignored => Ok(Json(ApiResponse::ignored(
                    format!("Timer {} not started", id),
                    timer,
                ))),
            }
        }
        Err(e) => reject("start", e),
    }
}

/// Handle POST /timers/:id/stop - Pause a timer
pub async fn stop_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    body: Option<Json<RemainingRequest>>,
) -> ApiResult<ApiResponse> {
    let id = TimerId(id);
    let snapshot = body.and_then(|Json(request)| request.remaining_ms);
    match state.stop(id, snapshot) {
        Ok(timer) => {
            info!("Stop endpoint called - timer {} at {}ms", id, timer.remaining_ms);
            Ok(Json(ApiResponse::ok(format!("Timer {} stopped", id), Some(timer))))
        }
        Err(e) => reject("stop", e),
    }
}

/// Handle POST /timers/:id/reset - Return a timer to idle
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    body: Option<Json<RemainingRequest>>,
) -> ApiResult<ApiResponse> {
    let id = TimerId(id);
    let remaining_ms = body.and_then(|Json(request)| request.remaining_ms);
    match state.reset(id, remaining_ms) {
        Ok(timer) => {
            info!("Reset endpoint called - timer {} reset", id);
            Ok(Json(ApiResponse::ok(format!("Timer {} reset", id), Some(timer))))
        }
        Err(e) => reject("reset", e),
    }
}

/// Handle DELETE /timers/:id - Remove a timer
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<ApiResponse> {
    let id = TimerId(id);
    match state.delete(id) {
        Ok(timer) => {
            info!("Delete endpoint called - timer {} removed", id);
            Ok(Json(ApiResponse::ok(format!("Timer {} deleted", id), Some(timer))))
        }
        Err(e) => reject("delete", e),
    }
}

/// Handle POST /suspend - The interactive surface went to the background
pub async fn suspend_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SuspendRequest>>,
) -> ApiResult<HandoffResponse> {
    let now_epoch_ms = body
        .and_then(|Json(request)| request.now_epoch_ms)
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    match state.suspend(now_epoch_ms) {
        Ok(active) => {
            info!("Suspend endpoint called - active timer {:?}", active);
            Ok(Json(HandoffResponse {
                status: "suspended".to_string(),
                message: format!("Suspended at {}", now_epoch_ms),
                timestamp: Utc::now(),
                active,
            }))
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// Handle POST /resume - The interactive surface is back in the foreground
pub async fn resume_handler(State(state): State<Arc<AppState>>) -> ApiResult<HandoffResponse> {
    let reconciliation = state
        .resume(Utc::now().timestamp_millis())
        .map_err(internal_error)?;

    let (status, message, active) = match reconciliation {
        Reconciliation::NotSuspended => ("ignored", "Not suspended".to_string(), None),
        Reconciliation::Discarded => ("resumed", "No running timer to reconcile".to_string(), None),
        Reconciliation::Resumed {
            id, remaining_ms, ..
        } => (
            "resumed",
            format!("Timer {} resumed with {}ms left", id, remaining_ms),
            Some(id),
        ),
        Reconciliation::Finished { id } => (
            "resumed",
            format!("Timer {} finished while suspended", id),
            Some(id),
        ),
    };
    info!("Resume endpoint called - {}", message);

    Ok(Json(HandoffResponse {
        status: status.to_string(),
        message,
        timestamp: Utc::now(),
        active,
    }))
}

/// Handle GET /events - Stream tick and finish events
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    info!("Event stream opened");

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(event) {
                    Ok(sse) => return Some((Ok::<_, Infallible>(sse), rx)),
                    Err(e) => warn!("Failed to encode timer event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handle GET /status - Return current service status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let timer_count = state.list().map_err(internal_error)?.len();
    let running = state.running().map_err(internal_error)?;
    let suspended = state.is_suspended().map_err(internal_error)?;
    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        timer_count,
        running,
        suspended,
        tick_ms: state.tick_ms,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
