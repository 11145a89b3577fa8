//! HTTP admin API and event ingress.
//!
//! | Route                                         | Operation            |
//! |-----------------------------------------------|----------------------|
//! | `GET /healthz`                                | liveness (no auth)   |
//! | `GET /timers`                                 | list every record    |
//! | `GET /timers/{user}`                          | one record           |
//! | `DELETE /timers/{user}/phases/{phase}`        | remove a phase timer |
//! | `POST /timers/{user}/phases/{phase}/release`  | release from jail    |
//! | `POST /admin/resync`                          | rebuild from roles   |
//! | `POST /admin/reset`                           | clear, then resync   |
//! | `POST /events`                                | platform event       |
//!
//! When a token is configured every route except `/healthz` requires
//! `Authorization: Bearer <token>`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, body::Bytes};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PhaseError, PlatformError, TimeBombError};
use crate::ids::UserId;
use crate::messages::format_remaining;
use crate::phase::{Phase, PhaseRecord};
use crate::tracker::{PlatformEvent, Tracker};

/// Largest accepted request body.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Shared state behind every handler.
pub struct ApiState {
    tracker: Arc<Tracker>,
    token: Option<String>,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("tracker", &self.tracker)
            .field("token_set", &self.token.is_some())
            .finish()
    }
}

impl ApiState {
    /// Wraps a tracker. `token`, when set, is required on every
    /// authenticated route.
    #[must_use]
    pub fn new(tracker: Arc<Tracker>, token: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

// ============================================================================
// Views
// ============================================================================

/// A record as shown to operators: the stored fields plus derived status
/// and time left per phase.
#[derive(Debug, Clone, Serialize)]
pub struct TimerView {
    /// Owner of the record.
    pub user_id: UserId,
    /// Derived status label.
    pub status: &'static str,
    /// Time left on phase 1, if armed and not expired.
    pub phase1_remaining: Option<String>,
    /// Time left on phase 2, if armed and not expired.
    pub phase2_remaining: Option<String>,
    /// The stored record.
    #[serde(flatten)]
    pub record: PhaseRecord,
}

impl TimerView {
    /// Builds the view of `record` as of `now`.
    #[must_use]
    pub fn new(user_id: UserId, record: PhaseRecord, now: DateTime<Utc>) -> Self {
        let remaining = |phase| record.remaining(phase, now).and_then(format_remaining);
        Self {
            user_id,
            status: record.status().as_str(),
            phase1_remaining: remaining(Phase::First),
            phase2_remaining: remaining(Phase::Second),
            record,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A handler failure mapped to a status code and a JSON error body.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Upstream(PlatformError),
}

impl From<PhaseError> for ApiError {
    fn from(e: PhaseError) -> Self {
        match e {
            PhaseError::NotTracked(_) => Self::NotFound(e.to_string()),
            PhaseError::InvalidPhase(_) | PhaseError::MalformedRecord { .. } => {
                Self::BadRequest(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Upstream(e) => {
                warn!(error = %e, "platform request failed");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router
// ============================================================================

/// Builds the router over `state`.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/timers", get(list_timers))
        .route("/timers/{user}", get(get_timer))
        .route("/timers/{user}/phases/{phase}", delete(remove_timer))
        .route("/timers/{user}/phases/{phase}/release", post(release))
        .route("/admin/resync", post(resync))
        .route("/admin/reset", post(reset))
        .route("/events", post(ingest_event))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_token,
        ))
        .route("/healthz", get(|| async { "ok" }))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serves the API on `listener` until `cancel` fires.
///
/// # Errors
///
/// Returns `TimeBombError::Io` if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ApiState>,
    cancel: CancellationToken,
) -> Result<(), TimeBombError> {
    let addr = listener.local_addr()?;
    info!(%addr, "admin API listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    debug!("admin API shut down");
    Ok(())
}

async fn require_token(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid bearer token" })),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_timers(State(state): State<Arc<ApiState>>) -> Json<Vec<TimerView>> {
    let now = Utc::now();
    let views = state
        .tracker
        .list()
        .await
        .into_iter()
        .map(|(user, record)| TimerView::new(user, record, now))
        .collect();
    Json(views)
}

async fn get_timer(
    State(state): State<Arc<ApiState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<TimerView>> {
    let user = parse_user(&user)?;
    let record = state
        .tracker
        .status(user)
        .await
        .ok_or(PhaseError::NotTracked(user))?;
    Ok(Json(TimerView::new(user, record, Utc::now())))
}

async fn remove_timer(
    State(state): State<Arc<ApiState>>,
    Path((user, phase)): Path<(String, String)>,
) -> ApiResult<Json<TimerView>> {
    let user = parse_user(&user)?;
    let phase = parse_phase(&phase)?;
    let record = state.tracker.remove_timer(user, phase).await?;
    Ok(Json(TimerView::new(user, record, Utc::now())))
}

async fn release(
    State(state): State<Arc<ApiState>>,
    Path((user, phase)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = parse_user(&user)?;
    let phase = parse_phase(&phase)?;
    match state.tracker.release(user, phase, Utc::now()).await? {
        Some(deadline) => Ok(Json(json!({
            "user_id": user,
            "phase": phase,
            "deadline": deadline,
        }))),
        None => Err(ApiError::Conflict(format!(
            "user {user} is not jailed for phase {phase}"
        ))),
    }
}

async fn resync(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    let report = state
        .tracker
        .resync(Utc::now())
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(report))
}

async fn reset(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    let report = state
        .tracker
        .reset(Utc::now())
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(report))
}

async fn ingest_event(State(state): State<Arc<ApiState>>, body: Bytes) -> ApiResult<Response> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty request body".to_string()));
    }
    let event: PlatformEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid event: {e}")))?;
    debug!(event = event.kind(), user = %event.user(), "event received");

    let outcome = state.tracker.handle_event(&event, Utc::now()).await;
    Ok((StatusCode::ACCEPTED, Json(outcome)).into_response())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_user(raw: &str) -> ApiResult<UserId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid user id \"{raw}\"")))
}

fn parse_phase(raw: &str) -> ApiResult<Phase> {
    let n: u8 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid phase \"{raw}\"")))?;
    Ok(Phase::try_from(n)?)
}

/// Parses a bind address into a socket address.
///
/// Accepts:
/// - `:8080` → `0.0.0.0:8080`
/// - `8080` → `0.0.0.0:8080`
/// - `127.0.0.1:8080` → as-is
///
/// # Errors
///
/// Returns `TimeBombError::Usage` if the result is not a socket address.
pub fn parse_bind_addr(input: &str) -> Result<SocketAddr, TimeBombError> {
    let addr = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else if input.parse::<u16>().is_ok() {
        format!("0.0.0.0:{input}")
    } else {
        input.to_string()
    };
    addr.parse()
        .map_err(|e| TimeBombError::Usage(format!("invalid bind address \"{input}\": {e}")))
}
