use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::health::{HealthReport, HealthState};
use crate::api::latency::LatencyStats;
use crate::error::AppError;
use crate::fetcher::fetch_leagues;
use crate::tracker::{
    Engine, Handoff, LadderReport, RefreshReport, SearchReport, Session, SessionHandle, SessionStatus,
};
use crate::types::{LadderEntry, ScanState, TrackingView};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub sessions: Arc<DashMap<u64, Arc<SessionHandle>>>,
    pub next_id: Arc<AtomicU64>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
}

impl ApiState {
    pub fn new(engine: Arc<Engine>, latency: Arc<LatencyStats>) -> Self {
        Self {
            engine,
            sessions: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            latency,
            health: Arc::new(HealthState::new()),
        }
    }

    fn register(&self, session: Session) -> Arc<SessionHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(SessionHandle::new(id, Arc::clone(&self.engine), session));
        self.sessions.insert(id, Arc::clone(&handle));
        info!(event = "SESSION_OPEN", session = id, league = %handle.league(), "[API] session opened");
        handle
    }

    fn session(&self, id: u64) -> Result<Arc<SessionHandle>, AppError> {
        self.sessions
            .get(&id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| AppError::NotFound(format!("session {id}")))
    }

    fn record(&self, state: Option<&ScanState>, err: Option<&AppError>) {
        let failed = matches!(state, Some(ScanState::Failed { .. })) || err.is_some_and(|e| e.is_network());
        self.health.record_operation(failed);
    }

    fn record_result<T>(&self, result: &Result<T, AppError>, state: impl Fn(&T) -> Option<&ScanState>) {
        match result {
            Ok(report) => self.record(state(report), None),
            Err(e) => self.record(None, Some(e)),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/leagues", get(get_leagues))
        .route("/sessions", post(create_session))
        .route("/sessions/import", post(import_session))
        .route("/sessions/:id", delete(delete_session))
        .route("/sessions/:id/status", get(get_status))
        .route("/sessions/:id/ladder", post(post_ladder))
        .route("/sessions/:id/ladder/more", post(post_show_more))
        .route("/sessions/:id/search", post(post_search))
        .route("/sessions/:id/stop", post(post_stop))
        .route("/sessions/:id/track", post(post_track))
        .route("/sessions/:id/refresh", post(post_refresh))
        .route("/sessions/:id/tracking", get(get_tracking))
        .route("/sessions/:id/snapshot", get(get_snapshot))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub league: String,
    /// Lift the standard scan ceiling.
    #[serde(default)]
    pub deep: bool,
}

#[derive(Deserialize, Default)]
pub struct LadderRequest {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub name: String,
}

#[derive(Deserialize, Default)]
pub struct TrackRequest {
    #[serde(default)]
    pub auto_refresh: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthReport> {
    Json(state.health.report(
        state.sessions.len(),
        state.engine.source().fetch_count(),
        state.latency.summary(),
    ))
}

async fn get_leagues(State(state): State<ApiState>) -> Json<Vec<String>> {
    match fetch_leagues(state.engine.config()).await {
        Ok(leagues) if !leagues.is_empty() => Json(leagues),
        Ok(_) => Json(vec!["Standard".to_string()]),
        Err(e) => {
            warn!("League list unavailable, offering Standard only: {e}");
            Json(vec!["Standard".to_string()])
        }
    }
}

async fn create_session(
    State(state): State<ApiState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionStatus>), AppError> {
    let league = req.league.trim();
    if league.is_empty() {
        return Err(AppError::BadRequest("league is required".to_string()));
    }
    let handle = state.register(Session::new(league, req.deep));
    Ok((StatusCode::CREATED, Json(handle.status())))
}

async fn import_session(
    State(state): State<ApiState>,
    Json(flat): Json<BTreeMap<String, String>>,
) -> Result<(StatusCode, Json<SessionStatus>), AppError> {
    let handoff = Handoff::from_flat(&flat)?;
    let handle = state.register(Session::from_handoff(handoff));
    Ok((StatusCode::CREATED, Json(handle.status())))
}

async fn delete_session(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let (_, handle) = state
        .sessions
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))?;
    handle.shutdown();
    info!(event = "SESSION_CLOSE", session = id, "[API] session closed");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_status(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<SessionStatus>, AppError> {
    Ok(Json(state.session(id)?.status()))
}

async fn post_ladder(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    body: Option<Json<LadderRequest>>,
) -> Result<Json<LadderReport>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let result = state.session(id)?.ladder(req.category).await;
    state.record_result(&result, |r| Some(&r.state));
    Ok(Json(result?))
}

async fn post_show_more(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<LadderReport>, AppError> {
    let result = state.session(id)?.show_more().await;
    state.record_result(&result, |r| Some(&r.state));
    Ok(Json(result?))
}

async fn post_search(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchReport>, AppError> {
    let result = state.session(id)?.search(&req.name).await;
    state.record_result(&result, |r| Some(&r.state));
    Ok(Json(result?))
}

async fn post_stop(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<SessionStatus>, AppError> {
    let handle = state.session(id)?;
    handle.stop();
    Ok(Json(handle.status()))
}

async fn post_track(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    body: Option<Json<TrackRequest>>,
) -> Result<Json<LadderEntry>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let entry = state.session(id)?.track(req.auto_refresh).await?;
    Ok(Json(entry))
}

async fn post_refresh(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<RefreshReport>, AppError> {
    let result = state.session(id)?.refresh().await;
    state.record_result(&result, |_| None);
    Ok(Json(result?))
}

async fn get_tracking(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<TrackingView>, AppError> {
    state
        .session(id)?
        .tracking_view()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("session {id} has no tracking view yet")))
}

async fn get_snapshot(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<BTreeMap<String, String>>, AppError> {
    Ok(Json(state.session(id)?.snapshot()?))
}
