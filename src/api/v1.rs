use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::error::ApiError,
    api::stream,
    controller::{AppState, ParameterPatch, RunState, StepSnapshot, SCHEMA},
};

/// Largest manual-step timestep accepted over HTTP, seconds.
const MAX_MANUAL_DT_S: f64 = 10.0;

/// Snapshots returned by `/history` when no explicit limit is given.
const DEFAULT_HISTORY_LIMIT: usize = 1000;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/snapshot", get(get_snapshot))
        .route("/history", get(get_history))
        .route("/parameters", get(get_parameters).post(update_parameters))
        .route("/parameters/schema", get(get_parameter_schema))
        .route("/start", post(start_simulation))
        .route("/stop", post(stop_simulation))
        .route("/step", post(manual_step))
        .route("/reset", post(reset_simulation))
        .route("/stream", get(stream::sse_snapshots))
        .route("/ws", get(stream::ws_snapshots))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub run_id: Uuid,
    pub time: f64,
    pub step: u64,
    pub power: f64,
    pub efficiency: f64,
    pub clutch_engaged: bool,
    pub air_tank_pressure: f64,
    pub num_floaters: usize,
    pub dt_s: f64,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_status(State(st): State<AppState>) -> impl IntoResponse {
    let snapshot = st.engine.latest_snapshot();
    let (state, error) = match st.engine.run_state() {
        RunState::Errored(msg) => ("errored".to_string(), Some(msg)),
        other => (other.to_string(), None),
    };
    Json(SystemStatus {
        state,
        error,
        run_id: st.engine.run_id(),
        time: snapshot.time,
        step: snapshot.step,
        power: snapshot.power,
        efficiency: snapshot.efficiency,
        clutch_engaged: snapshot.clutch_engaged,
        air_tank_pressure: snapshot.air_tank_pressure,
        num_floaters: snapshot.floaters.len(),
        dt_s: st.engine.dt_s(),
        timestamp: Utc::now(),
    })
}

pub async fn get_snapshot(State(st): State<AppState>) -> impl IntoResponse {
    let snapshot = st.engine.latest_snapshot();
    Json((*snapshot).clone())
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub snapshots: Vec<StepSnapshot>,
}

pub async fn get_history(
    State(st): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let snapshots: Vec<StepSnapshot> = st
        .engine
        .history(Some(limit))
        .iter()
        .map(|s| (**s).clone())
        .collect();
    Json(HistoryResponse {
        count: snapshots.len(),
        snapshots,
    })
}

pub async fn get_parameters(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.current_parameters())
}

pub async fn get_parameter_schema() -> impl IntoResponse {
    Json(SCHEMA.clone())
}

pub async fn update_parameters(
    State(st): State<AppState>,
    Json(patch): Json<ParameterPatch>,
) -> Result<impl IntoResponse, ApiError> {
    st.engine.update_parameters(&patch)?;
    Ok(Json(st.engine.current_parameters()))
}

pub async fn start_simulation(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.start().await;
    StatusCode::NO_CONTENT
}

pub async fn stop_simulation(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.stop().await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct StepQuery {
    pub dt: Option<f64>,
}

pub async fn manual_step(
    State(st): State<AppState>,
    Query(q): Query<StepQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let dt_s = q.dt.unwrap_or_else(|| st.engine.dt_s());
    if !dt_s.is_finite() || dt_s <= 0.0 || dt_s > MAX_MANUAL_DT_S {
        return Err(ApiError::ValidationError(format!(
            "dt must be in (0, {MAX_MANUAL_DT_S}] seconds"
        )));
    }
    let snapshot = st.engine.step_with(dt_s)?;
    Ok(Json((*snapshot).clone()))
}

pub async fn reset_simulation(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.reset();
    StatusCode::NO_CONTENT
}
