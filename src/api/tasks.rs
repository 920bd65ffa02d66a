use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::params::parse_id;
use crate::api::state::AppState;
use crate::services::jobs::{JobId, JobRecord};

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub version: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok",
        version: state.version.clone(),
    })
}

pub async fn get_task(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult<Json<JobRecord>> {
    let id = JobId(parse_id(&raw_id, "task")?);
    state
        .jobs
        .registry()
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("task"))
}
