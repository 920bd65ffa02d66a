//! Plant CRUD plus the per-plant ingest trigger.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::pagination::{Page, PageParams};
use crate::api::params::{name_ordering, parse_id, plant_name, query};
use crate::api::state::AppState;
use crate::db::models::Plant;
use crate::db::queries::{self, PlantSelector};
use crate::services::jobs::{JobId, JobTrigger};

#[derive(Debug, Serialize)]
pub struct PlantDto {
    pub id: Uuid,
    pub name: String,
}

impl From<Plant> for PlantDto {
    fn from(p: Plant) -> Self {
        PlantDto { id: p.id, name: p.name }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlantListQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlant {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlant {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: JobId,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

pub async fn list_plants(
    State(state): State<AppState>,
    params: Result<Query<PlantListQuery>, QueryRejection>,
) -> ApiResult<Json<Page<PlantDto>>> {
    let q = query(params)?;
    let req = q.page.resolve()?;
    let descending = name_ordering(q.ordering.as_deref())?;
    let search = q.search.clone();

    let (count, rows) = state
        .run_db(move |conn| queries::list_active_plants(conn, search.as_deref(), descending, req.limit(), req.offset()))
        .await?;
    Ok(Json(Page::new(req, count, rows)?.map(PlantDto::from)))
}

pub async fn create_plant(
    State(state): State<AppState>,
    payload: Result<Json<CreatePlant>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PlantDto>)> {
    let name = plant_name(&body(payload)?.name)?;
    let plant = state.run_db(move |conn| queries::create_plant(conn, &name)).await?;
    Ok((StatusCode::CREATED, Json(plant.into())))
}

pub async fn get_plant(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult<Json<PlantDto>> {
    let id = parse_id(&raw_id, "plant")?;
    state
        .run_db(move |conn| queries::find_active_plant(conn, id))
        .await?
        .map(|p| Json(p.into()))
        .ok_or_else(|| ApiError::not_found("plant"))
}

pub async fn update_plant(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<UpdatePlant>, JsonRejection>,
) -> ApiResult<Json<PlantDto>> {
    let id = parse_id(&raw_id, "plant")?;
    let name = body(payload)?.name.as_deref().map(plant_name).transpose()?;

    let updated = state
        .run_db(move |conn| match name {
            Some(name) => queries::rename_plant(conn, id, &name),
            None => queries::find_active_plant(conn, id),
        })
        .await?;
    updated
        .map(|p| Json(p.into()))
        .ok_or_else(|| ApiError::not_found("plant"))
}

/// Archive the plant. Already archived plants are not visible and answer 404.
pub async fn delete_plant(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult<StatusCode> {
    let id = parse_id(&raw_id, "plant")?;
    let archived = state
        .run_db(move |conn| match queries::find_active_plant(conn, id)? {
            Some(_) => queries::archive_plant(conn, id),
            None => Ok(None),
        })
        .await?;
    match archived {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::not_found("plant")),
    }
}

pub async fn ingest_plant(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    let id = parse_id(&raw_id, "plant")?;
    let plant = state
        .run_db(move |conn| queries::find_active_plant(conn, id))
        .await?
        .ok_or_else(|| ApiError::not_found("plant"))?;

    let task_id = state
        .jobs
        .submit(PlantSelector::from_ids(vec![plant.id]), JobTrigger::Manual)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}
