use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::pagination::{Page, PageParams};
use crate::api::params::{parse_id, query};
use crate::api::state::AppState;
use crate::db::models::{DataPoint, PlantDataPoint};
use crate::db::queries;

#[derive(Debug, Serialize)]
pub struct DataPointDto {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_expected: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_observed: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub irradiation_expected: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub irradiation_observed: Decimal,
    pub datetime: DateTime<Utc>,
}

impl From<DataPoint> for DataPointDto {
    fn from(dp: DataPoint) -> Self {
        DataPointDto {
            id: dp.id,
            energy_expected: dp.energy_expected,
            energy_observed: dp.energy_observed,
            irradiation_expected: dp.irradiation_expected,
            irradiation_observed: dp.irradiation_observed,
            datetime: dp.datetime,
        }
    }
}

/// Listing entry: the detail fields plus the owning plant.
#[derive(Debug, Serialize)]
pub struct PlantDataPointDto {
    #[serde(flatten)]
    pub point: DataPointDto,
    pub plant_id: Uuid,
    pub plant_name: String,
}

impl From<PlantDataPoint> for PlantDataPointDto {
    fn from(row: PlantDataPoint) -> Self {
        PlantDataPointDto {
            point: DataPointDto {
                id: row.id,
                energy_expected: row.energy_expected,
                energy_observed: row.energy_observed,
                irradiation_expected: row.irradiation_expected,
                irradiation_observed: row.irradiation_observed,
                datetime: row.datetime,
            },
            plant_id: row.plant_id,
            plant_name: row.plant_name,
        }
    }
}

/// Data points of an active plant ordered by time. Archived or unknown
/// plants yield an empty page.
pub async fn list_data_points(
    State(state): State<AppState>,
    Path(raw_plant_id): Path<String>,
    page: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Page<PlantDataPointDto>>> {
    let plant_id = parse_id(&raw_plant_id, "plant")?;
    let req = query(page)?.resolve()?;

    let (count, rows) = state
        .run_db(move |conn| queries::list_plant_data_points(conn, plant_id, req.limit(), req.offset()))
        .await?;
    Ok(Json(Page::new(req, count, rows)?.map(PlantDataPointDto::from)))
}

pub async fn get_data_point(
    State(state): State<AppState>,
    Path((raw_plant_id, raw_id)): Path<(String, String)>,
) -> ApiResult<Json<DataPointDto>> {
    let plant_id = parse_id(&raw_plant_id, "plant")?;
    let id = parse_id(&raw_id, "data point")?;

    state
        .run_db(move |conn| queries::find_plant_data_point(conn, plant_id, id))
        .await?
        .map(|dp| Json(dp.into()))
        .ok_or_else(|| ApiError::not_found("data point"))
}
