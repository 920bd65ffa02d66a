use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::pagination::{Page, PageParams};
use crate::api::params::{filter_datetime, flag, query};
use crate::api::state::AppState;
use crate::db::queries::{self, ReportFilter};
use crate::services::reports::{PlantReport, ReportOrdering};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub show_archived: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Serialize)]
pub struct ReportDto {
    pub plant_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_expected_sum: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_observed_sum: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_expected_avg: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_observed_avg: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub energy_efficiency: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub irradiation_expected_sum: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub irradiation_observed_sum: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub irradiation_expected_avg: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub irradiation_observed_avg: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub irradiation_efficiency: Option<Decimal>,
}

impl From<PlantReport> for ReportDto {
    fn from(r: PlantReport) -> Self {
        ReportDto {
            plant_name: r.plant_name,
            energy_expected_sum: r.energy.expected_sum,
            energy_observed_sum: r.energy.observed_sum,
            energy_expected_avg: r.energy.expected_avg,
            energy_observed_avg: r.energy.observed_avg,
            energy_efficiency: r.energy.efficiency,
            irradiation_expected_sum: r.irradiation.expected_sum,
            irradiation_observed_sum: r.irradiation.observed_sum,
            irradiation_expected_avg: r.irradiation.expected_avg,
            irradiation_observed_avg: r.irradiation.observed_avg,
            irradiation_efficiency: r.irradiation.efficiency,
        }
    }
}

fn report_filter(q: &ReportQuery) -> ApiResult<(ReportFilter, ReportOrdering)> {
    let ordering = match q.ordering.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
        None => ReportOrdering::NameAsc,
        Some(raw) => {
            ReportOrdering::parse(raw).ok_or_else(|| ApiError::validation(format!("unsupported ordering: {:?}", raw)))?
        }
    };
    let filter = ReportFilter {
        start: filter_datetime(q.start_datetime.as_deref(), "start_datetime")?,
        end: filter_datetime(q.end_datetime.as_deref(), "end_datetime")?,
        include_archived: flag(q.show_archived.as_deref()),
        search: q.search.clone(),
    };
    Ok((filter, ordering))
}

pub async fn list_reports(
    State(state): State<AppState>,
    params: Result<Query<ReportQuery>, QueryRejection>,
) -> ApiResult<Json<Page<ReportDto>>> {
    let q = query(params)?;
    let req = q.page.resolve()?;
    let (filter, ordering) = report_filter(&q)?;

    let (count, totals) = state
        .run_db(move |conn| {
            queries::report_totals(conn, &filter, ordering.is_descending(), req.limit(), req.offset())
        })
        .await?;
    Ok(Json(
        Page::new(req, count, totals)?.map(|t| ReportDto::from(PlantReport::from(t))),
    ))
}
