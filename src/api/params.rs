use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};

pub const MAX_NAME_LEN: usize = 256;

/// Unwrap query string parameters; a malformed query string is a validation
/// error like any other bad parameter.
pub fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(v)| v)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

/// Parse a path identifier. Runs before any database access.
pub fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::validation(format!("valid {} id is required", what)))
}

/// Trimmed plant name, non-blank and at most 256 characters.
pub fn plant_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name may not be blank"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "name may not be longer than {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// `true` in any letter case; everything else, absence included, is `false`.
pub fn flag(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// `name` (default) or `-name`. Returns whether the order is descending.
pub fn name_ordering(raw: Option<&str>) -> ApiResult<bool> {
    match raw.map(str::trim) {
        None | Some("") | Some("name") => Ok(false),
        Some("-name") => Ok(true),
        Some(other) => Err(ApiError::validation(format!("unsupported ordering: {:?}", other))),
    }
}

/// Report range bound: RFC 3339, a naive date-time taken as UTC, or a bare
/// date meaning midnight UTC.
pub fn filter_datetime(raw: Option<&str>, field: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Some(date.and_time(chrono::NaiveTime::MIN).and_utc()));
    }
    Err(ApiError::validation(format!("invalid {}: {:?}", field, value)))
}
