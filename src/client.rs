//! Blocking HTTP client for the external monitoring service.
//!
//! - One GET per plant and date window, using `ureq` (no async).
//! - A global per-request timeout bounds every call.
//! - Response elements are decoded one by one; see `crate::models::monitoring`.

use chrono::NaiveDate;
use http::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::models::monitoring::{decode_readings, MalformedReading, Reading};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Failure of the monitoring call as a whole. All variants are transient:
/// the run that hit one is retried.
#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("response body is not a JSON array: {0}")]
    Body(String),
}

/// Decoded readings plus the entries that had to be dropped.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub readings: Vec<Reading>,
    pub skipped: Vec<MalformedReading>,
}

/// Source of readings for a plant. Implemented by [`MonitoringClient`] and by
/// test doubles.
pub trait ReadingSource {
    fn fetch_readings(&self, plant_name: &str, from: NaiveDate, to: NaiveDate) -> Result<FetchOutcome, MonitoringError>;
}

#[derive(Debug, Clone)]
pub struct MonitoringClient {
    agent: ureq::Agent,
    endpoint: String,
}

impl MonitoringClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        MonitoringClient {
            agent: config.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn get_json_array(&self, query: &[(&str, String)]) -> Result<Vec<Value>, MonitoringError> {
        let mut req = self.agent.get(&self.endpoint).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(*k, v.as_str());
        }

        let mut res = req.call().map_err(|e| MonitoringError::Transport(e.to_string()))?;
        let status = res.status();
        let body = res
            .body_mut()
            .read_to_string()
            .map_err(|e| MonitoringError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = if body.trim().is_empty() {
                String::from("<no body>")
            } else {
                body
            };
            return Err(MonitoringError::Status { status, message });
        }

        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| MonitoringError::Body(e.to_string()))
    }
}

impl ReadingSource for MonitoringClient {
    fn fetch_readings(&self, plant_name: &str, from: NaiveDate, to: NaiveDate) -> Result<FetchOutcome, MonitoringError> {
        let query = [
            ("plant-id", plant_name.to_string()),
            ("from", from.format(DATE_FORMAT).to_string()),
            ("to", to.format(DATE_FORMAT).to_string()),
        ];
        let items = self.get_json_array(&query)?;
        let (readings, skipped) = decode_readings(items);
        Ok(FetchOutcome { readings, skipped })
    }
}
