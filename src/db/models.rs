//! Diesel model structs for plants and their hourly data points.
//!
//! Measurements are `NUMERIC(15, 10)` columns mapped to `rust_decimal::Decimal`
//! so values never round-trip through binary floating point.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::monitoring::Reading;
use crate::schema;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::plants)]
pub struct Plant {
    pub id: Uuid,
    pub name: String,
    pub is_archived: bool,
}

impl Plant {
    /// Fresh, active plant with a random v4 identity.
    pub fn new(name: impl Into<String>) -> Self {
        Plant {
            id: Uuid::new_v4(),
            name: name.into(),
            is_archived: false,
        }
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Associations, Selectable, Insertable, Serialize, Deserialize,
)]
#[diesel(table_name = schema::data_points)]
#[diesel(belongs_to(Plant))]
pub struct DataPoint {
    pub id: Uuid,
    pub plant_id: Uuid,
    pub datetime: DateTime<Utc>,
    pub energy_expected: Decimal,
    pub energy_observed: Decimal,
    pub irradiation_expected: Decimal,
    pub irradiation_observed: Decimal,
}

impl DataPoint {
    pub fn from_reading(plant_id: Uuid, reading: &Reading) -> Self {
        DataPoint {
            id: Uuid::new_v4(),
            plant_id,
            datetime: reading.datetime,
            energy_expected: reading.expected.energy,
            energy_observed: reading.observed.energy,
            irradiation_expected: reading.expected.irradiation,
            irradiation_observed: reading.observed.irradiation,
        }
    }

    /// Overwrite the four measurement fields. Identity and timestamp stay put.
    pub fn apply_reading(&mut self, reading: &Reading) {
        self.energy_expected = reading.expected.energy;
        self.energy_observed = reading.observed.energy;
        self.irradiation_expected = reading.expected.irradiation;
        self.irradiation_observed = reading.observed.irradiation;
    }
}

/// Data point joined with its owning plant, as returned by listings.
#[derive(Debug, Clone, Queryable)]
pub struct PlantDataPoint {
    pub id: Uuid,
    pub plant_id: Uuid,
    pub plant_name: String,
    pub datetime: DateTime<Utc>,
    pub energy_expected: Decimal,
    pub energy_observed: Decimal,
    pub irradiation_expected: Decimal,
    pub irradiation_observed: Decimal,
}
