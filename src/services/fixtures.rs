use crate::db::models::Plant;
use crate::db::pool::StoreError;
use crate::db::queries::{create_plant, select_active_plants, PlantSelector};
use crate::models::monitoring::{Metrics, Reading};
use crate::services::reconcile::{reconcile_plant, MergeSummary};
use chrono::{DateTime, Datelike, DurationRound, TimeDelta, Timelike, Utc};
use diesel::PgConnection;
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::f64::consts::PI;

const SEED: u64 = 0x5014_2024_0001_BEEF;
const SUNRISE_HOUR: f64 = 5.0;
const SUNSET_HOUR: f64 = 21.0;
const PEAK_IRRADIATION: f64 = 950.0;

/// Create (or reuse) `plants` demo plants and fill the last `days` days with
/// hourly data points.
pub fn seed(conn: &mut PgConnection, plants: usize, days: u32) -> Result<MergeSummary, String> {
    let now = Utc::now()
        .duration_trunc(TimeDelta::hours(1))
        .map_err(|e| format!("truncating current time failed: {}", e))?;
    let hours = i64::from(days) * 24;
    let start = now - TimeDelta::hours(hours);
    let mut rng = SmallRng::seed_from_u64(SEED);

    info!("Fixtures: seeding {} plant(s) from {} to {}", plants, start, now);

    let mut total = MergeSummary::default();
    for index in 0..plants {
        let name = format!("Solar Plant {:02}", index + 1);
        let Some(plant) = ensure_plant(conn, &name)? else {
            warn!("Fixtures: {:?} exists but is archived; skipping", name);
            continue;
        };

        let capacity = rng.random_range(40.0..=400.0);
        let readings = synthetic_readings(&mut rng, capacity, start, hours);
        let merged = reconcile_plant(conn, &plant, &readings).map_err(|e| format!("seeding {} failed: {}", name, e))?;
        info!(
            "Fixtures: {} ({:.0} kWp) -> {} created, {} updated",
            name, capacity, merged.created, merged.updated
        );
        total += merged;
    }

    Ok(total)
}

fn ensure_plant(conn: &mut PgConnection, name: &str) -> Result<Option<Plant>, String> {
    let existing = select_active_plants(conn, &PlantSelector::Names(vec![name.to_string()]))
        .map_err(|e| format!("looking up plant {} failed: {}", name, e))?;
    if let Some(plant) = existing.into_iter().next() {
        return Ok(Some(plant));
    }
    match create_plant(conn, name) {
        Ok(plant) => Ok(Some(plant)),
        Err(StoreError::DuplicateName(_)) => Ok(None),
        Err(e) => Err(format!("creating plant {} failed: {}", name, e)),
    }
}

/// Hourly readings for `hours` hours starting at `start`, shaped like a
/// plant of `capacity` kWp under a diurnal and seasonal sun.
pub fn synthetic_readings(rng: &mut SmallRng, capacity: f64, start: DateTime<Utc>, hours: i64) -> Vec<Reading> {
    (0..hours)
        .map(|h| {
            let ts = start + TimeDelta::hours(h);
            let sun = daylight(ts.hour() as f64) * seasonal(ts.ordinal0() as f64 / 365.0);
            let clouds = rng.random_range(0.3..=1.0);
            let losses = rng.random_range(0.78..=0.97);

            let irradiation_expected = sun * PEAK_IRRADIATION;
            let irradiation_observed = irradiation_expected * clouds;
            let energy_expected = sun * capacity * 0.85;
            let energy_observed = energy_expected * clouds * losses;

            Reading {
                datetime: ts,
                expected: Metrics {
                    energy: to_decimal(energy_expected),
                    irradiation: to_decimal(irradiation_expected),
                },
                observed: Metrics {
                    energy: to_decimal(energy_observed),
                    irradiation: to_decimal(irradiation_observed),
                },
            }
        })
        .collect()
}

fn daylight(hour: f64) -> f64 {
    if !(SUNRISE_HOUR..=SUNSET_HOUR).contains(&hour) {
        return 0.0;
    }
    ((hour - SUNRISE_HOUR) / (SUNSET_HOUR - SUNRISE_HOUR) * PI).sin().max(0.0)
}

fn seasonal(annual_fraction: f64) -> f64 {
    // Peaks near the June solstice.
    0.65 + 0.35 * ((annual_fraction - 0.47) * 2.0 * PI).cos()
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default().round_dp(4)
}
