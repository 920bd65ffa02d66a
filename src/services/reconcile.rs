//! Merge fetched readings into the stored data points of one plant.
//!
//! Planning is pure: readings are keyed by their normalized timestamp, matched
//! against the rows already stored at those timestamps, and split into a
//! create batch and an update batch. Updates are issued for every match, even
//! when the stored values already equal the incoming ones.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::db::models::{DataPoint, Plant};
use crate::db::pool::StoreError;
use crate::db::queries::existing_data_points;
use crate::models::monitoring::Reading;
use crate::services::ingest::{insert_data_points, update_data_point_measurements};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub creates: Vec<DataPoint>,
    pub updates: Vec<DataPoint>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
}

impl std::ops::AddAssign for MergeSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
    }
}

/// Key readings by timestamp. A later reading for the same hour replaces an
/// earlier one.
pub fn index_readings(readings: &[Reading]) -> BTreeMap<DateTime<Utc>, &Reading> {
    let mut by_ts = BTreeMap::new();
    for reading in readings {
        by_ts.insert(reading.datetime, reading);
    }
    by_ts
}

pub fn plan_merge(
    plant_id: Uuid,
    incoming: &BTreeMap<DateTime<Utc>, &Reading>,
    existing: Vec<DataPoint>,
) -> MergePlan {
    let mut existing_by_ts: HashMap<DateTime<Utc>, DataPoint> =
        existing.into_iter().map(|dp| (dp.datetime, dp)).collect();

    let mut plan = MergePlan::default();
    for (ts, reading) in incoming {
        match existing_by_ts.remove(ts) {
            Some(mut stored) => {
                stored.apply_reading(reading);
                plan.updates.push(stored);
            }
            None => plan.creates.push(DataPoint::from_reading(plant_id, reading)),
        }
    }
    plan
}

/// Merge `readings` into the data points of `plant` in one transaction,
/// creates first, then updates.
pub fn reconcile_plant(conn: &mut PgConnection, plant: &Plant, readings: &[Reading]) -> Result<MergeSummary, StoreError> {
    let incoming = index_readings(readings);
    if incoming.is_empty() {
        return Ok(MergeSummary::default());
    }
    let timestamps: Vec<DateTime<Utc>> = incoming.keys().copied().collect();

    conn.transaction::<_, StoreError, _>(|conn| {
        let existing = existing_data_points(conn, plant.id, &timestamps)?;
        let plan = plan_merge(plant.id, &incoming, existing);
        debug!(
            "Reconcile: plant {} plans {} create(s), {} update(s)",
            plant.name,
            plan.creates.len(),
            plan.updates.len()
        );

        let created = insert_data_points(conn, &plan.creates)?;
        let updated = update_data_point_measurements(conn, &plan.updates)?;
        Ok(MergeSummary { created, updated })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::monitoring::Metrics;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn reading(hour: u32, energy: i64) -> Reading {
        Reading {
            datetime: at(hour),
            expected: Metrics {
                energy: Decimal::new(energy, 1),
                irradiation: Decimal::new(energy * 3, 1),
            },
            observed: Metrics {
                energy: Decimal::new(energy - 1, 1),
                irradiation: Decimal::new(energy * 2, 1),
            },
        }
    }

    /// Applies plans the way the database would, keyed by (plant, datetime).
    #[derive(Default)]
    struct MemoryStore {
        rows: BTreeMap<(Uuid, DateTime<Utc>), DataPoint>,
    }

    impl MemoryStore {
        fn merge(&mut self, plant_id: Uuid, readings: &[Reading]) -> MergeSummary {
            let incoming = index_readings(readings);
            let existing = self
                .rows
                .values()
                .filter(|dp| dp.plant_id == plant_id && incoming.contains_key(&dp.datetime))
                .cloned()
                .collect();
            let plan = plan_merge(plant_id, &incoming, existing);
            let summary = MergeSummary {
                created: plan.creates.len(),
                updated: plan.updates.len(),
            };
            for dp in plan.creates {
                let previous = self.rows.insert((dp.plant_id, dp.datetime), dp);
                assert!(previous.is_none(), "create collided with a stored row");
            }
            for dp in plan.updates {
                let stored = self.rows.get_mut(&(dp.plant_id, dp.datetime)).expect("update targets a stored row");
                assert_eq!(stored.id, dp.id);
                *stored = dp;
            }
            summary
        }
    }

    #[test]
    fn splits_new_and_existing_timestamps() {
        let plant = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.merge(plant, &[reading(1, 10), reading(2, 20)]);

        let batch = [reading(1, 11), reading(2, 21), reading(3, 31), reading(4, 41), reading(5, 51)];
        let summary = store.merge(plant, &batch);

        assert_eq!(summary, MergeSummary { created: 3, updated: 2 });
        assert_eq!(store.rows.len(), 5);
        assert_eq!(store.rows[&(plant, at(1))].energy_expected, Decimal::new(11, 1));
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let plant = Uuid::new_v4();
        let mut store = MemoryStore::default();
        let batch = [reading(7, 70), reading(8, 80), reading(9, 90)];

        let first = store.merge(plant, &batch);
        let after_first = store.rows.clone();
        let second = store.merge(plant, &batch);

        assert_eq!(first, MergeSummary { created: 3, updated: 0 });
        // Unchanged values still count as updates.
        assert_eq!(second, MergeSummary { created: 0, updated: 3 });
        assert_eq!(store.rows, after_first);
    }

    #[test]
    fn last_reading_wins_on_duplicate_timestamps() {
        let plant = Uuid::new_v4();
        let batch = [reading(6, 60), reading(6, 66)];
        let incoming = index_readings(&batch);
        let plan = plan_merge(plant, &incoming, Vec::new());

        assert_eq!(plan.creates.len(), 1);
        assert!(plan.updates.is_empty());
        assert_eq!(plan.creates[0].energy_expected, Decimal::new(66, 1));
    }

    #[test]
    fn updates_keep_identity_and_timestamp() {
        let plant = Uuid::new_v4();
        let stored = DataPoint::from_reading(plant, &reading(12, 120));
        let incoming_batch = [reading(12, 125)];
        let incoming = index_readings(&incoming_batch);

        let plan = plan_merge(plant, &incoming, vec![stored.clone()]);

        assert!(plan.creates.is_empty());
        let updated = &plan.updates[0];
        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.plant_id, stored.plant_id);
        assert_eq!(updated.datetime, stored.datetime);
        assert_eq!(updated.energy_expected, Decimal::new(125, 1));
        assert_eq!(updated.irradiation_observed, Decimal::new(250, 1));
    }

    #[test]
    fn other_plants_are_untouched() {
        let plant_a = Uuid::new_v4();
        let plant_b = Uuid::new_v4();
        let mut store = MemoryStore::default();
        store.merge(plant_a, &[reading(1, 10)]);

        let summary = store.merge(plant_b, &[reading(1, 99)]);

        assert_eq!(summary, MergeSummary { created: 1, updated: 0 });
        assert_eq!(store.rows[&(plant_a, at(1))].energy_expected, Decimal::new(10, 1));
    }

    #[test]
    fn empty_batch_plans_nothing() {
        let plan = plan_merge(Uuid::new_v4(), &BTreeMap::new(), Vec::new());
        assert_eq!(plan, MergePlan::default());
    }
}
