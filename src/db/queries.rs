//! Every read and write against `plants` and `data_points` used by the API
//! and the reconciliation run.
//!
//! Soft deletion lives here: read paths start from [`active_plants`] or
//! [`active_data_points`], so archived plants and their data points never
//! leak into active views.

use chrono::{DateTime, Utc};
use diesel::dsl::{count, count_distinct, sum, Eq, Filter, GtEq, ILike, InnerJoin, LtEq};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_dsl::methods;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{DataPoint, Plant, PlantDataPoint};
use crate::db::pool::StoreError;
use crate::schema::{data_points, plants};
use crate::utils::contains_pattern;

pub type ActivePlants = Filter<plants::table, Eq<plants::is_archived, bool>>;
pub type ActiveDataPoints = Filter<InnerJoin<data_points::table, plants::table>, Eq<plants::is_archived, bool>>;

pub fn active_plants() -> ActivePlants {
    plants::table.filter(plants::is_archived.eq(false))
}

pub fn active_data_points() -> ActiveDataPoints {
    data_points::table
        .inner_join(plants::table)
        .filter(plants::is_archived.eq(false))
}

/// Which active plants a reconciliation run targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "plants")]
pub enum PlantSelector {
    All,
    Ids(Vec<Uuid>),
    Names(Vec<String>),
}

impl PlantSelector {
    /// An empty id list targets every active plant.
    pub fn from_ids(ids: Vec<Uuid>) -> Self {
        if ids.is_empty() {
            PlantSelector::All
        } else {
            PlantSelector::Ids(ids)
        }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            PlantSelector::All
        } else {
            PlantSelector::Names(names)
        }
    }
}

// ---------------------------------------------------------------------------
// plants
// ---------------------------------------------------------------------------

fn searched_active_plants(search: Option<&str>) -> plants::BoxedQuery<'static, Pg> {
    let mut query = active_plants().into_boxed();
    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        query = query.filter(plants::name.ilike(contains_pattern(term)));
    }
    query
}

pub fn list_active_plants(
    conn: &mut PgConnection,
    search: Option<&str>,
    descending: bool,
    limit: i64,
    offset: i64,
) -> Result<(i64, Vec<Plant>), StoreError> {
    let count = searched_active_plants(search).count().get_result::<i64>(conn)?;

    let query = searched_active_plants(search);
    let query = if descending {
        query.order(plants::name.desc())
    } else {
        query.order(plants::name.asc())
    };
    let rows = query
        .then_order_by(plants::id.asc())
        .limit(limit)
        .offset(offset)
        .select(Plant::as_select())
        .load(conn)?;

    Ok((count, rows))
}

pub fn find_active_plant(conn: &mut PgConnection, id: Uuid) -> Result<Option<Plant>, StoreError> {
    Ok(active_plants()
        .filter(plants::id.eq(id))
        .select(Plant::as_select())
        .first(conn)
        .optional()?)
}

/// Plants matching `selector`, active only, in name order.
pub fn select_active_plants(conn: &mut PgConnection, selector: &PlantSelector) -> Result<Vec<Plant>, StoreError> {
    let mut query = active_plants().into_boxed();
    match selector {
        PlantSelector::All => {}
        PlantSelector::Ids(ids) => query = query.filter(plants::id.eq_any(ids.clone())),
        PlantSelector::Names(names) => query = query.filter(plants::name.eq_any(names.clone())),
    }
    Ok(query
        .order(plants::name.asc())
        .select(Plant::as_select())
        .load(conn)?)
}

/// Whether any plant, archived or not, already uses `name`.
pub fn name_taken(conn: &mut PgConnection, name: &str, except: Option<Uuid>) -> Result<bool, StoreError> {
    let mut query = plants::table.filter(plants::name.eq(name.to_string())).into_boxed();
    if let Some(id) = except {
        query = query.filter(plants::id.ne(id));
    }
    let hit = query.select(plants::id).first::<Uuid>(conn).optional()?;
    Ok(hit.is_some())
}

fn duplicate_name_or(err: DieselError, name: &str) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => StoreError::DuplicateName(name.to_string()),
        other => StoreError::Diesel(other),
    }
}

pub fn create_plant(conn: &mut PgConnection, name: &str) -> Result<Plant, StoreError> {
    if name_taken(conn, name, None)? {
        return Err(StoreError::DuplicateName(name.to_string()));
    }
    let plant = Plant::new(name);
    diesel::insert_into(plants::table)
        .values(&plant)
        .execute(conn)
        .map_err(|e| duplicate_name_or(e, name))?;
    Ok(plant)
}

/// Rename an active plant. `None` when the plant is absent or archived.
pub fn rename_plant(conn: &mut PgConnection, id: Uuid, name: &str) -> Result<Option<Plant>, StoreError> {
    if find_active_plant(conn, id)?.is_none() {
        return Ok(None);
    }
    if name_taken(conn, name, Some(id))? {
        return Err(StoreError::DuplicateName(name.to_string()));
    }
    diesel::update(active_plants().filter(plants::id.eq(id)))
        .set(plants::name.eq(name))
        .returning(Plant::as_returning())
        .get_result(conn)
        .optional()
        .map_err(|e| duplicate_name_or(e, name))
}

/// Flag a plant as archived. Archiving an archived plant is a no-op that
/// still returns the record.
pub fn archive_plant(conn: &mut PgConnection, id: Uuid) -> Result<Option<Plant>, StoreError> {
    Ok(diesel::update(plants::table.find(id))
        .set(plants::is_archived.eq(true))
        .returning(Plant::as_returning())
        .get_result(conn)
        .optional()?)
}

// ---------------------------------------------------------------------------
// data points
// ---------------------------------------------------------------------------

pub fn list_plant_data_points(
    conn: &mut PgConnection,
    plant_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(i64, Vec<PlantDataPoint>), StoreError> {
    let scoped = || active_data_points().filter(data_points::plant_id.eq(plant_id));

    let count = scoped().count().get_result::<i64>(conn)?;
    let rows = scoped()
        .order((data_points::datetime.asc(), data_points::id.asc()))
        .limit(limit)
        .offset(offset)
        .select((
            data_points::id,
            data_points::plant_id,
            plants::name,
            data_points::datetime,
            data_points::energy_expected,
            data_points::energy_observed,
            data_points::irradiation_expected,
            data_points::irradiation_observed,
        ))
        .load::<PlantDataPoint>(conn)?;

    Ok((count, rows))
}

pub fn find_plant_data_point(conn: &mut PgConnection, plant_id: Uuid, id: Uuid) -> Result<Option<DataPoint>, StoreError> {
    Ok(active_data_points()
        .filter(data_points::plant_id.eq(plant_id))
        .filter(data_points::id.eq(id))
        .select(DataPoint::as_select())
        .first(conn)
        .optional()?)
}

/// Stored data points of `plant_id` at any of `timestamps`.
pub fn existing_data_points(
    conn: &mut PgConnection,
    plant_id: Uuid,
    timestamps: &[DateTime<Utc>],
) -> Result<Vec<DataPoint>, StoreError> {
    if timestamps.is_empty() {
        return Ok(Vec::new());
    }
    Ok(data_points::table
        .filter(data_points::plant_id.eq(plant_id))
        .filter(data_points::datetime.eq_any(timestamps.to_vec()))
        .select(DataPoint::as_select())
        .load(conn)?)
}

pub fn count_plant_data_points(conn: &mut PgConnection, plant_id: Uuid) -> Result<i64, StoreError> {
    Ok(data_points::table
        .filter(data_points::plant_id.eq(plant_id))
        .count()
        .get_result(conn)?)
}

// ---------------------------------------------------------------------------
// reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub include_archived: bool,
    pub search: Option<String>,
}

/// Per-plant totals over the data points a report covers. Sums are `None`
/// only for a plant without points, which the grouping never yields.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct PlantTotals {
    pub plant_id: Uuid,
    pub plant_name: String,
    pub points: i64,
    pub energy_expected: Option<Decimal>,
    pub energy_observed: Option<Decimal>,
    pub irradiation_expected: Option<Decimal>,
    pub irradiation_observed: Option<Decimal>,
}

/// Restrict a data point / plant join to what `filter` selects.
fn report_scope<Q>(query: Q, filter: &ReportFilter) -> Q
where
    Q: methods::FilterDsl<Eq<plants::is_archived, bool>, Output = Q>
        + methods::FilterDsl<GtEq<data_points::datetime, DateTime<Utc>>, Output = Q>
        + methods::FilterDsl<LtEq<data_points::datetime, DateTime<Utc>>, Output = Q>
        + methods::FilterDsl<ILike<plants::name, String>, Output = Q>,
{
    let mut query = query;
    if !filter.include_archived {
        query = methods::FilterDsl::filter(query, plants::is_archived.eq(false));
    }
    if let Some(start) = filter.start {
        query = methods::FilterDsl::filter(query, data_points::datetime.ge(start));
    }
    if let Some(end) = filter.end {
        query = methods::FilterDsl::filter(query, data_points::datetime.le(end));
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        query = methods::FilterDsl::filter(query, plants::name.ilike(contains_pattern(term)));
    }
    query
}

/// One page of per-plant totals, grouped and paginated by PostgreSQL, plus
/// the number of plants with at least one matching point.
pub fn report_totals(
    conn: &mut PgConnection,
    filter: &ReportFilter,
    descending: bool,
    limit: i64,
    offset: i64,
) -> Result<(i64, Vec<PlantTotals>), StoreError> {
    let plant_count = report_scope(
        data_points::table
            .inner_join(plants::table)
            .select(count_distinct(plants::id))
            .into_boxed::<Pg>(),
        filter,
    )
    .get_result::<i64>(conn)?;

    let grouped = report_scope(
        data_points::table
            .inner_join(plants::table)
            .group_by(plants::id)
            .select((
                plants::id,
                plants::name,
                count(data_points::id),
                sum(data_points::energy_expected),
                sum(data_points::energy_observed),
                sum(data_points::irradiation_expected),
                sum(data_points::irradiation_observed),
            ))
            .into_boxed::<Pg>(),
        filter,
    );
    let grouped = if descending {
        grouped.order(plants::name.desc())
    } else {
        grouped.order(plants::name.asc())
    };
    let rows = grouped
        .then_order_by(plants::id.asc())
        .limit(limit)
        .offset(offset)
        .load::<PlantTotals>(conn)?;

    Ok((plant_count, rows))
}
