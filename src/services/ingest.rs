use crate::db::models::DataPoint;
use crate::schema;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel::PgConnection;

/// One multi-row INSERT for data points that do not exist yet.
pub fn insert_data_points(conn: &mut PgConnection, rows: &[DataPoint]) -> QueryResult<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    use schema::data_points::dsl as D;

    diesel::insert_into(D::data_points).values(rows).execute(conn)
}

/// One statement rewriting the four measurement columns of existing rows,
/// matched by id. `plant_id` and `datetime` are never touched.
pub fn update_data_point_measurements(conn: &mut PgConnection, rows: &[DataPoint]) -> QueryResult<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    use schema::data_points::dsl as D;

    diesel::insert_into(D::data_points)
        .values(rows)
        .on_conflict(D::id)
        .do_update()
        .set((
            D::energy_expected.eq(excluded(D::energy_expected)),
            D::energy_observed.eq(excluded(D::energy_observed)),
            D::irradiation_expected.eq(excluded(D::irradiation_expected)),
            D::irradiation_observed.eq(excluded(D::irradiation_observed)),
        ))
        .execute(conn)
}
