//! End-to-end tests against a real PostgreSQL.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use solar_plants::api::router::create_router;
use solar_plants::api::state::AppState;
use solar_plants::client::{FetchOutcome, MonitoringError, ReadingSource};
use solar_plants::db::pool::{apply_migrations, connect, PgPool};
use solar_plants::db::queries::{self, PlantSelector};
use solar_plants::models::monitoring::{Metrics, Reading};
use solar_plants::services::jobs::{JobQueue, JobRegistry};
use solar_plants::services::runner::run_once;
use tower::ServiceExt;
use uuid::Uuid;

fn pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must point at a PostgreSQL database");
    let pool = connect(&url, 4).expect("connect");
    apply_migrations(&mut pool.get().expect("connection")).expect("migrations");
    pool
}

fn router(pool: &PgPool) -> Router {
    let (queue, receiver) = JobQueue::new(JobRegistry::default());
    // Leak the receiver so submissions succeed without a worker.
    std::mem::forget(receiver);
    create_router(AppState::new(pool.clone(), queue))
}

fn unique(name: &str) -> String {
    format!("{} {}", name, Uuid::new_v4().simple())
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Serves the same fixed readings for every plant.
struct FixedReadings(Vec<Reading>);

impl ReadingSource for FixedReadings {
    fn fetch_readings(&self, _plant: &str, _from: NaiveDate, _to: NaiveDate) -> Result<FetchOutcome, MonitoringError> {
        Ok(FetchOutcome {
            readings: self.0.clone(),
            skipped: Vec::new(),
        })
    }
}

fn reading_at_t1() -> Reading {
    Reading {
        datetime: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        expected: Metrics {
            energy: Decimal::new(1005, 1),
            irradiation: Decimal::new(8125, 1),
        },
        observed: Metrics {
            energy: Decimal::new(950, 1),
            irradiation: Decimal::new(7990, 1),
        },
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn solar_a_lifecycle() {
    let pool = pool();
    let app = router(&pool);
    let name = unique("Solar A");

    let (status, created) = call(&app, "POST", "/plants", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let source = FixedReadings(vec![reading_at_t1()]);
    let selector = PlantSelector::from_ids(vec![id]);
    let mut conn = pool.get().unwrap();
    let first = run_once(&mut conn, &source, &selector, Utc::now()).unwrap();
    assert_eq!((first.created, first.updated), (1, 0));
    let second = run_once(&mut conn, &source, &selector, Utc::now()).unwrap();
    assert_eq!((second.created, second.updated), (0, 1));
    assert_eq!(queries::count_plant_data_points(&mut conn, id).unwrap(), 1);
    drop(conn);

    let (status, page) = call(&app, "GET", &format!("/plants/{id}/datapoints"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    let point = &page["results"][0];
    assert_eq!(point["plant_name"], name.as_str());
    assert_eq!(point["energy_expected"], json!(100.5));
    assert_eq!(point["irradiation_observed"], json!(799.0));

    let point_id = point["id"].as_str().unwrap();
    let (status, detail) = call(&app, "GET", &format!("/plants/{id}/datapoints/{point_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail.get("plant_name").is_none());

    let (status, _) = call(&app, "DELETE", &format!("/plants/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, "GET", &format!("/plants/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, page) = call(&app, "GET", &format!("/plants/{id}/datapoints"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 0);
    assert_eq!(page["results"], json!([]));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn archiving_twice_keeps_the_plant_archived() {
    let pool = pool();
    let mut conn = pool.get().unwrap();
    let name = unique("Twice");
    let plant = queries::create_plant(&mut conn, &name).unwrap();

    let once = queries::archive_plant(&mut conn, plant.id).unwrap().unwrap();
    let twice = queries::archive_plant(&mut conn, plant.id).unwrap().unwrap();

    assert!(once.is_archived && twice.is_archived);
    assert_eq!(twice.name, name);
    assert!(queries::find_active_plant(&mut conn, plant.id).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn duplicate_names_are_rejected() {
    let pool = pool();
    let app = router(&pool);
    let name = unique("Duplicate");

    let (status, first) = call(&app, "POST", "/plants", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&app, "POST", "/plants", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // Archived plants still hold their name.
    let id = first["id"].as_str().unwrap();
    call(&app, "DELETE", &format!("/plants/{id}"), None).await;
    let (status, _) = call(&app, "POST", "/plants", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn report_with_zero_expected_energy_has_null_efficiency() {
    let pool = pool();
    let app = router(&pool);
    let name = unique("Dark");

    let mut conn = pool.get().unwrap();
    let plant = queries::create_plant(&mut conn, &name).unwrap();
    let mut reading = reading_at_t1();
    reading.expected.energy = Decimal::ZERO;
    let source = FixedReadings(vec![reading]);
    run_once(&mut conn, &source, &PlantSelector::from_ids(vec![plant.id]), Utc::now()).unwrap();
    drop(conn);

    let search = name.replace(' ', "%20");
    let (status, page) = call(&app, "GET", &format!("/reports?search={search}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    let row = &page["results"][0];
    assert!(row["energy_efficiency"].is_null());
    assert!(row["irradiation_efficiency"].is_number());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn reports_are_grouped_and_paged() {
    let pool = pool();
    let app = router(&pool);
    let tag = Uuid::new_v4().simple().to_string();

    let mut conn = pool.get().unwrap();
    let first = queries::create_plant(&mut conn, &format!("Report {tag} A")).unwrap();
    let second = queries::create_plant(&mut conn, &format!("Report {tag} B")).unwrap();
    let mut later = reading_at_t1();
    later.datetime = Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap();
    let source = FixedReadings(vec![reading_at_t1(), later]);
    run_once(&mut conn, &source, &PlantSelector::from_ids(vec![first.id, second.id]), Utc::now()).unwrap();
    drop(conn);

    let uri = format!("/reports?search={tag}&ordering=-plant_name&page_size=1");
    let (status, page) = call(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 2);
    assert_eq!(page["next"], 2);
    let row = &page["results"][0];
    assert_eq!(row["plant_name"], format!("Report {tag} B"));
    assert_eq!(row["energy_expected_sum"], json!(201.0));
    assert_eq!(row["energy_expected_avg"], json!(100.5));

    let (status, page) = call(&app, "GET", &format!("{uri}&page=2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["results"][0]["plant_name"], format!("Report {tag} A"));
    assert!(page["next"].is_null());

    let (status, _) = call(&app, "GET", &format!("{uri}&page=3"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
