use axum::routing::{get, post};
use axum::Router;

use crate::api::state::AppState;
use crate::api::{datapoints, plants, reports, tasks};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(tasks::health))
        // plants
        .route("/plants", get(plants::list_plants).post(plants::create_plant))
        .route(
            "/plants/{id}",
            get(plants::get_plant)
                .patch(plants::update_plant)
                .delete(plants::delete_plant),
        )
        .route("/plants/{id}/ingest", post(plants::ingest_plant))
        // data points
        .route("/plants/{id}/datapoints", get(datapoints::list_data_points))
        .route("/plants/{id}/datapoints/{point_id}", get(datapoints::get_data_point))
        // reporting and background jobs
        .route("/reports", get(reports::list_reports))
        .route("/tasks/{task_id}", get(tasks::get_task))
        .with_state(state)
}
