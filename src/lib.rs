pub mod models {
    pub mod monitoring;
}

pub mod api {
    pub mod datapoints;
    pub mod error;
    pub mod pagination;
    pub mod params;
    pub mod plants;
    pub mod reports;
    pub mod router;
    pub mod state;
    pub mod tasks;
}
pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod pool;
    pub mod queries;
}
pub mod schema;
pub mod utils;
pub mod services {
    pub mod fixtures;
    pub mod ingest;
    pub mod jobs;
    pub mod reconcile;
    pub mod reports;
    pub mod runner;
    pub mod schedule;
}
