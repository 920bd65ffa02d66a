use clap::{Parser, Subcommand};
use log::{error, info, warn};
use solar_plants::api::router::create_router;
use solar_plants::api::state::AppState;
use solar_plants::client::MonitoringClient;
use solar_plants::config::{load_env_file, Config};
use solar_plants::db::pool::{apply_migrations, connect, PgPool};
use solar_plants::db::queries::PlantSelector;
use solar_plants::services::jobs::{spawn_workers, JobQueue, JobRegistry};
use solar_plants::services::{fixtures, runner, schedule};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "solar-plants", version, about = "Solar plant registry and monitoring reconciliation")]
struct Cli {
    /// Load variables from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API with background workers and the daily schedule (default)
    Serve,
    /// Run one reconciliation now, retrying on monitoring failures
    Reconcile {
        /// Plant name to reconcile; repeat for several. Omit for every active plant.
        #[arg(long = "plant", value_name = "NAME")]
        plants: Vec<String>,
    },
    /// Apply pending database migrations and exit
    Migrate,
    /// Create demo plants with synthetic hourly data
    Seed {
        #[arg(long, default_value_t = 3)]
        plants: usize,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    variables: usize,
}

fn configure_env(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, is_explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    let variables = load_env_file(&path)?;
    Ok(Some(LoadedEnvFile {
        path,
        explicit: is_explicit,
        variables,
    }))
}

/// Connect and bring the schema up to date. Every subcommand starts here.
fn open_store(cfg: &Config) -> Result<PgPool, String> {
    let pool = connect(&cfg.database_url, cfg.db_pool_size)?;
    info!("Connected to database");
    let mut conn = pool.get().map_err(|e| format!("DB connection failed: {}", e))?;
    apply_migrations(&mut conn)?;
    Ok(pool)
}

fn serve(cfg: Config) -> Result<(), String> {
    let pool = open_store(&cfg)?;
    let client = Arc::new(MonitoringClient::new(cfg.monitoring_api_url.clone(), cfg.monitoring_timeout));

    let registry = JobRegistry::default();
    let (queue, receiver) = JobQueue::new(registry.clone());
    let workers = spawn_workers(cfg.worker_threads, receiver, registry, pool.clone(), client, cfg.retry)?;
    info!("Started {} reconciliation worker(s)", workers.len());

    if cfg.schedule_enabled {
        schedule::spawn_daily(queue.clone(), cfg.schedule_hour)?;
        info!("Daily reconciliation scheduled at {:02}:00 UTC", cfg.schedule_hour);
    } else {
        info!("Daily schedule disabled via SCHEDULE_ENABLED=false");
    }

    let router = create_router(AppState::new(pool, queue));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("starting async runtime failed: {}", e))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(cfg.bind_address)
            .await
            .map_err(|e| format!("binding {} failed: {}", cfg.bind_address, e))?;
        info!("API listening on {}", cfg.bind_address);
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    warn!("Ctrl-C handler unavailable; stop the process to shut down");
                    std::future::pending::<()>().await;
                }
                info!("Shutdown requested");
            })
            .await
            .map_err(|e| format!("API server failed: {}", e))
    })
}

fn reconcile(cfg: Config, plants: Vec<String>) -> Result<(), String> {
    let pool = open_store(&cfg)?;
    let client = MonitoringClient::new(cfg.monitoring_api_url.clone(), cfg.monitoring_timeout);
    let selector = PlantSelector::from_names(plants);

    info!("Reconciling {:?} against {}", selector, client.endpoint());
    let summary = runner::execute(&pool, &client, &selector, &cfg.retry, |_| {}).map_err(|e| e.to_string())?;
    info!(
        "Reconciliation complete: {} plant(s), {} created, {} updated, {} reading(s) skipped",
        summary.plants, summary.created, summary.updated, summary.skipped_readings
    );
    Ok(())
}

fn seed(cfg: Config, plants: usize, days: u32) -> Result<(), String> {
    let pool = open_store(&cfg)?;
    let mut conn = pool.get().map_err(|e| format!("DB connection failed: {}", e))?;
    let total = fixtures::seed(&mut conn, plants, days)?;
    info!("Seeding complete ({} created, {} updated)", total.created, total.updated);
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (monitoring={}, timeout={}s, bind={}, pool={}, schedule={}, hour={}, max_attempts={}, backoff={}s, workers={})",
        cfg.monitoring_api_url,
        cfg.monitoring_timeout.as_secs(),
        cfg.bind_address,
        cfg.db_pool_size,
        cfg.schedule_enabled,
        cfg.schedule_hour,
        cfg.retry.max_attempts,
        cfg.retry.backoff.as_secs(),
        cfg.worker_threads
    );

    match command {
        Command::Serve => serve(cfg),
        Command::Reconcile { plants } => reconcile(cfg, plants),
        Command::Migrate => open_store(&cfg).map(|_| ()),
        Command::Seed { plants, days } => seed(cfg, plants, days),
    }
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match configure_env(cli.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s))",
            origin,
            info.path.display(),
            info.variables
        );
    }

    info!(
        "solar-plants {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command.unwrap_or(Command::Serve)) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
