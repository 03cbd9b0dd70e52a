use std::env;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use netpulse::db::postgres::{
    PgTargetRepository, PgSpeedTestResultRepository, PgUserSpeedTestPreferenceRepository,
};
use netpulse::monitoring::config_service::SpeedTestConfigService;
use netpulse::monitoring::events::EventBus;
use netpulse::monitoring::scheduler::MonitoringScheduler;
use netpulse::monitoring::speed_test::SpeedTestService;
use netpulse::server::config::ServerConfig;
use netpulse::web::{AppState, create_router};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "netpulse.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    dotenv().ok();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting netpulse server");

    // --- Database Pool Setup ---
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL must be set in the environment or .env file")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let targets = Arc::new(PgTargetRepository::new(pool.clone()));
    let results = Arc::new(PgSpeedTestResultRepository::new(pool.clone()));
    let preferences = Arc::new(PgUserSpeedTestPreferenceRepository::new(pool.clone()));

    // --- Monitoring Pipeline Setup ---
    let config_service = Arc::new(SpeedTestConfigService::new(
        preferences.clone(),
        config.speed_test_url.clone(),
        Duration::from_millis(config.default_timeout_ms),
        config.speed_test_retries,
    ));
    let events = EventBus::default();
    let scheduler = Arc::new(MonitoringScheduler::new(
        Arc::new(SpeedTestService::new()),
        config_service.clone(),
        targets.clone(),
        results.clone(),
        events.clone(),
    ));
    tokio::spawn(scheduler.clone().run());

    for target_id in &config.always_monitor {
        match scheduler.start_monitoring(target_id, config.default_interval_ms) {
            Ok(()) => info!(target_id = %target_id, "boot-time monitoring started"),
            Err(e) => warn!(target_id = %target_id, error = %e, "failed to start boot-time monitoring"),
        }
    }

    // --- Axum HTTP Server Setup ---
    let app_state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        targets,
        results,
        preferences,
        config_service,
        config: config.clone(),
    });
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.listen_address).await?;
    info!(address = %config.listen_address, "HTTP server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await
    {
        error!(error = %e, "HTTP server exited with an error");
        return Err(e.into());
    }

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(scheduler: Arc<MonitoringScheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received, stopping all monitors");
    scheduler.stop_all();
}
