use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::BookingCoordinator;
use availability_cell::AvailabilityService;
use shared_config::AppConfig;
use shared_database::{AppointmentStore, InMemoryStore, ScheduleStore, SupabaseStore};
use shared_utils::{Clock, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Therapy Booking API server");

    // Load configuration
    let config = AppConfig::from_env();

    let (schedules, appointments) = build_stores(&config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let availability = Arc::new(AvailabilityService::new(
        schedules.clone(),
        clock.clone(),
        config.scheduling.clone(),
    ));
    let booking = Arc::new(BookingCoordinator::new(
        schedules,
        appointments,
        clock.clone(),
        config.scheduling.clone(),
    ));

    spawn_completion_sweep(booking.clone(), clock, config.completion_sweep_secs);

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(availability, booking)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}

fn build_stores(config: &AppConfig) -> (Arc<dyn ScheduleStore>, Arc<dyn AppointmentStore>) {
    if config.is_configured() {
        info!("Using Supabase schedule store at {}", config.supabase_url);
        let store = Arc::new(SupabaseStore::new(config));
        let schedules: Arc<dyn ScheduleStore> = store.clone();
        let appointments: Arc<dyn AppointmentStore> = store;
        (schedules, appointments)
    } else {
        warn!("Supabase is not configured, schedules live in memory and are lost on restart");
        let store = Arc::new(InMemoryStore::new());
        let schedules: Arc<dyn ScheduleStore> = store.clone();
        let appointments: Arc<dyn AppointmentStore> = store;
        (schedules, appointments)
    }
}

fn spawn_completion_sweep(booking: Arc<BookingCoordinator>, clock: Arc<dyn Clock>, every_secs: u64) {
    if every_secs == 0 {
        warn!("Completion sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(every_secs));

        loop {
            ticker.tick().await;

            if let Err(e) = booking.complete_elapsed(clock.now()).await {
                error!("Completion sweep failed: {}", e);
            }
        }
    });
}
