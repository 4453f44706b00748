//! # Salon Booking Service
//!
//! HTTP front end for the salon's appointment book.
//!
//! ## Startup
//!
//! 1. Load `.env` and read [`AppConfig`] from the environment
//! 2. Open the PostgreSQL store (or the in-memory one when no
//!    `DATABASE_URL` is set) and run migrations
//! 3. Seed demo data into an empty store if enabled
//! 4. Start the overdue payment sweep in the background
//! 5. Serve the router

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use salon_booking::config::AppConfig;
use salon_booking::lifecycle::LifecycleEngine;
use salon_booking::store::{EntityStore, MemoryStore, PgStore};
use salon_booking::{create_app, seed, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salon_booking=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!("Starting salon booking service");

    let store: Arc<dyn EntityStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url, config.max_connections).await?),
        None => {
            info!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if config.seed_demo_data
        && seed::seed_demo_data(store.as_ref(), Utc::now().date_naive()).await?
    {
        info!("Demo data loaded");
    }

    let state = AppState::new(store, &config);
    if let Some(every) = config.overdue_sweep_interval {
        spawn_overdue_sweep(state.engine.clone(), every);
        info!("Overdue payment sweep runs every {}s", every.as_secs());
    }

    let app = create_app(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_overdue_sweep(engine: Arc<LifecycleEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match engine.sweep_overdue(Utc::now().date_naive()).await {
                Ok(flagged) if !flagged.is_empty() => {
                    info!("Overdue sweep flagged {} appointments", flagged.len());
                }
                Ok(_) => {}
                Err(e) => error!("Overdue sweep failed: {}", e),
            }
        }
    })
}
