use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use grundbuch_backend::config::Config;
use grundbuch_backend::db::{create_pool, init_db, queries, AppState};
use grundbuch_backend::handlers;
use grundbuch_backend::payments::{PaypalClient, StripeClient};

#[derive(Parser, Debug)]
#[command(name = "grundbuch-backend")]
#[command(about = "Order and payment backend for Grundbuchauszug requests")]
struct Cli {
    /// Override HOST from the environment
    #[arg(long)]
    host: Option<String>,

    /// Override PORT from the environment
    #[arg(long)]
    port: Option<u16>,

    /// Override DATABASE_PATH from the environment
    #[arg(long)]
    database: Option<String>,

    /// Purge webhook events older than the retention window, then exit
    #[arg(long)]
    purge_events: bool,
}

/// Spawns a background task that periodically purges old webhook event ids.
/// The dedup table only needs to cover the provider's retry horizon.
fn spawn_cleanup_task(state: AppState, retention_days: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(24 * 60 * 60);

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match queries::purge_old_webhook_events(&conn, retention_days) {
                    Ok(count) => {
                        if count > 0 {
                            tracing::debug!("Purged {} old webhook events", count);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to purge webhook events: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                }
            }
        }
    });

    tracing::info!("Background cleanup task started (runs daily)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grundbuch_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    // Create the database connection pool and initialize the schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    // One-shot admin command (don't start the server)
    if cli.purge_events {
        let conn = db_pool.get().expect("Failed to get connection");
        let removed = queries::purge_old_webhook_events(&conn, config.webhook_event_retention_days)
            .expect("Failed to purge webhook events");
        println!(
            "Removed {} webhook events older than {} days",
            removed, config.webhook_event_retention_days
        );
        return;
    }

    let state = AppState {
        db: db_pool,
        stripe: StripeClient::new(&config.stripe_secret_key, &config.stripe_webhook_secret),
        paypal: PaypalClient::new(
            &config.paypal_client_id,
            &config.paypal_client_secret,
            &config.paypal_webhook_id,
            config.paypal_env,
        ),
    };

    // Purge old webhook events on startup (0 = keep forever)
    if config.webhook_event_retention_days > 0 {
        let conn = state.db.get().expect("Failed to get connection for purge");
        match queries::purge_old_webhook_events(&conn, config.webhook_event_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} webhook events older than {} days",
                    count,
                    config.webhook_event_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old webhook events: {}", e);
            }
        }

        spawn_cleanup_task(state.clone(), config.webhook_event_retention_days);
    }

    // The storefront is the only allowed browser origin; webhooks are
    // server-to-server and don't care about CORS.
    let cors_origin: HeaderValue = config
        .allowed_origin
        .parse()
        .expect("ALLOWED_ORIGIN is not a valid header value");
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    // Build the application router
    let app = handlers::router()
        .merge(handlers::webhooks::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Grundbuch backend listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
