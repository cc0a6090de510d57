mod auth;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use config::Config;
use routes::{create_router, AppState};
use services::notify::{HttpNotifier, LogNotifier, Notifier};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env file (from repo root)
    dotenvy::from_filename("../../.env").ok();
    dotenvy::dotenv().ok();

    // Initialize tracing; LOG_FORMAT=json switches to structured output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tripweave_server=debug,tower_http=debug"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = Config::from_env()?;
    let port = config.server_port;

    // Create database pool and run migrations
    let pool = db::create_pool(&config.sqlite_path).map_err(|e| e.to_string())?;
    tracing::info!("Database initialized at {}", config.sqlite_path);

    if config.identity_shared_secret.is_none() {
        tracing::warn!("IDENTITY_SHARED_SECRET is not set; identity headers are trusted unsigned");
    }
    if config.webhook_signing_secret.is_none() {
        tracing::warn!("WEBHOOK_SIGNING_SECRET is not set; identity webhooks will be refused");
    }

    let notifier: Arc<dyn Notifier> = match config.pubsub.clone() {
        Some(pubsub) => {
            tracing::info!("Publishing trip events to {}", pubsub.url);
            Arc::new(HttpNotifier::new(pubsub))
        }
        None => {
            tracing::info!("Pub/sub not configured; trip events are only logged");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState {
        db: pool,
        config: config.clone(),
        notifier,
        http: reqwest::Client::new(),
    };

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| format!("CORS_ORIGIN is not a valid header value: {e}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::middleware::SUBJECT_HEADER),
            HeaderName::from_static(auth::middleware::EMAIL_HEADER),
            HeaderName::from_static(auth::middleware::FIRST_NAME_HEADER),
            HeaderName::from_static(auth::middleware::LAST_NAME_HEADER),
            HeaderName::from_static(auth::middleware::SIGNATURE_HEADER),
        ])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = format!("0.0.0.0:{port}");
    tracing::info!("tripweave-server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {addr}: {e}"))?;

    // The rate limiter keys on the peer address, so connect info is required.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| format!("Server failed: {e}"))
}
