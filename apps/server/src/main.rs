mod auth;
mod booking;
mod db;
mod error;
mod handlers;
mod models;
mod notify;
mod rate_limit;
mod scheduling;
mod status;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use notify::Notifier;
use rate_limit::{rate_limit, RateLimitConfig, RateLimiter};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub auth_secret: String,
    pub tz_offset_hours: i32,
    pub notifier: Notifier,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:barbook.db?mode=rwc".into());
    let auth_secret = std::env::var("AUTH_SECRET").expect("AUTH_SECRET must be set");
    let tz_offset_hours: i32 = std::env::var("TZ_OFFSET_HOURS")
        .unwrap_or_else(|_| "7".into())
        .parse()
        .expect("TZ_OFFSET_HOURS must be a number");

    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());

    let webhook_url = std::env::var("NOTIFY_WEBHOOK_URL").ok();
    if webhook_url.is_none() {
        tracing::warn!("NOTIFY_WEBHOOK_URL not set — booking events will not be dispatched");
    }

    let webapp_url = std::env::var("WEBAPP_URL").ok();

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        auth_secret,
        tz_offset_hours,
        notifier: Notifier::new(webhook_url),
        started_at: Instant::now(),
    });

    // ── Rate limiter ──
    let limiter = RateLimiter::new();
    limiter.add_tier(
        "public",
        RateLimitConfig {
            max_requests: 60,
            window: Duration::from_secs(60),
        },
    );
    limiter.add_tier(
        "client",
        RateLimitConfig {
            max_requests: 30,
            window: Duration::from_secs(60),
        },
    );
    limiter.add_tier(
        "booking",
        RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(300),
        },
    );
    limiter.add_tier(
        "admin",
        RateLimitConfig {
            max_requests: 120,
            window: Duration::from_secs(60),
        },
    );

    // ── Background task: cleanup stale rate limit entries ──
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = match &webapp_url {
        Some(url) => {
            let origins: Vec<axum::http::HeaderValue> = vec![
                url.parse().expect("WEBAPP_URL must be a valid URL"),
                "http://localhost:5173".parse().expect("static origin"),
            ];
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    // ── Router (per-group rate limits; health stays unthrottled) ──

    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // Public read-only endpoints (60 req/min)
    let public_routes = Router::new()
        .route("/api/salons/{id}", get(handlers::client::get_salon))
        .route(
            "/api/salons/{id}/services",
            get(handlers::client::list_services),
        )
        .route("/api/salons/{id}/staff", get(handlers::client::list_staff))
        .route(
            "/api/staff/{id}/slots",
            get(handlers::client::available_slots),
        )
        .layer(from_fn_with_state((limiter.clone(), "public"), rate_limit));

    // Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::client::create_booking))
        .layer(from_fn_with_state((limiter.clone(), "booking"), rate_limit));

    // Authenticated customer endpoints (30 req/min)
    let client_routes = Router::new()
        .route("/api/bookings/my", get(handlers::client::my_bookings))
        .route(
            "/api/bookings/code/{code}",
            get(handlers::client::booking_by_code),
        )
        .route(
            "/api/bookings/{id}/cancel",
            post(handlers::client::cancel_booking),
        )
        .layer(from_fn_with_state((limiter.clone(), "client"), rate_limit));

    // Staff/owner/admin endpoints (120 req/min)
    let admin_routes = Router::new()
        .route(
            "/api/bookings/{id}/status",
            post(handlers::staff::update_status),
        )
        .route(
            "/api/salons/{id}/bookings",
            get(handlers::staff::salon_bookings),
        )
        .route(
            "/api/staff/{id}/schedule",
            get(handlers::staff::get_schedule),
        )
        .route(
            "/api/staff/{id}/schedule/{day}",
            put(handlers::staff::upsert_schedule),
        )
        .route("/api/salons", post(handlers::admin::create_salon))
        .route(
            "/api/salons/{id}/services",
            post(handlers::admin::create_service),
        )
        .route("/api/services/{id}", put(handlers::admin::update_service))
        .route(
            "/api/salons/{id}/staff",
            post(handlers::admin::create_staff),
        )
        .layer(from_fn_with_state((limiter.clone(), "admin"), rate_limit));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(client_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Barbook server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
