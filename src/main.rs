//! Charla billing engine server
//!
//! Real-time call billing for the Charla platform: session lifecycle,
//! per-minute metering, exactly-once settlement into wallet ledgers, and
//! missed call recording.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use charla_api::handlers::{
    configure_missed_calls, configure_pricing, configure_sessions, configure_wallets, health_check,
};
use charla_cache::RedisCache;
use charla_core::config::AppConfig;
use charla_core::traits::{
    MissedCallRepository, NotificationDispatcher, PricingRepository, SessionRepository,
    UserRepository, WalletRepository,
};
use charla_db::{
    create_pool, PgMissedCallRepository, PgPricingRepository, PgSessionRepository,
    PgUserRepository, PgWalletRepository,
};
use charla_services::{
    LogNotifier, MeteringService, MissedCallRecorder, PricingService, SessionManager,
    SettlementService,
};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Health check
            .route("/health", web::get().to(health_check))
            // Call lifecycle and messages
            .configure(configure_sessions)
            // Wallet balances and ledgers
            .configure(configure_wallets)
            // Pricing administration
            .configure(configure_pricing)
            // Missed call records
            .configure(configure_missed_calls),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "charla_billing={},charla_api={},charla_services={},charla_db={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!(
        "Starting Charla billing engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load().unwrap_or_else(|e| {
        panic!("Failed to load configuration: {}", e);
    });

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .unwrap_or_else(|e| panic!("Failed to create database pool: {}", e));

    // Redis is an optimization, not a dependency: billing falls back to
    // the database when the cache is unreachable
    let cache = match RedisCache::new(&config.redis.url).await {
        Ok(cache) => {
            info!("Redis connection established");
            Some(cache)
        }
        Err(e) => {
            warn!("Redis unavailable, pricing cache disabled: {}", e);
            None
        }
    };

    // Repositories
    let session_repo: Arc<dyn SessionRepository> =
        Arc::new(PgSessionRepository::new(pool.clone()));
    let wallet_repo: Arc<dyn WalletRepository> = Arc::new(PgWalletRepository::new(pool.clone()));
    let pricing_repo: Arc<dyn PricingRepository> =
        Arc::new(PgPricingRepository::new(pool.clone()));
    let missed_call_repo: Arc<dyn MissedCallRepository> =
        Arc::new(PgMissedCallRepository::new(pool.clone()));
    let user_repo: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let notifier: Arc<dyn NotificationDispatcher> = Arc::new(LogNotifier);

    // Services
    let pricing = Arc::new(PricingService::new(
        pricing_repo,
        cache,
        config.billing.pricing_cache_ttl_secs,
    ));
    let settlement = Arc::new(SettlementService::new(
        session_repo.clone(),
        wallet_repo.clone(),
        notifier.clone(),
    ));
    let metering = Arc::new(MeteringService::new(
        session_repo.clone(),
        wallet_repo.clone(),
        settlement.clone(),
        config.billing.metering_tick_secs,
        config.billing.max_call_minutes,
    ));
    let recorder = Arc::new(MissedCallRecorder::new(missed_call_repo, notifier));
    let manager = Arc::new(SessionManager::new(
        session_repo,
        user_repo,
        wallet_repo,
        pricing.clone(),
        metering.clone(),
        settlement.clone(),
        recorder.clone(),
        config.billing.ring_timeout_secs,
    ));

    // CORS configuration
    let cors_origins = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        // Configure CORS - clone cors_origins for each worker
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            // Shared state
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::from(manager.clone()))
            .app_data(web::Data::from(pricing.clone()))
            .app_data(web::Data::from(metering.clone()))
            .app_data(web::Data::from(recorder.clone()))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message
                    })),
                )
                .into()
            }))
            // Middleware
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            // Routes
            .configure(configure_routes)
            // Root redirect to health
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
