//! Health check handler

use actix_web::{web, HttpResponse};
use charla_services::MeteringService;

/// Liveness probe with basic engine stats
///
/// GET /api/v1/health
pub async fn health_check(metering: web::Data<MeteringService>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "charla-billing",
        "version": env!("CARGO_PKG_VERSION"),
        "active_metered_calls": metering.active_count().await,
    }))
}
