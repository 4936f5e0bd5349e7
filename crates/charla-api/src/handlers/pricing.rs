//! Pricing configuration handlers
//!
//! Admin surface for the pricing config. Updates apply to sessions
//! initiated afterwards; in-progress sessions keep their frozen rates.

use crate::dto::pricing::{PricingResponse, PricingUpdateRequest};
use crate::dto::ApiResponse;
use actix_web::{web, HttpResponse};
use charla_core::AppError;
use charla_services::PricingService;
use tracing::{info, instrument};

/// Current pricing config
///
/// GET /api/v1/pricing
#[instrument(skip(pricing))]
pub async fn get_pricing(pricing: web::Data<PricingService>) -> Result<HttpResponse, AppError> {
    let config = pricing.snapshot().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PricingResponse::from(config))))
}

/// Replace the pricing config
///
/// PUT /api/v1/pricing
#[instrument(skip(pricing, req))]
pub async fn update_pricing(
    pricing: web::Data<PricingService>,
    req: web::Json<PricingUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let saved = pricing.update(req.to_config()).await?;

    info!("Pricing config updated to version {}", saved.version);

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        PricingResponse::from(saved),
        "Pricing config updated",
    )))
}

/// Configure pricing routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/pricing")
            .route("", web::get().to(get_pricing))
            .route("", web::put().to(update_pricing)),
    );
}
