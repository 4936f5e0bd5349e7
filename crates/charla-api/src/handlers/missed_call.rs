//! Missed call handlers

use crate::dto::missed_call::MissedCallResponse;
use crate::dto::ApiResponse;
use actix_web::{web, HttpResponse};
use charla_core::AppError;
use charla_services::{constants::MISSED_CALL_PAGE_SIZE, MissedCallRecorder};
use serde::Deserialize;
use tracing::instrument;

/// Listing query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct MissedCallListParams {
    /// Maximum records to return
    pub limit: Option<i64>,
}

/// Unviewed missed calls for a receiver, newest-first
///
/// GET /api/v1/missed-calls/{receiver_id}
#[instrument(skip(recorder))]
pub async fn list_missed_calls(
    recorder: web::Data<MissedCallRecorder>,
    path: web::Path<i64>,
    query: web::Query<MissedCallListParams>,
) -> Result<HttpResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(MISSED_CALL_PAGE_SIZE)
        .clamp(1, MISSED_CALL_PAGE_SIZE);

    let records = recorder.unviewed_for(path.into_inner(), limit).await?;

    let data: Vec<MissedCallResponse> = records.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// Mark a missed call record as viewed
///
/// POST /api/v1/missed-calls/{id}/viewed
#[instrument(skip(recorder))]
pub async fn mark_viewed(
    recorder: web::Data<MissedCallRecorder>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !recorder.mark_viewed(id).await? {
        return Err(AppError::NotFound(format!("Missed call {} not found", id)));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::with_message((), "Marked viewed")))
}

/// Configure missed call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/missed-calls")
            .route("/{receiver_id}", web::get().to(list_missed_calls))
            .route("/{id}/viewed", web::post().to(mark_viewed)),
    );
}
