//! Call session handlers
//!
//! HTTP handlers for the call lifecycle: initiate, accept, decline,
//! no-answer, end, and one-shot messages, plus per-call ledger
//! reconciliation and per-user history.

use crate::dto::session::{
    CallCreateRequest, CallEndRequest, MessageResponse, MessageSendRequest, SessionResponse,
};
use crate::dto::wallet::LedgerEntryResponse;
use crate::dto::{ApiResponse, PaginationParams};
use actix_web::{web, HttpResponse};
use charla_core::traits::WalletRepository;
use charla_core::AppError;
use charla_db::PgWalletRepository;
use charla_services::SessionManager;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use validator::Validate;

/// Initiate a call session
///
/// POST /api/v1/calls
#[instrument(skip(manager, req))]
pub async fn initiate_call(
    manager: web::Data<SessionManager>,
    req: web::Json<CallCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Call creation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let class = req.parsed_class().ok_or_else(|| {
        AppError::Validation(format!(
            "call_class must be audio or video, got '{}'",
            req.call_class
        ))
    })?;

    debug!(
        caller_id = req.caller_id,
        receiver_id = req.receiver_id,
        "Initiating call"
    );

    let session = manager
        .initiate(req.caller_id, req.receiver_id, class)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Fetch a session
///
/// GET /api/v1/calls/{call_id}
#[instrument(skip(manager))]
pub async fn get_call(
    manager: web::Data<SessionManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session = manager.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Accept a ringing session
///
/// POST /api/v1/calls/{call_id}/accept
#[instrument(skip(manager))]
pub async fn accept_call(
    manager: web::Data<SessionManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session = manager.accept(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Decline a ringing session
///
/// POST /api/v1/calls/{call_id}/decline
#[instrument(skip(manager))]
pub async fn decline_call(
    manager: web::Data<SessionManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session = manager.decline(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Mark a ringing session as unanswered
///
/// POST /api/v1/calls/{call_id}/no-answer
#[instrument(skip(manager))]
pub async fn no_answer_call(
    manager: web::Data<SessionManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session = manager.mark_no_answer(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// End a session
///
/// POST /api/v1/calls/{call_id}/end
#[instrument(skip(manager, req))]
pub async fn end_call(
    manager: web::Data<SessionManager>,
    path: web::Path<String>,
    req: Option<web::Json<CallEndRequest>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(|r| r.into_inner()).unwrap_or_default();
    let reason = req.parsed_reason().ok_or_else(|| {
        AppError::Validation(format!(
            "reason must be completed, user_disconnected or admin_ended, got '{}'",
            req.reason.as_deref().unwrap_or("")
        ))
    })?;

    let session = manager.end(&path.into_inner(), reason).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SessionResponse::from(session))))
}

/// Ledger entries settling a call, for reconciliation
///
/// GET /api/v1/calls/{call_id}/ledger
#[instrument(skip(pool))]
pub async fn call_ledger(
    pool: web::Data<PgPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let repo = PgWalletRepository::new(pool.get_ref().clone());
    let entries = repo.entries_for_call(&path.into_inner()).await?;

    let data: Vec<LedgerEntryResponse> = entries.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// Terminal sessions involving a user, newest-first
///
/// GET /api/v1/calls/history/{user_id}
#[instrument(skip(manager))]
pub async fn call_history(
    manager: web::Data<SessionManager>,
    path: web::Path<i64>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let sessions = manager
        .history_for(path.into_inner(), query.limit(), query.offset())
        .await?;

    let data: Vec<SessionResponse> = sessions.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// Send a one-shot billed message
///
/// POST /api/v1/messages
#[instrument(skip(manager, req))]
pub async fn send_message(
    manager: web::Data<SessionManager>,
    req: web::Json<MessageSendRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Message validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (session, result) = manager.send_message(req.sender_id, req.receiver_id).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(MessageResponse::new(session, &result))))
}

/// Configure call session routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("", web::post().to(initiate_call))
            .route("/history/{user_id}", web::get().to(call_history))
            .route("/{call_id}", web::get().to(get_call))
            .route("/{call_id}/accept", web::post().to(accept_call))
            .route("/{call_id}/decline", web::post().to(decline_call))
            .route("/{call_id}/no-answer", web::post().to(no_answer_call))
            .route("/{call_id}/end", web::post().to(end_call))
            .route("/{call_id}/ledger", web::get().to(call_ledger)),
    )
    .service(web::scope("/messages").route("", web::post().to(send_message)));
}
