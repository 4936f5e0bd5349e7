//! Wallet handlers
//!
//! Read-only surface over wallet balances and the ledger. Balances move
//! only through settlement; there is no mutation endpoint here.

use crate::dto::wallet::{LedgerEntryResponse, WalletResponse};
use crate::dto::{ApiResponse, PaginationParams};
use actix_web::{web, HttpResponse};
use charla_core::traits::WalletRepository;
use charla_core::AppError;
use charla_db::PgWalletRepository;
use sqlx::PgPool;
use tracing::{instrument, warn};
use validator::Validate;

/// Wallet balance for a user
///
/// GET /api/v1/wallets/{user_id}
#[instrument(skip(pool))]
pub async fn get_wallet(
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let repo = PgWalletRepository::new(pool.get_ref().clone());
    let balance = repo.balance(user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(WalletResponse { user_id, balance })))
}

/// Ledger entries for a user, newest-first
///
/// GET /api/v1/wallets/{user_id}/ledger
#[instrument(skip(pool))]
pub async fn get_ledger(
    pool: web::Data<PgPool>,
    path: web::Path<i64>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let repo = PgWalletRepository::new(pool.get_ref().clone());
    let entries = repo
        .entries_for_user(path.into_inner(), query.limit(), query.offset())
        .await?;

    let data: Vec<LedgerEntryResponse> = entries.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// Configure wallet routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallets")
            .route("/{user_id}", web::get().to(get_wallet))
            .route("/{user_id}/ledger", web::get().to(get_ledger)),
    );
}
