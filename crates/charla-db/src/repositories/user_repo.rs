//! User directory repository implementation
//!
//! Read-only view over the platform's users table, narrowed to the fields
//! billing needs: kind (member/host) and receiver tier.

use charla_core::{
    models::{ReceiverTier, UserKind, UserProfile},
    traits::UserRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of UserRepository
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn profile(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        debug!("Loading profile for user {}", user_id);

        let row = sqlx::query_as::<sqlx::Postgres, ProfileRow>(
            "SELECT id, kind, tier FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error loading profile {}: {}", user_id, e);
            AppError::Database(format!("Failed to load profile: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

/// Helper struct for profile row mapping
#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    kind: String,
    tier: String,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            kind: UserKind::from_str(&row.kind).unwrap_or(UserKind::Member),
            tier: ReceiverTier::from_str(&row.tier).unwrap_or(ReceiverTier::Standard),
        }
    }
}
