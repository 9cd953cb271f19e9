use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use voyago_core::profile::{Profile, ProfileRepository};
use voyago_core::{StoreError, StoreResult};
use voyago_shared::pii::Masked;

pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    payout_email: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            email: Masked(row.email),
            first_name: row.first_name,
            last_name: row.last_name,
            payout_email: row.payout_email.map(Masked),
        }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, email, first_name, last_name, payout_email FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(row.map(Profile::from))
    }

    async fn profile_by_payout_email(&self, payout_email: &str) -> StoreResult<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, email, first_name, last_name, payout_email FROM profiles \
             WHERE payout_email = $1",
        )
        .bind(payout_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(row.map(Profile::from))
    }
}
