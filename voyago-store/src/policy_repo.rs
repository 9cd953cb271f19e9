use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use voyago_core::policy::{Action, PolicyStore, Possession, Resource};
use voyago_core::{StoreError, StoreResult};

pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn allows(
        &self,
        role: &str,
        resource: Resource,
        action: Action,
        possession: Possession,
    ) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM policies \
             WHERE role = $1 AND resource = $2 AND action = $3 AND possession = $4)",
        )
        .bind(role)
        .bind(resource.as_str())
        .bind(action.as_str())
        .bind(possession.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::database)
    }
}

/// The grants this engine depends on. Bump the version when the list
/// changes; the routine below re-applies idempotently.
pub const POLICY_SEED_VERSION: i32 = 1;

pub const SEED_RULES: &[(&str, Resource, Action, Possession)] = &[
    ("admin", Resource::Booking, Action::Read, Possession::Any),
    ("member", Resource::Booking, Action::Create, Possession::Own),
    ("partner", Resource::Booking, Action::Create, Possession::Own),
    ("admin", Resource::Booking, Action::Create, Possession::Own),
    ("member", Resource::Booking, Action::ReadAll, Possession::Own),
    ("partner", Resource::Booking, Action::ReadAll, Possession::Own),
    ("admin", Resource::CouponCode, Action::Read, Possession::Any),
    ("partner", Resource::CouponCode, Action::Read, Possession::Own),
    ("partner", Resource::CouponCode, Action::Create, Possession::Own),
    ("partner", Resource::CouponCode, Action::Update, Possession::Own),
    ("member", Resource::CouponCode, Action::Update, Possession::Any),
    ("partner", Resource::CouponCode, Action::Update, Possession::Any),
    ("admin", Resource::CouponCode, Action::Update, Possession::Any),
];

/// Versioned, idempotent policy seed. Invoked explicitly once at startup;
/// running it again (or concurrently from two instances) is safe because
/// every write is an upsert.
pub async fn seed_policies(pool: &PgPool) -> StoreResult<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM policy_seed")
        .fetch_one(pool)
        .await
        .map_err(StoreError::database)?;

    if applied.unwrap_or(0) >= POLICY_SEED_VERSION {
        return Ok(());
    }

    for (role, resource, action, possession) in SEED_RULES {
        sqlx::query(
            "INSERT INTO policies (role, resource, action, possession) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(role)
        .bind(resource.as_str())
        .bind(action.as_str())
        .bind(possession.as_str())
        .execute(pool)
        .await
        .map_err(StoreError::database)?;
    }

    sqlx::query("INSERT INTO policy_seed (version) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(POLICY_SEED_VERSION)
        .execute(pool)
        .await
        .map_err(StoreError::database)?;

    info!("policy seed v{POLICY_SEED_VERSION} applied");
    Ok(())
}
