use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyago_shared::pii::Masked;

/// Buyer/partner profile record, consumed from the accounts subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: Masked<String>,
    pub first_name: String,
    pub last_name: String,
    /// Registered payout identity for partners; members have none.
    pub payout_email: Option<Masked<String>>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn profile(&self, id: Uuid) -> crate::StoreResult<Option<Profile>>;

    /// Resolve a partner profile by its payout identity.
    async fn profile_by_payout_email(
        &self,
        payout_email: &str,
    ) -> crate::StoreResult<Option<Profile>>;
}
