use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Closed set of resources the engine guards. Dispatch is over these
/// variants, not over string keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Booking,
    CouponCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    ReadAll,
    Update,
}

/// Whether the action targets the caller's own records or anyone's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Possession {
    Any,
    Own,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: String,
    pub resource: Resource,
    pub action: Action,
    pub possession: Possession,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Booking => "booking",
            Resource::CouponCode => "coupon_code",
        }
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::ReadAll => "read_all",
            Action::Update => "update",
        }
    }
}

impl Possession {
    pub fn as_str(&self) -> &'static str {
        match self {
            Possession::Any => "any",
            Possession::Own => "own",
        }
    }
}

/// Policy lookup seam, consulted before a booking or coupon request is
/// accepted. Evaluation internals (role hierarchies, grants management)
/// live behind this trait and are not part of the engine.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn allows(
        &self,
        role: &str,
        resource: Resource,
        action: Action,
        possession: Possession,
    ) -> crate::StoreResult<bool>;
}
