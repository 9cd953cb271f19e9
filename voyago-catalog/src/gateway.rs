use async_trait::async_trait;
use uuid::Uuid;
use voyago_core::StoreResult;

use crate::items::{Flight, Hotel, Room, Tour};

/// Access to the inventory subsystem: lookups plus the two capacity
/// mutations the booking engine is allowed to make.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    async fn tour(&self, id: Uuid) -> StoreResult<Option<Tour>>;
    async fn room(&self, id: Uuid) -> StoreResult<Option<Room>>;
    async fn hotel(&self, id: Uuid) -> StoreResult<Option<Hotel>>;
    async fn flight(&self, id: Uuid) -> StoreResult<Option<Flight>>;

    /// Guarded decrement: succeeds iff `available >= quantity` held at the
    /// moment of the update. The check and the write are one atomic
    /// conditional update, never a read-then-write pair.
    ///
    /// Returns `false` when the guard fails (capacity gone).
    async fn reserve_tour_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<bool>;

    /// Reverse of `reserve_tour_capacity`; used by cancellation and by
    /// orchestration compensations.
    async fn restore_tour_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<()>;
}
