pub mod gateway;
pub mod items;

pub use gateway::InventoryGateway;
pub use items::{Flight, Hotel, Room, Tour};
