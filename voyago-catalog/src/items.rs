use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counted-capacity inventory: a departure with `available` seats left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub price_cents: i64,
    pub capacity: i32,
    pub available: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
}

/// Date-range-exclusive inventory: one stay at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub beds: i32,
}

/// Single-use inventory: one booking consumes the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
}
