use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use voyago_catalog::{Flight, Hotel, InventoryGateway, Room, Tour};
use voyago_core::{StoreError, StoreResult};

pub struct PgInventoryGateway {
    pool: PgPool,
}

impl PgInventoryGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TourRow {
    id: Uuid,
    name: String,
    owner: Uuid,
    price_cents: i64,
    capacity: i32,
    available: i32,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    hotel_id: Uuid,
    name: String,
    price_cents: i64,
    beds: i32,
}

#[derive(sqlx::FromRow)]
struct HotelRow {
    id: Uuid,
    name: String,
    owner: Uuid,
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    name: String,
    price_cents: i64,
}

#[async_trait]
impl InventoryGateway for PgInventoryGateway {
    async fn tour(&self, id: Uuid) -> StoreResult<Option<Tour>> {
        let row: Option<TourRow> = sqlx::query_as(
            "SELECT id, name, owner, price_cents, capacity, available FROM tours WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(row.map(|r| Tour {
            id: r.id,
            name: r.name,
            owner: r.owner,
            price_cents: r.price_cents,
            capacity: r.capacity,
            available: r.available,
        }))
    }

    async fn room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(
            "SELECT id, hotel_id, name, price_cents, beds FROM rooms WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(row.map(|r| Room {
            id: r.id,
            hotel_id: r.hotel_id,
            name: r.name,
            price_cents: r.price_cents,
            beds: r.beds,
        }))
    }

    async fn hotel(&self, id: Uuid) -> StoreResult<Option<Hotel>> {
        let row: Option<HotelRow> =
            sqlx::query_as("SELECT id, name, owner FROM hotels WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::database)?;

        Ok(row.map(|r| Hotel { id: r.id, name: r.name, owner: r.owner }))
    }

    async fn flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        let row: Option<FlightRow> =
            sqlx::query_as("SELECT id, name, price_cents FROM flights WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::database)?;

        Ok(row.map(|r| Flight { id: r.id, name: r.name, price_cents: r.price_cents }))
    }

    async fn reserve_tour_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<bool> {
        // The availability guard and the decrement are one statement; no
        // read-then-write window exists.
        let result = sqlx::query(
            "UPDATE tours SET available = available - $2 WHERE id = $1 AND available >= $2",
        )
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn restore_tour_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
        let result = sqlx::query("UPDATE tours SET available = available + $2 WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("tour {id}")));
        }
        Ok(())
    }
}
