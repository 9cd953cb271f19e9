use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use voyago_booking::models::{Booking, BookingItem, CustomerContact, ItemRef};
use voyago_booking::repository::BookingRepository;
use voyago_core::{StoreError, StoreResult};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    buyer: Uuid,
    total_cents: i64,
    captured: bool,
    hold_active: bool,
    payment_session_id: String,
    payer_token: String,
    redirect_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    item_type: String,
    tour_id: Option<Uuid>,
    room_id: Option<Uuid>,
    flight_id: Option<Uuid>,
    price_cents: i64,
    quantity: i32,
    coupon_code: Option<String>,
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
    customers: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> StoreResult<BookingItem> {
        let item = match (self.item_type.as_str(), self.tour_id, self.room_id, self.flight_id) {
            ("tour", Some(id), _, _) => ItemRef::Tour(id),
            ("room", _, Some(id), _) => ItemRef::Room(id),
            ("flight", _, _, Some(id)) => ItemRef::Flight(id),
            (other, ..) => {
                return Err(StoreError::Serialization(format!(
                    "booking item {} has inconsistent type {other}",
                    self.id
                )))
            }
        };
        let customers: Vec<CustomerContact> = serde_json::from_value(self.customers)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(BookingItem {
            id: self.id,
            item,
            price_cents: self.price_cents,
            quantity: self.quantity,
            coupon_code: self.coupon_code,
            date_start: self.date_start,
            date_end: self.date_end,
            customers,
            created_at: self.created_at,
        })
    }
}

fn item_columns(item: &BookingItem) -> (&'static str, Option<Uuid>, Option<Uuid>, Option<Uuid>) {
    match item.item {
        ItemRef::Tour(id) => ("tour", Some(id), None, None),
        ItemRef::Room(id) => ("room", None, Some(id), None),
        ItemRef::Flight(id) => ("flight", None, None, Some(id)),
    }
}

const ITEM_COLUMNS: &str = "id, item_type, tour_id, room_id, flight_id, price_cents, quantity, \
                            coupon_code, date_start, date_end, customers, created_at";

const BOOKING_COLUMNS: &str = "id, buyer, total_cents, captured, hold_active, payment_session_id, \
                               payer_token, redirect_url, created_at, updated_at";

/// Rows with no booking yet are mid-orchestration and count as holds;
/// rows whose booking is captured or still holding count as well.
const LIVE_HOLD_FILTER: &str = "(bi.booking_id IS NULL OR b.captured OR b.hold_active)";

impl PgBookingRepository {
    async fn load_items(&self, booking_id: Uuid) -> StoreResult<Vec<BookingItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM booking_items WHERE booking_id = $1 ORDER BY created_at"
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    async fn hydrate(&self, row: BookingRow) -> StoreResult<Booking> {
        let items = self.load_items(row.id).await?;
        Ok(Booking {
            id: row.id,
            items,
            buyer: row.buyer,
            total_cents: row.total_cents,
            captured: row.captured,
            hold_active: row.hold_active,
            payment_session_id: row.payment_session_id,
            payer_token: row.payer_token,
            redirect_url: row.redirect_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn hydrate_page(
        &self,
        rows: Vec<BookingRow>,
        total: i64,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            bookings.push(self.hydrate(row).await?);
        }
        Ok((bookings, total.max(0) as u64))
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_item(&self, item: &BookingItem) -> StoreResult<()> {
        let (item_type, tour_id, room_id, flight_id) = item_columns(item);
        let customers = serde_json::to_value(&item.customers)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(StoreError::database)?;

        // Per-room serialization: the advisory lock forces overlapping
        // carts into a queue, and the overlap recheck runs inside it.
        if let ItemRef::Room(room_id) = item.item {
            let (start, end) = match (item.date_start, item.date_end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(StoreError::Serialization(
                        "room item missing stay dates".to_string(),
                    ))
                }
            };

            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
                .bind(room_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(StoreError::database)?;

            let taken: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS( \
                   SELECT 1 FROM booking_items bi \
                   LEFT JOIN bookings b ON b.id = bi.booking_id \
                   WHERE bi.room_id = $1 AND {LIVE_HOLD_FILTER} \
                     AND bi.date_start <= $3 AND bi.date_end >= $2)"
            ))
            .bind(room_id)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::database)?;

            if taken {
                return Err(StoreError::Conflict(format!("room {room_id} already held")));
            }
        }

        sqlx::query(
            "INSERT INTO booking_items \
             (id, item_type, tour_id, room_id, flight_id, price_cents, quantity, coupon_code, \
              date_start, date_end, customers, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(item.id)
        .bind(item_type)
        .bind(tour_id)
        .bind(room_id)
        .bind(flight_id)
        .bind(item.price_cents)
        .bind(item.quantity)
        .bind(&item.coupon_code)
        .bind(item.date_start)
        .bind(item.date_end)
        .bind(customers)
        .bind(item.created_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database)?;

        tx.commit().await.map_err(StoreError::database)?;
        Ok(())
    }

    async fn delete_item(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM booking_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::database)?;

        sqlx::query(
            "INSERT INTO bookings \
             (id, buyer, total_cents, captured, hold_active, payment_session_id, payer_token, \
              redirect_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(booking.id)
        .bind(booking.buyer)
        .bind(booking.total_cents)
        .bind(booking.captured)
        .bind(booking.hold_active)
        .bind(&booking.payment_session_id)
        .bind(&booking.payer_token)
        .bind(&booking.redirect_url)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database)?;

        let item_ids: Vec<Uuid> = booking.items.iter().map(|i| i.id).collect();
        sqlx::query("UPDATE booking_items SET booking_id = $1 WHERE id = ANY($2)")
            .bind(booking.id)
            .bind(&item_ids)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::database)?;

        tx.commit().await.map_err(StoreError::database)?;
        Ok(())
    }

    async fn booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::database)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_pending_by_session(&self, session_id: &str) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE payment_session_id = $1 AND captured = FALSE"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn mark_captured(&self, id: Uuid) -> StoreResult<bool> {
        // Guarded flip: losing the race leaves zero rows affected.
        let result = sqlx::query(
            "UPDATE bookings SET captured = TRUE, hold_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND captured = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_hold(&self, payer_token: &str) -> StoreResult<Option<Booking>> {
        let released: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE bookings SET hold_active = FALSE, updated_at = NOW() \
             WHERE payer_token = $1 AND hold_active = TRUE \
             RETURNING id",
        )
        .bind(payer_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        match released {
            Some((id,)) => self.booking(id).await,
            None => Ok(None),
        }
    }

    async fn flight_is_held(&self, flight_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar(&format!(
            "SELECT EXISTS( \
               SELECT 1 FROM booking_items bi \
               LEFT JOIN bookings b ON b.id = bi.booking_id \
               WHERE bi.flight_id = $1 AND {LIVE_HOLD_FILTER})"
        ))
        .bind(flight_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::database)
    }

    async fn room_hold_overlaps(
        &self,
        room_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<bool> {
        sqlx::query_scalar(&format!(
            "SELECT EXISTS( \
               SELECT 1 FROM booking_items bi \
               LEFT JOIN bookings b ON b.id = bi.booking_id \
               WHERE bi.room_id = $1 AND {LIVE_HOLD_FILTER} \
                 AND bi.date_start <= $3 AND bi.date_end >= $2)"
        ))
        .bind(room_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::database)
    }

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<Booking>, u64)> {
        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?;

        self.hydrate_page(rows, total).await
    }

    async fn list_by_buyer(
        &self,
        buyer: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE buyer = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(buyer)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE buyer = $1")
            .bind(buyer)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?;

        self.hydrate_page(rows, total).await
    }

    async fn list_by_partner(
        &self,
        partner: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let filter = "EXISTS( \
             SELECT 1 FROM booking_items bi \
             LEFT JOIN tours t ON t.id = bi.tour_id \
             LEFT JOIN rooms r ON r.id = bi.room_id \
             LEFT JOIN hotels h ON h.id = r.hotel_id \
             WHERE bi.booking_id = bookings.id AND (t.owner = $1 OR h.owner = $1))";

        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE {filter} \
             ORDER BY updated_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(partner)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM bookings WHERE {filter}"))
                .bind(partner)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::database)?;

        self.hydrate_page(rows, total).await
    }
}
