use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use voyago_booking::models::{CouponCode, CouponTarget};
use voyago_booking::repository::CouponRepository;
use voyago_core::{StoreError, StoreResult};

pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    scope: String,
    tour_id: Option<Uuid>,
    hotel_id: Option<Uuid>,
    percent: i32,
    quantity: i32,
    available: i32,
    valid_from: NaiveDate,
    valid_until: NaiveDate,
    active: bool,
    creator: Uuid,
    created_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_coupon(self) -> StoreResult<CouponCode> {
        let target = match (self.scope.as_str(), self.tour_id, self.hotel_id) {
            ("tour", Some(id), _) => CouponTarget::Tour(id),
            ("hotel", _, Some(id)) => CouponTarget::Hotel(id),
            (other, ..) => {
                return Err(StoreError::Serialization(format!(
                    "coupon {} has inconsistent scope {other}",
                    self.code
                )))
            }
        };
        Ok(CouponCode {
            id: self.id,
            code: self.code,
            target,
            percent: self.percent,
            quantity: self.quantity,
            available: self.available,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            active: self.active,
            creator: self.creator,
            created_at: self.created_at,
        })
    }
}

fn target_columns(target: CouponTarget) -> (&'static str, Uuid) {
    match target {
        CouponTarget::Tour(id) => ("tour", id),
        CouponTarget::Hotel(id) => ("hotel", id),
    }
}

const COLUMNS: &str = "id, code, scope, tour_id, hotel_id, percent, quantity, available, \
                       valid_from, valid_until, active, creator, created_at";

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn insert(&self, coupon: &CouponCode) -> StoreResult<()> {
        let (scope, _) = target_columns(coupon.target);
        let (tour_id, hotel_id) = match coupon.target {
            CouponTarget::Tour(id) => (Some(id), None),
            CouponTarget::Hotel(id) => (None, Some(id)),
        };

        let result = sqlx::query(
            "INSERT INTO coupon_codes \
             (id, code, scope, tour_id, hotel_id, percent, quantity, available, valid_from, \
              valid_until, active, creator, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(scope)
        .bind(tour_id)
        .bind(hotel_id)
        .bind(coupon.percent)
        .bind(coupon.quantity)
        .bind(coupon.available)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.active)
        .bind(coupon.creator)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("coupon {} exists", coupon.code)));
        }
        Ok(())
    }

    async fn find(&self, code: &str) -> StoreResult<Option<CouponCode>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM coupon_codes WHERE code = $1"))
                .bind(code.to_uppercase())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::database)?;

        row.map(CouponRow::into_coupon).transpose()
    }

    async fn redeem(
        &self,
        code: &str,
        target: CouponTarget,
        today: NaiveDate,
    ) -> StoreResult<Option<CouponCode>> {
        let (scope, item_id) = target_columns(target);

        // One conditional UPDATE carries the whole guard; concurrent
        // redemptions of the last unit cannot both match.
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "UPDATE coupon_codes SET available = available - 1 \
             WHERE code = $1 AND active = TRUE AND available > 0 \
               AND valid_from <= $2 AND valid_until >= $2 \
               AND scope = $3 \
               AND (($3 = 'tour' AND tour_id = $4) OR ($3 = 'hotel' AND hotel_id = $4)) \
             RETURNING {COLUMNS}"
        ))
        .bind(code.to_uppercase())
        .bind(today)
        .bind(scope)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        row.map(CouponRow::into_coupon).transpose()
    }

    async fn close(&self, code: &str) -> StoreResult<Option<CouponCode>> {
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "UPDATE coupon_codes SET active = FALSE WHERE code = $1 RETURNING {COLUMNS}"
        ))
        .bind(code.to_uppercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        row.map(CouponRow::into_coupon).transpose()
    }

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<CouponCode>, u64)> {
        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let rows: Vec<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM coupon_codes ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon_codes")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?;

        let coupons: StoreResult<Vec<CouponCode>> =
            rows.into_iter().map(CouponRow::into_coupon).collect();
        Ok((coupons?, total.max(0) as u64))
    }

    async fn list_by_creator(
        &self,
        creator: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<(Vec<CouponCode>, u64)> {
        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let rows: Vec<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM coupon_codes WHERE creator = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(creator)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM coupon_codes WHERE creator = $1")
                .bind(creator)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::database)?;

        let coupons: StoreResult<Vec<CouponCode>> =
            rows.into_iter().map(CouponRow::into_coupon).collect();
        Ok((coupons?, total.max(0) as u64))
    }
}
