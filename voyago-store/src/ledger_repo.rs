use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use voyago_booking::models::{LedgerEntry, LedgerKind};
use voyago_booking::repository::LedgerRepository;
use voyago_core::{StoreError, StoreResult};
use voyago_shared::pii::Masked;

pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    sender_email: String,
    receiver_email: String,
    kind: String,
    amount_cents: i64,
    payment_session_id: String,
    created_at: DateTime<Utc>,
}

fn kind_str(kind: LedgerKind) -> &'static str {
    match kind {
        LedgerKind::Sale => "SALE",
        LedgerKind::Payout => "PAYOUT",
        LedgerKind::Refund => "REFUND",
    }
}

impl LedgerRow {
    fn into_entry(self) -> StoreResult<LedgerEntry> {
        let kind = match self.kind.as_str() {
            "SALE" => LedgerKind::Sale,
            "PAYOUT" => LedgerKind::Payout,
            "REFUND" => LedgerKind::Refund,
            other => {
                return Err(StoreError::Serialization(format!("unknown ledger kind {other}")))
            }
        };
        Ok(LedgerEntry {
            id: self.id,
            sender_email: Masked(self.sender_email),
            receiver_email: Masked(self.receiver_email),
            kind,
            amount_cents: self.amount_cents,
            payment_session_id: self.payment_session_id,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn append(&self, entry: &LedgerEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO payments \
             (id, sender_email, receiver_email, kind, amount_cents, payment_session_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.sender_email.inner())
        .bind(entry.receiver_email.inner())
        .bind(kind_str(entry.kind))
        .bind(entry.amount_cents)
        .bind(&entry.payment_session_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn entries_for_session(&self, session_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT id, sender_email, receiver_email, kind, amount_cents, payment_session_id, \
             created_at FROM payments WHERE payment_session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }
}
