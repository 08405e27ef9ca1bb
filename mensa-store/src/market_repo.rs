use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use mensa_core::repository::{
    ClaimRepository, ListingRepository, RepoError, RepoResult, SlotRepository,
    SyncCursorRepository,
};
use mensa_domain::{Claim, ClaimStatus, Listing, ListingStatus, Slot, SyncCursor, SyncOutcome};

/// SQLite-backed persistence gateway. Every state transition is a
/// WHERE-guarded UPDATE; `rows_affected` decides the winner of a race.
/// Timestamps are stored as unix seconds, dates as ISO strings.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| RepoError::from("timestamp out of range"))
}

fn row_to_slot(row: &SqliteRow) -> RepoResult<Slot> {
    Ok(Slot {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        provider_id: row.try_get("provider_id")?,
        date: NaiveDate::parse_from_str(&row.try_get::<String, _>("date")?, "%Y-%m-%d")?,
        sitting: row.try_get("sitting")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        available: row.try_get::<i64, _>("available")? != 0,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_ts(row.try_get("updated_at")?)?,
    })
}

fn row_to_listing(row: &SqliteRow) -> RepoResult<Listing> {
    Ok(Listing {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        slot_id: Uuid::parse_str(&row.try_get::<String, _>("slot_id")?)?,
        seller_id: row.try_get("seller_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        price: row.try_get("price")?,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_ts(row.try_get("updated_at")?)?,
        sold_at: row
            .try_get::<Option<i64>, _>("sold_at")?
            .map(from_ts)
            .transpose()?,
    })
}

fn row_to_claim(row: &SqliteRow) -> RepoResult<Claim> {
    Ok(Claim {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        listing_id: Uuid::parse_str(&row.try_get::<String, _>("listing_id")?)?,
        buyer_id: row.try_get("buyer_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: from_ts(row.try_get("created_at")?)?,
        deadline: from_ts(row.try_get("deadline")?)?,
    })
}

#[async_trait]
impl SlotRepository for SqliteStore {
    async fn insert_slot(&self, slot: &Slot) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO slots (id, provider_id, date, sitting, description, price, available, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(slot.id.to_string())
        .bind(&slot.provider_id)
        .bind(slot.date.format("%Y-%m-%d").to_string())
        .bind(&slot.sitting)
        .bind(&slot.description)
        .bind(slot.price)
        .bind(slot.available as i64)
        .bind(ts(slot.created_at))
        .bind(ts(slot.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn slot(&self, id: Uuid) -> RepoResult<Option<Slot>> {
        let row = sqlx::query("SELECT * FROM slots WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_slot).transpose()
    }

    async fn slot_by_provider_id(&self, provider_id: &str) -> RepoResult<Option<Slot>> {
        let row = sqlx::query("SELECT * FROM slots WHERE provider_id = ?1")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_slot).transpose()
    }

    async fn all_slots(&self) -> RepoResult<Vec<Slot>> {
        let rows = sqlx::query("SELECT * FROM slots ORDER BY date, provider_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_slot).collect()
    }

    async fn set_slot_availability(&self, id: Uuid, available: bool) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE slots SET available = ?2, updated_at = ?3 WHERE id = ?1 AND available <> ?2",
        )
        .bind(id.to_string())
        .bind(available as i64)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ListingRepository for SqliteStore {
    async fn insert_listing(&self, listing: &Listing) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO listings (id, slot_id, seller_id, status, price, created_at, updated_at, sold_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(listing.id.to_string())
        .bind(listing.slot_id.to_string())
        .bind(&listing.seller_id)
        .bind(listing.status.as_str())
        .bind(listing.price)
        .bind(ts(listing.created_at))
        .bind(ts(listing.updated_at))
        .bind(listing.sold_at.map(ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn listing(&self, id: Uuid) -> RepoResult<Option<Listing>> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_listing).transpose()
    }

    async fn listings_by_seller(&self, seller_id: &str) -> RepoResult<Vec<Listing>> {
        let rows =
            sqlx::query("SELECT * FROM listings WHERE seller_id = ?1 ORDER BY created_at DESC")
                .bind(seller_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn open_listings(&self) -> RepoResult<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings WHERE status = ?1 ORDER BY created_at")
            .bind(ListingStatus::Open.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn active_listings_for_slot(&self, slot_id: Uuid) -> RepoResult<Vec<Listing>> {
        let rows =
            sqlx::query("SELECT * FROM listings WHERE slot_id = ?1 AND status IN (?2, ?3)")
                .bind(slot_id.to_string())
                .bind(ListingStatus::Open.as_str())
                .bind(ListingStatus::Claimed.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn transition_listing(
        &self,
        id: Uuid,
        expected: ListingStatus,
        next: ListingStatus,
    ) -> RepoResult<bool> {
        let now = ts(Utc::now());
        let result = if next == ListingStatus::Sold {
            sqlx::query(
                "UPDATE listings SET status = ?2, updated_at = ?3, sold_at = ?3
                 WHERE id = ?1 AND status = ?4",
            )
            .bind(id.to_string())
            .bind(next.as_str())
            .bind(now)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE listings SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = ?4",
            )
            .bind(id.to_string())
            .bind(next.as_str())
            .bind(now)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ClaimRepository for SqliteStore {
    async fn claim_listing(&self, claim: &Claim) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        let guarded = sqlx::query(
            "UPDATE listings SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
        )
        .bind(claim.listing_id.to_string())
        .bind(ListingStatus::Claimed.as_str())
        .bind(ts(Utc::now()))
        .bind(ListingStatus::Open.as_str())
        .execute(&mut *tx)
        .await?;

        if guarded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO claims (id, listing_id, buyer_id, status, created_at, deadline)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(claim.id.to_string())
        .bind(claim.listing_id.to_string())
        .bind(&claim.buyer_id)
        .bind(claim.status.as_str())
        .bind(ts(claim.created_at))
        .bind(ts(claim.deadline))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn claim(&self, id: Uuid) -> RepoResult<Option<Claim>> {
        let row = sqlx::query("SELECT * FROM claims WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn pending_claim_for_listing(&self, listing_id: Uuid) -> RepoResult<Option<Claim>> {
        let row = sqlx::query(
            "SELECT * FROM claims WHERE listing_id = ?1 AND status = ?2 LIMIT 1",
        )
        .bind(listing_id.to_string())
        .bind(ClaimStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn expired_pending_claims(&self, now: DateTime<Utc>) -> RepoResult<Vec<Claim>> {
        let rows = sqlx::query(
            "SELECT * FROM claims WHERE status = ?1 AND deadline <= ?2 ORDER BY deadline",
        )
        .bind(ClaimStatus::Pending.as_str())
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_claim).collect()
    }

    async fn transition_claim(
        &self,
        id: Uuid,
        expected: ClaimStatus,
        next: ClaimStatus,
    ) -> RepoResult<bool> {
        let result =
            sqlx::query("UPDATE claims SET status = ?2 WHERE id = ?1 AND status = ?3")
                .bind(id.to_string())
                .bind(next.as_str())
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SyncCursorRepository for SqliteStore {
    async fn record_sync(&self, cursor: &SyncCursor) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO sync_cursor (id, finished_at, slot_count, outcome, detail)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 finished_at = excluded.finished_at,
                 slot_count = excluded.slot_count,
                 outcome = excluded.outcome,
                 detail = excluded.detail",
        )
        .bind(ts(cursor.finished_at))
        .bind(cursor.slot_count as i64)
        .bind(cursor.outcome.as_str())
        .bind(&cursor.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_sync(&self) -> RepoResult<Option<SyncCursor>> {
        let row = sqlx::query("SELECT * FROM sync_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> RepoResult<SyncCursor> {
            Ok(SyncCursor {
                finished_at: from_ts(row.try_get("finished_at")?)?,
                slot_count: row.try_get::<i64, _>("slot_count")? as u32,
                outcome: row.try_get::<String, _>("outcome")?.parse::<SyncOutcome>()?,
                detail: row.try_get("detail")?,
            })
        })
        .transpose()
    }
}
