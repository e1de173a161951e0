use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use haven_domain::{Booking, BookingStatus, BookingStore, DateRange, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{backend, is_unique_violation};

pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    property_id: Uuid,
    owner_id: String,
    traveler_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    guests: i32,
    price_per_night: i64,
    total_price: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown status {}", row.status)))?;
        let guests = u32::try_from(row.guests)
            .map_err(|_| StoreError::Backend(format!("negative guest count on {}", row.id)))?;

        Ok(Booking {
            id: row.id,
            property_id: row.property_id,
            owner_id: row.owner_id,
            traveler_id: row.traveler_id,
            date_range: DateRange { start: row.start_date, end: row.end_date },
            guests,
            price_per_night: row.price_per_night,
            total_price: row.total_price,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, StoreError> {
    rows.into_iter().map(Booking::try_from).collect()
}

const SELECT_BOOKING: &str = "SELECT id, property_id, owner_id, traveler_id, start_date, end_date, guests, \
     price_per_night, total_price, status, created_at, updated_at FROM bookings";

const INSERT_BOOKING: &str = r#"
    INSERT INTO bookings (id, property_id, owner_id, traveler_id, start_date, end_date, guests, price_per_night, total_price, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
"#;

async fn insert_row<'e, E>(executor: E, booking: &Booking) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let guests = i32::try_from(booking.guests)
        .map_err(|_| StoreError::Backend(format!("guest count out of range on {}", booking.id)))?;

    sqlx::query(INSERT_BOOKING)
        .bind(booking.id)
        .bind(booking.property_id)
        .bind(&booking.owner_id)
        .bind(&booking.traveler_id)
        .bind(booking.date_range.start)
        .bind(booking.date_range.end)
        .bind(guests)
        .bind(booking.price_per_night)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(executor)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateKey(booking.id)
            } else {
                backend(e)
            }
        })?;

    Ok(())
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn insert_if_available(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Serializes check-and-insert per property until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(booking.property_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        // Half-open ranges: [start, end)
        let conflict: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM bookings
            WHERE property_id = $1
              AND status IN ('PENDING', 'ACCEPTED')
              AND start_date < $3
              AND $2 < end_date
            LIMIT 1
            "#,
        )
        .bind(booking.property_id)
        .bind(booking.date_range.start)
        .bind(booking.date_range.end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        if let Some((conflicting_id,)) = conflict {
            return Err(StoreError::AvailabilityConflict { conflicting_id });
        }

        insert_row(&mut *tx, booking).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        insert_row(&self.pool, booking).await
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_BOOKING))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_active_by_property(&self, property_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "{} WHERE property_id = $1 AND status IN ('PENDING', 'ACCEPTED') ORDER BY start_date",
            SELECT_BOOKING
        ))
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_bookings(rows)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = GREATEST(updated_at, $4)
            WHERE id = $1 AND status = $2
            RETURNING id, property_id, owner_id, traveler_id, start_date, end_date, guests,
                      price_per_night, total_price, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Booking::try_from(row),
            None => match self.get(id).await? {
                Some(current) => Err(StoreError::StatusMismatch {
                    id,
                    expected,
                    actual: current.status,
                }),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "{} WHERE owner_id = $1 ORDER BY created_at DESC",
            SELECT_BOOKING
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_bookings(rows)
    }

    async fn list_by_traveler(&self, traveler_id: &str) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "{} WHERE traveler_id = $1 ORDER BY created_at DESC",
            SELECT_BOOKING
        ))
        .bind(traveler_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_bookings(rows)
    }

    async fn list_due_for_completion(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'ACCEPTED' AND end_date <= $1 ORDER BY end_date",
            SELECT_BOOKING
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_bookings(rows)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
