use async_trait::async_trait;
use haven_domain::{PropertyCatalog, PropertyListing, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend;

/// Reads listings from the `properties` table kept in sync by the catalog service.
pub struct PostgresPropertyCatalog {
    pool: PgPool,
}

impl PostgresPropertyCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PropertyRow {
    id: Uuid,
    owner_id: String,
    price_per_night: i64,
    max_guests: Option<i32>,
}

#[async_trait]
impl PropertyCatalog for PostgresPropertyCatalog {
    async fn get_listing(&self, property_id: Uuid) -> Result<Option<PropertyListing>, StoreError> {
        let row: Option<PropertyRow> = sqlx::query_as(
            "SELECT id, owner_id, price_per_night, max_guests FROM properties WHERE id = $1",
        )
        .bind(property_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| PropertyListing {
            property_id: row.id,
            owner_id: row.owner_id,
            price_per_night: row.price_per_night,
            max_guests: row.max_guests.and_then(|m| u32::try_from(m).ok()),
        }))
    }
}
