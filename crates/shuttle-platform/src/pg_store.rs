use async_trait::async_trait;
use chrono::Utc;
use shuttle_core::{
    EventSource, Group, InventoryStore, NewPickup, NewRestock, NewShuttleType, Owner, PickupEvent,
    RestockBatch, ShuttleType, StoreError, TenantDirectory,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::error;
use uuid::Uuid;

/// [`InventoryStore`] backed by the tables in `schema.sql`.
#[derive(Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Malformed(err.to_string()),
        other => {
            error!("postgres error: {other}");
            StoreError::Unavailable(other.to_string())
        }
    }
}

fn type_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "shuttlecock type",
        id,
    }
}

fn restock_from_row(row: &PgRow) -> Result<RestockBatch, sqlx::Error> {
    Ok(RestockBatch {
        id: row.try_get("id")?,
        sequence: row.try_get("seq")?,
        type_id: row.try_get("shuttlecock_type_id")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        created_at: row.try_get("created_at")?,
    })
}

fn pickup_from_row(row: &PgRow) -> Result<PickupEvent, sqlx::Error> {
    Ok(PickupEvent {
        id: row.try_get("id")?,
        sequence: row.try_get("seq")?,
        type_id: row.try_get("shuttlecock_type_id")?,
        picker_name: row.try_get("picker_name")?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn type_from_row(row: &PgRow) -> Result<ShuttleType, sqlx::Error> {
    Ok(ShuttleType {
        id: row.try_get("id")?,
        tenant_id: row.try_get("group_id")?,
        brand: row.try_get("brand")?,
        name: row.try_get("name")?,
        owner: Owner::from_column(row.try_get::<Option<Uuid>, _>("owner_id")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Locks the type row for the rest of the transaction so stock checks and
/// the writes that depend on them see a stable total.
async fn lock_type(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    type_id: Uuid,
) -> Result<(), StoreError> {
    sqlx::query("SELECT id FROM shuttlecock_types WHERE id = $1 AND group_id = $2 FOR UPDATE")
        .bind(type_id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_error)?
        .ok_or_else(|| type_not_found(type_id))?;

    Ok(())
}

/// `(restocked, picked)` for one type, read inside `tx`.
async fn stock_totals(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    type_id: Uuid,
) -> Result<(i64, i64), StoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM restock_records
              WHERE group_id = $1 AND shuttlecock_type_id = $2) AS restocked,
            (SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM pickup_records
              WHERE group_id = $1 AND shuttlecock_type_id = $2) AS picked
        "#,
    )
    .bind(tenant_id)
    .bind(type_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(store_error)?;

    Ok((
        row.try_get("restocked").map_err(store_error)?,
        row.try_get("picked").map_err(store_error)?,
    ))
}

#[async_trait]
impl EventSource for PgInventoryStore {
    async fn list_restock_batches(
        &self,
        tenant_id: Uuid,
        type_id: Option<Uuid>,
    ) -> Result<Vec<RestockBatch>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, seq, shuttlecock_type_id, quantity, unit_price, created_at
            FROM restock_records
            WHERE group_id = $1
              AND ($2::uuid IS NULL OR shuttlecock_type_id = $2)
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(tenant_id)
        .bind(type_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(restock_from_row)
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }

    async fn list_pickup_events(
        &self,
        tenant_id: Uuid,
        type_id: Option<Uuid>,
    ) -> Result<Vec<PickupEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, seq, shuttlecock_type_id, picker_name, quantity, created_at
            FROM pickup_records
            WHERE group_id = $1
              AND ($2::uuid IS NULL OR shuttlecock_type_id = $2)
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(tenant_id)
        .bind(type_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(pickup_from_row)
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }

    async fn list_active_type_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT shuttlecock_type_id
            FROM (
                SELECT DISTINCT ON (shuttlecock_type_id) shuttlecock_type_id, created_at, seq
                FROM restock_records
                WHERE group_id = $1
                ORDER BY shuttlecock_type_id, created_at ASC, seq ASC
            ) first_restocks
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("shuttlecock_type_id"))
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }
}

#[async_trait]
impl TenantDirectory for PgInventoryStore {
    async fn group_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("SELECT group_id FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(row) => row
                .try_get::<Option<Uuid>, _>("group_id")
                .map_err(store_error),
            None => Ok(None),
        }
    }

    async fn group(&self, tenant_id: Uuid) -> Result<Group, StoreError> {
        let row = sqlx::query("SELECT id, name, restock_password FROM groups WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or(StoreError::NotFound {
                entity: "group",
                id: tenant_id,
            })?;

        Ok(Group {
            id: row.try_get("id").map_err(store_error)?,
            name: row.try_get("name").map_err(store_error)?,
            restock_password: row.try_get("restock_password").map_err(store_error)?,
        })
    }

    async fn update_group(&self, group: &Group) -> Result<Group, StoreError> {
        let result = sqlx::query("UPDATE groups SET name = $2, restock_password = $3 WHERE id = $1")
            .bind(group.id)
            .bind(&group.name)
            .bind(group.restock_password.as_deref())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "group",
                id: group.id,
            });
        }
        Ok(group.clone())
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn list_types(&self, tenant_id: Uuid) -> Result<Vec<ShuttleType>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, brand, name, owner_id, is_active, created_at
            FROM shuttlecock_types
            WHERE group_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(type_from_row)
            .collect::<Result<_, _>>()
            .map_err(store_error)
    }

    async fn get_type(&self, tenant_id: Uuid, type_id: Uuid) -> Result<ShuttleType, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, brand, name, owner_id, is_active, created_at
            FROM shuttlecock_types
            WHERE id = $1 AND group_id = $2
            "#,
        )
        .bind(type_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| type_not_found(type_id))?;

        type_from_row(&row).map_err(store_error)
    }

    async fn create_type(
        &self,
        tenant_id: Uuid,
        new_type: NewShuttleType,
    ) -> Result<ShuttleType, StoreError> {
        let shuttle_type = ShuttleType {
            id: Uuid::new_v4(),
            tenant_id,
            brand: new_type.brand,
            name: new_type.name,
            owner: new_type.owner,
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO shuttlecock_types (id, group_id, brand, name, owner_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(shuttle_type.id)
        .bind(tenant_id)
        .bind(&shuttle_type.brand)
        .bind(&shuttle_type.name)
        .bind(shuttle_type.owner.as_column())
        .bind(shuttle_type.is_active)
        .bind(shuttle_type.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(shuttle_type)
    }

    async fn update_type(&self, shuttle_type: &ShuttleType) -> Result<ShuttleType, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE shuttlecock_types
            SET brand = $3, name = $4, owner_id = $5, is_active = $6
            WHERE id = $1 AND group_id = $2
            "#,
        )
        .bind(shuttle_type.id)
        .bind(shuttle_type.tenant_id)
        .bind(&shuttle_type.brand)
        .bind(&shuttle_type.name)
        .bind(shuttle_type.owner.as_column())
        .bind(shuttle_type.is_active)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(type_not_found(shuttle_type.id));
        }
        Ok(shuttle_type.clone())
    }

    async fn record_restock(
        &self,
        tenant_id: Uuid,
        restock: NewRestock,
    ) -> Result<RestockBatch, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        lock_type(&mut tx, tenant_id, restock.type_id).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO restock_records (id, group_id, shuttlecock_type_id, quantity, unit_price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, seq, shuttlecock_type_id, quantity, unit_price, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(restock.type_id)
        .bind(restock.quantity)
        .bind(restock.unit_price)
        .bind(restock.created_at.unwrap_or_else(Utc::now))
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;
        let batch = restock_from_row(&row).map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(batch)
    }

    async fn record_pickup(
        &self,
        tenant_id: Uuid,
        pickup: NewPickup,
    ) -> Result<PickupEvent, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        lock_type(&mut tx, tenant_id, pickup.type_id).await?;

        let (restocked, picked) = stock_totals(&mut tx, tenant_id, pickup.type_id).await?;
        let available = restocked - picked;
        if pickup.quantity > available {
            return Err(StoreError::InsufficientStock {
                requested: pickup.quantity,
                available,
            });
        }

        let row = sqlx::query(
            r#"
            INSERT INTO pickup_records (id, group_id, shuttlecock_type_id, picker_name, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, seq, shuttlecock_type_id, picker_name, quantity, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(pickup.type_id)
        .bind(&pickup.picker_name)
        .bind(pickup.quantity)
        .bind(pickup.created_at.unwrap_or_else(Utc::now))
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;
        let event = pickup_from_row(&row).map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(event)
    }

    async fn delete_pickup(&self, tenant_id: Uuid, pickup_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM pickup_records WHERE id = $1 AND group_id = $2")
            .bind(pickup_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "pickup",
                id: pickup_id,
            });
        }
        Ok(())
    }

    async fn delete_restock(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let row = sqlx::query(
            "SELECT shuttlecock_type_id, quantity FROM restock_records WHERE id = $1 AND group_id = $2",
        )
        .bind(batch_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?
        .ok_or(StoreError::NotFound {
            entity: "restock batch",
            id: batch_id,
        })?;
        let type_id: Uuid = row.try_get("shuttlecock_type_id").map_err(store_error)?;
        let quantity: i64 = row.try_get("quantity").map_err(store_error)?;

        lock_type(&mut tx, tenant_id, type_id).await?;
        let (restocked, picked) = stock_totals(&mut tx, tenant_id, type_id).await?;
        if restocked - quantity < picked {
            return Err(StoreError::Conflict(format!(
                "restock batch {batch_id} has already been consumed"
            )));
        }

        sqlx::query("DELETE FROM restock_records WHERE id = $1 AND group_id = $2")
            .bind(batch_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}
