use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Group, NewPickup, NewRestock, NewShuttleType, PickupEvent, RestockBatch, ShuttleType,
};

/// Read side consumed by the costing engine.
///
/// Both listings are ordered by `created_at` ascending, ties broken by
/// insertion sequence.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_restock_batches(
        &self,
        tenant_id: Uuid,
        type_id: Option<Uuid>,
    ) -> Result<Vec<RestockBatch>, StoreError>;

    async fn list_pickup_events(
        &self,
        tenant_id: Uuid,
        type_id: Option<Uuid>,
    ) -> Result<Vec<PickupEvent>, StoreError>;

    /// Types referenced by at least one restock, in order of first restock.
    async fn list_active_type_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn group_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError>;
    async fn group(&self, tenant_id: Uuid) -> Result<Group, StoreError>;
    async fn update_group(&self, group: &Group) -> Result<Group, StoreError>;
}

#[async_trait]
pub trait InventoryStore: EventSource + TenantDirectory {
    async fn list_types(&self, tenant_id: Uuid) -> Result<Vec<ShuttleType>, StoreError>;
    async fn get_type(&self, tenant_id: Uuid, type_id: Uuid) -> Result<ShuttleType, StoreError>;
    async fn create_type(
        &self,
        tenant_id: Uuid,
        new_type: NewShuttleType,
    ) -> Result<ShuttleType, StoreError>;
    async fn update_type(&self, shuttle_type: &ShuttleType) -> Result<ShuttleType, StoreError>;

    async fn record_restock(
        &self,
        tenant_id: Uuid,
        restock: NewRestock,
    ) -> Result<RestockBatch, StoreError>;

    /// Inserts the pickup only if the type still has `quantity` units in
    /// stock, checked atomically with the insert. Fails with
    /// [`StoreError::InsufficientStock`] otherwise.
    async fn record_pickup(
        &self,
        tenant_id: Uuid,
        pickup: NewPickup,
    ) -> Result<PickupEvent, StoreError>;

    async fn delete_pickup(&self, tenant_id: Uuid, pickup_id: Uuid) -> Result<(), StoreError>;

    /// Refuses with [`StoreError::Conflict`] when removing the batch would
    /// leave the type with more picked than restocked.
    async fn delete_restock(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<(), StoreError>;
}
