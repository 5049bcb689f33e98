use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use shuttle_core::{
    EventSource, Group, InventoryStore, NewPickup, NewRestock, NewShuttleType, PickupEvent,
    RestockBatch, ShuttleType, StoreError, TenantDirectory,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct TenantLedger {
    types: Vec<ShuttleType>,
    restocks: Vec<RestockBatch>,
    pickups: Vec<PickupEvent>,
}

impl TenantLedger {
    fn has_type(&self, type_id: Uuid) -> bool {
        self.types.iter().any(|t| t.id == type_id)
    }

    fn restocked(&self, type_id: Uuid) -> i64 {
        self.restocks
            .iter()
            .filter(|r| r.type_id == type_id)
            .map(|r| r.quantity)
            .sum()
    }

    fn picked(&self, type_id: Uuid) -> i64 {
        self.pickups
            .iter()
            .filter(|p| p.type_id == type_id)
            .map(|p| p.quantity)
            .sum()
    }
}

#[derive(Default)]
struct Directory {
    groups: HashMap<Uuid, Group>,
    members: HashMap<Uuid, Uuid>,
}

/// Process-local store used by tests and by the gateway's `memory` mode.
#[derive(Default)]
pub struct InMemoryInventoryStore {
    directory: RwLock<Directory>,
    tenants: RwLock<HashMap<Uuid, TenantLedger>>,
    sequence: RwLock<i64>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_group(&self, name: &str, restock_password: Option<&str>) -> Group {
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            restock_password: restock_password.map(str::to_string),
        };

        let mut directory = self.directory.write().await;
        directory.groups.insert(group.id, group.clone());
        self.tenants.write().await.entry(group.id).or_default();

        group
    }

    pub async fn add_member(&self, user_id: Uuid, group_id: Uuid) {
        let mut directory = self.directory.write().await;
        directory.members.insert(user_id, group_id);
    }

    async fn next_sequence(&self) -> i64 {
        let mut sequence_guard = self.sequence.write().await;
        *sequence_guard += 1;
        *sequence_guard
    }
}

#[async_trait]
impl EventSource for InMemoryInventoryStore {
    async fn list_restock_batches(
        &self,
        tenant_id: Uuid,
        type_id: Option<Uuid>,
    ) -> Result<Vec<RestockBatch>, StoreError> {
        let tenants = self.tenants.read().await;
        let mut batches: Vec<RestockBatch> = tenants
            .get(&tenant_id)
            .map(|ledger| {
                ledger
                    .restocks
                    .iter()
                    .filter(|r| type_id.is_none_or(|id| r.type_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        batches.sort_by_key(RestockBatch::fifo_key);
        Ok(batches)
    }

    async fn list_pickup_events(
        &self,
        tenant_id: Uuid,
        type_id: Option<Uuid>,
    ) -> Result<Vec<PickupEvent>, StoreError> {
        let tenants = self.tenants.read().await;
        let mut pickups: Vec<PickupEvent> = tenants
            .get(&tenant_id)
            .map(|ledger| {
                ledger
                    .pickups
                    .iter()
                    .filter(|p| type_id.is_none_or(|id| p.type_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        pickups.sort_by_key(PickupEvent::fifo_key);
        Ok(pickups)
    }

    async fn list_active_type_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let batches = self.list_restock_batches(tenant_id, None).await?;
        let mut type_ids: Vec<Uuid> = Vec::new();
        for batch in batches {
            if !type_ids.contains(&batch.type_id) {
                type_ids.push(batch.type_id);
            }
        }
        Ok(type_ids)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryInventoryStore {
    async fn group_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let directory = self.directory.read().await;
        Ok(directory.members.get(&user_id).copied())
    }

    async fn group(&self, tenant_id: Uuid) -> Result<Group, StoreError> {
        let directory = self.directory.read().await;
        directory
            .groups
            .get(&tenant_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "group",
                id: tenant_id,
            })
    }

    async fn update_group(&self, group: &Group) -> Result<Group, StoreError> {
        let mut directory = self.directory.write().await;
        let existing = directory
            .groups
            .get_mut(&group.id)
            .ok_or(StoreError::NotFound {
                entity: "group",
                id: group.id,
            })?;
        *existing = group.clone();
        Ok(group.clone())
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn list_types(&self, tenant_id: Uuid) -> Result<Vec<ShuttleType>, StoreError> {
        let tenants = self.tenants.read().await;
        let mut types = tenants
            .get(&tenant_id)
            .map(|ledger| ledger.types.clone())
            .unwrap_or_default();
        types.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(types)
    }

    async fn get_type(&self, tenant_id: Uuid, type_id: Uuid) -> Result<ShuttleType, StoreError> {
        let tenants = self.tenants.read().await;
        tenants
            .get(&tenant_id)
            .and_then(|ledger| ledger.types.iter().find(|t| t.id == type_id))
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "shuttlecock type",
                id: type_id,
            })
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

        let mut tenants = self.tenants.write().await;
        tenants
            .entry(tenant_id)
            .or_default()
            .types
            .push(shuttle_type.clone());

        Ok(shuttle_type)
    }

    async fn update_type(&self, shuttle_type: &ShuttleType) -> Result<ShuttleType, StoreError> {
        let mut tenants = self.tenants.write().await;
        let existing = tenants
            .get_mut(&shuttle_type.tenant_id)
            .and_then(|ledger| ledger.types.iter_mut().find(|t| t.id == shuttle_type.id))
            .ok_or(StoreError::NotFound {
                entity: "shuttlecock type",
                id: shuttle_type.id,
            })?;

        *existing = shuttle_type.clone();
        Ok(shuttle_type.clone())
    }

    async fn record_restock(
        &self,
        tenant_id: Uuid,
        restock: NewRestock,
    ) -> Result<RestockBatch, StoreError> {
        let mut tenants = self.tenants.write().await;
        let ledger = tenants.entry(tenant_id).or_default();
        if !ledger.has_type(restock.type_id) {
            return Err(StoreError::NotFound {
                entity: "shuttlecock type",
                id: restock.type_id,
            });
        }

        let batch = RestockBatch {
            id: Uuid::new_v4(),
            sequence: self.next_sequence().await,
            type_id: restock.type_id,
            quantity: restock.quantity,
            unit_price: restock.unit_price,
            created_at: restock.created_at.unwrap_or_else(Utc::now),
        };
        ledger.restocks.push(batch.clone());

        Ok(batch)
    }

    async fn record_pickup(
        &self,
        tenant_id: Uuid,
        pickup: NewPickup,
    ) -> Result<PickupEvent, StoreError> {
        // Check and insert under one write guard so concurrent pickups of the
        // same type cannot both pass the stock check.
        let mut tenants = self.tenants.write().await;
        let ledger = tenants.entry(tenant_id).or_default();
        if !ledger.has_type(pickup.type_id) {
            return Err(StoreError::NotFound {
                entity: "shuttlecock type",
                id: pickup.type_id,
            });
        }

        let available = ledger.restocked(pickup.type_id) - ledger.picked(pickup.type_id);
        if pickup.quantity > available {
            return Err(StoreError::InsufficientStock {
                requested: pickup.quantity,
                available,
            });
        }

        let event = PickupEvent {
            id: Uuid::new_v4(),
            sequence: self.next_sequence().await,
            type_id: pickup.type_id,
            picker_name: pickup.picker_name,
            quantity: pickup.quantity,
            created_at: pickup.created_at.unwrap_or_else(Utc::now),
        };
        ledger.pickups.push(event.clone());

        Ok(event)
    }

    async fn delete_pickup(&self, tenant_id: Uuid, pickup_id: Uuid) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write().await;
        let ledger = tenants.get_mut(&tenant_id).ok_or(StoreError::NotFound {
            entity: "pickup",
            id: pickup_id,
        })?;

        let before = ledger.pickups.len();
        ledger.pickups.retain(|p| p.id != pickup_id);
        if ledger.pickups.len() == before {
            return Err(StoreError::NotFound {
                entity: "pickup",
                id: pickup_id,
            });
        }
        Ok(())
    }

    async fn delete_restock(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write().await;
        let not_found = StoreError::NotFound {
            entity: "restock batch",
            id: batch_id,
        };
        let Some(ledger) = tenants.get_mut(&tenant_id) else {
            return Err(not_found);
        };
        let Some(position) = ledger.restocks.iter().position(|r| r.id == batch_id) else {
            return Err(not_found);
        };

        let batch = &ledger.restocks[position];
        let remaining_after = ledger.restocked(batch.type_id) - batch.quantity;
        if remaining_after < ledger.picked(batch.type_id) {
            return Err(StoreError::Conflict(format!(
                "restock batch {batch_id} has already been consumed"
            )));
        }

        ledger.restocks.remove(position);
        Ok(())
    }
}
