use serde::Serialize;
use shuttle_core::{EventSource, PickupEvent, RestockBatch, StoreError};
use uuid::Uuid;

/// Plain restocked-minus-picked count for one type.
///
/// Not FIFO aware; this is what gates new pickups and what the overview
/// screen shows.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StockSummary {
    pub type_id: Uuid,
    pub total_restocked: i64,
    pub total_picked: i64,
    pub current_stock: i64,
}

impl StockSummary {
    pub fn project(type_id: Uuid, batches: &[RestockBatch], pickups: &[PickupEvent]) -> Self {
        let total_restocked = batches
            .iter()
            .filter(|b| b.type_id == type_id)
            .map(|b| b.quantity)
            .sum();
        let total_picked = pickups
            .iter()
            .filter(|p| p.type_id == type_id)
            .map(|p| p.quantity)
            .sum();

        Self {
            type_id,
            total_restocked,
            total_picked,
            current_stock: total_restocked - total_picked,
        }
    }

    pub fn can_supply(&self, quantity: i64) -> bool {
        quantity <= self.current_stock
    }
}

pub async fn compute_current_stock<S>(
    store: &S,
    tenant_id: Uuid,
    type_id: Uuid,
) -> Result<StockSummary, StoreError>
where
    S: EventSource + ?Sized,
{
    let batches = store.list_restock_batches(tenant_id, Some(type_id)).await?;
    let pickups = store.list_pickup_events(tenant_id, Some(type_id)).await?;
    Ok(StockSummary::project(type_id, &batches, &pickups))
}

/// Stock for each of `type_ids`, in the given order.
pub async fn compute_stock_overview<S>(
    store: &S,
    tenant_id: Uuid,
    type_ids: &[Uuid],
) -> Result<Vec<StockSummary>, StoreError>
where
    S: EventSource + ?Sized,
{
    let batches = store.list_restock_batches(tenant_id, None).await?;
    let pickups = store.list_pickup_events(tenant_id, None).await?;
    Ok(type_ids
        .iter()
        .map(|type_id| StockSummary::project(*type_id, &batches, &pickups))
        .collect())
}
