//! FIFO replay of a type's pickup history against its restock batches.
//!
//! The price an individual pickup pays depends on everything picked before
//! it, so the whole history is replayed even when a caller only cares about a
//! narrow window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shuttle_core::{PickupEvent, RestockBatch};
use tracing::warn;
use uuid::Uuid;

use crate::ledger::{BatchDraw, BatchLedger, LedgerError};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConsumptionAllocation {
    pub pickup_id: Uuid,
    pub picker_name: String,
    pub picked_at: DateTime<Utc>,
    pub requested: i64,
    pub draws: Vec<BatchDraw>,
}

impl ConsumptionAllocation {
    pub fn consumed(&self) -> i64 {
        self.draws.iter().map(|d| d.quantity).sum()
    }

    pub fn cost(&self) -> Option<i64> {
        self.draws
            .iter()
            .try_fold(0i64, |total, draw| total.checked_add(draw.cost()?))
    }

    pub fn shortfall(&self) -> i64 {
        self.requested - self.consumed()
    }
}

/// A pickup that asked for more than the remaining batches held.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DepletionWarning {
    pub type_id: Uuid,
    pub pickup_id: Uuid,
    pub requested: i64,
    pub consumed: i64,
}

#[derive(Debug, Clone)]
pub struct TypeReplay {
    pub type_id: Uuid,
    pub allocations: Vec<ConsumptionAllocation>,
    pub warnings: Vec<DepletionWarning>,
    pub ledger: BatchLedger,
}

/// Replays every pickup of `type_id` in chronological order.
///
/// Records belonging to other types are ignored, so callers may pass a whole
/// tenant's history. Depletion never aborts the run: the unsatisfied part of
/// a pickup is dropped at zero cost and reported as a warning.
pub fn replay_type(
    type_id: Uuid,
    batches: &[RestockBatch],
    pickups: &[PickupEvent],
) -> Result<TypeReplay, LedgerError> {
    let type_batches: Vec<RestockBatch> = batches
        .iter()
        .filter(|b| b.type_id == type_id)
        .cloned()
        .collect();
    let mut ledger = BatchLedger::initialize(type_batches)?;

    let mut type_pickups: Vec<&PickupEvent> =
        pickups.iter().filter(|p| p.type_id == type_id).collect();
    if let Some(bad) = type_pickups.iter().find(|p| p.quantity < 1) {
        return Err(LedgerError::InvalidInput(format!(
            "pickup {} has non-positive quantity {}",
            bad.id, bad.quantity
        )));
    }
    type_pickups.sort_by_key(|p| p.fifo_key());

    let mut allocations = Vec::with_capacity(type_pickups.len());
    let mut warnings = Vec::new();

    for pickup in type_pickups {
        let draws = ledger.take_earliest_available(pickup.quantity);
        let allocation = ConsumptionAllocation {
            pickup_id: pickup.id,
            picker_name: pickup.picker_name.clone(),
            picked_at: pickup.created_at,
            requested: pickup.quantity,
            draws,
        };

        if allocation.shortfall() > 0 {
            warn!(
                %type_id,
                pickup_id = %pickup.id,
                requested = allocation.requested,
                consumed = allocation.consumed(),
                "inventory depleted during replay; shortfall costed at zero"
            );
            warnings.push(DepletionWarning {
                type_id,
                pickup_id: pickup.id,
                requested: allocation.requested,
                consumed: allocation.consumed(),
            });
        }

        allocations.push(allocation);
    }

    Ok(TypeReplay {
        type_id,
        allocations,
        warnings,
        ledger,
    })
}
