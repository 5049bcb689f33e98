//! Period cost settlement over FIFO-replayed pickup history.

pub mod aggregator;
pub mod window;

use shuttle_core::{EventSource, StoreError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use aggregator::{
    SettlementReport, SkippedType, TypeSettlementDetail, UsedBatch, aggregate, summarize_type,
};
pub use window::SettlementQuery;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("failed to load inventory history: {0}")]
    Query(#[from] StoreError),
}

/// Computes what the pickups covered by `query` cost the group.
///
/// Every call re-reads the full history; nothing is cached between calls.
pub async fn compute_settlement<S>(
    store: &S,
    tenant_id: Uuid,
    query: &SettlementQuery,
) -> Result<SettlementReport, SettlementError>
where
    S: EventSource + ?Sized,
{
    let type_ids = store.list_active_type_ids(tenant_id).await?;
    let batches = store.list_restock_batches(tenant_id, query.type_id).await?;
    let pickups = store.list_pickup_events(tenant_id, query.type_id).await?;

    let report = aggregate(&type_ids, &batches, &pickups, query);

    info!(
        %tenant_id,
        types = report.details.len(),
        skipped = report.skipped_types.len(),
        warnings = report.warnings.len(),
        grand_total_cost = report.grand_total_cost,
        "settlement computed"
    );

    Ok(report)
}
