use chrono::{DateTime, Utc};
use shuttle_inventory::ConsumptionAllocation;
use uuid::Uuid;

/// Which pickups a settlement charges for.
///
/// Bounds are inclusive and a missing bound is open. The picker filter is a
/// case-sensitive substring match; an empty filter matches everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub picker_name: Option<String>,
    pub type_id: Option<Uuid>,
}

impl SettlementQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn covers(&self, picked_at: DateTime<Utc>, picker_name: &str) -> bool {
        self.start.is_none_or(|start| picked_at >= start)
            && self.end.is_none_or(|end| picked_at <= end)
            && self
                .picker_name
                .as_deref()
                .is_none_or(|filter| picker_name.contains(filter))
    }

    pub fn includes(&self, allocation: &ConsumptionAllocation) -> bool {
        self.covers(allocation.picked_at, &allocation.picker_name)
    }

    pub fn includes_type(&self, type_id: Uuid) -> bool {
        self.type_id.is_none_or(|wanted| wanted == type_id)
    }
}
