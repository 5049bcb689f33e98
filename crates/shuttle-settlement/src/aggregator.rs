use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use shuttle_core::{PickupEvent, RestockBatch};
use shuttle_inventory::{DepletionWarning, LedgerError, TypeReplay, replay_type};
use tracing::warn;
use uuid::Uuid;

use crate::window::SettlementQuery;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UsedBatch {
    pub price: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TypeSettlementDetail {
    pub type_id: Uuid,
    pub total_quantity: i64,
    pub total_cost: i64,
    pub average_cost: Decimal,
    /// Merged by unit price, cheapest first.
    pub used_batches: Vec<UsedBatch>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedType {
    pub type_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettlementReport {
    pub grand_total_cost: i64,
    pub details: Vec<TypeSettlementDetail>,
    pub skipped_types: Vec<SkippedType>,
    pub warnings: Vec<DepletionWarning>,
}

/// Totals the in-window part of one type's replay.
///
/// Returns `Ok(None)` when nothing in the window consumed any stock.
pub fn summarize_type(
    replay: &TypeReplay,
    query: &SettlementQuery,
) -> Result<Option<TypeSettlementDetail>, LedgerError> {
    let overflow = || {
        LedgerError::InvalidInput(format!("totals of type {} overflow", replay.type_id))
    };

    let mut total_quantity: i64 = 0;
    let mut total_cost: i64 = 0;
    let mut by_price: BTreeMap<i64, i64> = BTreeMap::new();

    for allocation in replay.allocations.iter().filter(|a| query.includes(a)) {
        for draw in &allocation.draws {
            total_quantity = total_quantity
                .checked_add(draw.quantity)
                .ok_or_else(overflow)?;
            total_cost = draw
                .cost()
                .and_then(|cost| total_cost.checked_add(cost))
                .ok_or_else(overflow)?;
            let merged = by_price.entry(draw.unit_price).or_default();
            *merged = merged.checked_add(draw.quantity).ok_or_else(overflow)?;
        }
    }

    if total_quantity == 0 {
        return Ok(None);
    }

    Ok(Some(TypeSettlementDetail {
        type_id: replay.type_id,
        total_quantity,
        total_cost,
        average_cost: (Decimal::from(total_cost) / Decimal::from(total_quantity)).round_dp(4),
        used_batches: by_price
            .into_iter()
            .map(|(price, quantity)| UsedBatch { price, quantity })
            .collect(),
    }))
}

/// Replays each type over its full history and charges only the pickups the
/// query covers.
///
/// A type whose records cannot be loaded into a ledger, or whose totals do not
/// fit in an i64, is skipped and listed in `skipped_types`; the remaining
/// types are still reported.
pub fn aggregate(
    type_ids: &[Uuid],
    batches: &[RestockBatch],
    pickups: &[PickupEvent],
    query: &SettlementQuery,
) -> SettlementReport {
    let mut report = SettlementReport {
        grand_total_cost: 0,
        details: Vec::new(),
        skipped_types: Vec::new(),
        warnings: Vec::new(),
    };

    for type_id in type_ids.iter().copied().filter(|id| query.includes_type(*id)) {
        let settled = replay_type(type_id, batches, pickups).and_then(|replay| {
            let detail = summarize_type(&replay, query)?;
            let grand_total = match &detail {
                Some(detail) => report
                    .grand_total_cost
                    .checked_add(detail.total_cost)
                    .ok_or_else(|| {
                        LedgerError::InvalidInput(format!(
                            "type {type_id} overflows the grand total"
                        ))
                    })?,
                None => report.grand_total_cost,
            };
            Ok((replay, detail, grand_total))
        });

        let (replay, detail, grand_total) = match settled {
            Ok(settled) => settled,
            Err(err) => {
                warn!(%type_id, "skipping type in settlement: {err}");
                report.skipped_types.push(SkippedType {
                    type_id,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        report.warnings.extend(replay.warnings.iter().cloned());
        report.grand_total_cost = grand_total;
        report.details.extend(detail);
    }

    report
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    const TYPE_A: Uuid = Uuid::from_u128(0xA);
    const TYPE_B: Uuid = Uuid::from_u128(0xB);

    fn t(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 19, 0, 0).unwrap() + Duration::hours(offset)
    }

    fn batch(type_id: Uuid, sequence: i64, quantity: i64, unit_price: i64, at: i64) -> RestockBatch {
        RestockBatch {
            id: Uuid::from_u128(10_000 + sequence as u128),
            sequence,
            type_id,
            quantity,
            unit_price,
            created_at: t(at),
        }
    }

    fn pickup(type_id: Uuid, sequence: i64, name: &str, quantity: i64, at: i64) -> PickupEvent {
        PickupEvent {
            id: Uuid::from_u128(20_000 + sequence as u128),
            sequence,
            type_id,
            picker_name: name.to_string(),
            quantity,
            created_at: t(at),
        }
    }

    #[test]
    fn single_batch_single_pickup() {
        let batches = vec![batch(TYPE_A, 1, 10, 100, 0)];
        let pickups = vec![pickup(TYPE_A, 2, "Amy", 4, 1)];

        let report = aggregate(&[TYPE_A], &batches, &pickups, &SettlementQuery::default());

        assert_eq!(report.grand_total_cost, 400);
        assert_eq!(
            report.details,
            vec![TypeSettlementDetail {
                type_id: TYPE_A,
                total_quantity: 4,
                total_cost: 400,
                average_cost: Decimal::from(100),
                used_batches: vec![UsedBatch {
                    price: 100,
                    quantity: 4
                }],
            }]
        );
    }

    #[test]
    fn pickup_spanning_batches_costs_each_at_its_price() {
        let batches = vec![batch(TYPE_A, 1, 5, 100, 0), batch(TYPE_A, 2, 5, 200, 1)];
        let pickups = vec![pickup(TYPE_A, 3, "Amy", 7, 2)];

        let report = aggregate(&[TYPE_A], &batches, &pickups, &SettlementQuery::default());

        let detail = &report.details[0];
        assert_eq!(detail.total_cost, 900);
        assert_eq!(detail.total_quantity, 7);
        assert_eq!(detail.average_cost, Decimal::new(1285714, 4));
        assert_eq!(
            detail.used_batches,
            vec![
                UsedBatch {
                    price: 100,
                    quantity: 5
                },
                UsedBatch {
                    price: 200,
                    quantity: 2
                },
            ]
        );
    }

    #[test]
    fn window_after_all_pickups_reports_nothing_but_still_consumes() {
        let batches = vec![batch(TYPE_A, 1, 5, 100, 0), batch(TYPE_A, 2, 5, 200, 1)];
        let mut pickups = vec![pickup(TYPE_A, 3, "Amy", 7, 2)];
        let window = SettlementQuery::between(t(3), t(4));

        let report = aggregate(&[TYPE_A], &batches, &pickups, &window);
        assert_eq!(report.grand_total_cost, 0);
        assert!(report.details.is_empty());

        // A later in-window pickup only sees the three units left at 200.
        pickups.push(pickup(TYPE_A, 4, "Ben", 3, 3));
        let report = aggregate(&[TYPE_A], &batches, &pickups, &window);
        assert_eq!(report.grand_total_cost, 600);
        assert_eq!(
            report.details[0].used_batches,
            vec![UsedBatch {
                price: 200,
                quantity: 3
            }]
        );
    }

    #[test]
    fn depleted_pickup_charges_only_what_was_available() {
        let batches = vec![batch(TYPE_B, 1, 3, 50, 0)];
        let pickups = vec![
            pickup(TYPE_B, 2, "Amy", 2, 1),
            pickup(TYPE_B, 3, "Ben", 5, 2),
        ];
        let only_second = SettlementQuery {
            start: Some(t(2)),
            ..SettlementQuery::default()
        };

        let report = aggregate(&[TYPE_B], &batches, &pickups, &only_second);

        assert_eq!(report.details[0].total_quantity, 1);
        assert_eq!(report.details[0].total_cost, 50);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].requested, 5);
        assert_eq!(report.warnings[0].consumed, 1);
    }

    #[test]
    fn type_without_history_is_omitted() {
        let report = aggregate(&[TYPE_A], &[], &[], &SettlementQuery::default());
        assert_eq!(report.grand_total_cost, 0);
        assert!(report.details.is_empty());
        assert!(report.skipped_types.is_empty());
    }

    #[test]
    fn picker_filter_charges_matching_pickups_only() {
        let batches = vec![batch(TYPE_A, 1, 2, 100, 0), batch(TYPE_A, 2, 10, 150, 1)];
        let pickups = vec![
            pickup(TYPE_A, 3, "Amy", 2, 2),
            pickup(TYPE_A, 4, "Ben", 2, 3),
        ];
        let query = SettlementQuery {
            picker_name: Some("Ben".to_string()),
            ..SettlementQuery::default()
        };

        let report = aggregate(&[TYPE_A], &batches, &pickups, &query);

        // Amy already drained the cheap batch.
        assert_eq!(report.grand_total_cost, 300);
    }

    #[test]
    fn invalid_type_is_skipped_without_hiding_others() {
        let batches = vec![batch(TYPE_A, 1, 0, 100, 0), batch(TYPE_B, 2, 4, 70, 0)];
        let pickups = vec![pickup(TYPE_A, 3, "Amy", 1, 1), pickup(TYPE_B, 4, "Amy", 2, 1)];

        let report = aggregate(&[TYPE_A, TYPE_B], &batches, &pickups, &SettlementQuery::default());

        assert_eq!(report.skipped_types.len(), 1);
        assert_eq!(report.skipped_types[0].type_id, TYPE_A);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].type_id, TYPE_B);
        assert_eq!(report.grand_total_cost, 140);
    }

    #[test]
    fn grand_total_sums_types_in_order() {
        let batches = vec![batch(TYPE_B, 1, 5, 60, 0), batch(TYPE_A, 2, 5, 90, 0)];
        let pickups = vec![pickup(TYPE_A, 3, "Amy", 1, 1), pickup(TYPE_B, 4, "Amy", 2, 1)];

        let report = aggregate(&[TYPE_B, TYPE_A], &batches, &pickups, &SettlementQuery::default());

        let order: Vec<Uuid> = report.details.iter().map(|d| d.type_id).collect();
        assert_eq!(order, vec![TYPE_B, TYPE_A]);
        assert_eq!(report.grand_total_cost, 210);
    }

    #[test]
    fn batch_worth_more_than_i64_is_skipped() {
        let batches = vec![
            batch(TYPE_A, 1, 10_000_000_000, 10_000_000_000, 0),
            batch(TYPE_B, 2, 4, 70, 0),
        ];
        let pickups = vec![
            pickup(TYPE_A, 3, "Amy", 10_000_000_000, 1),
            pickup(TYPE_B, 4, "Amy", 2, 1),
        ];

        let report = aggregate(&[TYPE_A, TYPE_B], &batches, &pickups, &SettlementQuery::default());

        assert_eq!(report.skipped_types.len(), 1);
        assert_eq!(report.skipped_types[0].type_id, TYPE_A);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.grand_total_cost, 140);
    }

    #[test]
    fn type_pushing_grand_total_past_i64_is_skipped() {
        let price = i64::MAX / 2 + 1;
        let batches = vec![batch(TYPE_A, 1, 1, price, 0), batch(TYPE_B, 2, 1, price, 0)];
        let pickups = vec![pickup(TYPE_A, 3, "Amy", 1, 1), pickup(TYPE_B, 4, "Ben", 1, 1)];

        let report = aggregate(&[TYPE_A, TYPE_B], &batches, &pickups, &SettlementQuery::default());

        assert_eq!(report.grand_total_cost, price);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].type_id, TYPE_A);
        assert_eq!(report.skipped_types.len(), 1);
        assert_eq!(report.skipped_types[0].type_id, TYPE_B);
        assert!(report.skipped_types[0].reason.contains("grand total"));
    }

    fn history() -> impl Strategy<Value = (Vec<RestockBatch>, Vec<PickupEvent>)> {
        (
            prop::collection::vec((1i64..12, 0i64..300, 0i64..48), 1..6),
            prop::collection::vec((1i64..8, 0i64..48), 0..10),
        )
            .prop_map(|(raw_batches, raw_pickups)| {
                let batches = raw_batches
                    .into_iter()
                    .enumerate()
                    .map(|(i, (qty, price, at))| batch(TYPE_A, i as i64, qty, price, at))
                    .collect();
                let pickups = raw_pickups
                    .into_iter()
                    .enumerate()
                    .map(|(i, (qty, at))| pickup(TYPE_A, 100 + i as i64, "Amy", qty, at))
                    .collect();
                (batches, pickups)
            })
    }

    proptest! {
        #[test]
        fn window_never_changes_what_a_pickup_paid(
            (batches, pickups) in history(),
            start in 0i64..48,
            span in 0i64..48,
        ) {
            let window = SettlementQuery::between(t(start), t(start + span));
            let windowed = aggregate(&[TYPE_A], &batches, &pickups, &window);

            let full = replay_type(TYPE_A, &batches, &pickups).unwrap();
            let expected: i64 = full
                .allocations
                .iter()
                .filter(|a| window.includes(a))
                .map(|a| a.cost().unwrap())
                .sum();

            prop_assert_eq!(windowed.grand_total_cost, expected);
        }

        #[test]
        fn aggregation_is_idempotent((batches, pickups) in history()) {
            let query = SettlementQuery::default();
            let first = aggregate(&[TYPE_A], &batches, &pickups, &query);
            let second = aggregate(&[TYPE_A], &batches, &pickups, &query);
            prop_assert_eq!(first, second);
        }
    }
}
