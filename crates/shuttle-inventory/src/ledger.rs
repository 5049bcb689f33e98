use serde::Serialize;
use shuttle_core::RestockBatch;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerBatch {
    pub batch: RestockBatch,
    pub remaining: i64,
}

/// Units taken from one batch while serving a pickup.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BatchDraw {
    pub batch_id: Uuid,
    pub unit_price: i64,
    pub quantity: i64,
}

impl BatchDraw {
    /// `None` only if the product leaves the i64 range, which a draw from an
    /// initialized ledger never does.
    pub fn cost(&self) -> Option<i64> {
        self.quantity.checked_mul(self.unit_price)
    }
}

/// Restock batches of a single type with their transient remaining counts.
///
/// Built fresh for every replay and never written back to storage.
#[derive(Debug, Clone)]
pub struct BatchLedger {
    batches: Vec<LedgerBatch>,
    // Index of the earliest batch that may still have stock. Remaining
    // counts never grow, so everything before it is exhausted.
    cursor: usize,
}

impl BatchLedger {
    pub fn initialize(mut batches: Vec<RestockBatch>) -> Result<Self, LedgerError> {
        if let Some(bad) = batches.iter().find(|b| b.quantity < 1) {
            return Err(LedgerError::InvalidInput(format!(
                "restock batch {} has non-positive quantity {}",
                bad.id, bad.quantity
            )));
        }
        if let Some(bad) = batches.iter().find(|b| b.unit_price < 0) {
            return Err(LedgerError::InvalidInput(format!(
                "restock batch {} has negative unit price {}",
                bad.id, bad.unit_price
            )));
        }

        // Every draw and every sum of draws is bounded by these totals.
        let mut total_quantity: i64 = 0;
        let mut total_value: i64 = 0;
        for batch in &batches {
            let value = batch
                .total_price()
                .and_then(|value| total_value.checked_add(value))
                .zip(total_quantity.checked_add(batch.quantity));
            let Some((value, quantity)) = value else {
                return Err(LedgerError::InvalidInput(format!(
                    "restock batch {} ({} x {}) overflows the ledger totals",
                    batch.id, batch.quantity, batch.unit_price
                )));
            };
            total_value = value;
            total_quantity = quantity;
        }

        batches.sort_by_key(RestockBatch::fifo_key);

        Ok(Self {
            batches: batches
                .into_iter()
                .map(|batch| LedgerBatch {
                    remaining: batch.quantity,
                    batch,
                })
                .collect(),
            cursor: 0,
        })
    }

    /// Takes up to `max_amount` units, earliest batch first.
    ///
    /// Returns what was actually taken; the total is short of `max_amount`
    /// when the ledger runs dry.
    pub fn take_earliest_available(&mut self, max_amount: i64) -> Vec<BatchDraw> {
        let mut draws = Vec::new();
        let mut to_take = max_amount;

        while to_take > 0 {
            let Some(entry) = self.batches.get_mut(self.cursor) else {
                break;
            };
            if entry.remaining == 0 {
                self.cursor += 1;
                continue;
            }

            let amount = entry.remaining.min(to_take);
            entry.remaining -= amount;
            to_take -= amount;

            draws.push(BatchDraw {
                batch_id: entry.batch.id,
                unit_price: entry.batch.unit_price,
                quantity: amount,
            });
        }

        draws
    }

    pub fn batches(&self) -> &[LedgerBatch] {
        &self.batches
    }

    pub fn available(&self) -> i64 {
        self.batches.iter().map(|b| b.remaining).sum()
    }

    pub fn consumed(&self) -> i64 {
        self.batches
            .iter()
            .map(|b| b.batch.quantity - b.remaining)
            .sum()
    }

    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;

    fn t(offset_hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap() + Duration::hours(offset_hours)
    }

    fn batch(sequence: i64, quantity: i64, unit_price: i64, at: DateTime<Utc>) -> RestockBatch {
        RestockBatch {
            id: Uuid::new_v4(),
            sequence,
            type_id: Uuid::nil(),
            quantity,
            unit_price,
            created_at: at,
        }
    }

    #[test]
    fn initialize_sets_remaining_to_quantity() {
        let ledger = BatchLedger::initialize(vec![batch(1, 10, 100, t(0)), batch(2, 4, 120, t(1))])
            .unwrap();

        let remaining: Vec<i64> = ledger.batches().iter().map(|b| b.remaining).collect();
        assert_eq!(remaining, vec![10, 4]);
        assert_eq!(ledger.available(), 14);
        assert_eq!(ledger.consumed(), 0);
    }

    #[test]
    fn initialize_rejects_non_positive_quantity() {
        let err = BatchLedger::initialize(vec![batch(1, 10, 100, t(0)), batch(2, 0, 120, t(1))])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(msg) if msg.contains("non-positive")));
    }

    #[test]
    fn initialize_rejects_negative_price() {
        let err = BatchLedger::initialize(vec![batch(1, 10, -1, t(0))]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(msg) if msg.contains("negative")));
    }

    #[test]
    fn initialize_rejects_batch_value_beyond_i64() {
        let err = BatchLedger::initialize(vec![batch(1, 10_000_000_000, 10_000_000_000, t(0))])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(msg) if msg.contains("overflows")));
    }

    #[test]
    fn initialize_rejects_ledger_total_beyond_i64() {
        let half = i64::MAX / 2 + 1;
        let err = BatchLedger::initialize(vec![batch(1, half, 1, t(0)), batch(2, half, 1, t(1))])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn take_spans_batches_in_order() {
        let first = batch(1, 5, 100, t(0));
        let second = batch(2, 5, 200, t(1));
        let mut ledger = BatchLedger::initialize(vec![second.clone(), first.clone()]).unwrap();

        let draws = ledger.take_earliest_available(7);

        assert_eq!(
            draws,
            vec![
                BatchDraw {
                    batch_id: first.id,
                    unit_price: 100,
                    quantity: 5
                },
                BatchDraw {
                    batch_id: second.id,
                    unit_price: 200,
                    quantity: 2
                },
            ]
        );
        assert_eq!(draws.iter().filter_map(BatchDraw::cost).sum::<i64>(), 900);
        assert_eq!(ledger.available(), 3);
    }

    #[test]
    fn identical_timestamps_fall_back_to_sequence() {
        let late_insert = batch(9, 1, 300, t(0));
        let early_insert = batch(3, 1, 100, t(0));
        let mut ledger =
            BatchLedger::initialize(vec![late_insert.clone(), early_insert.clone()]).unwrap();

        let draws = ledger.take_earliest_available(1);
        assert_eq!(draws[0].batch_id, early_insert.id);
    }

    #[test]
    fn take_under_supplies_when_exhausted() {
        let mut ledger = BatchLedger::initialize(vec![batch(1, 3, 50, t(0))]).unwrap();

        assert_eq!(ledger.take_earliest_available(2)[0].quantity, 2);
        let draws = ledger.take_earliest_available(5);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].quantity, 1);
        assert!(ledger.is_exhausted());
        assert!(ledger.take_earliest_available(1).is_empty());
    }

    #[test]
    fn empty_ledger_supplies_nothing() {
        let mut ledger = BatchLedger::initialize(Vec::new()).unwrap();
        assert!(ledger.take_earliest_available(4).is_empty());
        assert!(ledger.take_earliest_available(0).is_empty());
    }
}
