pub mod ledger;
pub mod simulator;
pub mod stock;

pub use ledger::{BatchDraw, BatchLedger, LedgerBatch, LedgerError};
pub use simulator::{ConsumptionAllocation, DepletionWarning, TypeReplay, replay_type};
pub use stock::{StockSummary, compute_current_stock, compute_stock_overview};
