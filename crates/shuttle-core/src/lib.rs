pub mod error;
pub mod models;
pub mod storage;

pub use error::{OwnershipError, StoreError};
pub use models::{
    Group, NewPickup, NewRestock, NewShuttleType, Owner, PickupEvent, RestockBatch, ShuttleType,
};
pub use storage::{EventSource, InventoryStore, TenantDirectory};
