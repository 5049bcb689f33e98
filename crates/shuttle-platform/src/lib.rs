pub mod config;
pub mod contracts;
pub mod db;
pub mod pg_store;

pub use config::{DEFAULT_RESTOCK_PASSWORD, ServiceConfig, StoreBackend};
pub use contracts::{
    CalculateSettlementRequest, CalculateSettlementResponse, CreatePickupRequest,
    CreateTypeRequest, DateBound, DateWindow, DeletedResponse, GroupSettingsResponse,
    MAX_QUANTITY, MAX_UNIT_PRICE, PickupHistoryItem, PickupHistoryResponse, RestockHistoryItem,
    RestockHistoryQuery, RestockHistoryResponse, RestockRequest, RestockResponse,
    SettlementPeriod, ShuttleTypeListResponse, StockOverviewItem, StockOverviewResponse,
    ToggleTypeRequest, UpdateGroupRequest, UpdateTypeRequest, VisibilityQuery,
};
pub use db::connect_database;
pub use pg_store::PgInventoryStore;
