use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use shuttle_core::InventoryStore;
use shuttle_eventstore::InMemoryInventoryStore;
use shuttle_gateway::{AppState, USER_HEADER, router};
use shuttle_platform::{PgInventoryStore, ServiceConfig, StoreBackend, connect_database};
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "shuttle_gateway=info,shuttle_settlement=info,shuttle_inventory=warn".to_string()
            }),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let store: Arc<dyn InventoryStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = connect_database(&config).await?;
            Arc::new(PgInventoryStore::new(pool))
        }
        StoreBackend::Memory => Arc::new(seed_memory_store().await),
    };

    let addr: SocketAddr = config.http_addr.parse()?;
    let router = router(AppState::new(store, config));

    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// One demo group with a single member, so the API is usable without a
/// database.
async fn seed_memory_store() -> InMemoryInventoryStore {
    let store = InMemoryInventoryStore::new();
    let group = store.create_group("Demo Group", None).await;
    let user_id = Uuid::new_v4();
    store.add_member(user_id, group.id).await;

    warn!("using in-memory store; data is lost on restart");
    info!(%user_id, group_id = %group.id, "send {USER_HEADER}: {user_id} to act as the demo member");
    store
}
