use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, patch, post},
};
use shuttle_core::{
    EventSource, Group, InventoryStore, NewShuttleType, Owner, OwnershipError, ShuttleType,
    StoreError, TenantDirectory,
};
use shuttle_inventory::{StockSummary, compute_current_stock, compute_stock_overview};
use shuttle_platform::{
    CalculateSettlementRequest, CalculateSettlementResponse, CreatePickupRequest,
    CreateTypeRequest, DeletedResponse, GroupSettingsResponse, PickupHistoryItem,
    PickupHistoryResponse, RestockHistoryItem, RestockHistoryQuery, RestockHistoryResponse,
    RestockRequest, RestockResponse, ServiceConfig, SettlementPeriod, ShuttleTypeListResponse,
    StockOverviewItem, StockOverviewResponse, ToggleTypeRequest, UpdateGroupRequest,
    UpdateTypeRequest, VisibilityQuery,
};
use shuttle_settlement::{SettlementError, compute_settlement};
use tracing::{error, info};
use uuid::Uuid;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn InventoryStore>, config: ServiceConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

/// The authenticated member and the group whose data they act on.
#[derive(Debug, Clone, Copy)]
struct Caller {
    user_id: Uuid,
    tenant_id: Uuid,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/group", get(group_settings).patch(update_group))
        .route("/settlement/calculate", post(calculate_settlement))
        .route("/inventory", get(stock_overview))
        .route("/inventory/types/{type_id}/stock", get(type_stock))
        .route("/inventory/restock", post(restock))
        .route("/inventory/restock/{batch_id}", delete(delete_restock))
        .route("/inventory/history", get(restock_history))
        .route("/inventory/types", get(list_types).post(create_type))
        .route(
            "/inventory/types/{type_id}",
            patch(toggle_type).put(edit_type),
        )
        .route("/pickups", get(list_pickups).post(create_pickup))
        .route("/pickups/{pickup_id}", delete(delete_pickup))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn calculate_settlement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CalculateSettlementRequest>,
) -> ApiResult<Json<CalculateSettlementResponse>> {
    let caller = authenticate(&state, &headers).await?;
    let query = payload.validate().map_err(invalid_request)?;

    let report = compute_settlement(state.store.as_ref(), caller.tenant_id, &query)
        .await
        .map_err(settlement_error)?;

    Ok(Json(CalculateSettlementResponse {
        period: SettlementPeriod {
            start: query.start,
            end: query.end,
        },
        report,
    }))
}

async fn group_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<GroupSettingsResponse>> {
    let caller = authenticate(&state, &headers).await?;
    let group = state
        .store
        .group(caller.tenant_id)
        .await
        .map_err(store_error)?;

    Ok(Json(GroupSettingsResponse::new(&group)))
}

async fn update_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateGroupRequest>,
) -> ApiResult<Json<GroupSettingsResponse>> {
    let caller = authenticate(&state, &headers).await?;
    let mut group = state
        .store
        .group(caller.tenant_id)
        .await
        .map_err(store_error)?;

    if payload.touches_password() {
        let current = payload.current_restock_password.as_deref().unwrap_or_default();
        check_restock_password(&state, &group, current)?;
    }
    payload.apply(&mut group).map_err(invalid_request)?;

    let updated = state
        .store
        .update_group(&group)
        .await
        .map_err(store_error)?;

    info!(
        tenant_id = %caller.tenant_id,
        password_changed = payload.restock_password.is_some(),
        "group settings updated"
    );
    Ok(Json(GroupSettingsResponse::new(&updated)))
}

async fn stock_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(visibility): Query<VisibilityQuery>,
) -> ApiResult<Json<StockOverviewResponse>> {
    let caller = authenticate(&state, &headers).await?;

    let types = visible_types(&state, caller.tenant_id, visibility.all).await?;
    let type_ids: Vec<Uuid> = types.iter().map(|t| t.id).collect();
    let summaries = compute_stock_overview(state.store.as_ref(), caller.tenant_id, &type_ids)
        .await
        .map_err(store_error)?;

    let items = types
        .iter()
        .zip(summaries.iter())
        .map(|(shuttle_type, summary)| StockOverviewItem::new(shuttle_type, summary))
        .collect();

    Ok(Json(StockOverviewResponse { items }))
}

async fn type_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(type_id): Path<Uuid>,
) -> ApiResult<Json<StockSummary>> {
    let caller = authenticate(&state, &headers).await?;
    state
        .store
        .get_type(caller.tenant_id, type_id)
        .await
        .map_err(store_error)?;

    let summary = compute_current_stock(state.store.as_ref(), caller.tenant_id, type_id)
        .await
        .map_err(store_error)?;

    Ok(Json(summary))
}

async fn restock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RestockRequest>,
) -> ApiResult<(StatusCode, Json<RestockResponse>)> {
    let caller = authenticate(&state, &headers).await?;
    let new_restock = payload.validate().map_err(invalid_request)?;

    let group = state
        .store
        .group(caller.tenant_id)
        .await
        .map_err(store_error)?;
    check_restock_password(&state, &group, &payload.password)?;

    let batch = state
        .store
        .record_restock(caller.tenant_id, new_restock)
        .await
        .map_err(store_error)?;
    let summary = compute_current_stock(state.store.as_ref(), caller.tenant_id, batch.type_id)
        .await
        .map_err(store_error)?;

    info!(
        tenant_id = %caller.tenant_id,
        type_id = %batch.type_id,
        quantity = batch.quantity,
        unit_price = batch.unit_price,
        "restock recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(RestockResponse {
            batch,
            current_stock: summary.current_stock,
        }),
    ))
}

async fn delete_restock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    let caller = authenticate(&state, &headers).await?;
    state
        .store
        .delete_restock(caller.tenant_id, batch_id)
        .await
        .map_err(store_error)?;

    info!(tenant_id = %caller.tenant_id, %batch_id, "restock deleted");
    Ok(Json(DeletedResponse {
        id: batch_id,
        deleted: true,
    }))
}

async fn restock_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RestockHistoryQuery>,
) -> ApiResult<Json<RestockHistoryResponse>> {
    let caller = authenticate(&state, &headers).await?;
    let window = query.validate().map_err(invalid_request)?;

    let types = types_by_id(&state, caller.tenant_id).await?;
    let batches = state
        .store
        .list_restock_batches(caller.tenant_id, None)
        .await
        .map_err(store_error)?;

    let items = batches
        .iter()
        .rev()
        .filter(|batch| window.covers(batch.created_at))
        .map(|batch| RestockHistoryItem::new(batch, types.get(&batch.type_id)))
        .collect();

    Ok(Json(RestockHistoryResponse { items }))
}

async fn list_types(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(visibility): Query<VisibilityQuery>,
) -> ApiResult<Json<ShuttleTypeListResponse>> {
    let caller = authenticate(&state, &headers).await?;
    let items = visible_types(&state, caller.tenant_id, visibility.all).await?;
    Ok(Json(ShuttleTypeListResponse { items }))
}

async fn create_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTypeRequest>,
) -> ApiResult<(StatusCode, Json<ShuttleType>)> {
    let caller = authenticate(&state, &headers).await?;
    let (brand, name) = payload.validate().map_err(invalid_request)?;

    let shuttle_type = state
        .store
        .create_type(
            caller.tenant_id,
            NewShuttleType {
                brand,
                name,
                owner: Owner::User(caller.user_id),
            },
        )
        .await
        .map_err(store_error)?;

    info!(tenant_id = %caller.tenant_id, type_id = %shuttle_type.id, "shuttlecock type created");
    Ok((StatusCode::CREATED, Json(shuttle_type)))
}

async fn toggle_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(type_id): Path<Uuid>,
    Json(payload): Json<ToggleTypeRequest>,
) -> ApiResult<Json<ShuttleType>> {
    let caller = authenticate(&state, &headers).await?;
    let mut shuttle_type = state
        .store
        .get_type(caller.tenant_id, type_id)
        .await
        .map_err(store_error)?;

    shuttle_type.is_active = payload.is_active;
    let updated = state
        .store
        .update_type(&shuttle_type)
        .await
        .map_err(store_error)?;

    Ok(Json(updated))
}

async fn edit_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(type_id): Path<Uuid>,
    Json(payload): Json<UpdateTypeRequest>,
) -> ApiResult<Json<ShuttleType>> {
    let caller = authenticate(&state, &headers).await?;
    let mut shuttle_type = state
        .store
        .get_type(caller.tenant_id, type_id)
        .await
        .map_err(store_error)?;

    shuttle_type
        .apply_edit(caller.user_id, &payload.brand, &payload.name)
        .map_err(ownership_error)?;
    let updated = state
        .store
        .update_type(&shuttle_type)
        .await
        .map_err(store_error)?;

    info!(tenant_id = %caller.tenant_id, %type_id, editor = %caller.user_id, "shuttlecock type edited");
    Ok(Json(updated))
}

async fn list_pickups(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PickupHistoryResponse>> {
    let caller = authenticate(&state, &headers).await?;

    let types = types_by_id(&state, caller.tenant_id).await?;
    let pickups = state
        .store
        .list_pickup_events(caller.tenant_id, None)
        .await
        .map_err(store_error)?;

    let items = pickups
        .iter()
        .rev()
        .map(|pickup| PickupHistoryItem::new(pickup, types.get(&pickup.type_id)))
        .collect();

    Ok(Json(PickupHistoryResponse { items }))
}

async fn create_pickup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePickupRequest>,
) -> ApiResult<(StatusCode, Json<PickupHistoryItem>)> {
    let caller = authenticate(&state, &headers).await?;
    let new_pickup = payload.validate().map_err(invalid_request)?;

    let shuttle_type = state
        .store
        .get_type(caller.tenant_id, new_pickup.type_id)
        .await
        .map_err(store_error)?;
    let summary = compute_current_stock(state.store.as_ref(), caller.tenant_id, shuttle_type.id)
        .await
        .map_err(store_error)?;
    if !summary.can_supply(new_pickup.quantity) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "insufficient stock: only {} left",
                summary.current_stock.max(0)
            ),
        ));
    }

    let pickup = state
        .store
        .record_pickup(caller.tenant_id, new_pickup)
        .await
        .map_err(store_error)?;

    info!(
        tenant_id = %caller.tenant_id,
        type_id = %pickup.type_id,
        quantity = pickup.quantity,
        "pickup recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(PickupHistoryItem::new(&pickup, Some(&shuttle_type))),
    ))
}

async fn delete_pickup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pickup_id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    let caller = authenticate(&state, &headers).await?;
    state
        .store
        .delete_pickup(caller.tenant_id, pickup_id)
        .await
        .map_err(store_error)?;

    info!(tenant_id = %caller.tenant_id, %pickup_id, "pickup deleted");
    Ok(Json(DeletedResponse {
        id: pickup_id,
        deleted: true,
    }))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Caller> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(unauthorized)?;

    let tenant_id = state
        .store
        .group_for_user(user_id)
        .await
        .map_err(store_error)?
        .ok_or_else(unauthorized)?;

    Ok(Caller { user_id, tenant_id })
}

async fn visible_types(
    state: &AppState,
    tenant_id: Uuid,
    include_hidden: bool,
) -> ApiResult<Vec<ShuttleType>> {
    let types = state
        .store
        .list_types(tenant_id)
        .await
        .map_err(store_error)?;

    Ok(types
        .into_iter()
        .filter(|t| include_hidden || t.is_active)
        .collect())
}

async fn types_by_id(state: &AppState, tenant_id: Uuid) -> ApiResult<HashMap<Uuid, ShuttleType>> {
    let types = state
        .store
        .list_types(tenant_id)
        .await
        .map_err(store_error)?;

    Ok(types.into_iter().map(|t| (t.id, t)).collect())
}

fn check_restock_password(state: &AppState, group: &Group, presented: &str) -> ApiResult<()> {
    let expected = group.effective_restock_password(&state.config.restock_default_password);
    if presented != expected {
        return Err((
            StatusCode::UNAUTHORIZED,
            "invalid restock password".to_string(),
        ));
    }

    Ok(())
}

fn unauthorized() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
}

fn invalid_request(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn ownership_error(err: OwnershipError) -> (StatusCode, String) {
    match err {
        OwnershipError::NotOwner { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        OwnershipError::MissingField(_) => (StatusCode::BAD_REQUEST, err.to_string()),
    }
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        StoreError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        StoreError::Unavailable(_) | StoreError::Malformed(_) => {
            error!("store failure: {err}");
            internal_error(err)
        }
    }
}

fn settlement_error(err: SettlementError) -> (StatusCode, String) {
    match err {
        SettlementError::Query(err) => store_error(err),
    }
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
