use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use shuttle_core::{Group, NewPickup, NewRestock, PickupEvent, RestockBatch, ShuttleType};
use shuttle_inventory::StockSummary;
use shuttle_settlement::{SettlementQuery, SettlementReport};
use uuid::Uuid;

/// Largest quantity a single restock or pickup may carry.
pub const MAX_QUANTITY: i64 = 1_000_000;
/// Largest unit price, in minor currency units.
pub const MAX_UNIT_PRICE: i64 = 1_000_000_000;

/// A period bound as clients send it: an RFC 3339 instant or a bare
/// `YYYY-MM-DD` day.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DateBound {
    Instant(DateTime<Utc>),
    Day(NaiveDate),
}

impl DateBound {
    pub fn parse(raw: &str) -> Result<Self> {
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self::Instant(instant.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Self::Day)
            .map_err(|_| anyhow::anyhow!("invalid date {raw:?}: expected RFC 3339 or YYYY-MM-DD"))
    }

    /// A day starts at midnight UTC.
    pub fn first_instant(self) -> Result<DateTime<Utc>> {
        match self {
            Self::Instant(instant) => Ok(instant),
            Self::Day(day) => day
                .and_hms_opt(0, 0, 0)
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
                .ok_or_else(|| anyhow::anyhow!("invalid start day {day}")),
        }
    }

    /// A day ends at its last nanosecond, so an end day is included whole.
    pub fn last_instant(self) -> Result<DateTime<Utc>> {
        match self {
            Self::Instant(instant) => Ok(instant),
            Self::Day(day) => day
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
                .ok_or_else(|| anyhow::anyhow!("invalid end day {day}")),
        }
    }
}

/// Missing, `null` and blank strings all mean "no bound".
fn optional_date_bound<'de, D>(deserializer: D) -> Result<Option<DateBound>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => DateBound::parse(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculateSettlementRequest {
    #[serde(default, deserialize_with = "optional_date_bound")]
    pub start_date: Option<DateBound>,
    #[serde(default, deserialize_with = "optional_date_bound")]
    pub end_date: Option<DateBound>,
    pub picker_name: Option<String>,
    pub type_id: Option<Uuid>,
}

impl CalculateSettlementRequest {
    pub fn validate(&self) -> Result<SettlementQuery> {
        let window = resolve_range(self.start_date, self.end_date)?;

        let picker_name = self
            .picker_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(SettlementQuery {
            start: window.start,
            end: window.end,
            picker_name,
            type_id: self.type_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementPeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalculateSettlementResponse {
    pub period: SettlementPeriod,
    #[serde(flatten)]
    pub report: SettlementReport,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisibilityQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockOverviewItem {
    pub type_id: Uuid,
    pub brand: String,
    pub name: String,
    pub is_active: bool,
    pub total_restocked: i64,
    pub total_picked: i64,
    pub current_stock: i64,
}

impl StockOverviewItem {
    pub fn new(shuttle_type: &ShuttleType, summary: &StockSummary) -> Self {
        Self {
            type_id: shuttle_type.id,
            brand: shuttle_type.brand.clone(),
            name: shuttle_type.name.clone(),
            is_active: shuttle_type.is_active,
            total_restocked: summary.total_restocked,
            total_picked: summary.total_picked,
            current_stock: summary.current_stock,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockOverviewResponse {
    pub items: Vec<StockOverviewItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockRequest {
    pub type_id: Uuid,
    pub amount: i64,
    #[serde(default)]
    pub unit_price: i64,
    pub password: String,
}

impl RestockRequest {
    pub fn validate(&self) -> Result<NewRestock> {
        if !(1..=MAX_QUANTITY).contains(&self.amount) {
            anyhow::bail!("amount must be between 1 and {MAX_QUANTITY}");
        }
        if !(0..=MAX_UNIT_PRICE).contains(&self.unit_price) {
            anyhow::bail!("unit_price must be between 0 and {MAX_UNIT_PRICE}");
        }

        Ok(NewRestock {
            type_id: self.type_id,
            quantity: self.amount,
            unit_price: self.unit_price,
            created_at: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockResponse {
    pub batch: RestockBatch,
    pub current_stock: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestockHistoryQuery {
    #[serde(default, deserialize_with = "optional_date_bound")]
    pub start_date: Option<DateBound>,
    #[serde(default, deserialize_with = "optional_date_bound")]
    pub end_date: Option<DateBound>,
}

impl RestockHistoryQuery {
    pub fn validate(&self) -> Result<DateWindow> {
        resolve_range(self.start_date, self.end_date)
    }
}

/// Resolved bounds, inclusive at both ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at <= end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockHistoryItem {
    pub id: Uuid,
    pub type_id: Uuid,
    pub date: DateTime<Utc>,
    pub brand: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_price: Option<i64>,
}

impl RestockHistoryItem {
    pub fn new(batch: &RestockBatch, shuttle_type: Option<&ShuttleType>) -> Self {
        let (brand, name) = labels(shuttle_type);
        Self {
            id: batch.id,
            type_id: batch.type_id,
            date: batch.created_at,
            brand,
            name,
            quantity: batch.quantity,
            unit_price: batch.unit_price,
            total_price: batch.total_price(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockHistoryResponse {
    pub items: Vec<RestockHistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTypeRequest {
    pub brand: String,
    pub name: String,
}

impl CreateTypeRequest {
    /// Trimmed `(brand, name)`.
    pub fn validate(&self) -> Result<(String, String)> {
        Ok((
            required_field("brand", &self.brand)?,
            required_field("name", &self.name)?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTypeRequest {
    pub brand: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleTypeRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuttleTypeListResponse {
    pub items: Vec<ShuttleType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePickupRequest {
    pub picker_name: String,
    pub quantity: i64,
    pub type_id: Uuid,
}

impl CreatePickupRequest {
    pub fn validate(&self) -> Result<NewPickup> {
        let picker_name = required_field("picker_name", &self.picker_name)?;
        if !(1..=MAX_QUANTITY).contains(&self.quantity) {
            anyhow::bail!("quantity must be between 1 and {MAX_QUANTITY}");
        }

        Ok(NewPickup {
            type_id: self.type_id,
            picker_name,
            quantity: self.quantity,
            created_at: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupHistoryItem {
    pub id: Uuid,
    pub type_id: Uuid,
    pub brand: String,
    pub name: String,
    pub picker_name: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

impl PickupHistoryItem {
    pub fn new(pickup: &PickupEvent, shuttle_type: Option<&ShuttleType>) -> Self {
        let (brand, name) = labels(shuttle_type);
        Self {
            id: pickup.id,
            type_id: pickup.type_id,
            brand,
            name,
            picker_name: pickup.picker_name.clone(),
            quantity: pickup.quantity,
            created_at: pickup.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupHistoryResponse {
    pub items: Vec<PickupHistoryItem>,
}

/// Group settings change. Touching the restock password in any way requires
/// the current one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    /// An empty string clears the password back to the service default.
    pub restock_password: Option<String>,
    pub current_restock_password: Option<String>,
}

impl UpdateGroupRequest {
    pub fn touches_password(&self) -> bool {
        self.restock_password.is_some() || self.current_restock_password.is_some()
    }

    /// Applies the change to `group`. Password verification is the caller's.
    pub fn apply(&self, group: &mut Group) -> Result<()> {
        if let Some(name) = &self.name {
            group.name = required_field("name", name)?;
        }
        if let Some(password) = &self.restock_password {
            group.restock_password = Some(password.clone()).filter(|p| !p.is_empty());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettingsResponse {
    pub id: Uuid,
    pub name: String,
    pub has_restock_password: bool,
}

impl GroupSettingsResponse {
    pub fn new(group: &Group) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            has_restock_password: group
                .restock_password
                .as_deref()
                .is_some_and(|password| !password.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}

fn required_field(field_name: &str, value: &str) -> Result<String> {
    let normalized = value.trim().to_string();
    if normalized.is_empty() {
        anyhow::bail!("{field_name} is required");
    }

    Ok(normalized)
}

fn resolve_range(start: Option<DateBound>, end: Option<DateBound>) -> Result<DateWindow> {
    let start = start.map(DateBound::first_instant).transpose()?;
    let end = end.map(DateBound::last_instant).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            anyhow::bail!("end_date must be greater than or equal to start_date");
        }
    }

    Ok(DateWindow { start, end })
}

fn labels(shuttle_type: Option<&ShuttleType>) -> (String, String) {
    match shuttle_type {
        Some(t) => (t.brand.clone(), t.name.clone()),
        None => ("Unknown".to_string(), "Unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 4, 18, 30, 0).unwrap()
    }

    #[test]
    fn settlement_request_rejects_inverted_range() {
        let request = CalculateSettlementRequest {
            start_date: Some(DateBound::Instant(t0())),
            end_date: Some(DateBound::Instant(t0() - Duration::days(1))),
            ..CalculateSettlementRequest::default()
        };
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("end_date"));
    }

    #[test]
    fn blank_dates_mean_unbounded() {
        let request: CalculateSettlementRequest = serde_json::from_value(json!({
            "start_date": "",
            "end_date": "  ",
            "picker_name": ""
        }))
        .unwrap();

        let query = request.validate().unwrap();
        assert_eq!(query.start, None);
        assert_eq!(query.end, None);

        let request: CalculateSettlementRequest =
            serde_json::from_value(json!({ "start_date": null })).unwrap();
        assert_eq!(request.start_date, None);
    }

    #[test]
    fn day_only_dates_cover_whole_days() {
        let request: CalculateSettlementRequest = serde_json::from_value(json!({
            "start_date": "2024-05-01",
            "end_date": "2024-05-01"
        }))
        .unwrap();

        let query = request.validate().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(query.start, Some(start));
        assert!(query.covers(start, "Amy"));
        assert!(query.covers(Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap(), "Amy"));
        assert!(!query.covers(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(), "Amy"));
    }

    #[test]
    fn unparseable_date_is_rejected() {
        let err = serde_json::from_value::<CalculateSettlementRequest>(json!({
            "start_date": "05/01/2024"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn settlement_request_drops_blank_picker_filter() {
        let request = CalculateSettlementRequest {
            picker_name: Some("   ".to_string()),
            ..CalculateSettlementRequest::default()
        };
        assert_eq!(request.validate().unwrap().picker_name, None);

        let request = CalculateSettlementRequest {
            picker_name: Some(" Lin ".to_string()),
            ..CalculateSettlementRequest::default()
        };
        assert_eq!(request.validate().unwrap().picker_name.as_deref(), Some("Lin"));
    }

    #[test]
    fn settlement_request_accepts_rfc3339_dates() {
        let request: CalculateSettlementRequest = serde_json::from_value(json!({
            "start_date": "2024-11-01T00:00:00Z",
            "end_date": "2024-11-30T23:59:59Z"
        }))
        .unwrap();

        let query = request.validate().unwrap();
        assert_eq!(
            query.start,
            Some(Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap())
        );
        assert!(query.end.is_some());
        assert_eq!(query.type_id, None);
    }

    #[test]
    fn restock_defaults_unit_price_to_zero() {
        let request: RestockRequest = serde_json::from_value(json!({
            "type_id": Uuid::nil(),
            "amount": 3,
            "password": "1111"
        }))
        .unwrap();

        let restock = request.validate().unwrap();
        assert_eq!(restock.quantity, 3);
        assert_eq!(restock.unit_price, 0);
    }

    #[test]
    fn restock_rejects_bad_amounts() {
        let mut request = RestockRequest {
            type_id: Uuid::nil(),
            amount: 0,
            unit_price: 10,
            password: "1111".to_string(),
        };
        assert!(request.validate().is_err());

        request.amount = 2;
        request.unit_price = -5;
        assert!(request.validate().unwrap_err().to_string().contains("unit_price"));
    }

    #[test]
    fn restock_caps_amount_and_price() {
        let mut request = RestockRequest {
            type_id: Uuid::nil(),
            amount: MAX_QUANTITY + 1,
            unit_price: 10,
            password: "1111".to_string(),
        };
        assert!(request.validate().unwrap_err().to_string().contains("amount"));

        request.amount = 10_000_000_000;
        assert!(request.validate().is_err());

        request.amount = MAX_QUANTITY;
        request.unit_price = MAX_UNIT_PRICE + 1;
        assert!(request.validate().unwrap_err().to_string().contains("unit_price"));

        request.unit_price = MAX_UNIT_PRICE;
        let restock = request.validate().unwrap();
        assert!(restock.quantity.checked_mul(restock.unit_price).is_some());
    }

    #[test]
    fn pickup_requires_name_and_positive_quantity() {
        let mut request = CreatePickupRequest {
            picker_name: "  ".to_string(),
            quantity: 1,
            type_id: Uuid::nil(),
        };
        assert!(request.validate().unwrap_err().to_string().contains("picker_name"));

        request.picker_name = " Amy ".to_string();
        request.quantity = 0;
        assert!(request.validate().unwrap_err().to_string().contains("quantity"));

        request.quantity = MAX_QUANTITY + 1;
        assert!(request.validate().unwrap_err().to_string().contains("quantity"));

        request.quantity = 2;
        let pickup = request.validate().unwrap();
        assert_eq!(pickup.picker_name, "Amy");
    }

    #[test]
    fn history_query_is_inclusive() {
        let query = RestockHistoryQuery {
            start_date: Some(DateBound::Instant(t0())),
            end_date: Some(DateBound::Instant(t0() + Duration::hours(1))),
        };
        let window = query.validate().unwrap();
        assert!(window.covers(t0()));
        assert!(window.covers(t0() + Duration::hours(1)));
        assert!(!window.covers(t0() + Duration::hours(2)));
    }

    #[test]
    fn group_update_sets_and_clears_password() {
        let mut group = Group {
            id: Uuid::nil(),
            name: "Tuesday Club".to_string(),
            restock_password: None,
        };

        let request = UpdateGroupRequest {
            restock_password: Some("2468".to_string()),
            current_restock_password: Some("1111".to_string()),
            ..UpdateGroupRequest::default()
        };
        assert!(request.touches_password());
        request.apply(&mut group).unwrap();
        assert_eq!(group.restock_password.as_deref(), Some("2468"));
        assert!(GroupSettingsResponse::new(&group).has_restock_password);

        let request = UpdateGroupRequest {
            restock_password: Some(String::new()),
            current_restock_password: Some("2468".to_string()),
            ..UpdateGroupRequest::default()
        };
        request.apply(&mut group).unwrap();
        assert_eq!(group.restock_password, None);
    }

    #[test]
    fn group_rename_requires_a_name() {
        let mut group = Group {
            id: Uuid::nil(),
            name: "Tuesday Club".to_string(),
            restock_password: None,
        };
        let request = UpdateGroupRequest {
            name: Some("  ".to_string()),
            ..UpdateGroupRequest::default()
        };
        assert!(!request.touches_password());
        assert!(request.apply(&mut group).is_err());
        assert_eq!(group.name, "Tuesday Club");
    }

    #[test]
    fn history_item_labels_unknown_types() {
        let batch = RestockBatch {
            id: Uuid::new_v4(),
            sequence: 1,
            type_id: Uuid::new_v4(),
            quantity: 4,
            unit_price: 250,
            created_at: t0(),
        };
        let item = RestockHistoryItem::new(&batch, None);

        assert_eq!(item.brand, "Unknown");
        assert_eq!(item.total_price, Some(1000));
    }
}
