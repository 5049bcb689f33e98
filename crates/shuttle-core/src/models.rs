use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OwnershipError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub restock_password: Option<String>,
}

impl Group {
    /// The password restocks must present; an unset or empty one falls back
    /// to `default`.
    pub fn effective_restock_password<'a>(&'a self, default: &'a str) -> &'a str {
        self.restock_password
            .as_deref()
            .filter(|password| !password.is_empty())
            .unwrap_or(default)
    }
}

/// Who may edit a shuttlecock type.
///
/// Seeded types start as `System`; the first user to edit one claims it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Owner {
    System,
    User(Uuid),
}

impl Owner {
    pub fn from_column(owner_id: Option<Uuid>) -> Self {
        owner_id.map_or(Owner::System, Owner::User)
    }

    pub fn as_column(&self) -> Option<Uuid> {
        match self {
            Owner::System => None,
            Owner::User(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShuttleType {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub brand: String,
    pub name: String,
    pub owner: Owner,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ShuttleType {
    pub fn can_edit(&self, editor: Uuid) -> bool {
        match self.owner {
            Owner::System => true,
            Owner::User(owner) => owner == editor,
        }
    }

    /// Renames the type on behalf of `editor`. Editing a system-owned type
    /// transfers it to the editor.
    pub fn apply_edit(
        &mut self,
        editor: Uuid,
        brand: &str,
        name: &str,
    ) -> Result<(), OwnershipError> {
        if !self.can_edit(editor) {
            return Err(OwnershipError::NotOwner { type_id: self.id });
        }

        let brand = brand.trim();
        let name = name.trim();
        if brand.is_empty() {
            return Err(OwnershipError::MissingField("brand"));
        }
        if name.is_empty() {
            return Err(OwnershipError::MissingField("name"));
        }

        self.brand = brand.to_string();
        self.name = name.to_string();
        self.owner = Owner::User(editor);
        Ok(())
    }
}

/// One purchase of a type at a fixed unit price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestockBatch {
    pub id: Uuid,
    /// Insertion order; breaks ties between identical `created_at` values.
    pub sequence: i64,
    pub type_id: Uuid,
    pub quantity: i64,
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

impl RestockBatch {
    pub fn fifo_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }

    /// `None` when `quantity * unit_price` does not fit in an i64.
    pub fn total_price(&self) -> Option<i64> {
        self.quantity.checked_mul(self.unit_price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickupEvent {
    pub id: Uuid,
    pub sequence: i64,
    pub type_id: Uuid,
    pub picker_name: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

impl PickupEvent {
    pub fn fifo_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShuttleType {
    pub brand: String,
    pub name: String,
    pub owner: Owner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRestock {
    pub type_id: Uuid,
    pub quantity: i64,
    pub unit_price: i64,
    /// Backdated entries are allowed; `None` means now.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPickup {
    pub type_id: Uuid,
    pub picker_name: String,
    pub quantity: i64,
    pub created_at: Option<DateTime<Utc>>,
}
