//! Account domain types.
//!
//! These types represent validated domain objects separate from database row
//! types and transport payloads.

use chrono::{DateTime, Utc};
use serde::Serialize;

use carnet_core::{AccountId, AddressId, Email, NoticeId, OrderId};

/// A stored account (domain type).
///
/// The account is the owning side of the account/address relationship: it
/// holds its [`Address`] directly, and the address carries the inverse
/// back-reference (`account_id`) for traversal only.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    /// Unique account ID, assigned by storage on insert.
    pub id: AccountId,
    pub first_name: String,
    pub last_name: String,
    /// Unique across all accounts.
    pub email: Email,
    /// Opaque credential string. Never serialized in responses.
    #[serde(skip_serializing)]
    pub password: String,
    /// Optional owned address.
    pub address: Option<Address>,
    /// Child records with lifecycle bound to the account. Untouched by
    /// update, removed by the delete cascade.
    pub orders: Vec<Order>,
    pub notices: Vec<Notice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A postal address owned by an account.
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    /// Inverse side of the one-to-one relationship. Set by the store at
    /// write time; always equal to the owning account's id once persisted.
    pub account_id: AccountId,
}

/// An order belonging to an account.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// A notice belonging to an account.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub id: NoticeId,
    pub account_id: AccountId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A candidate account, before persistence.
///
/// Used both for create (the full candidate) and for update (the replacement
/// field values; a `None` address means "keep the existing address").
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub password: String,
    pub address: Option<NewAddress>,
}

/// A candidate address, before persistence.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}
