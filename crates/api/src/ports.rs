//! Ports consumed by the account orchestrator.
//!
//! The orchestrator talks to storage and to the address-validation service
//! through these trait objects, so the business rules can be exercised with
//! in-memory doubles while production wires in the Postgres store and the
//! BAN geocoding client.

use async_trait::async_trait;

use carnet_core::{AccountId, Email};

use crate::db::StoreError;
use crate::models::{Account, NewAccount, NewAddress};

/// Outcome of an external address lookup.
///
/// `Unconfirmed` is distinct from `Rejected`: the lookup itself failed, so
/// nothing is known about the address. The orchestrator decides what to do
/// with that (it fails closed and treats it as rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressVerdict {
    /// The top candidate's confidence score clears the threshold.
    Confirmed,
    /// The lookup answered, but no candidate cleared the threshold.
    Rejected,
    /// The lookup could not be completed (transport or parse failure).
    Unconfirmed,
}

/// Storage port for account records and their owned children.
///
/// Implementations must return accounts whose address back-reference
/// (`Address::account_id`) is wired to the owning account's id.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a candidate account, assigning its identity.
    ///
    /// The account row and its address (if any) are written inside a single
    /// transaction. A duplicate email surfaces as `StoreError::Conflict`;
    /// this constraint is the authoritative uniqueness guarantee.
    async fn insert(&self, candidate: NewAccount) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError>;

    /// All stored accounts in storage's natural order (primary key ascending).
    async fn find_all(&self) -> Result<Vec<Account>, StoreError>;

    /// Overwrite name, email, and password; replace the address wholesale
    /// when `patch.address` is supplied (the superseded row is removed).
    /// Orders and notices are untouched.
    async fn update(&self, id: AccountId, patch: NewAccount) -> Result<Account, StoreError>;

    /// Remove the account and, by explicit cascade, its owned address,
    /// orders, and notices. Returns `false` if the id did not exist.
    async fn delete_by_id(&self, id: AccountId) -> Result<bool, StoreError>;

    async fn exists_by_email(&self, email: &Email) -> Result<bool, StoreError>;
}

/// Validation port for candidate addresses.
#[async_trait]
pub trait AddressValidator: Send + Sync {
    /// Produce a verdict for the address. Lookup failures are absorbed
    /// into [`AddressVerdict::Unconfirmed`] rather than surfaced as errors.
    async fn validate(&self, address: &NewAddress) -> AddressVerdict;
}
