//! Account orchestration service.
//!
//! Owns the business rules around account lifecycle: email uniqueness,
//! address validation before persistence, and the wiring of the
//! account/address relationship. Storage and validation are reached through
//! the ports in [`crate::ports`].

use std::sync::Arc;

use thiserror::Error;

use carnet_core::AccountId;

use crate::db::StoreError;
use crate::models::{Account, NewAccount, NewAddress};
use crate::ports::{AccountStore, AddressValidator, AddressVerdict};

/// Errors raised at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum AccountError {
    /// An account with this email already exists.
    #[error("an account with this email already exists")]
    DuplicateEmail,

    /// The supplied address could not be confirmed.
    #[error("the supplied address is not valid or does not exist")]
    InvalidAddress,

    /// No account with this id.
    #[error("account not found: {0}")]
    NotFound(AccountId),

    /// Storage failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Account orchestrator.
///
/// Cheap to clone; the ports are shared behind `Arc`.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    validator: Arc<dyn AddressValidator>,
}

impl AccountService {
    /// Create a new service over the given ports.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, validator: Arc<dyn AddressValidator>) -> Self {
        Self { store, validator }
    }

    /// Create a new account.
    ///
    /// Sequencing: uniqueness check, then address validation (when an
    /// address is present), then a single transactional write. The store's
    /// unique constraint is the authoritative uniqueness guarantee; the
    /// upfront check is a fast path, so a conflict surfacing from the write
    /// itself is also reported as a duplicate email.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::DuplicateEmail` if the email is taken.
    /// Returns `AccountError::InvalidAddress` if the address fails validation.
    pub async fn create(&self, candidate: NewAccount) -> Result<Account, AccountError> {
        if self.store.exists_by_email(&candidate.email).await? {
            return Err(AccountError::DuplicateEmail);
        }

        if let Some(address) = &candidate.address {
            self.ensure_confirmed(address).await?;
        }

        let account = self.store.insert(candidate).await.map_err(|e| match e {
            StoreError::Conflict(_) => AccountError::DuplicateEmail,
            other => AccountError::Store(other),
        })?;

        tracing::info!(account_id = %account.id, "account created");
        Ok(account)
    }

    /// All stored accounts, in storage's natural order.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::Store` if the query fails.
    pub async fn list(&self) -> Result<Vec<Account>, AccountError> {
        Ok(self.store.find_all().await?)
    }

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the id does not exist.
    pub async fn get(&self, id: AccountId) -> Result<Account, AccountError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AccountError::NotFound(id))
    }

    /// Update an existing account.
    ///
    /// Overwrites first name, last name, email, and password; replaces the
    /// address wholesale when a new one is supplied. A changed email is
    /// re-checked for uniqueness and a replacement address is re-validated
    /// before anything is written.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the id does not exist.
    /// Returns `AccountError::DuplicateEmail` if the new email is taken.
    /// Returns `AccountError::InvalidAddress` if the replacement address
    /// fails validation.
    pub async fn update(&self, id: AccountId, patch: NewAccount) -> Result<Account, AccountError> {
        let existing = self.get(id).await?;

        if patch.email != existing.email && self.store.exists_by_email(&patch.email).await? {
            return Err(AccountError::DuplicateEmail);
        }

        if let Some(address) = &patch.address {
            self.ensure_confirmed(address).await?;
        }

        let account = self.store.update(id, patch).await.map_err(|e| match e {
            StoreError::NotFound => AccountError::NotFound(id),
            StoreError::Conflict(_) => AccountError::DuplicateEmail,
            other => AccountError::Store(other),
        })?;

        tracing::info!(account_id = %account.id, "account updated");
        Ok(account)
    }

    /// Delete an account and, by cascade, its owned address, orders, and
    /// notices.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::NotFound` if the id does not exist.
    pub async fn delete(&self, id: AccountId) -> Result<(), AccountError> {
        let deleted = self.store.delete_by_id(id).await?;
        if !deleted {
            return Err(AccountError::NotFound(id));
        }

        tracing::info!(account_id = %id, "account deleted");
        Ok(())
    }

    /// Named policy: an address is persisted only on a `Confirmed` verdict.
    /// `Unconfirmed` (lookup failure) fails closed and is rejected like a
    /// low-scoring match.
    async fn ensure_confirmed(&self, address: &NewAddress) -> Result<(), AccountError> {
        match self.validator.validate(address).await {
            AddressVerdict::Confirmed => Ok(()),
            AddressVerdict::Rejected => Err(AccountError::InvalidAddress),
            AddressVerdict::Unconfirmed => {
                tracing::warn!("address unconfirmed by lookup, rejecting");
                Err(AccountError::InvalidAddress)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use carnet_core::{AddressId, Email, NoticeId, OrderId};

    use super::*;
    use crate::models::{Address, Notice, Order};

    /// In-memory account store mirroring the Postgres adapter's contract.
    #[derive(Default)]
    struct MemoryStore {
        accounts: Mutex<Vec<Account>>,
        next_id: AtomicUsize,
    }

    impl MemoryStore {
        fn next(&self) -> i64 {
            i64::try_from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1).unwrap()
        }

        fn len(&self) -> usize {
            self.accounts.lock().unwrap().len()
        }

        /// Seed a fully-formed account, bypassing the insert path.
        fn seed(&self, account: Account) {
            self.accounts.lock().unwrap().push(account);
        }
    }

    #[async_trait]
    impl AccountStore for MemoryStore {
        async fn insert(&self, candidate: NewAccount) -> Result<Account, StoreError> {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.iter().any(|a| a.email == candidate.email) {
                return Err(StoreError::Conflict("email already exists".to_owned()));
            }

            let id = AccountId::new(self.next());
            let address = candidate.address.map(|addr| Address {
                id: AddressId::new(self.next()),
                street: addr.street,
                city: addr.city,
                postal_code: addr.postal_code,
                country: addr.country,
                account_id: id,
            });

            let now = Utc::now();
            let account = Account {
                id,
                first_name: candidate.first_name,
                last_name: candidate.last_name,
                email: candidate.email,
                password: candidate.password,
                address,
                orders: Vec::new(),
                notices: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            accounts.push(account.clone());
            Ok(account)
        }

        async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == id)
                .cloned())
        }

        async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError> {
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| &a.email == email)
                .cloned())
        }

        async fn find_all(&self) -> Result<Vec<Account>, StoreError> {
            Ok(self.accounts.lock().unwrap().clone())
        }

        async fn update(&self, id: AccountId, patch: NewAccount) -> Result<Account, StoreError> {
            let new_address_id = patch.address.as_ref().map(|_| AddressId::new(self.next()));
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or(StoreError::NotFound)?;

            account.first_name = patch.first_name;
            account.last_name = patch.last_name;
            account.email = patch.email;
            account.password = patch.password;
            if let Some(addr) = patch.address {
                account.address = Some(Address {
                    id: new_address_id.unwrap(),
                    street: addr.street,
                    city: addr.city,
                    postal_code: addr.postal_code,
                    country: addr.country,
                    account_id: id,
                });
            }
            account.updated_at = Utc::now();
            Ok(account.clone())
        }

        async fn delete_by_id(&self, id: AccountId) -> Result<bool, StoreError> {
            let mut accounts = self.accounts.lock().unwrap();
            let before = accounts.len();
            accounts.retain(|a| a.id != id);
            Ok(accounts.len() < before)
        }

        async fn exists_by_email(&self, email: &Email) -> Result<bool, StoreError> {
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .iter()
                .any(|a| &a.email == email))
        }
    }

    /// Validator double returning a fixed verdict and counting calls.
    struct ScriptedValidator {
        verdict: AddressVerdict,
        calls: AtomicUsize,
    }

    impl ScriptedValidator {
        fn new(verdict: AddressVerdict) -> Self {
            Self {
                verdict,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AddressValidator for ScriptedValidator {
        async fn validate(&self, _address: &NewAddress) -> AddressVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn service(
        verdict: AddressVerdict,
    ) -> (AccountService, Arc<MemoryStore>, Arc<ScriptedValidator>) {
        let store = Arc::new(MemoryStore::default());
        let validator = Arc::new(ScriptedValidator::new(verdict));
        let service = AccountService::new(store.clone(), validator.clone());
        (service, store, validator)
    }

    fn candidate(email: &str, address: Option<NewAddress>) -> NewAccount {
        NewAccount {
            first_name: "Alice".to_owned(),
            last_name: "Dupont".to_owned(),
            email: Email::parse(email).unwrap(),
            password: "x".to_owned(),
            address,
        }
    }

    fn paris_address() -> NewAddress {
        NewAddress {
            street: "1 rue Test".to_owned(),
            city: "Paris".to_owned(),
            postal_code: "75001".to_owned(),
            country: "FR".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_create_wires_address_back_reference() {
        let (service, _store, validator) = service(AddressVerdict::Confirmed);

        let account = service
            .create(candidate("a@d.fr", Some(paris_address())))
            .await
            .unwrap();

        assert_eq!(validator.calls(), 1);
        let address = account.address.unwrap();
        assert_eq!(address.account_id, account.id);
        assert_eq!(address.street, "1 rue Test");
    }

    #[tokio::test]
    async fn test_create_without_address_skips_validator() {
        let (service, store, validator) = service(AddressVerdict::Rejected);

        let account = service.create(candidate("a@d.fr", None)).await.unwrap();

        assert_eq!(validator.calls(), 0);
        assert!(account.address.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_email_no_validation_no_write() {
        let (service, store, validator) = service(AddressVerdict::Confirmed);
        service.create(candidate("a@d.fr", None)).await.unwrap();

        let result = service
            .create(candidate("a@d.fr", Some(paris_address())))
            .await;

        assert!(matches!(result, Err(AccountError::DuplicateEmail)));
        assert_eq!(validator.calls(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejected_address_no_write() {
        let (service, store, validator) = service(AddressVerdict::Rejected);

        let result = service
            .create(candidate("a@d.fr", Some(paris_address())))
            .await;

        assert!(matches!(result, Err(AccountError::InvalidAddress)));
        assert_eq!(validator.calls(), 1);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_create_unconfirmed_address_fails_closed() {
        let (service, store, _validator) = service(AddressVerdict::Unconfirmed);

        let result = service
            .create(candidate("a@d.fr", Some(paris_address())))
            .await;

        assert!(matches!(result, Err(AccountError::InvalidAddress)));
        assert_eq!(store.len(), 0);
    }

    /// Store whose fast-path check always misses, simulating a concurrent
    /// insert slipping between the existence check and the write.
    struct RacyStore(MemoryStore);

    #[async_trait]
    impl AccountStore for RacyStore {
        async fn insert(&self, candidate: NewAccount) -> Result<Account, StoreError> {
            self.0.insert(candidate).await
        }
        async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError> {
            self.0.find_by_email(email).await
        }
        async fn find_all(&self) -> Result<Vec<Account>, StoreError> {
            self.0.find_all().await
        }
        async fn update(&self, id: AccountId, patch: NewAccount) -> Result<Account, StoreError> {
            self.0.update(id, patch).await
        }
        async fn delete_by_id(&self, id: AccountId) -> Result<bool, StoreError> {
            self.0.delete_by_id(id).await
        }
        async fn exists_by_email(&self, _email: &Email) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_create_store_conflict_maps_to_duplicate_email() {
        let store = Arc::new(RacyStore(MemoryStore::default()));
        let service = AccountService::new(
            store,
            Arc::new(ScriptedValidator::new(AddressVerdict::Confirmed)),
        );
        service.create(candidate("a@d.fr", None)).await.unwrap();

        // The fast path misses, but the unique constraint in the store
        // still surfaces the duplicate.
        let result = service.create(candidate("a@d.fr", None)).await;
        assert!(matches!(result, Err(AccountError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_get_nonexistent_is_not_found() {
        let (service, _store, _validator) = service(AddressVerdict::Confirmed);

        let result = service.get(AccountId::new(99)).await;

        assert!(matches!(result, Err(AccountError::NotFound(id)) if id == AccountId::new(99)));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_leaves_storage_unchanged() {
        let (service, store, _validator) = service(AddressVerdict::Confirmed);
        service.create(candidate("a@d.fr", None)).await.unwrap();

        let result = service.delete(AccountId::new(99)).await;

        assert!(matches!(result, Err(AccountError::NotFound(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let (service, store, _validator) = service(AddressVerdict::Confirmed);
        let account = service
            .create(candidate("a@d.fr", Some(paris_address())))
            .await
            .unwrap();

        service.delete(account.id).await.unwrap();

        assert_eq!(store.len(), 0);
        assert!(matches!(
            service.get(account.id).await,
            Err(AccountError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_overwrites_fields_and_keeps_children() {
        let (service, store, _validator) = service(AddressVerdict::Confirmed);
        let now = Utc::now();
        let id = AccountId::new(1);
        store.seed(Account {
            id,
            first_name: "Alice".to_owned(),
            last_name: "Dupont".to_owned(),
            email: Email::parse("a@d.fr").unwrap(),
            password: "x".to_owned(),
            address: Some(Address {
                id: AddressId::new(2),
                street: "1 rue Test".to_owned(),
                city: "Paris".to_owned(),
                postal_code: "75001".to_owned(),
                country: "FR".to_owned(),
                account_id: id,
            }),
            orders: vec![Order {
                id: OrderId::new(3),
                account_id: id,
                reference: "ORD-1".to_owned(),
                created_at: now,
            }],
            notices: vec![Notice {
                id: NoticeId::new(4),
                account_id: id,
                message: "welcome".to_owned(),
                created_at: now,
            }],
            created_at: now,
            updated_at: now,
        });

        let updated = service
            .update(
                id,
                NewAccount {
                    first_name: "Alicia".to_owned(),
                    last_name: "Durand".to_owned(),
                    email: Email::parse("alicia@d.fr").unwrap(),
                    password: "y".to_owned(),
                    address: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Alicia");
        assert_eq!(updated.last_name, "Durand");
        assert_eq!(updated.email.as_str(), "alicia@d.fr");
        assert_eq!(updated.password, "y");
        // No replacement supplied: the existing address survives.
        assert_eq!(updated.address.unwrap().street, "1 rue Test");
        // Children untouched.
        assert_eq!(updated.orders.len(), 1);
        assert_eq!(updated.notices.len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_address_wholesale() {
        let (service, _store, validator) = service(AddressVerdict::Confirmed);
        let account = service
            .create(candidate("a@d.fr", Some(paris_address())))
            .await
            .unwrap();
        let old_address_id = account.address.as_ref().unwrap().id;

        let mut patch = candidate("a@d.fr", Some(paris_address()));
        patch.address.as_mut().unwrap().street = "2 rue Neuve".to_owned();
        let updated = service.update(account.id, patch).await.unwrap();

        let address = updated.address.unwrap();
        assert_eq!(address.street, "2 rue Neuve");
        assert_ne!(address.id, old_address_id);
        assert_eq!(address.account_id, account.id);
        // Both the create and the replacement were validated.
        assert_eq!(validator.calls(), 2);
    }

    #[tokio::test]
    async fn test_update_nonexistent_is_not_found() {
        let (service, _store, _validator) = service(AddressVerdict::Confirmed);

        let result = service
            .update(AccountId::new(42), candidate("a@d.fr", None))
            .await;

        assert!(matches!(result, Err(AccountError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_rechecks_email_uniqueness() {
        let (service, _store, _validator) = service(AddressVerdict::Confirmed);
        service.create(candidate("a@d.fr", None)).await.unwrap();
        let second = service.create(candidate("b@d.fr", None)).await.unwrap();

        let result = service.update(second.id, candidate("a@d.fr", None)).await;

        assert!(matches!(result, Err(AccountError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_update_keeping_same_email_is_allowed() {
        let (service, _store, _validator) = service(AddressVerdict::Confirmed);
        let account = service.create(candidate("a@d.fr", None)).await.unwrap();

        let updated = service
            .update(account.id, candidate("a@d.fr", None))
            .await
            .unwrap();

        assert_eq!(updated.email.as_str(), "a@d.fr");
    }

    #[tokio::test]
    async fn test_update_revalidates_replacement_address() {
        let (service, _store, validator) = service(AddressVerdict::Confirmed);
        let account = service.create(candidate("a@d.fr", None)).await.unwrap();

        let failing = AccountService::new(
            service.store.clone(),
            Arc::new(ScriptedValidator::new(AddressVerdict::Rejected)),
        );
        let result = failing
            .update(account.id, candidate("a@d.fr", Some(paris_address())))
            .await;

        assert!(matches!(result, Err(AccountError::InvalidAddress)));
        // The create path never called the validator (no address supplied).
        assert_eq!(validator.calls(), 0);
        // The rejected update wrote nothing.
        let reloaded = service.get(account.id).await.unwrap();
        assert!(reloaded.address.is_none());
    }

    #[tokio::test]
    async fn test_list_returns_all_accounts() {
        let (service, _store, _validator) = service(AddressVerdict::Confirmed);
        service.create(candidate("a@d.fr", None)).await.unwrap();
        service.create(candidate("b@d.fr", None)).await.unwrap();

        let accounts = service.list().await.unwrap();

        assert_eq!(accounts.len(), 2);
    }

    #[tokio::test]
    async fn test_uniqueness_holds_after_create_sequence() {
        let (service, _store, _validator) = service(AddressVerdict::Confirmed);
        for email in ["a@d.fr", "b@d.fr", "a@d.fr", "b@d.fr", "c@d.fr"] {
            let _ = service.create(candidate(email, None)).await;
        }

        let accounts = service.list().await.unwrap();
        let mut emails: Vec<&str> = accounts.iter().map(|a| a.email.as_str()).collect();
        emails.sort_unstable();
        emails.dedup();
        assert_eq!(emails.len(), accounts.len());
    }
}
