//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::PgAccountStore;
use crate::ports::{AccountStore, AddressValidator};
use crate::services::{AccountService, BanAddressValidator, BanClient, GeocodingError};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the database pool and the account service.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    accounts: AccountService,
}

impl AppState {
    /// Create the production state: Postgres store + BAN validator.
    ///
    /// # Errors
    ///
    /// Returns an error if the geocoding HTTP client fails to build.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, GeocodingError> {
        let store = Arc::new(PgAccountStore::new(pool.clone()));
        let validator = Arc::new(BanAddressValidator::new(BanClient::new(&config.geocoding)?));

        Ok(Self::with_ports(config, pool, store, validator))
    }

    /// Create state over explicit port implementations.
    ///
    /// Used by tests to inject in-memory doubles.
    #[must_use]
    pub fn with_ports(
        config: ApiConfig,
        pool: PgPool,
        store: Arc<dyn AccountStore>,
        validator: Arc<dyn AddressValidator>,
    ) -> Self {
        let accounts = AccountService::new(store, validator);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                accounts,
            }),
        }
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the account service.
    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.inner.accounts
    }
}
