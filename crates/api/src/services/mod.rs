//! Business services.
//!
//! - [`accounts`] - Account orchestration (uniqueness, validation, lifecycle)
//! - [`geocoding`] - BAN geocoding client and address-validation adapter

pub mod accounts;
pub mod geocoding;

pub use accounts::{AccountError, AccountService};
pub use geocoding::{BanAddressValidator, BanClient, GeocodingError};
