//! Domain types for the account-management API.

pub mod account;

pub use account::{Account, Address, NewAccount, NewAddress, Notice, Order};
