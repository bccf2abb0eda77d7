//! HTTP route handlers for the account API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health              - Liveness check
//! GET    /health/ready        - Readiness check (verifies database)
//!
//! # Accounts
//! POST   /api/accounts        - Create account (201, 400 on duplicate email
//!                               or invalid address)
//! GET    /api/accounts        - List all accounts (200)
//! GET    /api/accounts/{id}   - Get account (200, 404)
//! PUT    /api/accounts/{id}   - Update account (200, 400, 404)
//! DELETE /api/accounts/{id}   - Delete account (204, 404)
//! ```

pub mod accounts;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(accounts::list).post(accounts::create))
        .route(
            "/{id}",
            get(accounts::get_by_id)
                .put(accounts::update)
                .delete(accounts::remove),
        )
}

/// Create all routes for the API.
pub fn routes() -> Router<AppState> {
    Router::new().nest("/api/accounts", account_routes())
}
