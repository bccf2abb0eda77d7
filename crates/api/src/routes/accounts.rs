//! Account route handlers.
//!
//! JSON API endpoints for account management. Domain outcomes map to
//! transport statuses in [`crate::error`].

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use carnet_core::{AccountId, Email};

use crate::error::{AppError, Result};
use crate::models::{Account, NewAccount, NewAddress};
use crate::state::AppState;

/// Request body for create and update.
///
/// The email arrives as a raw string so a malformed value is a 400 with a
/// parse message, not a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct AccountPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub address: Option<NewAddress>,
}

impl AccountPayload {
    fn into_candidate(self) -> Result<NewAccount> {
        let email = Email::parse(&self.email)
            .map_err(|e| AppError::BadRequest(format!("invalid email: {e}")))?;

        Ok(NewAccount {
            first_name: self.first_name,
            last_name: self.last_name,
            email,
            password: self.password,
            address: self.address,
        })
    }
}

/// Create a new account.
///
/// POST /api/accounts
///
/// # Errors
///
/// Returns 400 on a duplicate email, an invalid address, or a malformed
/// email.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<AccountPayload>,
) -> Result<(StatusCode, Json<Account>)> {
    let candidate = payload.into_candidate()?;
    let account = state.accounts().create(candidate).await?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// List all accounts.
///
/// GET /api/accounts
///
/// # Errors
///
/// Returns 500 if storage fails.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Account>>> {
    let accounts = state.accounts().list().await?;
    Ok(Json(accounts))
}

/// Get an account by id.
///
/// GET /api/accounts/{id}
///
/// # Errors
///
/// Returns 404 if the account does not exist.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Account>> {
    let account = state.accounts().get(AccountId::new(id)).await?;
    Ok(Json(account))
}

/// Update an account.
///
/// PUT /api/accounts/{id}
///
/// # Errors
///
/// Returns 404 on an unknown id, 400 on a duplicate email or an invalid
/// replacement address.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AccountPayload>,
) -> Result<Json<Account>> {
    let patch = payload.into_candidate()?;
    let account = state.accounts().update(AccountId::new(id), patch).await?;

    Ok(Json(account))
}

/// Delete an account and its owned children.
///
/// DELETE /api/accounts/{id}
///
/// # Errors
///
/// Returns 404 if the account does not exist.
pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    state.accounts().delete(AccountId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
