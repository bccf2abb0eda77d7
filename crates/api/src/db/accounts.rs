//! Postgres implementation of the account storage port.
//!
//! All queries are runtime-checked `query_as` calls against the schema in
//! `crates/api/migrations/`. Writes that touch more than one table run inside
//! a single transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use carnet_core::{AccountId, AddressId, Email, NoticeId, OrderId};

use super::StoreError;
use crate::models::{Account, Address, NewAccount, NewAddress, Notice, Order};
use crate::ports::AccountStore;

const ACCOUNT_COLUMNS: &str = "id, first_name, last_name, email, password, created_at, updated_at";

/// Postgres-backed account store.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Create a new store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, candidate: NewAccount) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: AccountRow = sqlx::query_as(
            "INSERT INTO accounts (first_name, last_name, email, password) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, first_name, last_name, email, password, created_at, updated_at",
        )
        .bind(&candidate.first_name)
        .bind(&candidate.last_name)
        .bind(candidate.email.as_str())
        .bind(&candidate.password)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_on_unique)?;

        let address = match &candidate.address {
            Some(addr) => Some(insert_address(&mut tx, row.id, addr).await?),
            None => None,
        };

        tx.commit().await?;

        assemble(row, address, Vec::new(), Vec::new())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.load_one(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.load_one(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let addresses: Vec<AddressRow> =
            sqlx::query_as("SELECT id, account_id, street, city, postal_code, country FROM addresses")
                .fetch_all(&self.pool)
                .await?;
        let orders: Vec<OrderRow> =
            sqlx::query_as("SELECT id, account_id, reference, created_at FROM orders ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;
        let notices: Vec<NoticeRow> =
            sqlx::query_as("SELECT id, account_id, message, created_at FROM notices ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        let mut address_by_account: HashMap<i64, AddressRow> = addresses
            .into_iter()
            .map(|a| (a.account_id, a))
            .collect();
        let mut orders_by_account: HashMap<i64, Vec<OrderRow>> = HashMap::new();
        for order in orders {
            orders_by_account.entry(order.account_id).or_default().push(order);
        }
        let mut notices_by_account: HashMap<i64, Vec<NoticeRow>> = HashMap::new();
        for notice in notices {
            notices_by_account.entry(notice.account_id).or_default().push(notice);
        }

        rows.into_iter()
            .map(|row| {
                let address = address_by_account.remove(&row.id);
                let orders = orders_by_account.remove(&row.id).unwrap_or_default();
                let notices = notices_by_account.remove(&row.id).unwrap_or_default();
                assemble(row, address.map(Address::from), orders, notices)
            })
            .collect()
    }

    async fn update(&self, id: AccountId, patch: NewAccount) -> Result<Account, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<AccountRow> = sqlx::query_as(
            "UPDATE accounts \
             SET first_name = $1, last_name = $2, email = $3, password = $4, updated_at = now() \
             WHERE id = $5 \
             RETURNING id, first_name, last_name, email, password, created_at, updated_at",
        )
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(patch.email.as_str())
        .bind(&patch.password)
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(conflict_on_unique)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let address = if let Some(addr) = &patch.address {
            // Wholesale replacement: the superseded row is removed (orphan removal).
            sqlx::query("DELETE FROM addresses WHERE account_id = $1")
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
            Some(insert_address(&mut tx, row.id, addr).await?)
        } else {
            let existing: Option<AddressRow> = sqlx::query_as(
                "SELECT id, account_id, street, city, postal_code, country \
                 FROM addresses WHERE account_id = $1",
            )
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
            existing.map(Address::from)
        };

        let orders: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, account_id, reference, created_at FROM orders \
             WHERE account_id = $1 ORDER BY id ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&mut *tx)
        .await?;
        let notices: Vec<NoticeRow> = sqlx::query_as(
            "SELECT id, account_id, message, created_at FROM notices \
             WHERE account_id = $1 ORDER BY id ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        assemble(row, address, orders, notices)
    }

    async fn delete_by_id(&self, id: AccountId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Explicit cascade: children first, then the account row.
        for table in ["orders", "notices", "addresses"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE account_id = $1"))
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists_by_email(&self, email: &Email) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

impl PgAccountStore {
    /// Load the owned children for a single account row and assemble it.
    async fn load_one(&self, row: AccountRow) -> Result<Account, StoreError> {
        let address: Option<AddressRow> = sqlx::query_as(
            "SELECT id, account_id, street, city, postal_code, country \
             FROM addresses WHERE account_id = $1",
        )
        .bind(row.id)
        .fetch_optional(&self.pool)
        .await?;
        let orders: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, account_id, reference, created_at FROM orders \
             WHERE account_id = $1 ORDER BY id ASC",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        let notices: Vec<NoticeRow> = sqlx::query_as(
            "SELECT id, account_id, message, created_at FROM notices \
             WHERE account_id = $1 ORDER BY id ASC",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        assemble(row, address.map(Address::from), orders, notices)
    }
}

/// Map a unique-constraint violation to `StoreError::Conflict`.
fn conflict_on_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict("email already exists".to_owned());
    }
    StoreError::Database(e)
}

/// Insert an address row wired to its owning account.
async fn insert_address(
    tx: &mut Transaction<'_, Postgres>,
    account_id: i64,
    address: &NewAddress,
) -> Result<Address, StoreError> {
    let row: AddressRow = sqlx::query_as(
        "INSERT INTO addresses (account_id, street, city, postal_code, country) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, account_id, street, city, postal_code, country",
    )
    .bind(account_id)
    .bind(&address.street)
    .bind(&address.city)
    .bind(&address.postal_code)
    .bind(&address.country)
    .fetch_one(&mut **tx)
    .await?;

    Ok(Address::from(row))
}

fn assemble(
    row: AccountRow,
    address: Option<Address>,
    orders: Vec<OrderRow>,
    notices: Vec<NoticeRow>,
) -> Result<Account, StoreError> {
    let email = Email::parse(&row.email)
        .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;

    Ok(Account {
        id: AccountId::new(row.id),
        first_name: row.first_name,
        last_name: row.last_name,
        email,
        password: row.password,
        address,
        orders: orders.into_iter().map(Order::from).collect(),
        notices: notices.into_iter().map(Notice::from).collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: i64,
    account_id: i64,
    street: String,
    city: String,
    postal_code: String,
    country: String,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Self {
            id: AddressId::new(row.id),
            street: row.street,
            city: row.city,
            postal_code: row.postal_code,
            country: row.country,
            account_id: AccountId::new(row.account_id),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    account_id: i64,
    reference: String,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            account_id: AccountId::new(row.account_id),
            reference: row.reference,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NoticeRow {
    id: i64,
    account_id: i64,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<NoticeRow> for Notice {
    fn from(row: NoticeRow) -> Self {
        Self {
            id: NoticeId::new(row.id),
            account_id: AccountId::new(row.account_id),
            message: row.message,
            created_at: row.created_at,
        }
    }
}
