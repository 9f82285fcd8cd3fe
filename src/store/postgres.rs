use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Account, CredentialStore, NewAccount, StoredCredential};
use crate::error::{AppError, AuthError};

type AccountRow = (i64, String, String, String, String, bool, DateTime<Utc>, DateTime<Utc>);

/// Postgres-backed store over the `accounts` table
/// (see `migrations/20240101000000_create_accounts.sql`).
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_account(row: AccountRow) -> Account {
    let (id, email, first_name, last_name, password_hash, active, created_at, updated_at) = row;
    Account {
        id,
        email,
        first_name,
        last_name,
        password_hash,
        active,
        created_at,
        updated_at,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_stored_credential(&self, account_id: i64) -> Result<Option<StoredCredential>, AppError> {
        let row = sqlx::query_as::<_, (Option<String>, Option<DateTime<Utc>>)>(
            r#"
            SELECT refresh_token_hash, refresh_token_expires_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((Some(refresh_token_hash), Some(expires_at))) => Some(StoredCredential {
                refresh_token_hash,
                expires_at,
            }),
            _ => None,
        })
    }

    async fn put_stored_credential(&self, account_id: i64, credential: StoredCredential) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token_hash = $1, refresh_token_expires_at = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(&credential.refresh_token_hash)
        .bind(credential.expires_at)
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotExist.into());
        }

        Ok(())
    }

    async fn replace_stored_credential(
        &self,
        account_id: i64,
        expected_hash: &str,
        credential: StoredCredential,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token_hash = $1, refresh_token_expires_at = $2, updated_at = $3
            WHERE id = $4 AND refresh_token_hash = $5
            "#,
        )
        .bind(&credential.refresh_token_hash)
        .bind(credential.expires_at)
        .bind(Utc::now())
        .bind(account_id)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, first_name, last_name, password_hash, active, created_at, updated_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_account))
    }

    async fn get_account_by_id(&self, account_id: i64) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, first_name, last_name, password_hash, active, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_account))
    }

    async fn insert_account(&self, account: NewAccount) -> Result<i64, AppError> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO accounts (email, first_name, last_name, password_hash, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&account.email)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.password_hash)
        .bind(account.active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
