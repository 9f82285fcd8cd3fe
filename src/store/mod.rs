/// Credential Store
///
/// Persistence seam for accounts and their single current refresh
/// credential. The engine only talks to `CredentialStore`; Postgres and
/// in-memory implementations live in the submodules.

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, InfrastructureError};

/// A user account as the credential engine sees it.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password_hash", &"[REDACTED]")
            .field("active", &self.active)
            .finish()
    }
}

/// Fields needed to create an account. The password is already hashed.
#[derive(Clone)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub active: bool,
}

/// The one live refresh credential of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when the account has no refresh credential (or does not exist).
    async fn get_stored_credential(&self, account_id: i64) -> Result<Option<StoredCredential>, AppError>;

    /// Unconditionally overwrite the account's refresh credential.
    /// Fails with `UserNotExist` if there is no such account.
    async fn put_stored_credential(&self, account_id: i64, credential: StoredCredential) -> Result<(), AppError>;

    /// Overwrite the refresh credential only if the stored hash still equals
    /// `expected_hash`. Returns whether the swap happened.
    async fn replace_stored_credential(
        &self,
        account_id: i64,
        expected_hash: &str,
        credential: StoredCredential,
    ) -> Result<bool, AppError>;

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn get_account_by_id(&self, account_id: i64) -> Result<Option<Account>, AppError>;

    /// Create an account, returning its id. Duplicate emails fail with
    /// `UniqueConstraintViolation`.
    async fn insert_account(&self, account: NewAccount) -> Result<i64, AppError>;
}

/// Run a store call, failing with `Timeout` once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(InfrastructureError::Timeout.into())
        }
    }
}
