use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{Account, CredentialStore, NewAccount, StoredCredential};
use crate::error::{AppError, AuthError, InfrastructureError};

#[derive(Default)]
struct State {
    accounts: HashMap<i64, Account>,
    credentials: HashMap<i64, StoredCredential>,
    next_id: i64,
}

/// Process-local store for tests and local runs.
///
/// A single mutex guards accounts and credentials, so every operation,
/// including the compare-and-swap, is atomic.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    state: Mutex<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| InfrastructureError::Store("in-memory store lock poisoned".to_string()).into())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_stored_credential(&self, account_id: i64) -> Result<Option<StoredCredential>, AppError> {
        Ok(self.lock()?.credentials.get(&account_id).cloned())
    }

    async fn put_stored_credential(&self, account_id: i64, credential: StoredCredential) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(AuthError::UserNotExist.into());
        }

        state.credentials.insert(account_id, credential);
        Ok(())
    }

    async fn replace_stored_credential(
        &self,
        account_id: i64,
        expected_hash: &str,
        credential: StoredCredential,
    ) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        match state.credentials.get(&account_id) {
            Some(current) if current.refresh_token_hash == expected_hash => {
                state.credentials.insert(account_id, credential);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn get_account_by_id(&self, account_id: i64) -> Result<Option<Account>, AppError> {
        Ok(self.lock()?.accounts.get(&account_id).cloned())
    }

    async fn insert_account(&self, account: NewAccount) -> Result<i64, AppError> {
        let mut state = self.lock()?;

        if state.accounts.values().any(|existing| existing.email == account.email) {
            return Err(InfrastructureError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            )
            .into());
        }

        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();
        state.accounts.insert(
            id,
            Account {
                id,
                email: account.email,
                first_name: account.first_name,
                last_name: account.last_name,
                password_hash: account.password_hash,
                active: account.active,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }
}
