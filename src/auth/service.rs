/// Credential Service
///
/// Orchestrates login, first issuance and rotation on top of the password
/// hasher, token codec, refresh validator and credential store.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::jwt::{TokenCodec, TokenPair};
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::hash_refresh_token;
use crate::auth::validator::RefreshTokenValidator;
use crate::error::{AppError, AuthError, TokenError, ValidationError};
use crate::notifier::SecurityNotifier;
use crate::store::{bounded, CredentialStore, NewAccount, StoredCredential};
use crate::validators::{parse_client_ip, parse_email};

/// Tokens handed to the caller, plus the account they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    pub account_id: i64,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct RegistrationRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    validator: RefreshTokenValidator,
    store_timeout: Duration,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: TokenCodec,
        hasher: PasswordHasher,
        notifier: Arc<dyn SecurityNotifier>,
        store_timeout: Duration,
    ) -> Self {
        let validator = RefreshTokenValidator::new(
            store.clone(),
            notifier,
            codec.clock().clone(),
            store_timeout,
        );

        Self {
            store,
            codec,
            hasher,
            validator,
            store_timeout,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an account with a bcrypt-hashed password.
    pub async fn register(&self, request: RegistrationRequest) -> Result<i64, AppError> {
        let email = parse_email(&request.email)?;
        let password_hash = self.hasher.hash_password(&request.password)?;

        let account_id = bounded(
            self.store_timeout,
            self.store.insert_account(NewAccount {
                email,
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                password_hash,
                active: true,
            }),
        )
        .await?;

        tracing::info!(account_id = account_id, "Account registered");
        Ok(account_id)
    }

    /// Log in with email and password and receive a fresh token pair.
    ///
    /// # Errors
    /// - `UserNotExist` if no account has this email
    /// - `InvalidPassword` if the password does not match
    /// - `InvalidIp` if the client IP is unusable
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        client_ip: &str,
    ) -> Result<IssuedCredentials, AppError> {
        let email = parse_email(email)?;
        if password.is_empty() {
            return Err(ValidationError::EmptyField("password".to_string()).into());
        }
        let client_ip = parse_client_ip(client_ip)?;

        let account = bounded(self.store_timeout, self.store.get_account_by_email(&email))
            .await?
            .ok_or(AuthError::UserNotExist)?;

        if !self.hasher.verify_password(password, &account.password_hash)? {
            tracing::warn!(account_id = account.id, "Password mismatch on login");
            return Err(AuthError::InvalidPassword.into());
        }

        let tokens = self.issue_and_store(account.id, &client_ip).await?;
        tracing::info!(account_id = account.id, "Account authenticated");

        Ok(IssuedCredentials {
            account_id: account.id,
            tokens,
        })
    }

    /// Issue a token pair for an existing account without a password check.
    pub async fn provide(&self, account_id: i64, client_ip: &str) -> Result<IssuedCredentials, AppError> {
        let client_ip = parse_client_ip(client_ip)?;

        let account = bounded(self.store_timeout, self.store.get_account_by_id(account_id))
            .await?
            .ok_or(AuthError::UserNotExist)?;

        let tokens = self.issue_and_store(account.id, &client_ip).await?;
        tracing::info!(account_id = account.id, "Tokens provided");

        Ok(IssuedCredentials {
            account_id: account.id,
            tokens,
        })
    }

    /// Exchange a valid refresh token for a new pair. The presented token is
    /// unusable afterwards.
    ///
    /// The new credential is written with a compare-and-swap on the hash that
    /// was validated, so of two concurrent refreshes with the same token only
    /// one commits; the other fails with `HashMismatch`.
    pub async fn refresh(
        &self,
        account_id: i64,
        presented: &str,
        client_ip: &str,
    ) -> Result<IssuedCredentials, AppError> {
        let client_ip = parse_client_ip(client_ip)?;
        let validated = self.validator.validate(account_id, presented, &client_ip).await?;

        let tokens = self.codec.issue_pair(&validated.client_ip)?;
        let rotated = bounded(
            self.store_timeout,
            self.store.replace_stored_credential(
                account_id,
                &validated.stored_hash,
                self.stored_credential_for(&tokens.refresh_token),
            ),
        )
        .await?;

        if !rotated {
            tracing::warn!(account_id = account_id, "Refresh token rotated concurrently");
            return Err(TokenError::HashMismatch.into());
        }

        tracing::info!(account_id = account_id, "Tokens refreshed");

        Ok(IssuedCredentials {
            account_id,
            tokens,
        })
    }

    async fn issue_and_store(&self, account_id: i64, client_ip: &str) -> Result<TokenPair, AppError> {
        let tokens = self.codec.issue_pair(client_ip)?;

        bounded(
            self.store_timeout,
            self.store
                .put_stored_credential(account_id, self.stored_credential_for(&tokens.refresh_token)),
        )
        .await?;

        Ok(tokens)
    }

    fn stored_credential_for(&self, refresh_token: &str) -> StoredCredential {
        StoredCredential {
            refresh_token_hash: hash_refresh_token(refresh_token),
            expires_at: self.codec.clock().now() + self.codec.refresh_ttl(),
        }
    }
}
