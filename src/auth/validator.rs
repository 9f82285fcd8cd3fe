/// Refresh Token Validation
///
/// Checks, in order, and stops at the first failure:
/// 1. Parse: exactly `ip|secret`, before any store access
/// 2. IP: embedded IP must equal the requesting IP (warns the account holder)
/// 3. Lookup: the account must have a stored credential
/// 4. Expiry: the stored credential must not have expired
/// 5. Hash: the presented token must match the stored digest
///
/// Nothing is written here; the caller rotates on success.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::refresh_token::{parse_refresh_token, refresh_token_matches};
use crate::clock::Clock;
use crate::error::{AppError, TokenError};
use crate::notifier::{IpChangeWarning, SecurityNotifier, PLACEHOLDER_RECIPIENT};
use crate::store::{bounded, CredentialStore};

/// A refresh token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRefresh {
    pub account_id: i64,
    pub client_ip: String,
    /// Stored digest the token matched; rotation swaps against it.
    pub stored_hash: String,
}

pub struct RefreshTokenValidator {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn SecurityNotifier>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl RefreshTokenValidator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn SecurityNotifier>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            store_timeout,
        }
    }

    /// Validate a presented refresh token for `account_id` from `client_ip`.
    ///
    /// # Errors
    /// `MalformedToken`, `IpMismatch`, `NotFound`, `Expired` or
    /// `HashMismatch` token errors; store failures and timeouts as
    /// infrastructure errors.
    pub async fn validate(
        &self,
        account_id: i64,
        presented: &str,
        client_ip: &str,
    ) -> Result<ValidatedRefresh, AppError> {
        let parsed = parse_refresh_token(presented)?;

        if parsed.ip != client_ip {
            tracing::warn!(
                account_id = account_id,
                token_ip = %parsed.ip,
                client_ip = %client_ip,
                "Refresh token presented from a different IP"
            );
            self.warn_account_holder(account_id, parsed.ip, client_ip).await;
            return Err(TokenError::IpMismatch.into());
        }

        let stored = bounded(self.store_timeout, self.store.get_stored_credential(account_id))
            .await?
            .ok_or(TokenError::NotFound)?;

        if stored.is_expired_at(self.clock.now()) {
            tracing::info!(account_id = account_id, "Refresh token expired");
            return Err(TokenError::Expired.into());
        }

        if !refresh_token_matches(presented, &stored.refresh_token_hash) {
            tracing::warn!(account_id = account_id, "Refresh token does not match stored hash");
            return Err(TokenError::HashMismatch.into());
        }

        Ok(ValidatedRefresh {
            account_id,
            client_ip: client_ip.to_string(),
            stored_hash: stored.refresh_token_hash,
        })
    }

    /// Best effort: lookup or delivery failures are logged and dropped.
    async fn warn_account_holder(&self, account_id: i64, previous_ip: &str, current_ip: &str) {
        let recipient = match bounded(self.store_timeout, self.store.get_account_by_id(account_id)).await {
            Ok(Some(account)) => account.email,
            Ok(None) => PLACEHOLDER_RECIPIENT.to_string(),
            Err(e) => {
                tracing::warn!(
                    account_id = account_id,
                    error = %e,
                    "Failed to get account email for IP change warning"
                );
                PLACEHOLDER_RECIPIENT.to_string()
            }
        };

        let warning = IpChangeWarning {
            recipient,
            account_id,
            previous_ip: previous_ip.to_string(),
            current_ip: current_ip.to_string(),
            detected_at: self.clock.now(),
        };

        match tokio::time::timeout(self.store_timeout, self.notifier.notify_ip_change(&warning)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(account_id = account_id, error = %e, "IP change warning not delivered");
            }
            Err(_) => {
                tracing::warn!(account_id = account_id, "IP change warning timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::refresh_token::{generate_refresh_token, hash_refresh_token, OsEntropy};
    use crate::clock::MockClock;
    use crate::error::EmailError;
    use crate::store::{InMemoryCredentialStore, NewAccount, StoredCredential};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Mutex;

    const IP: &str = "10.10.10.10";
    const OTHER_IP: &str = "192.168.1.1";

    #[derive(Default)]
    struct RecordingNotifier {
        warnings: Mutex<Vec<IpChangeWarning>>,
        fail: bool,
    }

    #[async_trait]
    impl SecurityNotifier for RecordingNotifier {
        async fn notify_ip_change(&self, warning: &IpChangeWarning) -> Result<(), EmailError> {
            self.warnings.lock().unwrap().push(warning.clone());
            if self.fail {
                return Err(EmailError::ServiceUnavailable("mail relay down".to_string()));
            }
            Ok(())
        }
    }

    struct Fixture {
        validator: RefreshTokenValidator,
        store: Arc<InMemoryCredentialStore>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<MockClock>,
        account_id: i64,
        token: String,
    }

    async fn fixture(fail_notifications: bool) -> Fixture {
        let store = Arc::new(InMemoryCredentialStore::new());
        let notifier = Arc::new(RecordingNotifier {
            fail: fail_notifications,
            ..Default::default()
        });
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));

        let account_id = store
            .insert_account(NewAccount {
                email: "user@example.com".to_string(),
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                password_hash: "unused".to_string(),
                active: true,
            })
            .await
            .unwrap();

        let token = generate_refresh_token(IP, 32, &OsEntropy).unwrap();
        store
            .put_stored_credential(
                account_id,
                StoredCredential {
                    refresh_token_hash: hash_refresh_token(&token),
                    expires_at: clock.now() + ChronoDuration::days(30),
                },
            )
            .await
            .unwrap();

        let validator = RefreshTokenValidator::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            Duration::from_secs(1),
        );

        Fixture {
            validator,
            store,
            notifier,
            clock,
            account_id,
            token,
        }
    }

    fn token_error(result: Result<ValidatedRefresh, AppError>) -> TokenError {
        match result {
            Err(AppError::Token(e)) => e,
            other => panic!("expected token error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_valid_token_passes() {
        let f = fixture(false).await;
        let validated = f.validator.validate(f.account_id, &f.token, IP).await.unwrap();

        assert_eq!(validated.account_id, f.account_id);
        assert_eq!(validated.stored_hash, hash_refresh_token(&f.token));
    }

    #[tokio::test]
    async fn test_ip_mismatch_notifies_account_holder() {
        let f = fixture(false).await;
        let result = f.validator.validate(f.account_id, &f.token, OTHER_IP).await;

        assert_eq!(token_error(result), TokenError::IpMismatch);
        let warnings = f.notifier.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].recipient, "user@example.com");
        assert_eq!(warnings[0].previous_ip, IP);
        assert_eq!(warnings[0].current_ip, OTHER_IP);
    }

    #[tokio::test]
    async fn test_unknown_account_gets_placeholder_recipient() {
        let f = fixture(false).await;
        let result = f.validator.validate(f.account_id + 100, &f.token, OTHER_IP).await;

        assert_eq!(token_error(result), TokenError::IpMismatch);
        assert_eq!(
            f.notifier.warnings.lock().unwrap()[0].recipient,
            PLACEHOLDER_RECIPIENT
        );
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_change_outcome() {
        let f = fixture(true).await;
        let result = f.validator.validate(f.account_id, &f.token, OTHER_IP).await;

        assert_eq!(token_error(result), TokenError::IpMismatch);
        assert_eq!(f.notifier.warnings.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ip_mismatch_wins_over_expiry() {
        let f = fixture(false).await;
        f.clock.advance(ChronoDuration::days(31));

        let result = f.validator.validate(f.account_id, &f.token, OTHER_IP).await;
        assert_eq!(token_error(result), TokenError::IpMismatch);
    }

    #[tokio::test]
    async fn test_missing_credential_is_not_found() {
        let f = fixture(false).await;
        let token = generate_refresh_token(IP, 32, &OsEntropy).unwrap();

        let result = f.validator.validate(f.account_id + 1, &token, IP).await;
        assert_eq!(token_error(result), TokenError::NotFound);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let f = fixture(false).await;

        f.clock.advance(ChronoDuration::days(30));
        assert!(f.validator.validate(f.account_id, &f.token, IP).await.is_ok());

        f.clock.advance(ChronoDuration::seconds(1));
        let result = f.validator.validate(f.account_id, &f.token, IP).await;
        assert_eq!(token_error(result), TokenError::Expired);
    }

    #[tokio::test]
    async fn test_foreign_token_is_hash_mismatch() {
        let f = fixture(false).await;
        let forged = generate_refresh_token(IP, 32, &OsEntropy).unwrap();

        let result = f.validator.validate(f.account_id, &forged, IP).await;
        assert_eq!(token_error(result), TokenError::HashMismatch);
    }

    #[tokio::test]
    async fn test_malformed_token_rejected_without_side_effects() {
        let f = fixture(false).await;

        for raw in ["", "no-separator", "10.10.10.10|a|b"] {
            let result = f.validator.validate(f.account_id, raw, OTHER_IP).await;
            assert_eq!(token_error(result), TokenError::MalformedToken);
        }
        assert!(f.notifier.warnings.lock().unwrap().is_empty());
        assert!(f.store.get_stored_credential(f.account_id).await.unwrap().is_some());
    }
}
