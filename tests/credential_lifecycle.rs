//! Credential lifecycle tests against the in-memory store

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auth_service::auth::{CredentialService, PasswordHasher, RegistrationRequest, TokenCodec};
use auth_service::clock::{Clock, MockClock};
use auth_service::configuration::{PasswordSettings, TokenSettings};
use auth_service::error::{
    AppError, AuthError, EmailError, InfrastructureError, TokenError, ValidationError,
};
use auth_service::notifier::{IpChangeWarning, SecurityNotifier};
use auth_service::store::{
    Account, CredentialStore, InMemoryCredentialStore, NewAccount, StoredCredential,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::Barrier;

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "correct-horse-battery";
const IP: &str = "10.10.10.10";
const OTHER_IP: &str = "192.168.1.1";

#[derive(Default)]
struct RecordingNotifier {
    warnings: Mutex<Vec<IpChangeWarning>>,
}

#[async_trait]
impl SecurityNotifier for RecordingNotifier {
    async fn notify_ip_change(&self, warning: &IpChangeWarning) -> Result<(), EmailError> {
        self.warnings.lock().unwrap().push(warning.clone());
        Ok(())
    }
}

/// Wraps the in-memory store: counts stored-credential lookups, can hold
/// lookups until two callers arrive, and can stall every call.
struct InstrumentedStore {
    inner: InMemoryCredentialStore,
    lookups: AtomicUsize,
    rendezvous: Barrier,
    hold_lookups: AtomicBool,
    stall: AtomicBool,
}

impl InstrumentedStore {
    fn new() -> Self {
        Self {
            inner: InMemoryCredentialStore::new(),
            lookups: AtomicUsize::new(0),
            rendezvous: Barrier::new(2),
            hold_lookups: AtomicBool::new(false),
            stall: AtomicBool::new(false),
        }
    }

    async fn maybe_stall(&self) {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}

#[async_trait]
impl CredentialStore for InstrumentedStore {
    async fn get_stored_credential(&self, account_id: i64) -> Result<Option<StoredCredential>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        let stored = self.inner.get_stored_credential(account_id).await;
        if self.hold_lookups.load(Ordering::SeqCst) {
            self.rendezvous.wait().await;
        }
        stored
    }

    async fn put_stored_credential(&self, account_id: i64, credential: StoredCredential) -> Result<(), AppError> {
        self.maybe_stall().await;
        self.inner.put_stored_credential(account_id, credential).await
    }

    async fn replace_stored_credential(
        &self,
        account_id: i64,
        expected_hash: &str,
        credential: StoredCredential,
    ) -> Result<bool, AppError> {
        self.maybe_stall().await;
        self.inner
            .replace_stored_credential(account_id, expected_hash, credential)
            .await
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        self.maybe_stall().await;
        self.inner.get_account_by_email(email).await
    }

    async fn get_account_by_id(&self, account_id: i64) -> Result<Option<Account>, AppError> {
        self.maybe_stall().await;
        self.inner.get_account_by_id(account_id).await
    }

    async fn insert_account(&self, account: NewAccount) -> Result<i64, AppError> {
        self.maybe_stall().await;
        self.inner.insert_account(account).await
    }
}

struct TestApp {
    service: CredentialService,
    store: Arc<InstrumentedStore>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<MockClock>,
    account_id: i64,
}

async fn spawn_service() -> TestApp {
    let store = Arc::new(InstrumentedStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(MockClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));

    let codec = TokenCodec::new(
        &TokenSettings {
            secret: "integration-test-secret".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 2_592_000,
            refresh_token_bytes: 32,
        },
        clock.clone(),
    )
    .expect("Failed to build token codec");

    let hasher = PasswordHasher::new(&PasswordSettings {
        min_length: 8,
        hash_work_factor: 4,
    });

    let service = CredentialService::new(
        store.clone(),
        codec,
        hasher,
        notifier.clone(),
        Duration::from_millis(200),
    );

    let account_id = service
        .register(RegistrationRequest {
            email: EMAIL.to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .expect("Failed to register account");

    TestApp {
        service,
        store,
        notifier,
        clock,
        account_id,
    }
}

fn token_error<T: std::fmt::Debug>(result: Result<T, AppError>) -> TokenError {
    match result {
        Err(AppError::Token(e)) => e,
        other => panic!("expected token error, got {:?}", other),
    }
}

#[tokio::test]
async fn login_then_refresh_after_access_expiry() {
    let app = spawn_service().await;

    let first = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();
    assert_eq!(first.account_id, app.account_id);
    let first_claims = app
        .service
        .codec()
        .verify_access_token(&first.tokens.access_token)
        .unwrap();
    assert_eq!(first_claims.ip, IP);

    app.clock.advance(ChronoDuration::minutes(20));
    assert_eq!(
        token_error(app.service.codec().verify_access_token(&first.tokens.access_token)),
        TokenError::Invalid
    );

    let second = app
        .service
        .refresh(app.account_id, &first.tokens.refresh_token, IP)
        .await
        .unwrap();
    let second_claims = app
        .service
        .codec()
        .verify_access_token(&second.tokens.access_token)
        .unwrap();
    assert!(second_claims.exp > first_claims.exp);
    assert_ne!(second.tokens.refresh_token, first.tokens.refresh_token);

    let replay = app
        .service
        .refresh(app.account_id, &first.tokens.refresh_token, IP)
        .await;
    assert_eq!(token_error(replay), TokenError::HashMismatch);
}

#[tokio::test]
async fn refresh_at_29_days_is_single_use() {
    let app = spawn_service().await;
    let issued = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();

    app.clock.advance(ChronoDuration::days(29));
    let rotated = app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, IP)
        .await
        .unwrap();

    // The new credential's lifetime starts at rotation.
    let stored = app
        .store
        .get_stored_credential(app.account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.expires_at, app.clock.now() + ChronoDuration::days(30));

    let reused = app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, IP)
        .await;
    assert_eq!(token_error(reused), TokenError::HashMismatch);

    assert!(app
        .service
        .refresh(app.account_id, &rotated.tokens.refresh_token, IP)
        .await
        .is_ok());
}

#[tokio::test]
async fn refresh_after_refresh_ttl_is_expired() {
    let app = spawn_service().await;
    let issued = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();

    app.clock.advance(ChronoDuration::days(30) + ChronoDuration::seconds(1));
    let result = app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, IP)
        .await;
    assert_eq!(token_error(result), TokenError::Expired);
}

#[tokio::test]
async fn refresh_from_other_ip_is_rejected_and_reported() {
    let app = spawn_service().await;
    let issued = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();

    let result = app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, OTHER_IP)
        .await;
    assert_eq!(token_error(result), TokenError::IpMismatch);

    {
        let warnings = app.notifier.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].recipient, EMAIL);
        assert_eq!(warnings[0].current_ip, OTHER_IP);
    }

    // No rotation happened: the token still works from the original IP.
    assert!(app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, IP)
        .await
        .is_ok());
}

#[tokio::test]
async fn refresh_from_other_ip_is_rejected_even_when_expired() {
    let app = spawn_service().await;
    let issued = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();

    app.clock.advance(ChronoDuration::days(60));
    let result = app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, OTHER_IP)
        .await;
    assert_eq!(token_error(result), TokenError::IpMismatch);
}

#[tokio::test]
async fn malformed_refresh_token_fails_before_store_lookup() {
    let app = spawn_service().await;
    app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();
    let lookups_before = app.store.lookups.load(Ordering::SeqCst);

    for raw in ["", "no-separator", "10.10.10.10|abc|def", "|abc", "10.10.10.10|"] {
        let result = app.service.refresh(app.account_id, raw, IP).await;
        assert_eq!(token_error(result), TokenError::MalformedToken, "{:?}", raw);
    }

    assert_eq!(app.store.lookups.load(Ordering::SeqCst), lookups_before);
}

#[tokio::test]
async fn concurrent_refreshes_commit_exactly_once() {
    let app = spawn_service().await;
    let issued = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();

    // Both refreshes read the stored credential before either writes.
    app.store.hold_lookups.store(true, Ordering::SeqCst);
    let (a, b) = tokio::join!(
        app.service
            .refresh(app.account_id, &issued.tokens.refresh_token, IP),
        app.service
            .refresh(app.account_id, &issued.tokens.refresh_token, IP),
    );
    app.store.hold_lookups.store(false, Ordering::SeqCst);

    let (winner, loser) = match (a, b) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        (a, b) => panic!("expected exactly one success, got {:?} and {:?}", a, b),
    };
    assert_eq!(loser.token_error(), Some(&TokenError::HashMismatch));

    assert!(app
        .service
        .refresh(app.account_id, &winner.tokens.refresh_token, IP)
        .await
        .is_ok());
}

#[tokio::test]
async fn slow_store_surfaces_timeout() {
    let app = spawn_service().await;
    app.store.stall.store(true, Ordering::SeqCst);

    let result = app.service.authenticate(EMAIL, PASSWORD, IP).await;
    assert!(matches!(
        result,
        Err(AppError::Infrastructure(InfrastructureError::Timeout))
    ));
}

#[tokio::test]
async fn authenticate_rejects_bad_credentials() {
    let app = spawn_service().await;

    assert!(matches!(
        app.service.authenticate("nobody@example.com", PASSWORD, IP).await,
        Err(AppError::Auth(AuthError::UserNotExist))
    ));
    assert!(matches!(
        app.service.authenticate(EMAIL, "wrong-password", IP).await,
        Err(AppError::Auth(AuthError::InvalidPassword))
    ));
    assert!(matches!(
        app.service.authenticate(EMAIL, PASSWORD, "not-an-ip").await,
        Err(AppError::Validation(ValidationError::InvalidIp))
    ));
}

#[tokio::test]
async fn provide_issues_pair_for_existing_account_only() {
    let app = spawn_service().await;

    let issued = app.service.provide(app.account_id, IP).await.unwrap();
    assert!(issued.tokens.refresh_token.starts_with("10.10.10.10|"));
    assert!(app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, IP)
        .await
        .is_ok());

    assert!(matches!(
        app.service.provide(app.account_id + 1, IP).await,
        Err(AppError::Auth(AuthError::UserNotExist))
    ));
    assert!(matches!(
        app.service.provide(app.account_id, "").await,
        Err(AppError::Validation(ValidationError::InvalidIp))
    ));
}

#[tokio::test]
async fn provide_overwrites_previous_refresh_token() {
    let app = spawn_service().await;
    let first = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();
    app.service.provide(app.account_id, IP).await.unwrap();

    let result = app
        .service
        .refresh(app.account_id, &first.tokens.refresh_token, IP)
        .await;
    assert_eq!(token_error(result), TokenError::HashMismatch);
}

#[tokio::test]
async fn refresh_without_stored_credential_is_not_found() {
    let app = spawn_service().await;
    let token = app.service.codec().issue_refresh_token(IP).unwrap();

    let result = app.service.refresh(app.account_id, &token, IP).await;
    assert_eq!(token_error(result), TokenError::NotFound);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_weak_passwords() {
    let app = spawn_service().await;

    let duplicate = app
        .service
        .register(RegistrationRequest {
            email: EMAIL.to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            password: PASSWORD.to_string(),
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(AppError::Infrastructure(InfrastructureError::UniqueConstraintViolation(_)))
    ));

    let weak = app
        .service
        .register(RegistrationRequest {
            email: "other@example.com".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            password: "short".to_string(),
        })
        .await;
    assert!(matches!(
        weak,
        Err(AppError::Validation(ValidationError::WeakSecret { min: 8 }))
    ));
}

#[tokio::test]
async fn refresh_rejects_unusable_client_ip_without_warning() {
    let app = spawn_service().await;
    let issued = app.service.authenticate(EMAIL, PASSWORD, IP).await.unwrap();

    for raw_ip in ["", "not-an-ip", "10.10.10.10|x"] {
        let result = app
            .service
            .refresh(app.account_id, &issued.tokens.refresh_token, raw_ip)
            .await;
        assert!(
            matches!(result, Err(AppError::Validation(ValidationError::InvalidIp))),
            "{:?}",
            raw_ip
        );
    }
    assert!(app.notifier.warnings.lock().unwrap().is_empty());

    // Surrounding whitespace is normalized away, as for authenticate.
    assert!(app
        .service
        .refresh(app.account_id, &issued.tokens.refresh_token, " 10.10.10.10 ")
        .await
        .is_ok());
}

#[tokio::test]
async fn login_with_extended_max_length_password_fails() {
    let app = spawn_service().await;
    let password = "p".repeat(72);
    app.service
        .register(RegistrationRequest {
            email: "long@example.com".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            password: password.clone(),
        })
        .await
        .unwrap();

    assert!(app
        .service
        .authenticate("long@example.com", &password, IP)
        .await
        .is_ok());
    assert!(matches!(
        app.service
            .authenticate("long@example.com", &format!("{}-suffix", password), IP)
            .await,
        Err(AppError::Auth(AuthError::InvalidPassword))
    ));
}
