/// Error Handling Module
///
/// Every failure the credential engine can produce is one of:
/// 1. Validation errors (malformed input: bad ID, empty token, short password)
/// 2. Authentication errors (unknown user, wrong password)
/// 3. Token errors (access or refresh token rejected)
/// 4. Infrastructure errors (store, RNG, signing, timeouts)
///
/// Core functions return these as values; only a missing signing key at
/// startup is fatal.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    WeakSecret { min: usize },
    TooLong(String, usize),
    InvalidFormat(String),
    InvalidId,
    InvalidIp,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::WeakSecret { min } => {
                write!(f, "password must be at least {} characters long", min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} bytes)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::InvalidId => write!(f, "provided ID is invalid"),
            ValidationError::InvalidIp => write!(f, "client IP could not be determined"),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    UserNotExist,
    InvalidPassword,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::UserNotExist => write!(f, "user does not exist"),
            AuthError::InvalidPassword => write!(f, "invalid password"),
            AuthError::MissingToken => write!(f, "missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// Access and refresh token rejections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Access token is structurally broken or lacks numeric `exp`/`iat`.
    Malformed,
    /// Access token declares an algorithm other than the codec's.
    UnexpectedAlgorithm(String),
    /// Access token signature does not verify, or it has expired.
    Invalid,
    /// Refresh token does not split into exactly `ip|secret`.
    MalformedToken,
    /// Refresh token presented from a different IP than it was issued for.
    IpMismatch,
    /// No stored refresh credential for the account.
    NotFound,
    /// Stored refresh credential has expired.
    Expired,
    /// Presented refresh token does not match the stored hash.
    HashMismatch,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "access token is malformed"),
            TokenError::UnexpectedAlgorithm(alg) => {
                write!(f, "unexpected signing method: {}", alg)
            }
            TokenError::Invalid => write!(f, "access token is invalid or expired"),
            TokenError::MalformedToken => write!(f, "refresh token is malformed"),
            TokenError::IpMismatch => write!(f, "refresh token presented from a new IP"),
            TokenError::NotFound => write!(f, "no refresh token stored for account"),
            TokenError::Expired => write!(f, "refresh token has expired"),
            TokenError::HashMismatch => write!(f, "refresh token does not match stored hash"),
        }
    }
}

impl StdError for TokenError {}

/// Store, crypto and timeout failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfrastructureError {
    UniqueConstraintViolation(String),
    Store(String),
    Timeout,
    SigningFailure(String),
    RandomnessFailure(String),
    Hashing(String),
}

impl fmt::Display for InfrastructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfrastructureError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            InfrastructureError::Store(msg) => write!(f, "Store error: {}", msg),
            InfrastructureError::Timeout => write!(f, "Store call timed out"),
            InfrastructureError::SigningFailure(msg) => {
                write!(f, "Failed to sign the token: {}", msg)
            }
            InfrastructureError::RandomnessFailure(msg) => {
                write!(f, "Failed to generate random bytes: {}", msg)
            }
            InfrastructureError::Hashing(msg) => write!(f, "Hashing failed: {}", msg),
        }
    }
}

impl StdError for InfrastructureError {}

/// Email service errors
#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
    ServiceUnavailable(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
            EmailError::InvalidRecipient(msg) => write!(f, "Invalid recipient: {}", msg),
            EmailError::ServiceUnavailable(msg) => {
                write!(f, "Email service unavailable: {}", msg)
            }
        }
    }
}

impl StdError for EmailError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Token(TokenError),
    Infrastructure(InfrastructureError),
    Config(ConfigError),
}

impl AppError {
    /// The token rejection kind, if this is one.
    pub fn token_error(&self) -> Option<&TokenError> {
        match self {
            AppError::Token(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Infrastructure(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<InfrastructureError> for AppError {
    fn from(err: InfrastructureError) -> Self {
        AppError::Infrastructure(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::Infrastructure(InfrastructureError::UniqueConstraintViolation(
                    "Email already registered".to_string(),
                ))
            }
            sqlx::Error::PoolTimedOut => AppError::Infrastructure(InfrastructureError::Timeout),
            _ => AppError::Infrastructure(InfrastructureError::Store(err.to_string())),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                e.to_string(),
            ),

            // Same message for both cases, so the response does not reveal
            // whether the email is registered.
            AppError::Auth(AuthError::UserNotExist | AuthError::InvalidPassword) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS".to_string(),
                "Invalid email or password".to_string(),
            ),
            AppError::Auth(AuthError::MissingToken) => (
                StatusCode::UNAUTHORIZED,
                "MISSING_TOKEN".to_string(),
                "Missing authentication token".to_string(),
            ),

            AppError::Token(_) => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_INVALID".to_string(),
                "Invalid or expired token".to_string(),
            ),

            AppError::Infrastructure(InfrastructureError::UniqueConstraintViolation(_)) => (
                StatusCode::CONFLICT,
                "DUPLICATE_ENTRY".to_string(),
                "Email already registered".to_string(),
            ),
            AppError::Infrastructure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                "Internal server error".to_string(),
            ),

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR".to_string(),
                "Server configuration error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code,
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Token(TokenError::IpMismatch) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %self,
                    "Refresh attempt from new IP rejected"
                );
            }
            AppError::Token(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Token rejected");
            }
            AppError::Infrastructure(e) => {
                tracing::error!(request_id = request_id, error = %e, "Infrastructure error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) | AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Infrastructure(InfrastructureError::UniqueConstraintViolation(_)) => {
                StatusCode::CONFLICT
            }
            AppError::Infrastructure(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-operation context for log correlation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub account_id: Option<i64>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            account_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_account_id(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "account_id": self.account_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Infrastructure(_) | AppError::Config(_) => {
                tracing::error!(error = %error, context = ?context, "Operation failed");
            }
            _ => {
                tracing::warn!(error = %error, context = ?context, "Operation rejected");
            }
        }
    }
}
