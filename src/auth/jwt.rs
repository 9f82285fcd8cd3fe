/// Access Token Signing and Verification
///
/// `TokenCodec` signs access tokens with HMAC-SHA256 and mints refresh
/// token material. Both token types carry the client IP they were issued
/// for.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::AccessClaims;
use crate::auth::refresh_token::{generate_refresh_token, EntropySource, OsEntropy};
use crate::clock::Clock;
use crate::configuration::TokenSettings;
use crate::error::{AppError, ConfigError, InfrastructureError, TokenError};

/// The only algorithm this codec signs with or accepts.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;
const SIGNING_ALGORITHM_NAME: &str = "HS256";

/// The `alg` string of a token header, read without validating anything else.
fn declared_algorithm(token: &str) -> Option<String> {
    let encoded = token.split('.').next()?;
    let raw = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&raw).ok()?;
    header.get("alg")?.as_str().map(str::to_string)
}

/// A freshly issued access + refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    refresh_token_bytes: usize,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
}

impl TokenCodec {
    /// Builds the codec from startup configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingRequired` when no signing secret is set.
    pub fn new(settings: &TokenSettings, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let key = settings.signing_key()?;
        if settings.refresh_token_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "tokens.refresh_token_bytes must be positive".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            access_ttl: settings.access_ttl(),
            refresh_ttl: settings.refresh_ttl(),
            refresh_token_bytes: settings.refresh_token_bytes,
            clock,
            entropy: Arc::new(OsEntropy),
        })
    }

    /// Replace the secure random source.
    #[must_use]
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign a new access token for `client_ip`, valid for the access TTL.
    ///
    /// # Errors
    /// Returns `SigningFailure` if encoding fails
    pub fn issue_access_token(&self, client_ip: &str) -> Result<String, AppError> {
        let claims = AccessClaims::new(client_ip, self.clock.now(), self.access_ttl);

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Access token signing failed");
            InfrastructureError::SigningFailure(e.to_string()).into()
        })
    }

    /// Verify an access token and return its claims
    ///
    /// # Errors
    /// - `UnexpectedAlgorithm` if the header declares anything but HS256
    /// - `Malformed` if the token cannot be parsed or lacks numeric `exp`/`iat`
    /// - `Invalid` if the signature does not verify or the token has expired
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        let token = token.trim();

        let header = decode_header(token).map_err(|e| {
            // jsonwebtoken refuses `none` and unknown algorithms outright.
            match declared_algorithm(token) {
                Some(alg) if alg != SIGNING_ALGORITHM_NAME => {
                    tracing::warn!(alg = %alg, "Access token declares unexpected algorithm");
                    TokenError::UnexpectedAlgorithm(alg)
                }
                _ => {
                    tracing::debug!(error = %e, "Access token header unreadable");
                    TokenError::Malformed
                }
            }
        })?;

        if header.alg != SIGNING_ALGORITHM {
            tracing::warn!(alg = ?header.alg, "Access token declares unexpected algorithm");
            return Err(TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg)).into());
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is checked against the injected clock below; presence of
        // `exp`/`iat` is enforced by `AccessClaims` deserialization.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::Invalid,
                ErrorKind::InvalidAlgorithm => {
                    TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg))
                }
                ErrorKind::Json(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::InvalidToken
                | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Invalid.into());
        }

        Ok(data.claims)
    }

    /// Mint `clientIP|base64url(random bytes)` refresh token material.
    ///
    /// # Errors
    /// Returns `RandomnessFailure` if the secure random source fails
    pub fn issue_refresh_token(&self, client_ip: &str) -> Result<String, AppError> {
        generate_refresh_token(client_ip, self.refresh_token_bytes, self.entropy.as_ref())
    }

    pub fn issue_pair(&self, client_ip: &str) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(client_ip)?,
            refresh_token: self.issue_refresh_token(client_ip)?,
        })
    }
}
