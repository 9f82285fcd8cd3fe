/// Refresh Token Material
///
/// A refresh token is `clientIP|base64url(random bytes)`. The raw value is
/// handed to the client once; only its SHA-256 digest is stored. The random
/// suffix carries the entropy, so a fast digest is enough and lookups stay
/// cheap. Comparison against the stored digest is constant-time.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, InfrastructureError, TokenError};

pub const TOKEN_SEPARATOR: char = '|';

/// Source of cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), AppError>;
}

/// The operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), AppError> {
        OsRng.try_fill_bytes(buf).map_err(|e| {
            tracing::error!(error = %e, "Secure random source unavailable");
            InfrastructureError::RandomnessFailure(e.to_string()).into()
        })
    }
}

/// Generate a new refresh token bound to `client_ip`.
pub fn generate_refresh_token(
    client_ip: &str,
    byte_length: usize,
    entropy: &dyn EntropySource,
) -> Result<String, AppError> {
    let mut token_bytes = vec![0u8; byte_length];
    entropy.fill(&mut token_bytes)?;

    Ok(format!(
        "{}{}{}",
        client_ip,
        TOKEN_SEPARATOR,
        URL_SAFE.encode(&token_bytes)
    ))
}

/// The two halves of a presented refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRefreshToken<'a> {
    pub ip: &'a str,
    pub secret: &'a str,
}

/// Split a raw refresh token into its embedded IP and random suffix.
///
/// # Errors
/// `MalformedToken` unless the value has exactly one separator with
/// non-empty text on both sides.
pub fn parse_refresh_token(raw: &str) -> Result<ParsedRefreshToken<'_>, TokenError> {
    let mut parts = raw.split(TOKEN_SEPARATOR);

    match (parts.next(), parts.next(), parts.next()) {
        (Some(ip), Some(secret), None) if !ip.is_empty() && !secret.is_empty() => {
            Ok(ParsedRefreshToken { ip, secret })
        }
        _ => Err(TokenError::MalformedToken),
    }
}

/// Hash a refresh token using SHA-256
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `token` hashes to `stored_hash`, compared in constant time.
pub fn refresh_token_matches(token: &str, stored_hash: &str) -> bool {
    let presented = hash_refresh_token(token);
    presented.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
