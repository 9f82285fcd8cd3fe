/// Access token claims
///
/// A fixed, typed claim set. `exp` and `iat` are required numbers; a token
/// missing either, or carrying them as another JSON type, fails to decode
/// instead of defaulting.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Client IP the token was issued for
    pub ip: String,
}

impl AccessClaims {
    pub fn new(client_ip: &str, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let iat = issued_at.timestamp();
        Self {
            exp: iat + ttl.num_seconds(),
            iat,
            ip: client_ip.to_string(),
        }
    }

    /// Expired once `now` is strictly past `exp`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}
