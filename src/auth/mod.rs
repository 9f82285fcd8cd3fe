/// Authentication module
///
/// Password hashing, access token signing/verification, refresh token
/// material, refresh validation, and the service tying them together.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;
mod validator;

pub use claims::AccessClaims;
pub use jwt::{TokenCodec, TokenPair, SIGNING_ALGORITHM};
pub use password::{PasswordHasher, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
pub use refresh_token::{
    generate_refresh_token, hash_refresh_token, parse_refresh_token, refresh_token_matches,
    EntropySource, OsEntropy, ParsedRefreshToken, TOKEN_SEPARATOR,
};
pub use service::{CredentialService, IssuedCredentials, RegistrationRequest};
pub use validator::{RefreshTokenValidator, ValidatedRefresh};
