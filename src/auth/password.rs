/// Password Hashing and Verification
///
/// Passwords are hashed with bcrypt. The output encodes algorithm, cost
/// and salt (`$2b$12$...`), so verification needs no other state.

use bcrypt::{hash, verify};

use crate::configuration::PasswordSettings;
use crate::error::{AppError, InfrastructureError, ValidationError};

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    min_length: usize,
    cost: u32,
}

impl PasswordHasher {
    pub fn new(settings: &PasswordSettings) -> Self {
        Self {
            min_length: settings.min_length,
            cost: settings.hash_work_factor,
        }
    }

    /// Hash a password using bcrypt
    ///
    /// # Errors
    /// - `WeakSecret` if the password is shorter than the minimum length
    /// - `TooLong` if it exceeds bcrypt's 72-byte input
    /// - `Hashing` if bcrypt itself fails
    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        if password.len() < self.min_length {
            return Err(ValidationError::WeakSecret {
                min: self.min_length,
            }
            .into());
        }

        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(
                ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH).into(),
            );
        }

        hash(password, self.cost)
            .map_err(|e| InfrastructureError::Hashing(e.to_string()).into())
    }

    /// Verify a password against its hash
    ///
    /// A mismatch is `Ok(false)`. Only a malformed or corrupt hash is an
    /// error. The comparison is constant-time inside bcrypt.
    ///
    /// Input longer than 72 bytes never matches: bcrypt would only compare
    /// its prefix, and no such password can have been hashed.
    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool, AppError> {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Ok(false);
        }

        verify(password, password_hash).map_err(|e| {
            tracing::error!(error = %e, "Stored password hash is corrupt");
            InfrastructureError::Hashing("stored password hash is corrupt".to_string()).into()
        })
    }
}
