use std::time::Duration;

use crate::error::ConfigError as StartupError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub tokens: TokenSettings,
    pub passwords: PasswordSettings,
    pub notifications: NotificationSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    /// Upper bound for a single store round trip, in milliseconds.
    pub timeout_ms: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Access/refresh token settings
#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub access_token_ttl: i64,  // seconds (900 = 15 minutes)
    pub refresh_token_ttl: i64, // seconds (2592000 = 30 days)
    pub refresh_token_bytes: usize,
}

impl TokenSettings {
    /// The HMAC signing key. An empty secret is a startup failure.
    pub fn signing_key(&self) -> Result<&[u8], StartupError> {
        if self.secret.trim().is_empty() {
            return Err(StartupError::MissingRequired("tokens.secret".to_string()));
        }
        Ok(self.secret.as_bytes())
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_ttl)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_ttl)
    }
}

// Hand-written so the secret never reaches the logs.
impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("refresh_token_bytes", &self.refresh_token_bytes)
            .finish()
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub min_length: usize,
    pub hash_work_factor: u32,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct NotificationSettings {
    /// Email API base URL; security warnings are only logged when unset.
    pub email_base_url: Option<String>,
    pub sender: String,
    pub timeout_ms: u64,
}

/// Loads settings from built-in defaults, then `configuration.yaml` (if
/// present), then `APP__*` environment variables.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8080)?
        .set_default("database.username", "postgres")?
        .set_default("database.password", "password")?
        .set_default("database.host", "localhost")?
        .set_default("database.port", 5432)?
        .set_default("database.database_name", "auth")?
        .set_default("database.timeout_ms", 3000)?
        .set_default("tokens.secret", "")?
        .set_default("tokens.access_token_ttl", 900)?
        .set_default("tokens.refresh_token_ttl", 2_592_000)?
        .set_default("tokens.refresh_token_bytes", 32)?
        .set_default("passwords.min_length", 8)?
        .set_default("passwords.hash_work_factor", 12)?
        .set_default("notifications.sender", "security@localhost")?
        .set_default("notifications.timeout_ms", 5000)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    settings.try_deserialize::<Settings>()
}
