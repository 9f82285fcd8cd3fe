use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use auth_service::auth::{CredentialService, PasswordHasher, TokenCodec};
use auth_service::clock::SystemClock;
use auth_service::configuration::{get_configuration, NotificationSettings};
use auth_service::email_client::{EmailClient, SenderAddress};
use auth_service::notifier::{EmailSecurityNotifier, LogSecurityNotifier, SecurityNotifier};
use auth_service::startup::run;
use auth_service::store::PgCredentialStore;
use auth_service::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

fn build_notifier(settings: &NotificationSettings) -> std::io::Result<Arc<dyn SecurityNotifier>> {
    let base_url = match &settings.email_base_url {
        Some(url) if !url.trim().is_empty() => url.clone(),
        _ => {
            tracing::info!("No email API configured; security warnings go to the log");
            return Ok(Arc::new(LogSecurityNotifier));
        }
    };

    let sender = SenderAddress::parse(settings.sender.clone()).map_err(|e| {
        tracing::error!(error = %e, "Invalid notification sender address");
        startup_error(std::io::ErrorKind::InvalidInput, "Invalid sender address")
    })?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(settings.timeout_ms))
        .build()
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build HTTP client");
            startup_error(std::io::ErrorKind::Other, "HTTP client error")
        })?;

    Ok(Arc::new(EmailSecurityNotifier::new(EmailClient::new(
        base_url,
        sender,
        http_client,
    ))))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    // A missing signing secret is fatal.
    let codec = TokenCodec::new(&configuration.tokens, Arc::new(SystemClock)).map_err(|e| {
        tracing::error!(error = %e, "Token signing key is not configured");
        startup_error(std::io::ErrorKind::InvalidInput, "Signing key error")
    })?;

    let store_timeout = configuration.database.timeout();
    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(store_timeout)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    tracing::info!("Database connection pool created successfully");

    let notifier = build_notifier(&configuration.notifications)?;
    let service = CredentialService::new(
        Arc::new(PgCredentialStore::new(pool)),
        codec,
        PasswordHasher::new(&configuration.passwords),
        notifier,
        store_timeout,
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, service)?.await
}
