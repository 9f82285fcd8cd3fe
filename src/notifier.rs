/// Security notifications
///
/// A refresh attempt from a different IP than the token was issued for
/// triggers a best-effort warning to the account holder. Delivery failures
/// are reported to the caller, which logs and ignores them.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::email_client::EmailClient;
use crate::error::EmailError;

/// Recipient used when the account's email cannot be looked up.
pub const PLACEHOLDER_RECIPIENT: &str = "unknown-account@localhost";

pub const IP_CHANGE_SUBJECT: &str = "Security Warning - New IP Detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpChangeWarning {
    pub recipient: String,
    pub account_id: i64,
    pub previous_ip: String,
    pub current_ip: String,
    pub detected_at: DateTime<Utc>,
}

impl IpChangeWarning {
    pub fn body(&self) -> String {
        format!(
            "Security warning: Refresh attempt from new IP\n\
             Account ID: {}\n\
             Old IP: {}\n\
             New IP: {}\n\
             Time: {}",
            self.account_id,
            self.previous_ip,
            self.current_ip,
            self.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}

#[async_trait]
pub trait SecurityNotifier: Send + Sync {
    async fn notify_ip_change(&self, warning: &IpChangeWarning) -> Result<(), EmailError>;
}

/// Writes the warning to the structured log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSecurityNotifier;

#[async_trait]
impl SecurityNotifier for LogSecurityNotifier {
    async fn notify_ip_change(&self, warning: &IpChangeWarning) -> Result<(), EmailError> {
        tracing::warn!(
            account_id = warning.account_id,
            previous_ip = %warning.previous_ip,
            current_ip = %warning.current_ip,
            "Security warning: refresh attempt from new IP"
        );
        Ok(())
    }
}

/// Emails the warning through the email API.
#[derive(Clone)]
pub struct EmailSecurityNotifier {
    client: EmailClient,
}

impl EmailSecurityNotifier {
    pub fn new(client: EmailClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecurityNotifier for EmailSecurityNotifier {
    async fn notify_ip_change(&self, warning: &IpChangeWarning) -> Result<(), EmailError> {
        self.client
            .send_email(&warning.recipient, IP_CHANGE_SUBJECT, &warning.body())
            .await?;

        tracing::info!(account_id = warning.account_id, "IP change warning sent");
        Ok(())
    }
}
