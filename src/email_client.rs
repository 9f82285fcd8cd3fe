use crate::error::EmailError;
use crate::validators::parse_email;
use serde::Serialize;

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderAddress,
}

#[derive(Clone, Debug)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(s: String) -> Result<Self, EmailError> {
        let email = parse_email(&s).map_err(|e| EmailError::InvalidRecipient(e.to_string()))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
pub struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "TextBody")]
    text_body: &'a str,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderAddress, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        text_content: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            text_body: text_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send email");
                EmailError::SendFailed(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!(error = %e, "Email service returned error");
                EmailError::ServiceUnavailable(e.to_string())
            })?;

        Ok(())
    }
}
