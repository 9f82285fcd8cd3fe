/// Input validators for the credential endpoints
///
/// - Email: length limits and RFC 5322 simplified format
/// - Account id: non-empty, decimal, positive
/// - Client IP: must parse as an IPv4/IPv6 address

use std::net::IpAddr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 3;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Validates an email address and returns it trimmed.
pub fn parse_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH || !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    Ok(trimmed.to_string())
}

/// Parses an account id taken from a URL path segment.
pub fn parse_account_id(raw: &str) -> Result<i64, ValidationError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("id".to_string()));
    }

    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidId);
    }

    match trimmed.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidId),
    }
}

/// Normalizes a client IP; anything that is not an IP address is rejected.
pub fn parse_client_ip(raw: &str) -> Result<String, ValidationError> {
    raw.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ValidationError::InvalidIp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert_eq!(parse_email("user@example.com").unwrap(), "user@example.com");
        assert_eq!(parse_email("  user@example.com ").unwrap(), "user@example.com");
        assert!(parse_email("first.last+tag@sub.example.org").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert_eq!(
            parse_email(""),
            Err(ValidationError::EmptyField("email".to_string()))
        );
        for invalid in ["notanemail", "user@", "@example.com", "user@@example.com"] {
            assert!(parse_email(invalid).is_err(), "{} should be rejected", invalid);
        }
    }

    #[test]
    fn test_account_ids() {
        assert_eq!(parse_account_id("42"), Ok(42));
        assert_eq!(parse_account_id(" 7 "), Ok(7));
        assert_eq!(
            parse_account_id(""),
            Err(ValidationError::EmptyField("id".to_string()))
        );
        for invalid in ["abc", "-1", "0", "1.5", "99999999999999999999"] {
            assert_eq!(parse_account_id(invalid), Err(ValidationError::InvalidId), "{}", invalid);
        }
    }

    #[test]
    fn test_client_ips() {
        assert_eq!(parse_client_ip("10.10.10.10").unwrap(), "10.10.10.10");
        assert_eq!(parse_client_ip("2001:db8::1").unwrap(), "2001:db8::1");
        assert_eq!(parse_client_ip(""), Err(ValidationError::InvalidIp));
        assert_eq!(parse_client_ip("10.0.0.1|x"), Err(ValidationError::InvalidIp));
        assert_eq!(parse_client_ip("localhost"), Err(ValidationError::InvalidIp));
    }
}
