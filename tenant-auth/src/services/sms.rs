use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use crate::config::SmsConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Gateway returned status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Sends `text` to every destination. Returns the gateway's response body.
    async fn send(&self, text: &str, destinations: &[String])
        -> Result<serde_json::Value, SmsError>;

    fn is_enabled(&self) -> bool;
}

/// SMSOnlineGH HTTP gateway.
pub struct SmsOnlineGhGateway {
    endpoint: String,
    token: Option<SecretString>,
    sender: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    text: &'a str,
    #[serde(rename = "type")]
    message_type: u8,
    sender: &'a str,
    destinations: &'a [String],
}

impl SmsOnlineGhGateway {
    pub fn new(config: &SmsConfig) -> Result<Self, SmsError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SmsError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            sender: config.sender.clone(),
            client,
        })
    }
}

#[async_trait]
impl SmsGateway for SmsOnlineGhGateway {
    async fn send(
        &self,
        text: &str,
        destinations: &[String],
    ) -> Result<serde_json::Value, SmsError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| SmsError::NotConfigured("SMS_TOKEN is not set".to_string()))?;

        if destinations.is_empty() || destinations.iter().any(|d| d.trim().is_empty()) {
            return Err(SmsError::InvalidRecipient(
                "Destination phone number is empty".to_string(),
            ));
        }

        let request = SendRequest {
            text,
            message_type: 0,
            sender: &self.sender,
            destinations,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", token.expose_secret()))
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| SmsError::Connection(format!("Failed to reach SMS gateway: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status != 200 && status != 201 {
            return Err(SmsError::Rejected { status, body });
        }

        tracing::info!(recipients = destinations.len(), "SMS sent via SMSOnlineGH");

        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }

    fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SentSms {
    pub to: String,
    pub text: String,
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct MockSmsGateway {
    sent: Mutex<Vec<SentSms>>,
    failing: AtomicBool,
    unconfigured: AtomicBool,
    send_count: AtomicU64,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail as if the gateway rejected them.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the gateway report itself as not configured.
    pub fn set_unconfigured(&self, unconfigured: bool) {
        self.unconfigured.store(unconfigured, Ordering::SeqCst);
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_message_to(&self, phone: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|sms| sms.to == phone)
            .map(|sms| sms.text)
    }
}

#[async_trait]
impl SmsGateway for MockSmsGateway {
    async fn send(
        &self,
        text: &str,
        destinations: &[String],
    ) -> Result<serde_json::Value, SmsError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SmsError::Rejected {
                status: 500,
                body: "mock gateway failure".to_string(),
            });
        }

        self.send_count.fetch_add(1, Ordering::SeqCst);
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        for to in destinations {
            sent.push(SentSms {
                to: to.clone(),
                text: text.to_string(),
            });
        }

        tracing::info!(recipients = destinations.len(), "[MOCK] SMS would be sent");
        Ok(serde_json::json!({ "status": "queued" }))
    }

    fn is_enabled(&self) -> bool {
        !self.unconfigured.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_gateway_field_names() {
        let destinations = vec!["+233201234567".to_string()];
        let request = SendRequest {
            text: "Your login code is: 123456. Valid for 10 minutes.",
            message_type: 0,
            sender: "Campus",
            destinations: &destinations,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], 0);
        assert_eq!(json["sender"], "Campus");
        assert_eq!(json["destinations"][0], "+233201234567");
    }

    #[tokio::test]
    async fn unconfigured_gateway_refuses_to_send() {
        let gateway = SmsOnlineGhGateway::new(&SmsConfig {
            endpoint: "http://127.0.0.1:9/sms".to_string(),
            token: None,
            sender: "Campus".to_string(),
        })
        .unwrap();

        let result = gateway.send("hi", &["+233201234567".to_string()]).await;
        assert!(matches!(result, Err(SmsError::NotConfigured(_))));
        assert!(!gateway.is_enabled());
    }

    #[tokio::test]
    async fn mock_records_messages_per_recipient() {
        let gateway = MockSmsGateway::new();
        gateway
            .send("code 1", &["+1".to_string(), "+2".to_string()])
            .await
            .unwrap();

        assert_eq!(gateway.send_count(), 1);
        assert_eq!(gateway.last_message_to("+2").as_deref(), Some("code 1"));

        gateway.set_failing(true);
        assert!(gateway.send("code 2", &["+1".to_string()]).await.is_err());
        assert_eq!(gateway.last_message_to("+1").as_deref(), Some("code 1"));
    }
}
