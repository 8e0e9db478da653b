use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError>;

    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), EmailError>;

    async fn send_password_reset(&self, to_email: &str, link: &str) -> Result<(), EmailError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| EmailError::Transport(e.to_string()))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| EmailError::Build(e.to_string()))?;

        // SmtpTransport blocks; keep it off the runtime threads.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        match result {
            Ok(_) => {
                tracing::info!(subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Failed to send email");
                Err(EmailError::Transport(e.to_string()))
            }
        }
    }
}

fn link_email(heading: &str, intro: &str, button: &str, link: &str, expiry: &str) -> (String, String) {
    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>{heading}</h2>
    <p>{intro}</p>
    <p>
      <a href="{link}" style="background-color: #2563EB; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">{button}</a>
    </p>
    <p style="color: #666; font-size: 12px;">This link expires in {expiry}. If you didn't request this, you can ignore this email.</p>
  </body>
</html>"#
    );
    let plain = format!(
        "{heading}\n\n{intro}\n\n{link}\n\nThis link expires in {expiry}. If you didn't request this, you can ignore this email."
    );
    (plain, html)
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        let (plain, html) = link_email(
            "Sign in to your account",
            "Use the link below to sign in. It can only be used once.",
            "Sign in",
            link,
            "15 minutes",
        );
        self.send_email(to_email, "Your sign-in link", plain, html).await
    }

    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), EmailError> {
        let html = format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>Verify your email address</h2>
    <p>Your verification code is:</p>
    <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{code}</p>
    <p style="color: #666; font-size: 12px;">The code expires in 10 minutes.</p>
  </body>
</html>"#
        );
        let plain = format!(
            "Verify your email address\n\nYour verification code is: {code}\n\nThe code expires in 10 minutes."
        );
        self.send_email(to_email, "Your verification code", plain, html)
            .await
    }

    async fn send_password_reset(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        let (plain, html) = link_email(
            "Password reset request",
            "We received a request to reset your password. Use the link below to choose a new one.",
            "Reset password",
            link,
            "30 minutes",
        );
        self.send_email(to_email, "Reset your password", plain, html)
            .await
    }
}

/// Used when SMTP is not configured outside production. Logs that a
/// message was due; never logs the link or code.
#[derive(Clone, Default)]
pub struct LogEmailService;

#[async_trait]
impl EmailProvider for LogEmailService {
    async fn send_magic_link(&self, _to_email: &str, _link: &str) -> Result<(), EmailError> {
        tracing::warn!(kind = "magic_link", "SMTP not configured, email not sent");
        Ok(())
    }

    async fn send_verification_code(&self, _to_email: &str, _code: &str) -> Result<(), EmailError> {
        tracing::warn!(kind = "verification_code", "SMTP not configured, email not sent");
        Ok(())
    }

    async fn send_password_reset(&self, _to_email: &str, _link: &str) -> Result<(), EmailError> {
        tracing::warn!(kind = "password_reset", "SMTP not configured, email not sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    MagicLink,
    VerificationCode,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub kind: EmailKind,
    /// The link or code the message carried.
    pub payload: String,
}

/// Captures outgoing mail so callers can inspect it.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self, to: &str, kind: EmailKind) -> Option<SentEmail> {
        self.sent()
            .into_iter()
            .rev()
            .find(|email| email.to == to && email.kind == kind)
    }

    fn record(&self, to: &str, kind: EmailKind, payload: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentEmail {
                to: to.to_string(),
                kind,
                payload: payload.to_string(),
            });
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_magic_link(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        self.record(to_email, EmailKind::MagicLink, link);
        Ok(())
    }

    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), EmailError> {
        self.record(to_email, EmailKind::VerificationCode, code);
        Ok(())
    }

    async fn send_password_reset(&self, to_email: &str, link: &str) -> Result<(), EmailError> {
        self.record(to_email, EmailKind::PasswordReset, link);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn email_service_creation() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "mailer@example.com".to_string(),
            password: SecretString::new("app-password".to_string()),
            from: "Campus <no-reply@example.com>".to_string(),
        };

        assert!(EmailService::new(&config).is_ok());
    }

    #[test]
    fn link_email_embeds_link_in_both_parts() {
        let (plain, html) = link_email("H", "I", "B", "https://app/x?token=abc", "15 minutes");
        assert!(plain.contains("https://app/x?token=abc"));
        assert!(html.contains("href=\"https://app/x?token=abc\""));
    }

    #[tokio::test]
    async fn mock_keeps_latest_message_per_kind() {
        let mock = MockEmailService::new();
        mock.send_verification_code("a@x.org", "111111").await.unwrap();
        mock.send_verification_code("a@x.org", "222222").await.unwrap();
        mock.send_magic_link("a@x.org", "link").await.unwrap();

        let last = mock.last("a@x.org", EmailKind::VerificationCode).unwrap();
        assert_eq!(last.payload, "222222");
        assert_eq!(mock.sent().len(), 3);
    }
}
