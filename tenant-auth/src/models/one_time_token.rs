use chrono::{DateTime, Duration, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::models::User;
use crate::utils::tokens::{hash_token, hashes_match};

/// Single-use secret (magic link, reset link or numeric code) embedded in a
/// user record. Only the SHA-256 of the raw value is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneTimeToken {
    pub hash: String,
    /// Stored as a BSON datetime so queries can compare it with now.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn issue(raw: &str, ttl: Duration) -> Self {
        Self {
            hash: hash_token(raw),
            expires_at: Utc::now() + ttl,
        }
    }

    /// Valid strictly before `expires_at`; there is no grace window.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn matches_hash(&self, hash: &str) -> bool {
        hashes_match(&self.hash, hash)
    }
}

/// The one-time-token slots on a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    MagicLink,
    PhoneVerification,
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    /// Field name of the slot in the users collection.
    pub fn field(self) -> &'static str {
        match self {
            TokenKind::MagicLink => "magic_link",
            TokenKind::PhoneVerification => "phone_verification",
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }

    pub fn slot(self, user: &User) -> Option<&OneTimeToken> {
        match self {
            TokenKind::MagicLink => user.magic_link.as_ref(),
            TokenKind::PhoneVerification => user.phone_verification.as_ref(),
            TokenKind::EmailVerification => user.email_verification.as_ref(),
            TokenKind::PasswordReset => user.password_reset.as_ref(),
        }
    }

    pub fn slot_mut(self, user: &mut User) -> &mut Option<OneTimeToken> {
        match self {
            TokenKind::MagicLink => &mut user.magic_link,
            TokenKind::PhoneVerification => &mut user.phone_verification,
            TokenKind::EmailVerification => &mut user.email_verification,
            TokenKind::PasswordReset => &mut user.password_reset,
        }
    }
}

/// Which users a token lookup may match besides the hash itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope<'a> {
    Any,
    User(&'a str),
    Email(&'a str),
    Phone(&'a str),
}

impl TokenScope<'_> {
    pub fn admits(&self, user: &User) -> bool {
        match self {
            TokenScope::Any => true,
            TokenScope::User(id) => user.id == *id,
            TokenScope::Email(email) => user.email == *email,
            TokenScope::Phone(phone) => user.phone.as_deref() == Some(*phone),
        }
    }
}
