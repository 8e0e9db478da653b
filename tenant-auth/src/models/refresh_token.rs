use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::tokens::{hash_token, hashes_match};

/// Server-side record of an issued refresh token, keyed by its `jti`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

impl RefreshToken {
    pub fn new(jti: String, user_id: String, token: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: jti,
            user_id,
            token_hash: hash_token(token),
            expires_at: now + ttl,
            created_at: now,
            revoked: false,
        }
    }

    /// Accepts `token` only if it is the one recorded here and still usable.
    pub fn accepts(&self, token: &str, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now && hashes_match(&self.token_hash, &hash_token(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_recorded_token() {
        let record = RefreshToken::new("jti-1".into(), "user-1".into(), "token-abc", Duration::days(30));

        assert!(record.accepts("token-abc", Utc::now()));
        assert!(!record.accepts("token-xyz", Utc::now()));
        assert_ne!(record.token_hash, "token-abc");
    }

    #[test]
    fn revoked_or_expired_records_reject() {
        let mut record = RefreshToken::new("jti-1".into(), "user-1".into(), "t", Duration::days(30));
        assert!(!record.accepts("t", record.expires_at));

        record.revoked = true;
        assert!(!record.accepts("t", Utc::now()));
    }
}
