use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{OneTimeToken, TokenKind};
use crate::utils::tokens::{hash_token, hashes_match};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employment {
    pub employee_id: String,
    pub date_of_joining: DateTime<Utc>,
    pub department_id: Option<String>,
}

/// Device allowed to skip the MFA step until `expires`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub token_hash: String,
    pub expires: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TrustedDevice {
    pub fn new(raw_token: &str, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            token_hash: hash_token(raw_token),
            expires: now + ttl,
            created_at: now,
        }
    }
}

/// Staff account scoped to one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    /// Name of the organization role this user holds.
    pub role: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub employment: Option<Employment>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,

    pub is_active: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub login_attempts: u32,
    #[serde(default)]
    pub lockout_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,

    #[serde(default)]
    pub two_factor_enabled: bool,
    #[serde(default)]
    pub two_factor_secret: Option<String>,
    #[serde(default)]
    pub trusted_devices: Vec<TrustedDevice>,

    #[serde(default)]
    pub password_reset: Option<OneTimeToken>,
    #[serde(default)]
    pub magic_link: Option<OneTimeToken>,
    #[serde(default)]
    pub phone_verification: Option<OneTimeToken>,
    #[serde(default)]
    pub email_verification: Option<OneTimeToken>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(organization_id: String, full_name: String, email: String, role: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            organization_id,
            full_name,
            email,
            phone: None,
            position: None,
            role,
            password_hash: None,
            employment: None,
            bio: None,
            avatar: None,
            is_active: true,
            banned: false,
            suspended: false,
            login_attempts: 0,
            lockout_until: None,
            last_login: None,
            last_login_at: None,
            email_verified: false,
            phone_verified: false,
            two_factor_enabled: false,
            two_factor_secret: None,
            trusted_devices: Vec::new(),
            password_reset: None,
            magic_link: None,
            phone_verification: None,
            email_verification: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.banned || self.suspended
    }

    /// End of the current lockout, if one is in force at `now`.
    pub fn locked_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lockout_until.filter(|until| *until > now)
    }

    /// Clears the failure counter and records a successful sign-in.
    pub fn record_sign_in(&mut self, now: DateTime<Utc>) {
        self.login_attempts = 0;
        self.lockout_until = None;
        self.last_login = Some(now);
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn has_trusted_device(&self, raw_token: &str, now: DateTime<Utc>) -> bool {
        let hash = hash_token(raw_token);
        self.trusted_devices
            .iter()
            .any(|device| device.expires > now && hashes_match(&device.token_hash, &hash))
    }

    pub fn trust_device(&mut self, raw_token: &str, ttl: Duration, now: DateTime<Utc>) {
        self.trusted_devices.push(TrustedDevice::new(raw_token, ttl, now));
        self.updated_at = now;
    }

    pub fn roles(&self) -> Vec<String> {
        vec![self.role.clone()]
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role.clone(),
            organization_id: self.organization_id.clone(),
            mfa_enabled: self.two_factor_enabled,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            position: self.position.clone(),
            role: self.role.clone(),
            bio: self.bio.clone(),
            avatar: self.avatar.clone(),
            is_active: self.is_active,
            email_verified: self.email_verified,
            phone_verified: self.phone_verified,
            mfa_enabled: self.two_factor_enabled,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }
}

/// Identity returned alongside freshly issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub organization_id: String,
    pub mfa_enabled: bool,
}

/// User without credentials, secrets or token hashes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub organization_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub role: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub mfa_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Editable profile fields, written together by a profile update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileFields {
    pub full_name: String,
    pub email: String,
    pub email_verified: bool,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

impl ProfileFields {
    pub fn of(user: &User) -> Self {
        Self {
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            phone: user.phone.clone(),
            phone_verified: user.phone_verified,
            bio: user.bio.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

/// Field-scoped change to a stored user. Fields an update does not name keep
/// whatever the stored document holds.
#[derive(Debug, Clone)]
pub enum UserUpdate {
    /// Clears failure tracking and stamps the login.
    SignIn {
        phone_verified: bool,
        trusted_device: Option<TrustedDevice>,
    },
    IssueToken { kind: TokenKind, token: OneTimeToken },
    MfaSecret(String),
    EnableMfa,
    /// Also forgets the secret and every trusted device.
    DisableMfa,
    EmailVerified,
    PhoneVerified,
    Password { hash: String, clear_lockout: bool },
    Profile(ProfileFields),
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        match self {
            UserUpdate::SignIn {
                phone_verified,
                trusted_device,
            } => {
                user.record_sign_in(now);
                if *phone_verified {
                    user.phone_verified = true;
                }
                if let Some(device) = trusted_device {
                    user.trusted_devices.push(device.clone());
                }
            }
            UserUpdate::IssueToken { kind, token } => {
                *kind.slot_mut(user) = Some(token.clone());
            }
            UserUpdate::MfaSecret(secret) => user.two_factor_secret = Some(secret.clone()),
            UserUpdate::EnableMfa => user.two_factor_enabled = true,
            UserUpdate::DisableMfa => {
                user.two_factor_enabled = false;
                user.two_factor_secret = None;
                user.trusted_devices.clear();
            }
            UserUpdate::EmailVerified => user.email_verified = true,
            UserUpdate::PhoneVerified => user.phone_verified = true,
            UserUpdate::Password {
                hash,
                clear_lockout,
            } => {
                user.password_hash = Some(hash.clone());
                if *clear_lockout {
                    user.login_attempts = 0;
                    user.lockout_until = None;
                }
            }
            UserUpdate::Profile(fields) => {
                user.full_name = fields.full_name.clone();
                user.email = fields.email.clone();
                user.email_verified = fields.email_verified;
                user.phone = fields.phone.clone();
                user.phone_verified = fields.phone_verified;
                user.bio = fields.bio.clone();
                user.avatar = fields.avatar.clone();
            }
        }
        user.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(
            "org-1".to_string(),
            "Ama Mensah".to_string(),
            "ama@school.org".to_string(),
            "admin".to_string(),
        )
    }

    #[test]
    fn trusted_device_expires() {
        let now = Utc::now();
        let mut user = user();
        user.trust_device("device-token", Duration::days(30), now);

        assert!(user.has_trusted_device("device-token", now + Duration::days(29)));
        assert!(!user.has_trusted_device("device-token", now + Duration::days(31)));
        assert!(!user.has_trusted_device("other-token", now));
    }

    #[test]
    fn lockout_only_counts_while_in_force() {
        let now = Utc::now();
        let mut user = user();
        user.lockout_until = Some(now + Duration::minutes(5));

        assert!(user.locked_until(now).is_some());
        assert!(user.locked_until(now + Duration::minutes(6)).is_none());
    }

    #[test]
    fn sign_in_resets_counters() {
        let now = Utc::now();
        let mut user = user();
        user.login_attempts = 4;
        user.lockout_until = Some(now);

        user.record_sign_in(now);

        assert_eq!(user.login_attempts, 0);
        assert!(user.lockout_until.is_none());
        assert_eq!(user.last_login_at, Some(now));
    }

    #[test]
    fn profile_omits_secrets() {
        let mut user = user();
        user.password_hash = Some("$argon2id$secret".to_string());
        user.two_factor_secret = Some("JBSWY3DPEHPK3PXP".to_string());

        let json = serde_json::to_string(&user.profile()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
        assert!(json.contains("fullName"));
    }

    #[test]
    fn token_update_leaves_lockout_alone() {
        let now = Utc::now();
        let mut user = user();
        user.login_attempts = 5;
        user.lockout_until = Some(now + Duration::minutes(30));

        UserUpdate::IssueToken {
            kind: TokenKind::MagicLink,
            token: OneTimeToken::issue("raw", Duration::minutes(15)),
        }
        .apply(&mut user, now);

        assert!(user.magic_link.is_some());
        assert_eq!(user.login_attempts, 5);
        assert!(user.locked_until(now).is_some());
    }

    #[test]
    fn sign_in_update_can_remember_a_device() {
        let now = Utc::now();
        let mut user = user();
        user.login_attempts = 2;

        UserUpdate::SignIn {
            phone_verified: true,
            trusted_device: Some(TrustedDevice::new("device", Duration::days(30), now)),
        }
        .apply(&mut user, now);

        assert_eq!(user.login_attempts, 0);
        assert!(user.phone_verified);
        assert!(user.has_trusted_device("device", now));
    }
}
