use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::AuthConfig,
    models::{
        OneTimeToken, ProfileFields, RefreshToken, Role, TokenKind, TokenScope, TrustedDevice,
        User, UserProfile, UserSummary, UserUpdate,
    },
    services::{
        metrics::record_auth_event, AuthError, AuthStore, EmailProvider, JwtService, SmsGateway,
        TokenError, TokenPair,
    },
    utils::{
        generate_numeric_code, generate_random_token, hash_password, hash_token,
        normalize_email,
        tokens::{is_numeric_code, is_random_token_shaped},
        totp, verify_password, Password, PasswordHashString,
    },
};

const MAGIC_LINK_TTL_MINUTES: i64 = 15;
const CODE_TTL_MINUTES: i64 = 10;
const PASSWORD_RESET_TTL_MINUTES: i64 = 30;

fn login_code_text(code: &str) -> String {
    format!("Your login code is: {code}. Valid for {CODE_TTL_MINUTES} minutes.")
}

fn verification_code_text(code: &str) -> String {
    format!("Your verification code is: {code}. Valid for {CODE_TTL_MINUTES} minutes.")
}

fn invalid_refresh_token() -> AuthError {
    AuthError::TokenInvalid("Invalid refresh token")
}

/// Knobs of the sign-in flows that come from configuration.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub app_url: String,
    pub max_login_attempts: u32,
    pub lockout: Duration,
    pub trusted_device_ttl: Duration,
    pub mfa_issuer: String,
}

impl AuthPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            app_url: config.app_url.clone(),
            max_login_attempts: config.login.max_attempts,
            lockout: Duration::minutes(config.login.lockout_minutes),
            trusted_device_ttl: Duration::days(config.mfa.trusted_device_days),
            mfa_issuer: config.mfa.issuer.clone(),
        }
    }
}

/// Authenticated identity plus the tokens issued for it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserSummary,
    pub tokens: TokenPair,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// Password accepted; a TOTP code must follow.
    MfaRequired { mfa_token: String, user_id: String },
}

#[derive(Debug, Default)]
pub struct MfaVerification<'a> {
    pub code: &'a str,
    pub mfa_token: Option<&'a str>,
    /// Caller already holding an access token.
    pub session_user_id: Option<&'a str>,
    pub remember_device: bool,
}

#[derive(Debug)]
pub struct MfaSession {
    pub session: Session,
    /// Raw device token, only when the device was remembered.
    pub trusted_device_token: Option<String>,
}

#[derive(Debug)]
pub struct MfaEnrollment {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    jwt: JwtService,
    sms: Arc<dyn SmsGateway>,
    email: Arc<dyn EmailProvider>,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        jwt: JwtService,
        sms: Arc<dyn SmsGateway>,
        email: Arc<dyn EmailProvider>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            store,
            jwt,
            sms,
            email,
            policy,
        }
    }

    // ==================== Password login ====================

    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: Password,
        trusted_device_token: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let now = Utc::now();
        let email = normalize_email(email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            record_auth_event("login", "invalid_credentials");
            return Err(AuthError::InvalidCredentials);
        };

        if user.is_blocked() {
            record_auth_event("login", "blocked");
            return Err(AuthError::AccountSuspended);
        }

        // A locked account is refused before the password is looked at.
        if let Some(until) = user.locked_until(now) {
            tracing::warn!(user_id = %user.id, "Login rejected: account locked");
            record_auth_event("login", "locked");
            return Err(AuthError::AccountLocked {
                retry_after_secs: (until - now).num_seconds().max(1).unsigned_abs(),
            });
        }

        let Some(stored_hash) = user.password_hash.as_deref() else {
            record_auth_event("login", "invalid_credentials");
            return Err(AuthError::InvalidCredentials);
        };

        let password_ok = verify_password(&password, &PasswordHashString::new(stored_hash))
            .unwrap_or_else(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Stored password hash is malformed");
                false
            });

        if !password_ok {
            self.register_failed_login(&user, now).await?;
            record_auth_event("login", "invalid_credentials");
            return Err(AuthError::InvalidCredentials);
        }

        if user.two_factor_enabled {
            let trusted = trusted_device_token.is_some_and(|t| user.has_trusted_device(t, now));
            if !trusted {
                let mfa_token = self.jwt.generate_mfa_token(&user.id)?;
                tracing::info!(user_id = %user.id, "Password accepted, MFA required");
                record_auth_event("login", "mfa_required");
                return Ok(LoginOutcome::MfaRequired {
                    mfa_token,
                    user_id: user.id,
                });
            }
        }

        let session = self.sign_in(&user.id, false, None).await?;
        tracing::info!(user_id = %session.user.id, "User logged in");
        record_auth_event("login", "success");
        Ok(LoginOutcome::Authenticated(session))
    }

    async fn register_failed_login(&self, user: &User, now: DateTime<Utc>) -> Result<(), AuthError> {
        let updated = self
            .store
            .record_failed_login(
                &user.id,
                self.policy.max_login_attempts,
                now + self.policy.lockout,
            )
            .await?;

        if let Some(updated) = updated {
            if updated.login_attempts >= self.policy.max_login_attempts {
                tracing::warn!(
                    user_id = %user.id,
                    attempts = updated.login_attempts,
                    "Account locked after repeated failed logins"
                );
            } else {
                tracing::info!(
                    user_id = %user.id,
                    attempts = updated.login_attempts,
                    "Failed login attempt"
                );
            }
        }
        Ok(())
    }

    /// Resets failure tracking, stamps the login and issues tokens.
    async fn sign_in(
        &self,
        user_id: &str,
        phone_verified: bool,
        trusted_device: Option<TrustedDevice>,
    ) -> Result<Session, AuthError> {
        let update = UserUpdate::SignIn {
            phone_verified,
            trusted_device,
        };
        let user = self.update_user(user_id, update).await?;
        self.issue_session(&user).await
    }

    async fn update_user(&self, user_id: &str, update: UserUpdate) -> Result<User, AuthError> {
        self.store
            .apply_user_update(user_id, &update, Utc::now())
            .await?
            .ok_or(AuthError::NotFound("User not found"))
    }

    async fn issue_session(&self, user: &User) -> Result<Session, AuthError> {
        let tokens = self.jwt.generate_token_pair(user)?;

        let record = RefreshToken::new(
            tokens.refresh_token_id.clone(),
            user.id.clone(),
            &tokens.refresh_token,
            self.jwt.refresh_token_ttl(),
        );
        self.store.insert_refresh_token(&record).await?;

        Ok(Session {
            user: user.summary(),
            tokens,
        })
    }

    // ==================== MFA ====================

    #[tracing::instrument(skip_all)]
    pub async fn verify_mfa(&self, req: MfaVerification<'_>) -> Result<MfaSession, AuthError> {
        let user_id = match (req.mfa_token, req.session_user_id) {
            (Some(token), _) => {
                self.jwt
                    .validate_mfa_token(token)
                    .map_err(|e| {
                        tracing::debug!(error = %e, "MFA token rejected");
                        AuthError::TokenInvalid("Invalid MFA token")
                    })?
                    .sub
            }
            (None, Some(user_id)) => user_id.to_string(),
            (None, None) => return Err(AuthError::Unauthorized),
        };

        let user = self
            .store
            .find_user_by_id(&user_id)
            .await?
            .ok_or(AuthError::TokenInvalid("Invalid MFA token"))?;

        let secret = match (&user.two_factor_secret, user.two_factor_enabled) {
            (Some(secret), true) => secret.clone(),
            _ => return Err(AuthError::MfaNotEnabled),
        };

        if user.is_blocked() {
            return Err(AuthError::AccountSuspended);
        }

        let now = Utc::now();
        if !totp::verify(&secret, req.code, now.timestamp()) {
            tracing::info!(user_id = %user.id, "Invalid MFA code");
            record_auth_event("mfa", "invalid_code");
            return Err(AuthError::TokenInvalid("Invalid code"));
        }

        let trusted_device_token = req.remember_device.then(generate_random_token);
        let device = trusted_device_token
            .as_deref()
            .map(|raw| TrustedDevice::new(raw, self.policy.trusted_device_ttl, now));

        let session = self.sign_in(&user.id, false, device).await?;
        tracing::info!(
            user_id = %session.user.id,
            remembered = trusted_device_token.is_some(),
            "MFA verified"
        );
        record_auth_event("mfa", "success");

        Ok(MfaSession {
            session,
            trusted_device_token,
        })
    }

    pub async fn is_trusted_device(&self, user_id: &str, device_token: &str) -> Result<bool, AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("User not found"))?;
        Ok(user.has_trusted_device(device_token, Utc::now()))
    }

    /// Generates and stores a new TOTP secret; MFA stays off until `enable_mfa`.
    #[tracing::instrument(skip(self))]
    pub async fn setup_mfa(&self, user_id: &str) -> Result<MfaEnrollment, AuthError> {
        let user = self.user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::Validation("MFA is already enabled".to_string()));
        }

        let secret = totp::generate_secret();
        let otpauth_url = totp::provisioning_uri(&secret, &user.email, &self.policy.mfa_issuer);
        self.update_user(&user.id, UserUpdate::MfaSecret(secret.clone())).await?;

        Ok(MfaEnrollment {
            secret,
            otpauth_url,
        })
    }

    #[tracing::instrument(skip(self, code))]
    pub async fn enable_mfa(&self, user_id: &str, code: &str) -> Result<(), AuthError> {
        let user = self.user(user_id).await?;
        let secret = user.two_factor_secret.clone().ok_or_else(|| {
            AuthError::Validation("MFA setup has not been started".to_string())
        })?;

        if !totp::verify(&secret, code, Utc::now().timestamp()) {
            return Err(AuthError::InvalidCode("Invalid code"));
        }

        self.update_user(&user.id, UserUpdate::EnableMfa).await?;
        tracing::info!(user_id = %user.id, "MFA enabled");
        Ok(())
    }

    /// Turns MFA off and forgets the secret and every trusted device.
    #[tracing::instrument(skip(self, code))]
    pub async fn disable_mfa(&self, user_id: &str, code: &str) -> Result<(), AuthError> {
        let user = self.user(user_id).await?;
        let secret = match (&user.two_factor_secret, user.two_factor_enabled) {
            (Some(secret), true) => secret.clone(),
            _ => return Err(AuthError::MfaNotEnabled),
        };

        if !totp::verify(&secret, code, Utc::now().timestamp()) {
            return Err(AuthError::InvalidCode("Invalid code"));
        }

        self.update_user(&user.id, UserUpdate::DisableMfa).await?;
        tracing::info!(user_id = %user.id, "MFA disabled");
        Ok(())
    }

    // ==================== Magic link ====================

    /// Emails a single-use sign-in link. Unknown addresses succeed silently.
    pub async fn send_magic_link(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            tracing::debug!("Magic link requested for unknown email");
            return Ok(());
        };

        let raw = generate_random_token();
        self.issue_token(
            &user.id,
            TokenKind::MagicLink,
            OneTimeToken::issue(&raw, Duration::minutes(MAGIC_LINK_TTL_MINUTES)),
        )
        .await?;

        let link = format!("{}/magic-link?token={}", self.policy.app_url, raw);
        self.email
            .send_magic_link(&user.email, &link)
            .await
            .map_err(|e| AuthError::Email(e.to_string()))?;

        tracing::info!(user_id = %user.id, "Magic link sent");
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub async fn verify_magic_link(&self, token: &str) -> Result<Session, AuthError> {
        if !is_random_token_shaped(token) {
            return Err(AuthError::TokenInvalid("Invalid magic link"));
        }

        let now = Utc::now();
        let user = self
            .store
            .consume_token(TokenKind::MagicLink, TokenScope::Any, &hash_token(token), now)
            .await?
            .ok_or_else(|| {
                tracing::debug!("No live magic link matched");
                record_auth_event("magic_link", "invalid");
                AuthError::TokenInvalid("Invalid or expired magic link")
            })?;

        if user.is_blocked() {
            return Err(AuthError::AccountSuspended);
        }

        let session = self.sign_in(&user.id, false, None).await?;
        tracing::info!(user_id = %session.user.id, "Magic link login");
        record_auth_event("magic_link", "success");
        Ok(session)
    }

    // ==================== Phone codes ====================

    /// Texts a login code. Unknown numbers succeed silently.
    pub async fn send_login_code(&self, phone: &str) -> Result<(), AuthError> {
        let phone = phone.trim();
        let Some(user) = self.store.find_user_by_phone(phone).await? else {
            tracing::debug!("Login code requested for unknown phone");
            return Ok(());
        };

        self.send_phone_code(&user, phone, login_code_text).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn verify_login_code(&self, phone: &str, code: &str) -> Result<Session, AuthError> {
        let phone = phone.trim();
        if !is_numeric_code(code) {
            return Err(AuthError::TokenInvalid("Invalid or expired code"));
        }

        let now = Utc::now();
        let user = self
            .store
            .consume_token(
                TokenKind::PhoneVerification,
                TokenScope::Phone(phone),
                &hash_token(code),
                now,
            )
            .await?
            .ok_or_else(|| {
                record_auth_event("phone_code", "invalid");
                AuthError::TokenInvalid("Invalid or expired code")
            })?;

        if user.is_blocked() {
            return Err(AuthError::AccountSuspended);
        }

        let session = self.sign_in(&user.id, true, None).await?;
        tracing::info!(user_id = %session.user.id, "Phone code login");
        record_auth_event("phone_code", "success");
        Ok(session)
    }

    /// Texts a verification code to the caller's phone on file.
    pub async fn send_profile_phone_code(&self, user_id: &str) -> Result<(), AuthError> {
        let user = self.user(user_id).await?;
        let phone = user
            .phone
            .clone()
            .ok_or_else(|| AuthError::Validation("No phone number on file".to_string()))?;

        self.send_phone_code(&user, &phone, verification_code_text).await
    }

    #[tracing::instrument(skip(self, code))]
    pub async fn verify_profile_phone(&self, user_id: &str, code: &str) -> Result<UserProfile, AuthError> {
        if !is_numeric_code(code) {
            return Err(AuthError::InvalidCode("Invalid or expired code"));
        }

        let user = self
            .store
            .consume_token(
                TokenKind::PhoneVerification,
                TokenScope::User(user_id),
                &hash_token(code),
                Utc::now(),
            )
            .await?
            .ok_or(AuthError::InvalidCode("Invalid or expired code"))?;

        let user = self.update_user(&user.id, UserUpdate::PhoneVerified).await?;
        tracing::info!(user_id = %user.id, "Phone verified");
        Ok(user.profile())
    }

    async fn send_phone_code(
        &self,
        user: &User,
        phone: &str,
        text: fn(&str) -> String,
    ) -> Result<(), AuthError> {
        if !self.sms.is_enabled() {
            return Err(AuthError::Sms("SMS gateway is not configured".to_string()));
        }

        let code = generate_numeric_code();
        self.issue_token(
            &user.id,
            TokenKind::PhoneVerification,
            OneTimeToken::issue(&code, Duration::minutes(CODE_TTL_MINUTES)),
        )
        .await?;

        self.sms
            .send(&text(&code), &[phone.to_string()])
            .await
            .map_err(|e| AuthError::Sms(e.to_string()))?;

        tracing::info!(user_id = %user.id, "Phone code sent");
        Ok(())
    }

    // ==================== Email verification ====================

    /// Confirms an emailed code, scoped to `email` when given, otherwise to
    /// the signed-in caller.
    pub async fn verify_email(
        &self,
        code: &str,
        email: Option<&str>,
        session_user_id: Option<&str>,
    ) -> Result<UserProfile, AuthError> {
        if !is_numeric_code(code) {
            return Err(AuthError::InvalidCode("Invalid verification code"));
        }

        let email = email.map(normalize_email);
        let scope = match (&email, session_user_id) {
            (Some(email), _) => TokenScope::Email(email),
            (None, Some(user_id)) => TokenScope::User(user_id),
            (None, None) => return Err(AuthError::Unauthorized),
        };

        let user = self
            .store
            .consume_token(TokenKind::EmailVerification, scope, &hash_token(code), Utc::now())
            .await?
            .ok_or(AuthError::InvalidCode("Invalid or expired verification code"))?;

        let user = self.update_user(&user.id, UserUpdate::EmailVerified).await?;
        tracing::info!(user_id = %user.id, "Email verified");
        Ok(user.profile())
    }

    pub async fn resend_verification_email(&self, user_id: &str) -> Result<(), AuthError> {
        let user = self.user(user_id).await?;
        if user.email_verified {
            return Err(AuthError::Validation("Email already verified".to_string()));
        }
        self.send_email_code(&user).await
    }

    /// Resend for accounts that have not signed in yet.
    pub async fn resend_registration_email(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .filter(|u| !u.email_verified)
            .ok_or(AuthError::NotFound("User not found or already verified"))?;
        self.send_email_code(&user).await
    }

    async fn send_email_code(&self, user: &User) -> Result<(), AuthError> {
        let code = generate_numeric_code();
        self.issue_token(
            &user.id,
            TokenKind::EmailVerification,
            OneTimeToken::issue(&code, Duration::minutes(CODE_TTL_MINUTES)),
        )
        .await?;

        self.email
            .send_verification_code(&user.email, &code)
            .await
            .map_err(|e| AuthError::Email(e.to_string()))?;

        tracing::info!(user_id = %user.id, "Verification code emailed");
        Ok(())
    }

    // ==================== Password reset ====================

    /// Emails a reset link. Unknown addresses succeed silently.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let raw = generate_random_token();
        self.issue_token(
            &user.id,
            TokenKind::PasswordReset,
            OneTimeToken::issue(&raw, Duration::minutes(PASSWORD_RESET_TTL_MINUTES)),
        )
        .await?;

        let link = format!("{}/reset-password?token={}", self.policy.app_url, raw);
        self.email
            .send_password_reset(&user.email, &link)
            .await
            .map_err(|e| AuthError::Email(e.to_string()))?;

        tracing::info!(user_id = %user.id, "Password reset link sent");
        Ok(())
    }

    /// Sets the new password, lifts any lockout and ends every session.
    #[tracing::instrument(skip_all)]
    pub async fn confirm_password_reset(&self, token: &str, new_password: Password) -> Result<(), AuthError> {
        if !is_random_token_shaped(token) {
            return Err(AuthError::TokenInvalid("Invalid or expired reset token"));
        }

        let now = Utc::now();
        let user = self
            .store
            .consume_token(TokenKind::PasswordReset, TokenScope::Any, &hash_token(token), now)
            .await?
            .ok_or(AuthError::TokenInvalid("Invalid or expired reset token"))?;

        let update = UserUpdate::Password {
            hash: hash_password(&new_password)?.into_string(),
            clear_lockout: true,
        };
        self.update_user(&user.id, update).await?;

        let revoked = self.store.revoke_user_refresh_tokens(&user.id).await?;
        tracing::info!(user_id = %user.id, revoked_sessions = revoked, "Password reset");
        Ok(())
    }

    // ==================== Refresh / logout ====================

    /// Rotates a refresh token: the presented one is revoked and a new pair issued.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let claims = self.jwt.validate_refresh_token(refresh_token).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token rejected");
            match e {
                TokenError::Expired => AuthError::TokenExpired,
                TokenError::Invalid(_) => invalid_refresh_token(),
            }
        })?;

        let record = self
            .store
            .find_refresh_token(&claims.jti)
            .await?
            .ok_or_else(invalid_refresh_token)?;

        if record.user_id != claims.sub {
            return Err(invalid_refresh_token());
        }

        if record.revoked {
            // A rotated token coming back means it leaked; end every session.
            let revoked = self.store.revoke_user_refresh_tokens(&record.user_id).await?;
            tracing::warn!(
                user_id = %record.user_id,
                revoked_sessions = revoked,
                "Revoked refresh token reused"
            );
            record_auth_event("refresh", "reuse");
            return Err(invalid_refresh_token());
        }

        if !record.accepts(refresh_token, Utc::now()) {
            return Err(invalid_refresh_token());
        }

        // Lost a race with a concurrent rotation of the same token.
        if !self.store.revoke_refresh_token(&record.id).await? {
            return Err(invalid_refresh_token());
        }

        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or_else(invalid_refresh_token)?;

        if user.is_blocked() {
            return Err(AuthError::AccountSuspended);
        }

        let session = self.issue_session(&user).await?;
        record_auth_event("refresh", "success");
        Ok(session)
    }

    /// Revokes the refresh token if one is given and valid; never fails on a bad token.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = refresh_token else {
            return Ok(());
        };

        match self.jwt.validate_refresh_token(token) {
            Ok(claims) => {
                self.store.revoke_refresh_token(&claims.jti).await?;
                tracing::info!(user_id = %claims.sub, "User logged out");
            }
            Err(e) => tracing::debug!(error = %e, "Logout with unusable refresh token"),
        }
        Ok(())
    }

    // ==================== Profile ====================

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, AuthError> {
        Ok(self.user(user_id).await?.profile())
    }

    /// Applies the given changes. A new email or phone must be unused and
    /// resets its verified flag.
    pub async fn update_profile(&self, user_id: &str, changes: ProfileChanges) -> Result<UserProfile, AuthError> {
        let mut user = self.user(user_id).await?;

        let email = changes.email.as_deref().map(normalize_email);
        let phone = changes
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let email_changed = email.as_ref().is_some_and(|e| *e != user.email);
        let phone_changed = phone.is_some() && phone != user.phone;

        if email_changed || phone_changed {
            let check_email = email.as_deref().unwrap_or(&user.email);
            let check_phone = if phone_changed { phone.as_deref() } else { None };
            if self
                .store
                .contact_taken(check_email, check_phone, &user.id)
                .await?
            {
                return Err(AuthError::Conflict("Email or phone already in use"));
            }
        }

        if let Some(full_name) = changes.full_name {
            user.full_name = full_name;
        }
        if email_changed {
            if let Some(email) = email {
                user.email = email;
                user.email_verified = false;
            }
        }
        if phone_changed {
            user.phone = phone;
            user.phone_verified = false;
        }
        if let Some(bio) = changes.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar) = changes.avatar {
            user.avatar = Some(avatar);
        }

        let update = UserUpdate::Profile(ProfileFields::of(&user));
        let user = self
            .store
            .apply_user_update(&user.id, &update, Utc::now())
            .await
            .map_err(|e| match e {
                crate::services::StoreError::Duplicate(_) => {
                    AuthError::Conflict("Email or phone already in use")
                }
                other => other.into(),
            })?
            .ok_or(AuthError::NotFound("User not found"))?;

        tracing::info!(user_id = %user.id, "Profile updated");
        Ok(user.profile())
    }

    #[tracing::instrument(skip(self, current, new_password))]
    pub async fn change_password(
        &self,
        user_id: &str,
        current: Password,
        new_password: Password,
    ) -> Result<(), AuthError> {
        let user = self.user(user_id).await?;
        let stored = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::IncorrectPassword)?;

        if !verify_password(&current, &PasswordHashString::new(stored))? {
            return Err(AuthError::IncorrectPassword);
        }

        let update = UserUpdate::Password {
            hash: hash_password(&new_password)?.into_string(),
            clear_lockout: false,
        };
        self.update_user(&user.id, update).await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    pub async fn role(&self, user_id: &str) -> Result<Role, AuthError> {
        let user = self.user(user_id).await?;
        self.store
            .find_role(&user.organization_id, &user.role)
            .await?
            .ok_or(AuthError::NotFound("Role not found"))
    }

    async fn issue_token(
        &self,
        user_id: &str,
        kind: TokenKind,
        token: OneTimeToken,
    ) -> Result<(), AuthError> {
        self.update_user(user_id, UserUpdate::IssueToken { kind, token }).await?;
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("User not found"))
    }
}
