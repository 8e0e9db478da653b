use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;

/// Purpose a token was minted for; a token is only accepted for its own use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
    Mfa,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(err.to_string()),
        }
    }
}

trait Purpose {
    fn token_use(&self) -> TokenUse;
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    /// Organization the user belongs to
    pub org: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub mfa_enabled: bool,
    pub token_use: TokenUse,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    /// Token ID (matches the stored record)
    pub jti: String,
    pub token_use: TokenUse,
    pub exp: i64,
    pub iat: i64,
}

/// Claims for the short challenge token between the password and MFA steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaChallengeClaims {
    pub sub: String,
    pub token_use: TokenUse,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl Purpose for AccessTokenClaims {
    fn token_use(&self) -> TokenUse {
        self.token_use
    }
}

impl Purpose for RefreshTokenClaims {
    fn token_use(&self) -> TokenUse {
        self.token_use
    }
}

impl Purpose for MfaChallengeClaims {
    fn token_use(&self) -> TokenUse {
        self.token_use
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Identifier of the refresh token's server-side record
    pub refresh_token_id: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// HS256 token service. Access and MFA tokens share the access secret;
/// refresh tokens use their own.
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    mfa_token_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let access = config.access_secret.expose_secret().as_bytes();
        let refresh = config.refresh_secret.expose_secret().as_bytes();

        Self {
            access_encoding: EncodingKey::from_secret(access),
            access_decoding: DecodingKey::from_secret(access),
            refresh_encoding: EncodingKey::from_secret(refresh),
            refresh_decoding: DecodingKey::from_secret(refresh),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            mfa_token_expiry_minutes: config.mfa_token_expiry_minutes,
        }
    }

    pub fn generate_access_token(&self, user: &User) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.full_name.clone(),
            roles: user.roles(),
            org: user.organization_id.clone(),
            email_verified: user.email_verified,
            phone_verified: user.phone_verified,
            mfa_enabled: user.two_factor_enabled,
            token_use: TokenUse::Access,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    pub fn generate_refresh_token(
        &self,
        user_id: &str,
        token_id: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();

        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            jti: token_id.to_string(),
            token_use: TokenUse::Refresh,
            exp: (now + self.refresh_token_ttl()).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    pub fn generate_mfa_token(&self, user_id: &str) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.mfa_token_expiry_minutes);

        let claims = MfaChallengeClaims {
            sub: user_id.to_string(),
            token_use: TokenUse::Mfa,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode MFA token: {}", e))
    }

    pub fn generate_token_pair(&self, user: &User) -> Result<TokenPair, anyhow::Error> {
        let access_token = self.generate_access_token(user)?;
        let refresh_token_id = Uuid::new_v4().to_string();
        let refresh_token = self.generate_refresh_token(&user.id, &refresh_token_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_token_id,
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        validate(token, &self.access_decoding, TokenUse::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        validate(token, &self.refresh_decoding, TokenUse::Refresh)
    }

    pub fn validate_mfa_token(&self, token: &str) -> Result<MfaChallengeClaims, TokenError> {
        validate(token, &self.access_decoding, TokenUse::Mfa)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::days(self.refresh_token_expiry_days)
    }
}

fn validate<C>(token: &str, key: &DecodingKey, expected: TokenUse) -> Result<C, TokenError>
where
    C: DeserializeOwned + Purpose,
{
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let claims = decode::<C>(token, key, &validation)?.claims;
    if claims.token_use() != expected {
        return Err(TokenError::Invalid(format!(
            "expected {expected:?} token, got {:?}",
            claims.token_use()
        )));
    }
    Ok(claims)
}
