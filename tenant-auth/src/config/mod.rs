use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_SMS_ENDPOINT: &str = "https://api.smsonlinegh.com/v5/message/sms/send";
const MIN_PROD_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Public base URL of the web app, used to build emailed links.
    pub app_url: String,
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub login: LoginPolicyConfig,
    pub mfa: MfaConfig,
    pub sms: SmsConfig,
    pub smtp: Option<SmtpConfig>,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Rate-limit counters fall back to process memory when unset.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub mfa_token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct LoginPolicyConfig {
    pub max_attempts: u32,
    pub lockout_minutes: i64,
}

impl Default for LoginPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MfaConfig {
    pub issuer: String,
    pub trusted_device_days: i64,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub endpoint: String,
    pub token: Option<SecretString>,
    pub sender: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub otp_attempts: u32,
    pub otp_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let smtp = match get_env_opt("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_env("SMTP_PORT", "587")?,
                user: get_env("SMTP_USER", None)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", None)?),
                from: get_env("SMTP_FROM", None)?,
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SMTP_HOST is required in production but not set"
                )));
            }
            None => None,
        };

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("tenant-auth"))?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: get_env_opt("OTLP_ENDPOINT"),
            app_url: get_env_opt("APP_URL")
                .or_else(|| get_env_opt("NEXT_PUBLIC_APP_URL"))
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", if is_prod { None } else { Some("mongodb://localhost:27017") })?,
                database: get_env("MONGODB_DATABASE", Some("tenant_auth"))?,
            },
            redis: RedisConfig {
                url: get_env_opt("REDIS_URL"),
            },
            jwt: JwtConfig {
                access_secret: SecretString::new(get_env("JWT_ACCESS_SECRET", None)?),
                refresh_secret: SecretString::new(get_env("JWT_REFRESH_SECRET", None)?),
                access_token_expiry_minutes: parse_env("ACCESS_TOKEN_TTL_MINUTES", "15")?,
                refresh_token_expiry_days: parse_env("REFRESH_TOKEN_TTL_DAYS", "30")?,
                mfa_token_expiry_minutes: parse_env("MFA_TOKEN_TTL_MINUTES", "10")?,
            },
            login: LoginPolicyConfig {
                max_attempts: parse_env("LOGIN_MAX_ATTEMPTS", "5")?,
                lockout_minutes: parse_env("LOGIN_LOCKOUT_MINUTES", "30")?,
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("tenant-auth"))?,
                trusted_device_days: parse_env("TRUSTED_DEVICE_TTL_DAYS", "30")?,
            },
            sms: SmsConfig {
                endpoint: get_env("SMS_ENDPOINT", Some(DEFAULT_SMS_ENDPOINT))?,
                token: get_env_opt("SMS_TOKEN").map(SecretString::new),
                sender: get_env("SMS_SENDER", Some("Campus"))?,
            },
            smtp,
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some(DEFAULT_APP_URL))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                secure_cookies: parse_env("COOKIE_SECURE", if is_prod { "true" } else { "false" })?,
            },
            swagger: SwaggerConfig {
                enabled: parse_env("ENABLE_SWAGGER", if is_prod { "false" } else { "true" })?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5")?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900")?,
                otp_attempts: parse_env("RATE_LIMIT_OTP_ATTEMPTS", "5")?,
                otp_window_seconds: parse_env("RATE_LIMIT_OTP_WINDOW_SECONDS", "900")?,
                register_attempts: parse_env("RATE_LIMIT_REGISTER_ATTEMPTS", "3")?,
                register_window_seconds: parse_env("RATE_LIMIT_REGISTER_WINDOW_SECONDS", "3600")?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100")?,
                global_ip_window_seconds: parse_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "60")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(config_error("ACCESS_TOKEN_TTL_MINUTES must be positive"));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(config_error("REFRESH_TOKEN_TTL_DAYS must be positive"));
        }

        if self.jwt.mfa_token_expiry_minutes <= 0 {
            return Err(config_error("MFA_TOKEN_TTL_MINUTES must be positive"));
        }

        if self.login.max_attempts == 0 {
            return Err(config_error("LOGIN_MAX_ATTEMPTS must be greater than 0"));
        }

        if self.jwt.access_secret.expose_secret() == self.jwt.refresh_secret.expose_secret() {
            return Err(config_error(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ",
            ));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.jwt.access_secret.expose_secret().len() < MIN_PROD_SECRET_LEN
                || self.jwt.refresh_secret.expose_secret().len() < MIN_PROD_SECRET_LEN
            {
                return Err(config_error(
                    "JWT secrets must be at least 32 bytes in production",
                ));
            }

            if self.sms.token.is_none() {
                tracing::warn!("SMS_TOKEN is not set; phone codes cannot be delivered");
            }

            if self.swagger.enabled {
                tracing::warn!("Swagger UI is enabled in production");
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default))?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
    })
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_accepts_long_names() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("DEV".parse::<Environment>(), Ok(Environment::Dev));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn login_policy_defaults() {
        let policy = LoginPolicyConfig::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.lockout_minutes, 30);
    }
}
