//! Shared setup for tenant-auth integration tests.
//!
//! Everything runs in-process: the router is driven with `oneshot`, the store
//! is the in-memory implementation and SMS/email go to recording mocks.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use service_core::middleware::rate_limit::InMemoryCounterStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tenant_auth::{
    build_router,
    config::{
        AuthConfig, Environment, JwtConfig, LoginPolicyConfig, MfaConfig, MongoConfig,
        RateLimitConfig, RedisConfig, SecurityConfig, SmsConfig, SwaggerConfig,
    },
    models::{Address, ModuleFlags, NewOrganization, Organization, PlanTier, Role, User},
    services::{InMemoryStore, MockEmailService, MockSmsGateway},
    utils::{hash_password, Password},
    AppState,
};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config {
            port: 8080,
            shutdown_grace_seconds: 0,
        },
        environment: Environment::Dev,
        service_name: "tenant-auth-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        app_url: "http://app.test".to_string(),
        mongodb: MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "unused".to_string(),
        },
        redis: RedisConfig { url: None },
        jwt: JwtConfig {
            access_secret: SecretString::new("test-access-secret-0123456789abcdef".to_string()),
            refresh_secret: SecretString::new("test-refresh-secret-0123456789abcdef".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 30,
            mfa_token_expiry_minutes: 10,
        },
        login: LoginPolicyConfig::default(),
        mfa: MfaConfig {
            issuer: "tenant-auth".to_string(),
            trusted_device_days: 30,
        },
        sms: SmsConfig {
            endpoint: "http://sms.test/send".to_string(),
            token: None,
            sender: "Campus".to_string(),
        },
        smtp: None,
        security: SecurityConfig {
            allowed_origins: vec!["http://app.test".to_string()],
            secure_cookies: false,
        },
        swagger: SwaggerConfig { enabled: true },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            otp_attempts: 100,
            otp_window_seconds: 60,
            register_attempts: 100,
            register_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` of each Set-Cookie header for `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies()
            .into_iter()
            .find(|c| c.starts_with(&format!("{}=", name)))
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
    pub sms: Arc<MockSmsGateway>,
    pub email: Arc<MockEmailService>,
    pub config: AuthConfig,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: AuthConfig) -> Self {
        let store = InMemoryStore::new();
        let sms = Arc::new(MockSmsGateway::new());
        let email = Arc::new(MockEmailService::new());

        let state = AppState::new(
            config.clone(),
            Arc::new(store.clone()),
            sms.clone(),
            email.clone(),
            Arc::new(InMemoryCounterStore::new()),
        );
        let router = build_router(state).await.expect("Failed to build router");

        Self {
            router,
            store,
            sms,
            email,
            config,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            text,
            body,
        }
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn post_authed(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        let bearer = format!("Bearer {}", token);
        self.request(
            Method::POST,
            uri,
            Some(body),
            &[(header::AUTHORIZATION.as_str(), bearer.as_str())],
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None, &[]).await
    }

    pub async fn get_authed(&self, uri: &str, token: &str) -> TestResponse {
        let bearer = format!("Bearer {}", token);
        self.request(
            Method::GET,
            uri,
            None,
            &[(header::AUTHORIZATION.as_str(), bearer.as_str())],
        )
        .await
    }

    pub async fn patch_authed(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        let bearer = format!("Bearer {}", token);
        self.request(
            Method::PATCH,
            uri,
            Some(body),
            &[(header::AUTHORIZATION.as_str(), bearer.as_str())],
        )
        .await
    }

    /// Organization, admin role and a verified admin user with [`TEST_PASSWORD`].
    pub fn seed_user(&self, email: &str, phone: Option<&str>) -> User {
        let organization = Organization::new(NewOrganization {
            name: "Greenfield Academy".to_string(),
            email: format!("office+{}", email),
            phone: "+233302000000".to_string(),
            website: None,
            description: None,
            founded_year: 1998,
            addresses: Address {
                street: "1 Main St".to_string(),
                city: "Accra".to_string(),
                state: String::new(),
                zip_code: String::new(),
                country: "Ghana".to_string(),
            },
            modules: ModuleFlags::default(),
            plan: PlanTier::Basic,
        });
        let role = Role::administrator(&organization.id);

        let mut user = User::new(
            organization.id.clone(),
            "Ama Mensah".to_string(),
            email.to_string(),
            role.name.clone(),
        );
        user.phone = phone.map(str::to_string);
        user.email_verified = true;
        user.password_hash = Some(
            hash_password(&Password::new(TEST_PASSWORD))
                .unwrap()
                .into_string(),
        );

        self.store.insert_organization(organization);
        self.store.insert_role(role);
        self.store.insert_user(user.clone());
        user
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Access token from a successful password login.
    pub async fn access_token(&self, email: &str) -> String {
        let res = self.login(email, TEST_PASSWORD).await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.text);
        res.body["accessToken"].as_str().unwrap().to_string()
    }
}

pub fn registration_body(email: &str) -> Value {
    let modules: BTreeMap<&str, bool> = [("library", true), ("transportManagement", true)]
        .into_iter()
        .collect();

    serde_json::json!({
        "name": "Greenfield Academy",
        "addresses": {
            "street": "1 Main St",
            "city": "Accra",
            "state": "Greater Accra",
            "zipCode": "00233",
            "country": "Ghana"
        },
        "phone": "+233302000000",
        "website": "https://greenfield.edu",
        "foundedYear": 1998,
        "description": "Primary and junior high",
        "fullName": "Ama Mensah",
        "email": email,
        "password": "password123",
        "position": "Headmistress",
        "phoneNumber": "+233201234567",
        "modules": modules,
        "plan": "pro"
    })
}

/// Query parameter value from an emailed link.
pub fn token_from_link(link: &str) -> String {
    link.split("token=").nth(1).unwrap_or_default().to_string()
}

/// Six digits from an SMS such as "Your login code is: 123456. Valid for ...".
pub fn code_from_sms(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).take(6).collect()
}
