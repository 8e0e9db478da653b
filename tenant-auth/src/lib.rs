pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{rate_limit_middleware, CounterStore, RouteRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{http_trace_layer, request_id_middleware},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::services::{
    AuthPolicy, AuthService, AuthStore, EmailProvider, JwtService, SmsGateway, TenantService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::session::check_trusted_device,
        handlers::auth::mfa::verify,
        handlers::auth::mfa::setup,
        handlers::auth::mfa::enable,
        handlers::auth::mfa::disable,
        handlers::auth::passwordless::send_magic_link,
        handlers::auth::passwordless::verify_magic_link,
        handlers::auth::passwordless::send_phone_code,
        handlers::auth::passwordless::verify_phone_code,
        handlers::auth::verification::verify_email,
        handlers::auth::verification::resend,
        handlers::auth::verification::resend_registration,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::confirm_password_reset,
        handlers::user::get_current_user,
        handlers::user::update_profile,
        handlers::user::change_password,
        handlers::user::get_current_role,
        handlers::user::send_phone_verification,
        handlers::user::verify_phone,
        handlers::organization::register_organization,
        handlers::organization::get_my_organization,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::MfaVerifyRequest,
            dtos::auth::TrustedDeviceCheckRequest,
            dtos::auth::EmailRequest,
            dtos::auth::TokenRequest,
            dtos::auth::PhoneRequest,
            dtos::auth::PhoneVerifyRequest,
            dtos::auth::CodeRequest,
            dtos::auth::EmailVerifyRequest,
            dtos::auth::PasswordResetConfirm,
            dtos::auth::RefreshRequest,
            dtos::auth::SessionResponse,
            dtos::auth::MfaChallengeResponse,
            dtos::auth::TrustedDeviceResponse,
            dtos::auth::MfaSetupResponse,
            dtos::user::UpdateProfileRequest,
            dtos::user::ChangePasswordRequest,
            dtos::user::ProfileResponse,
            dtos::user::RoleResponse,
            dtos::organization::AddressRequest,
            dtos::organization::RegisterOrganizationRequest,
            dtos::organization::RegisterOrganizationResponse,
            dtos::organization::OrganizationResponse,
            models::UserSummary,
            models::UserProfile,
            models::Organization,
            models::Address,
            models::ModuleFlags,
            models::PlanTier,
            models::SubscriptionPlan,
            models::organization::BillingPeriod,
            models::Role,
            models::RolePermissions,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Password login, sessions and password reset"),
        (name = "MFA", description = "TOTP enrolment, verification and trusted devices"),
        (name = "Passwordless", description = "Magic links and SMS login codes"),
        (name = "Verification", description = "Email verification codes"),
        (name = "Users", description = "The signed-in user's profile"),
        (name = "Organizations", description = "Tenant registration and lookup"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn AuthStore>,
    pub jwt: JwtService,
    pub auth_service: AuthService,
    pub tenant_service: TenantService,
    pub login_rate_limiter: RouteRateLimiter,
    pub otp_rate_limiter: RouteRateLimiter,
    pub register_rate_limiter: RouteRateLimiter,
    pub ip_rate_limiter: RouteRateLimiter,
}

impl AppState {
    /// Wires services and rate limiters from configuration. Rate-limit
    /// counters live in `counters` so every instance shares them.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        sms: Arc<dyn SmsGateway>,
        email: Arc<dyn EmailProvider>,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let auth_service = AuthService::new(
            store.clone(),
            jwt.clone(),
            sms,
            email,
            AuthPolicy::from_config(&config),
        );
        let tenant_service = TenantService::new(store.clone());

        let limits = &config.rate_limit;
        let login_rate_limiter = RouteRateLimiter::new(
            counters.clone(),
            "login",
            limits.login_attempts,
            limits.login_window_seconds,
        );
        let otp_rate_limiter = RouteRateLimiter::new(
            counters.clone(),
            "otp",
            limits.otp_attempts,
            limits.otp_window_seconds,
        );
        let register_rate_limiter = RouteRateLimiter::new(
            counters.clone(),
            "register",
            limits.register_attempts,
            limits.register_window_seconds,
        );
        let ip_rate_limiter = RouteRateLimiter::new(
            counters,
            "global",
            limits.global_ip_limit,
            limits.global_ip_window_seconds,
        );

        Self {
            config,
            store,
            jwt,
            auth_service,
            tenant_service,
            login_rate_limiter,
            otp_rate_limiter,
            register_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Password and second-factor attempts share one budget per IP.
    let login_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/mfa/verify", post(handlers::auth::mfa::verify))
        .route("/auth/phone/verify", post(handlers::auth::verify_phone_code))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            rate_limit_middleware,
        ));

    // Anything that sends an email or SMS.
    let otp_routes = Router::new()
        .route("/auth/magic-link", post(handlers::auth::send_magic_link))
        .route("/auth/phone/send", post(handlers::auth::send_phone_code))
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/auth/email/resend-registration",
            post(handlers::auth::verification::resend_registration),
        )
        .layer(from_fn_with_state(
            state.otp_rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let register_routes = Router::new()
        .route(
            "/organizations/register",
            post(handlers::register_organization),
        )
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/auth/mfa/setup", post(handlers::auth::mfa::setup))
        .route("/auth/mfa/enable", post(handlers::auth::mfa::enable))
        .route("/auth/mfa/disable", post(handlers::auth::mfa::disable))
        .route(
            "/auth/email/resend",
            post(handlers::auth::verification::resend),
        )
        .route(
            "/users/me",
            get(handlers::get_current_user).patch(handlers::update_profile),
        )
        .route("/users/me/password", post(handlers::change_password))
        .route("/users/me/role", get(handlers::get_current_role))
        .route(
            "/users/me/phone/send",
            post(handlers::send_phone_verification),
        )
        .route("/users/me/phone/verify", post(handlers::verify_phone))
        .route("/organizations/me", get(handlers::get_my_organization))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.swagger.enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    }

    let app = app
        .route(
            "/auth/trusted-device/check",
            post(handlers::auth::check_trusted_device),
        )
        .route(
            "/auth/magic-link/verify",
            post(handlers::auth::verify_magic_link),
        )
        .route(
            "/auth/email/verify",
            post(handlers::auth::verification::verify_email),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .merge(login_routes)
        .merge(otp_routes)
        .merge(register_routes)
        .merge(protected_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(from_fn(middleware::metrics_middleware))
        .layer(http_trace_layer())
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}

/// Cookies are the session carrier, so origins must be explicit.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "MongoDB health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "mongodb": "up"
        }
    })))
}
