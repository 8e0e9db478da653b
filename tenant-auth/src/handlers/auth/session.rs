use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            LoginRequest, MfaChallengeResponse, RefreshRequest, SessionResponse,
            TrustedDeviceCheckRequest, TrustedDeviceResponse,
        },
        ErrorResponse, MessageResponse,
    },
    handlers::cookies::{self, REFRESH_COOKIE, TRUSTED_DEVICE_COOKIE},
    services::LoginOutcome,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, or an MFA challenge when `requiresMFA` is set", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account suspended", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Account temporarily locked", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device_token = req
        .trusted_device_token
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| cookies::cookie_value(&jar, TRUSTED_DEVICE_COOKIE));

    let outcome = state
        .auth_service
        .login(&req.email, Password::new(req.password), device_token.as_deref())
        .await?;

    match outcome {
        LoginOutcome::MfaRequired { mfa_token, user_id } => Ok((
            jar,
            Json(MfaChallengeResponse {
                success: true,
                requires_mfa: true,
                mfa_token,
                user_id,
            }),
        )
            .into_response()),
        LoginOutcome::Authenticated(session) => {
            let jar = cookies::with_session(jar, &session.tokens, state.config.security.secure_cookies);
            Ok((jar, Json(SessionResponse::new(session, None))).into_response())
        }
    }
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = SessionResponse),
        (status = 401, description = "Missing, invalid, expired or revoked refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| cookies::cookie_value(&jar, REFRESH_COOKIE))
        .ok_or_else(|| AppError::Unauthorized("Refresh token required".to_string()))?;

    let session = state.auth_service.refresh(&token).await?;
    let jar = cookies::with_session(jar, &session.tokens, state.config.security.secure_cookies);
    Ok((jar, Json(SessionResponse::new(session, None))))
}

/// Revoke the refresh token and clear session cookies
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| cookies::cookie_value(&jar, REFRESH_COOKIE));

    state.auth_service.logout(token.as_deref()).await?;

    Ok((
        StatusCode::OK,
        cookies::without_session(jar),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// Whether a device token is still trusted for a user
#[utoipa::path(
    post,
    path = "/auth/trusted-device/check",
    request_body = TrustedDeviceCheckRequest,
    responses(
        (status = 200, description = "Trust status", body = TrustedDeviceResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "MFA"
)]
pub async fn check_trusted_device(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<TrustedDeviceCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let trusted = state
        .auth_service
        .is_trusted_device(&req.user_id, &req.device_token)
        .await?;

    Ok(Json(TrustedDeviceResponse {
        success: true,
        trusted,
    }))
}
