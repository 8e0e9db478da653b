use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{CodeRequest, MfaSetupResponse, MfaVerifyRequest, SessionResponse},
        ErrorResponse, MessageResponse,
    },
    handlers::cookies,
    middleware::{AuthUser, MaybeAuthUser},
    services::MfaVerification,
    utils::ValidatedJson,
    AppState,
};

/// Complete a login with a TOTP code
///
/// Accepts the challenge token from `/auth/login` or an existing session.
#[utoipa::path(
    post,
    path = "/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "MFA not enabled", body = ErrorResponse),
        (status = 401, description = "Invalid code or MFA token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "MFA"
)]
pub async fn verify(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<MfaVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let verified = state
        .auth_service
        .verify_mfa(MfaVerification {
            code: &req.code,
            mfa_token: req.mfa_token.as_deref().filter(|t| !t.is_empty()),
            session_user_id: claims.as_ref().map(|c| c.sub.as_str()),
            remember_device: req.remember_device,
        })
        .await?;

    let secure = state.config.security.secure_cookies;
    let mut jar = cookies::with_session(jar, &verified.session.tokens, secure);
    if let Some(device_token) = &verified.trusted_device_token {
        jar = cookies::with_trusted_device(
            jar,
            device_token,
            state.config.mfa.trusted_device_days,
            secure,
        );
    }

    Ok((
        jar,
        Json(SessionResponse::new(
            verified.session,
            verified.trusted_device_token,
        )),
    ))
}

/// Start MFA enrolment
#[utoipa::path(
    post,
    path = "/auth/mfa/setup",
    responses(
        (status = 200, description = "Secret generated; MFA stays off until enabled", body = MfaSetupResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 400, description = "MFA already enabled", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn setup(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.auth_service.setup_mfa(&claims.sub).await?;

    Ok(Json(MfaSetupResponse {
        success: true,
        secret: enrollment.secret,
        otpauth_url: enrollment.otpauth_url,
    }))
}

/// Confirm enrolment with a first TOTP code
#[utoipa::path(
    post,
    path = "/auth/mfa/enable",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "MFA enabled", body = MessageResponse),
        (status = 400, description = "Invalid code or setup not started", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn enable(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.enable_mfa(&claims.sub, &req.code).await?;
    Ok(Json(MessageResponse::new("MFA enabled")))
}

/// Turn MFA off; forgets every trusted device
#[utoipa::path(
    post,
    path = "/auth/mfa/disable",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "MFA disabled", body = MessageResponse),
        (status = 400, description = "Invalid code or MFA not enabled", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn disable(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.disable_mfa(&claims.sub, &req.code).await?;
    Ok(Json(MessageResponse::new("MFA disabled")))
}
