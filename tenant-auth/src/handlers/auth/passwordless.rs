use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{EmailRequest, PhoneRequest, PhoneVerifyRequest, SessionResponse, TokenRequest},
        ErrorResponse, MessageResponse,
    },
    handlers::cookies,
    utils::ValidatedJson,
    AppState,
};

/// Email a single-use sign-in link
#[utoipa::path(
    post,
    path = "/auth/magic-link",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Link sent if the account exists", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 502, description = "Email delivery failed", body = ErrorResponse)
    ),
    tag = "Passwordless"
)]
pub async fn send_magic_link(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.send_magic_link(&req.email).await?;
    Ok(Json(MessageResponse::new(
        "If an account exists for that email, a sign-in link has been sent",
    )))
}

/// Sign in with a magic link token
#[utoipa::path(
    post,
    path = "/auth/magic-link/verify",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid or expired magic link", body = ErrorResponse)
    ),
    tag = "Passwordless"
)]
pub async fn verify_magic_link(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth_service.verify_magic_link(&req.token).await?;
    let jar = cookies::with_session(jar, &session.tokens, state.config.security.secure_cookies);
    Ok((jar, Json(SessionResponse::new(session, None))))
}

/// Text a login code
#[utoipa::path(
    post,
    path = "/auth/phone/send",
    request_body = PhoneRequest,
    responses(
        (status = 200, description = "Code sent if the number is registered", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 502, description = "SMS delivery failed", body = ErrorResponse)
    ),
    tag = "Passwordless"
)]
pub async fn send_phone_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PhoneRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.send_login_code(&req.phone).await?;
    Ok(Json(MessageResponse::new(
        "If that number is registered, a login code has been sent",
    )))
}

/// Sign in with a texted code
#[utoipa::path(
    post,
    path = "/auth/phone/verify",
    request_body = PhoneVerifyRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid or expired code", body = ErrorResponse)
    ),
    tag = "Passwordless"
)]
pub async fn verify_phone_code(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<PhoneVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .auth_service
        .verify_login_code(&req.phone, &req.code)
        .await?;
    let jar = cookies::with_session(jar, &session.tokens, state.config.security.secure_cookies);
    Ok((jar, Json(SessionResponse::new(session, None))))
}
