use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{EmailRequest, EmailVerifyRequest},
        user::ProfileResponse,
        ErrorResponse, MessageResponse,
    },
    middleware::{AuthUser, MaybeAuthUser},
    utils::ValidatedJson,
    AppState,
};

/// Confirm an email address with the emailed code
///
/// The code is matched against `email` when given, otherwise against the
/// signed-in caller.
#[utoipa::path(
    post,
    path = "/auth/email/verify",
    request_body = EmailVerifyRequest,
    responses(
        (status = 200, description = "Email verified", body = ProfileResponse),
        (status = 400, description = "Invalid or expired verification code", body = ErrorResponse),
        (status = 401, description = "Neither an email nor a session was supplied", body = ErrorResponse)
    ),
    tag = "Verification"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    ValidatedJson(req): ValidatedJson<EmailVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .auth_service
        .verify_email(
            &req.code,
            req.email.as_deref(),
            claims.as_ref().map(|c| c.sub.as_str()),
        )
        .await?;

    Ok(Json(ProfileResponse::new(profile)))
}

/// Send a fresh verification code to the caller
#[utoipa::path(
    post,
    path = "/auth/email/resend",
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Email already verified", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "Verification",
    security(("bearer_auth" = []))
)]
pub async fn resend(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.resend_verification_email(&claims.sub).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// Send a fresh verification code to a newly registered address
#[utoipa::path(
    post,
    path = "/auth/email/resend-registration",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 404, description = "User not found or already verified", body = ErrorResponse)
    ),
    tag = "Verification"
)]
pub async fn resend_registration(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.resend_registration_email(&req.email).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}
