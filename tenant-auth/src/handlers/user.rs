use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::CodeRequest,
        user::{ChangePasswordRequest, ProfileResponse, RoleResponse, UpdateProfileRequest},
        ErrorResponse, MessageResponse,
    },
    middleware::AuthUser,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth_service.profile(&claims.sub).await?;
    Ok(Json(ProfileResponse::new(profile)))
}

/// Update the caller's profile
#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 409, description = "Email or phone already in use", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .auth_service
        .update_profile(&claims.sub, req.into())
        .await?;
    Ok(Json(ProfileResponse::new(profile)))
}

/// Change the caller's password
#[utoipa::path(
    post,
    path = "/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password is incorrect", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .change_password(
            &claims.sub,
            Password::new(req.current_password),
            Password::new(req.new_password),
        )
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Get the caller's role definition
#[utoipa::path(
    get,
    path = "/users/me/role",
    responses(
        (status = 200, description = "Role of the caller's organization", body = RoleResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_current_role(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let role = state.auth_service.role(&claims.sub).await?;
    Ok(Json(RoleResponse {
        success: true,
        role,
    }))
}

/// Text a verification code to the caller's phone
#[utoipa::path(
    post,
    path = "/users/me/phone/send",
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "No phone number on file", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 502, description = "SMS delivery failed", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn send_phone_verification(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.send_profile_phone_code(&claims.sub).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// Confirm the caller's phone with the texted code
#[utoipa::path(
    post,
    path = "/users/me/phone/verify",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Phone verified", body = ProfileResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn verify_phone(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .auth_service
        .verify_profile_phone(&claims.sub, &req.code)
        .await?;
    Ok(Json(ProfileResponse::new(profile)))
}
