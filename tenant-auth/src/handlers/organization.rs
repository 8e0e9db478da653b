use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        organization::{OrganizationResponse, RegisterOrganizationRequest, RegisterOrganizationResponse},
        ErrorResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Register an organization and its first administrator
///
/// Creates the organization, its `admin` role, the Administration department
/// and the admin user in one transaction.
#[utoipa::path(
    post,
    path = "/organizations/register",
    request_body = RegisterOrganizationRequest,
    responses(
        (status = 201, description = "Organization registered", body = RegisterOrganizationResponse),
        (status = 400, description = "Unknown module", body = ErrorResponse),
        (status = 409, description = "Organization or user email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Organizations"
)]
pub async fn register_organization(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let registration = req.into_registration().map_err(AppError::BadRequest)?;
    let tenant = state
        .tenant_service
        .register_organization(registration)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterOrganizationResponse {
            success: true,
            organization_id: tenant.organization_id,
            organization_code: tenant.organization_code,
            user_id: tenant.user_id,
            message: "Organization registered successfully".to_string(),
        }),
    ))
}

/// Get the caller's organization
#[utoipa::path(
    get,
    path = "/organizations/me",
    responses(
        (status = 200, description = "Organization with its owner", body = OrganizationResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn get_my_organization(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let overview = state.tenant_service.organization_for_user(&claims.sub).await?;
    Ok(Json(OrganizationResponse::from(overview)))
}
