mod common;

use axum::http::StatusCode;
use common::{registration_body, TestApp};
use serde_json::json;
use tenant_auth::services::{email::EmailKind, TenantWrite};

const EMAIL: &str = "head@greenfield.edu";

#[tokio::test]
async fn registration_creates_a_linked_tenant() {
    let app = TestApp::spawn().await;

    let res = app.post("/organizations/register", registration_body(EMAIL)).await;

    assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
    assert_eq!(res.body["success"], true);
    let organization_id = res.body["organizationId"].as_str().unwrap();
    let user_id = res.body["userId"].as_str().unwrap();
    let code = res.body["organizationCode"].as_str().unwrap();
    assert!(code.starts_with("ORG-"));

    let counts = app.store.counts();
    assert_eq!(
        (counts.organizations, counts.roles, counts.departments, counts.users),
        (1, 1, 1, 1)
    );

    let organizations = app.store.organizations();
    let organization = &organizations[0];
    assert_eq!(organization.id, organization_id);
    assert_eq!(organization.owner.as_deref(), Some(user_id));
    assert_eq!(organization.email, EMAIL);
    assert!(organization.modules.library);
    assert!(organization.modules.transport_management);
    assert_eq!(organization.subscription_plan.period.price, 10.0);

    let departments = app.store.departments();
    let department = &departments[0];
    assert_eq!(department.name, "Administration");
    assert_eq!(department.created_by.as_deref(), Some(user_id));

    let roles = app.store.roles();
    let role = &roles[0];
    assert_eq!(role.name, "admin");
    assert_eq!(role.organization_id, organization_id);

    let user = app.store.user(user_id).unwrap();
    assert_eq!(user.role, "admin");
    assert!(user.is_active);
    assert!(!user.email_verified);
    assert_eq!(user.organization_id, organization_id);
    assert_eq!(
        user.employment.as_ref().and_then(|e| e.department_id.as_deref()),
        Some(department.id.as_str())
    );
    assert_ne!(user.password_hash.as_deref(), Some("password123"));
}

#[tokio::test]
async fn registered_admin_can_sign_in_and_see_the_organization() {
    let app = TestApp::spawn().await;
    app.post("/organizations/register", registration_body(EMAIL)).await;

    let login = app.login(EMAIL, "password123").await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.text);
    let token = login.body["accessToken"].as_str().unwrap();

    let res = app.get_authed("/organizations/me", token).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["organization"]["name"], "Greenfield Academy");
    assert_eq!(res.body["owner"]["email"], EMAIL);
    assert_eq!(res.body["owner"]["fullName"], "Ama Mensah");

    let res = app.get_authed("/users/me/role", token).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["role"]["name"], "admin");
    assert_eq!(res.body["role"]["permissions"]["userManagement"], true);
}

#[tokio::test]
async fn duplicate_organization_email_is_a_conflict() {
    let app = TestApp::spawn().await;
    let first = app.post("/organizations/register", registration_body(EMAIL)).await;
    assert_eq!(first.status, StatusCode::CREATED);
    let before = app.store.counts();

    let res = app
        .post("/organizations/register", registration_body("HEAD@greenfield.edu"))
        .await;

    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.body["success"], false);
    assert_eq!(res.error(), "Organization with this email already exists");
    assert_eq!(app.store.counts(), before);
    assert_eq!(before.organizations, 1);
}

#[tokio::test]
async fn existing_user_email_is_a_conflict() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, None);
    let before = app.store.counts();

    let res = app.post("/organizations/register", registration_body(EMAIL)).await;

    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error(), "User with this email already exists");
    assert_eq!(app.store.counts(), before);
}

#[tokio::test]
async fn failure_at_any_step_leaves_nothing_behind() {
    for step in TenantWrite::ALL {
        let app = TestApp::spawn().await;
        app.store.fail_tenant_write(Some(step));

        let res = app.post("/organizations/register", registration_body(EMAIL)).await;

        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR, "step {:?}", step);
        assert_eq!(res.error(), "Internal server error");
        let counts = app.store.counts();
        assert_eq!(
            (counts.organizations, counts.roles, counts.departments, counts.users),
            (0, 0, 0, 0),
            "partial tenant left after failing at {:?}",
            step
        );
    }
}

#[tokio::test]
async fn invalid_registration_input_is_rejected() {
    let app = TestApp::spawn().await;

    let mut body = registration_body(EMAIL);
    body["password"] = json!("short");
    let res = app.post("/organizations/register", body).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut body = registration_body(EMAIL);
    body["plan"] = json!("enterprise");
    let res = app.post("/organizations/register", body).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let mut body = registration_body(EMAIL);
    body["modules"] = json!({ "teleportation": true });
    let res = app.post("/organizations/register", body).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "Unknown module: teleportation");

    assert_eq!(app.store.counts().organizations, 0);
}

#[tokio::test]
async fn new_admin_verifies_email_with_emailed_code() {
    let app = TestApp::spawn().await;
    let res = app.post("/organizations/register", registration_body(EMAIL)).await;
    let user_id = res.body["userId"].as_str().unwrap().to_string();

    let res = app
        .post("/auth/email/resend-registration", json!({ "email": EMAIL }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    let code = app
        .email
        .last(EMAIL, EmailKind::VerificationCode)
        .expect("verification email")
        .payload;
    assert_eq!(code.len(), 6);

    let res = app
        .post("/auth/email/verify", json!({ "code": code, "email": EMAIL }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["user"]["emailVerified"], true);
    assert!(app.store.user(&user_id).unwrap().email_verified);

    let res = app
        .post("/auth/email/resend-registration", json!({ "email": EMAIL }))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.error(), "User not found or already verified");
}
