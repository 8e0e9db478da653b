mod common;

use axum::http::{header, Method, StatusCode};
use chrono::{Duration, Utc};
use common::{TestApp, TEST_PASSWORD};
use serde_json::json;
use tenant_auth::utils::totp;

const EMAIL: &str = "ama@greenfield.edu";

fn current_code(secret: &str) -> String {
    totp::code_for(secret, Utc::now().timestamp()).unwrap()
}

/// A six-digit code outside the accepted window.
fn wrong_code(secret: &str) -> String {
    let now = Utc::now().timestamp();
    let nearby: Vec<String> = (-2..=2)
        .filter_map(|step| totp::code_for(secret, now + step * 30))
        .collect();
    ["111111", "222222", "333333", "444444", "555555", "666666"]
        .into_iter()
        .find(|candidate| !nearby.iter().any(|c| c == candidate))
        .unwrap()
        .to_string()
}

/// Seeds a user and turns MFA on through the API; returns (user id, secret).
async fn enroll(app: &TestApp) -> (String, String) {
    let user = app.seed_user(EMAIL, None);
    let token = app.access_token(EMAIL).await;

    let setup = app.post_authed("/auth/mfa/setup", &token, json!({})).await;
    assert_eq!(setup.status, StatusCode::OK, "{}", setup.text);
    let secret = setup.body["secret"].as_str().unwrap().to_string();
    let otpauth = setup.body["otpauthUrl"].as_str().unwrap();
    assert!(otpauth.starts_with("otpauth://totp/tenant-auth:"));
    assert!(otpauth.contains(&format!("secret={}", secret)));

    // Setup alone does not turn MFA on.
    assert!(!app.store.user(&user.id).unwrap().two_factor_enabled);

    let enable = app
        .post_authed("/auth/mfa/enable", &token, json!({ "code": current_code(&secret) }))
        .await;
    assert_eq!(enable.status, StatusCode::OK, "{}", enable.text);
    assert!(app.store.user(&user.id).unwrap().two_factor_enabled);

    (user.id, secret)
}

#[tokio::test]
async fn login_with_mfa_returns_a_challenge() {
    let app = TestApp::spawn().await;
    let (user_id, _) = enroll(&app).await;

    let res = app.login(EMAIL, TEST_PASSWORD).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["requiresMFA"], true);
    assert_eq!(res.body["userId"], user_id.as_str());
    assert!(res.body["mfaToken"].as_str().is_some());
    assert!(res.body.get("accessToken").is_none());
    assert!(res.cookie("auth-token").is_none());
}

#[tokio::test]
async fn challenge_completes_with_valid_code() {
    let app = TestApp::spawn().await;
    let (user_id, secret) = enroll(&app).await;
    let challenge = app.login(EMAIL, TEST_PASSWORD).await;
    let mfa_token = challenge.body["mfaToken"].as_str().unwrap();

    let res = app
        .post(
            "/auth/mfa/verify",
            json!({ "code": current_code(&secret), "mfaToken": mfa_token }),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
    assert_eq!(res.body["user"]["id"], user_id.as_str());
    assert_eq!(res.body["user"]["mfaEnabled"], true);
    assert!(res.body.get("trustedDeviceToken").is_none());
    assert!(res.cookie("auth-token").is_some());
    assert!(res.cookie("trusted-device").is_none());
}

#[tokio::test]
async fn wrong_code_and_bad_tokens_are_rejected() {
    let app = TestApp::spawn().await;
    let (_, secret) = enroll(&app).await;
    let challenge = app.login(EMAIL, TEST_PASSWORD).await;
    let mfa_token = challenge.body["mfaToken"].as_str().unwrap();

    let res = app
        .post(
            "/auth/mfa/verify",
            json!({ "code": wrong_code(&secret), "mfaToken": mfa_token }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error(), "Invalid code");

    let res = app
        .post(
            "/auth/mfa/verify",
            json!({ "code": current_code(&secret), "mfaToken": "garbage" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error(), "Invalid MFA token");

    let res = app
        .post("/auth/mfa/verify", json!({ "code": current_code(&secret) }))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .post("/auth/mfa/verify", json!({ "code": "12345", "mfaToken": mfa_token }))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn access_token_is_not_an_mfa_token() {
    let app = TestApp::spawn().await;
    let (_, secret) = enroll(&app).await;
    app.store.update_user(&app.store.user_by_email(EMAIL).unwrap().id, |u| {
        u.two_factor_enabled = false;
    });
    let access = app.access_token(EMAIL).await;

    let res = app
        .post(
            "/auth/mfa/verify",
            json!({ "code": current_code(&secret), "mfaToken": access }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error(), "Invalid MFA token");
}

#[tokio::test]
async fn session_holder_can_verify_without_mfa_token() {
    let app = TestApp::spawn().await;
    let (_, secret) = enroll(&app).await;
    let user = app.store.user_by_email(EMAIL).unwrap();

    // A session issued before MFA was switched on.
    app.store.update_user(&user.id, |u| u.two_factor_enabled = false);
    let access = app.access_token(EMAIL).await;
    app.store.update_user(&user.id, |u| u.two_factor_enabled = true);

    let res = app
        .post_authed("/auth/mfa/verify", &access, json!({ "code": current_code(&secret) }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);
}

#[tokio::test]
async fn remembered_device_skips_mfa_until_it_expires() {
    let app = TestApp::spawn().await;
    let (user_id, secret) = enroll(&app).await;
    let challenge = app.login(EMAIL, TEST_PASSWORD).await;

    let verified = app
        .post(
            "/auth/mfa/verify",
            json!({
                "code": current_code(&secret),
                "mfaToken": challenge.body["mfaToken"],
                "rememberDevice": true
            }),
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK, "{}", verified.text);
    let device_token = verified.body["trustedDeviceToken"].as_str().unwrap().to_string();
    assert_eq!(device_token.len(), 64);
    let device_cookie = verified.cookie("trusted-device").expect("trusted-device cookie");
    assert!(device_cookie.contains("Max-Age=2592000"));
    assert!(device_cookie.contains("HttpOnly"));

    // In the body
    let res = app
        .post(
            "/auth/login",
            json!({ "email": EMAIL, "password": TEST_PASSWORD, "trustedDeviceToken": device_token }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["accessToken"].as_str().is_some());

    // In the cookie
    let cookie = format!("trusted-device={}", device_token);
    let res = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": EMAIL, "password": TEST_PASSWORD })),
            &[(header::COOKIE.as_str(), cookie.as_str())],
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["accessToken"].as_str().is_some());

    let check = app
        .post(
            "/auth/trusted-device/check",
            json!({ "userId": user_id, "deviceToken": device_token }),
        )
        .await;
    assert_eq!(check.body["trusted"], true);

    // Thirty days later
    app.store.update_user(&user_id, |u| {
        for device in &mut u.trusted_devices {
            device.expires = Utc::now() - Duration::seconds(1);
        }
    });

    let res = app
        .post(
            "/auth/login",
            json!({ "email": EMAIL, "password": TEST_PASSWORD, "trustedDeviceToken": device_token }),
        )
        .await;
    assert_eq!(res.body["requiresMFA"], true);

    let check = app
        .post(
            "/auth/trusted-device/check",
            json!({ "userId": user_id, "deviceToken": device_token }),
        )
        .await;
    assert_eq!(check.body["trusted"], false);
}

#[tokio::test]
async fn trusted_device_check_for_unknown_user() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/auth/trusted-device/check",
            json!({ "userId": "missing", "deviceToken": "abc" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.error(), "User not found");
}

#[tokio::test]
async fn disabling_mfa_forgets_secret_and_devices() {
    let app = TestApp::spawn().await;
    let (user_id, secret) = enroll(&app).await;
    app.store.update_user(&user_id, |u| {
        u.trust_device("device", Duration::days(30), Utc::now());
    });

    // Sign in through the challenge to get a session.
    let challenge = app.login(EMAIL, TEST_PASSWORD).await;
    let session = app
        .post(
            "/auth/mfa/verify",
            json!({ "code": current_code(&secret), "mfaToken": challenge.body["mfaToken"] }),
        )
        .await;
    let access = session.body["accessToken"].as_str().unwrap().to_string();

    let res = app
        .post_authed("/auth/mfa/disable", &access, json!({ "code": wrong_code(&secret) }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post_authed("/auth/mfa/disable", &access, json!({ "code": current_code(&secret) }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text);

    let stored = app.store.user(&user_id).unwrap();
    assert!(!stored.two_factor_enabled);
    assert!(stored.two_factor_secret.is_none());
    assert!(stored.trusted_devices.is_empty());

    let res = app.login(EMAIL, TEST_PASSWORD).await;
    assert!(res.body["accessToken"].as_str().is_some());
}

#[tokio::test]
async fn enrolment_requires_a_session() {
    let app = TestApp::spawn().await;

    let res = app.post("/auth/mfa/setup", json!({})).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
