use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::services::TokenPair;

pub const AUTH_COOKIE: &str = "auth-token";
pub const REFRESH_COOKIE: &str = "refresh-token";
pub const TRUSTED_DEVICE_COOKIE: &str = "trusted-device";

const AUTH_COOKIE_DAYS: i64 = 7;
const REFRESH_COOKIE_DAYS: i64 = 30;

fn build(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// Sets the auth-token and refresh-token cookies for a fresh session.
pub fn with_session(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(build(
        AUTH_COOKIE,
        tokens.access_token.clone(),
        Duration::days(AUTH_COOKIE_DAYS),
        secure,
    ))
    .add(build(
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        Duration::days(REFRESH_COOKIE_DAYS),
        secure,
    ))
}

pub fn with_trusted_device(jar: CookieJar, token: &str, days: i64, secure: bool) -> CookieJar {
    jar.add(build(
        TRUSTED_DEVICE_COOKIE,
        token.to_string(),
        Duration::days(days),
        secure,
    ))
}

/// Expires both session cookies; the trusted-device cookie survives logout.
pub fn without_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(AUTH_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

pub fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenPair {
        TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            refresh_token_id: "jti".to_string(),
            expires_in: 900,
        }
    }

    #[test]
    fn session_cookies_are_http_only_and_scoped_to_root() {
        let jar = with_session(CookieJar::new(), &tokens(), true);

        let auth = jar.get(AUTH_COOKIE).unwrap();
        assert_eq!(auth.value(), "access");
        assert_eq!(auth.http_only(), Some(true));
        assert_eq!(auth.secure(), Some(true));
        assert_eq!(auth.path(), Some("/"));
        assert_eq!(auth.same_site(), Some(SameSite::Lax));
        assert_eq!(auth.max_age(), Some(Duration::days(7)));

        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.max_age(), Some(Duration::days(30)));
    }

    #[test]
    fn logout_clears_session_but_keeps_device() {
        let jar = with_session(CookieJar::new(), &tokens(), false);
        let jar = with_trusted_device(jar, "device", 30, false);
        let jar = without_session(jar);

        assert!(cookie_value(&jar, AUTH_COOKIE).is_none());
        assert!(cookie_value(&jar, REFRESH_COOKIE).is_none());
        assert_eq!(cookie_value(&jar, TRUSTED_DEVICE_COOKIE).as_deref(), Some("device"));
    }
}
