//! RFC 6238 time-based one-time passwords (HMAC-SHA1, 30 s step, 6 digits).

use base32::Alphabet;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;
use subtle::{Choice, ConstantTimeEq};

use crate::utils::tokens::is_numeric_code;

type HmacSha1 = Hmac<Sha1>;

pub const STEP_SECONDS: i64 = 30;
pub const DIGITS: u32 = 6;
/// Accepted clock drift, in steps, on either side of now.
const SKEW_STEPS: i64 = 1;
const SECRET_BYTES: usize = 20;
const ALPHABET: Alphabet = Alphabet::Rfc4648 { padding: false };

/// Fresh 160-bit shared secret, base32-encoded for authenticator apps.
pub fn generate_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::thread_rng().gen();
    base32::encode(ALPHABET, &bytes)
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_uppercase();
    base32::decode(ALPHABET, &normalized).filter(|key| !key.is_empty())
}

/// HOTP value for `counter` (RFC 4226 dynamic truncation).
pub fn code_at(key: &[u8], counter: u64) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    Some(format!(
        "{:0width$}",
        binary % 10u32.pow(DIGITS),
        width = DIGITS as usize
    ))
}

/// Code an authenticator holding `secret` shows at `unix_time`.
pub fn code_for(secret: &str, unix_time: i64) -> Option<String> {
    let key = decode_secret(secret)?;
    code_at(&key, u64::try_from(unix_time.div_euclid(STEP_SECONDS)).ok()?)
}

/// Checks `code` against the steps around `unix_time` without short-circuiting.
pub fn verify(secret: &str, code: &str, unix_time: i64) -> bool {
    if !is_numeric_code(code) {
        return false;
    }
    let Some(key) = decode_secret(secret) else {
        return false;
    };

    let counter = unix_time.div_euclid(STEP_SECONDS);
    let mut matched = Choice::from(0);

    for step in (counter - SKEW_STEPS)..=(counter + SKEW_STEPS) {
        if step < 0 {
            continue;
        }
        if let Some(expected) = code_at(&key, step as u64) {
            matched |= expected.as_bytes().ct_eq(code.as_bytes());
        }
    }

    matched.into()
}

/// `otpauth://` URI rendered as a QR code by authenticator apps.
pub fn provisioning_uri(secret: &str, account: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{issuer_label}:{account}?secret={secret}&issuer={issuer_label}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}",
        issuer_label = urlencoding::encode(issuer),
        account = urlencoding::encode(account),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_KEY: &[u8] = b"12345678901234567890";

    fn rfc_secret() -> String {
        base32::encode(ALPHABET, RFC_KEY)
    }

    #[test]
    fn matches_rfc6238_sha1_vectors() {
        let vectors = [
            (59, "287082"),
            (1111111109, "081804"),
            (1234567890, "005924"),
            (2000000000, "279037"),
        ];

        for (time, expected) in vectors {
            let counter = (time / STEP_SECONDS) as u64;
            assert_eq!(code_at(RFC_KEY, counter).unwrap(), expected, "time {time}");
            assert!(verify(&rfc_secret(), expected, time));
        }
    }

    #[test]
    fn accepts_one_step_of_drift_only() {
        let secret = rfc_secret();
        assert!(verify(&secret, "287082", 59 + STEP_SECONDS));
        assert!(!verify(&secret, "287082", 59 + 3 * STEP_SECONDS));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(!verify(&rfc_secret(), "28708", 59));
        assert!(!verify(&rfc_secret(), "abcdef", 59));
        assert!(!verify("not base32!", "287082", 59));
    }

    #[test]
    fn generated_secrets_round_trip_through_base32() {
        let secret = generate_secret();
        assert_eq!(decode_secret(&secret).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn provisioning_uri_encodes_labels() {
        let uri = provisioning_uri("ABC", "jane@school.org", "Green Hill");
        assert!(uri.starts_with("otpauth://totp/Green%20Hill:jane%40school.org?secret=ABC"));
        assert!(uri.contains("digits=6"));
    }
}
