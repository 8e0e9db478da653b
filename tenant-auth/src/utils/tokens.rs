use chrono::Utc;
use rand::{distributions::Uniform, Rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Raw byte length of link and device tokens; hex-encoded they are twice as long.
pub const RANDOM_TOKEN_BYTES: usize = 32;
pub const RANDOM_TOKEN_LEN: usize = RANDOM_TOKEN_BYTES * 2;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 32 random bytes, hex-encoded (64 chars).
pub fn generate_random_token() -> String {
    let bytes: [u8; RANDOM_TOKEN_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Six-digit numeric code in 100000..=999999.
pub fn generate_numeric_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

/// SHA-256 hex digest; the only form in which tokens are persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// True when `token` has the shape of [`generate_random_token`] output.
pub fn is_random_token_shaped(token: &str) -> bool {
    token.len() == RANDOM_TOKEN_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn is_numeric_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Human-readable unique reference such as `ORG-1718000000000-K3J9QZ`.
pub fn generate_reference_code(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Uniform::from(0..BASE36.len()))
        .take(6)
        .map(|i| BASE36[i] as char)
        .collect();

    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_are_64_hex_chars() {
        let token = generate_random_token();
        assert!(is_random_token_shaped(&token));
        assert_ne!(token, generate_random_token());
    }

    #[test]
    fn numeric_codes_have_six_digits() {
        for _ in 0..100 {
            let code = generate_numeric_code();
            assert!(is_numeric_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn hash_is_stable_and_not_the_input() {
        let hash = hash_token("abc");
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, "abc");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn shape_check_rejects_wrong_lengths_and_alphabet() {
        assert!(!is_random_token_shaped("abc"));
        assert!(!is_random_token_shaped(&"z".repeat(64)));
        assert!(!is_numeric_code("12345"));
        assert!(!is_numeric_code("12a456"));
    }

    #[test]
    fn reference_codes_follow_the_pattern() {
        let code = generate_reference_code("ORG");
        let parts: Vec<&str> = code.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORG");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }
}
