pub mod password;
pub mod tokens;
pub mod totp;
pub mod validation;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use tokens::{generate_numeric_code, generate_random_token, hash_token};
pub use validation::{normalize_email, ValidatedJson};
