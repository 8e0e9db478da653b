pub mod mfa;
pub mod password;
pub mod passwordless;
pub mod session;
pub mod verification;

pub use password::*;
pub use passwordless::*;
pub use session::*;
