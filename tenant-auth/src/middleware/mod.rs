pub mod auth;
pub mod metrics;

pub use auth::{access_token_from, auth_middleware, AuthUser, MaybeAuthUser};
pub use metrics::metrics_middleware;
