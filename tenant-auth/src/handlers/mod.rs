//! HTTP handlers for tenant-auth.

pub mod auth;
pub mod cookies;
pub mod metrics;
pub mod organization;
pub mod user;

pub use organization::*;
pub use user::*;
