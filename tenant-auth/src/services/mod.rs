pub mod auth;
pub mod email;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod sms;
pub mod store;
pub mod tenant;

pub use auth::{
    AuthPolicy, AuthService, LoginOutcome, MfaEnrollment, MfaSession, MfaVerification,
    ProfileChanges, Session,
};
pub use email::{EmailProvider, EmailService, LogEmailService, MockEmailService};
pub use error::AuthError;
pub use jwt::{AccessTokenClaims, JwtService, TokenError, TokenPair};
pub use sms::{MockSmsGateway, SmsGateway, SmsOnlineGhGateway};
pub use store::{AuthStore, InMemoryStore, MongoStore, StoreError, TenantTransaction, TenantWrite};
pub use tenant::{
    AdminAccount, OrganizationOverview, OrganizationRegistration, RegisteredTenant, TenantService,
};
