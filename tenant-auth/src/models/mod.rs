pub mod department;
pub mod one_time_token;
pub mod organization;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use department::Department;
pub use one_time_token::{OneTimeToken, TokenKind, TokenScope};
pub use organization::{
    Address, Module, ModuleFlags, NewOrganization, Organization, PlanTier, SubscriptionPlan,
};
pub use refresh_token::RefreshToken;
pub use role::{Permission, Role, RolePermissions, ADMIN_ROLE};
pub use user::{
    Employment, ProfileFields, TrustedDevice, User, UserProfile, UserSummary, UserUpdate,
};
