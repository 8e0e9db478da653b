//! Persistence seam for users, tenants and refresh tokens.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Department, Organization, RefreshToken, Role, TokenKind, TokenScope, User, UserUpdate,
};

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A unique constraint rejected the write; names the colliding entity.
    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    #[error("{0}")]
    Backend(String),
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Steps of the tenant bootstrap, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantWrite {
    Organization,
    Role,
    Department,
    User,
    DepartmentCreator,
    OrganizationOwner,
}

impl TenantWrite {
    pub const ALL: [TenantWrite; 6] = [
        TenantWrite::Organization,
        TenantWrite::Role,
        TenantWrite::Department,
        TenantWrite::User,
        TenantWrite::DepartmentCreator,
        TenantWrite::OrganizationOwner,
    ];
}

/// All-or-nothing unit of work creating one tenant.
///
/// Nothing written through it is visible to other readers until `commit`
/// succeeds; `abort`, or dropping it uncommitted, discards every write.
#[async_trait]
pub trait TenantTransaction: Send {
    async fn organization_email_taken(&mut self, email: &str) -> Result<bool, StoreError>;
    async fn user_email_taken(&mut self, email: &str) -> Result<bool, StoreError>;
    async fn insert_organization(&mut self, organization: &Organization) -> Result<(), StoreError>;
    async fn insert_role(&mut self, role: &Role) -> Result<(), StoreError>;
    async fn insert_department(&mut self, department: &Department) -> Result<(), StoreError>;
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;
    async fn set_department_creator(
        &mut self,
        department_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;
    async fn set_organization_owner(
        &mut self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError>;

    /// Writes only the fields `update` names, stamping `updated_at` with
    /// `now`. Returns the updated user, or `None` when there is none.
    async fn apply_user_update(
        &self,
        user_id: &str,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// True when a user other than `exclude_user_id` already has `email` or `phone`.
    async fn contact_taken(
        &self,
        email: &str,
        phone: Option<&str>,
        exclude_user_id: &str,
    ) -> Result<bool, StoreError>;

    /// Adds one failed attempt in a single write and, once the count
    /// reaches `threshold`, sets the lockout. Returns the updated user.
    async fn record_failed_login(
        &self,
        user_id: &str,
        threshold: u32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Finds the user in `scope` whose `kind` slot holds `hash` and is live at
    /// `now`, clearing the slot in the same write. A given token can be
    /// consumed at most once.
    async fn consume_token(
        &self,
        kind: TokenKind,
        scope: TokenScope<'_>,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;
    async fn find_refresh_token(&self, id: &str) -> Result<Option<RefreshToken>, StoreError>;
    /// Revokes an active record; `false` if it was absent or already revoked.
    async fn revoke_refresh_token(&self, id: &str) -> Result<bool, StoreError>;
    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn find_organization(&self, id: &str) -> Result<Option<Organization>, StoreError>;
    async fn find_role(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<Role>, StoreError>;

    async fn begin_tenant_transaction(&self) -> Result<Box<dyn TenantTransaction>, StoreError>;
}
