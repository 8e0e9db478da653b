use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AuthStore, StoreError, TenantTransaction, TenantWrite};
use crate::models::{
    Department, Organization, RefreshToken, Role, TokenKind, TokenScope, User, UserUpdate,
};

#[derive(Default, Clone)]
struct Collections {
    users: HashMap<String, User>,
    organizations: HashMap<String, Organization>,
    roles: HashMap<String, Role>,
    departments: HashMap<String, Department>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

impl Collections {
    fn organization_email_taken(&self, email: &str) -> bool {
        self.organizations.values().any(|o| o.email == email)
    }

    fn organization_code_taken(&self, code: &str) -> bool {
        self.organizations
            .values()
            .any(|o| o.organization_code == code)
    }

    fn user_email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }
}

/// Document counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: usize,
    pub organizations: usize,
    pub roles: usize,
    pub departments: usize,
}

/// Process-local store with the same contract as [`super::MongoStore`],
/// used for tests and local runs without a database.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Collections>>,
    fail_on: Arc<Mutex<Option<TenantWrite>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next tenant transactions fail at `step`.
    pub fn fail_tenant_write(&self, step: Option<TenantWrite>) {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) = step;
    }

    pub fn insert_user(&self, user: User) {
        self.collections().users.insert(user.id.clone(), user);
    }

    pub fn insert_organization(&self, organization: Organization) {
        self.collections()
            .organizations
            .insert(organization.id.clone(), organization);
    }

    pub fn insert_role(&self, role: Role) {
        self.collections().roles.insert(role.id.clone(), role);
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.collections().users.get(id).cloned()
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.collections()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    /// Applies `change` to a stored user; false if there is none.
    pub fn update_user(&self, id: &str, change: impl FnOnce(&mut User)) -> bool {
        match self.collections().users.get_mut(id) {
            Some(user) => {
                change(user);
                true
            }
            None => false,
        }
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.collections().organizations.values().cloned().collect()
    }

    pub fn departments(&self) -> Vec<Department> {
        self.collections().departments.values().cloned().collect()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.collections().roles.values().cloned().collect()
    }

    pub fn refresh_tokens_for(&self, user_id: &str) -> Vec<RefreshToken> {
        self.collections()
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        let collections = self.collections();
        StoreCounts {
            users: collections.users.len(),
            organizations: collections.organizations.len(),
            roles: collections.roles.len(),
            departments: collections.departments.len(),
        }
    }
}

#[async_trait]
impl AuthStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.user(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.user_by_email(email))
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .collections()
            .users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn apply_user_update(
        &self,
        user_id: &str,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut collections = self.collections();
        if let UserUpdate::Profile(fields) = update {
            if collections
                .users
                .values()
                .any(|u| u.id != user_id && u.email == fields.email)
            {
                return Err(StoreError::Duplicate("user"));
            }
        }
        Ok(collections.users.get_mut(user_id).map(|user| {
            update.apply(user, now);
            user.clone()
        }))
    }

    async fn contact_taken(
        &self,
        email: &str,
        phone: Option<&str>,
        exclude_user_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.collections().users.values().any(|u| {
            u.id != exclude_user_id
                && (u.email == email || (phone.is_some() && u.phone.as_deref() == phone))
        }))
    }

    async fn record_failed_login(
        &self,
        user_id: &str,
        threshold: u32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut collections = self.collections();
        let Some(user) = collections.users.get_mut(user_id) else {
            return Ok(None);
        };
        user.login_attempts += 1;
        if user.login_attempts >= threshold {
            user.lockout_until = Some(lockout_until);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn consume_token(
        &self,
        kind: TokenKind,
        scope: TokenScope<'_>,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut collections = self.collections();
        let matched = collections.users.values_mut().find(|user| {
            scope.admits(user)
                && kind
                    .slot(user)
                    .is_some_and(|token| token.is_live_at(now) && token.matches_hash(hash))
        });
        Ok(matched.map(|user| {
            *kind.slot_mut(user) = None;
            user.updated_at = now;
            user.clone()
        }))
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut collections = self.collections();
        if collections.refresh_tokens.contains_key(&token.id) {
            return Err(StoreError::Duplicate("refresh token"));
        }
        collections
            .refresh_tokens
            .insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, id: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.collections().refresh_tokens.get(id).cloned())
    }

    async fn revoke_refresh_token(&self, id: &str) -> Result<bool, StoreError> {
        match self.collections().refresh_tokens.get_mut(id) {
            Some(token) if !token.revoked => {
                token.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for token in self.collections().refresh_tokens.values_mut() {
            if token.user_id == user_id && !token.revoked {
                token.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_organization(&self, id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.collections().organizations.get(id).cloned())
    }

    async fn find_role(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<Role>, StoreError> {
        Ok(self
            .collections()
            .roles
            .values()
            .find(|r| r.organization_id == organization_id && r.name == name)
            .cloned())
    }

    async fn begin_tenant_transaction(&self) -> Result<Box<dyn TenantTransaction>, StoreError> {
        Ok(Box::new(MemoryTenantTransaction {
            store: self.clone(),
            staged: Collections::default(),
        }))
    }
}

/// Buffers writes and applies them under one lock on commit.
struct MemoryTenantTransaction {
    store: InMemoryStore,
    staged: Collections,
}

impl MemoryTenantTransaction {
    fn check_step(&self, step: TenantWrite) -> Result<(), StoreError> {
        let fail_on = *self
            .store
            .fail_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if fail_on == Some(step) {
            return Err(StoreError::Backend(format!("write failed at {step:?}")));
        }
        Ok(())
    }

    fn organization_collides(&self, committed: &Collections, organization: &Organization) -> bool {
        [committed, &self.staged].iter().any(|c| {
            c.organization_email_taken(&organization.email)
                || c.organization_code_taken(&organization.organization_code)
        })
    }
}

#[async_trait]
impl TenantTransaction for MemoryTenantTransaction {
    async fn organization_email_taken(&mut self, email: &str) -> Result<bool, StoreError> {
        Ok(self.store.collections().organization_email_taken(email)
            || self.staged.organization_email_taken(email))
    }

    async fn user_email_taken(&mut self, email: &str) -> Result<bool, StoreError> {
        Ok(self.store.collections().user_email_taken(email)
            || self.staged.user_email_taken(email))
    }

    async fn insert_organization(&mut self, organization: &Organization) -> Result<(), StoreError> {
        self.check_step(TenantWrite::Organization)?;
        if self.organization_collides(&self.store.collections(), organization) {
            return Err(StoreError::Duplicate("organization"));
        }
        self.staged
            .organizations
            .insert(organization.id.clone(), organization.clone());
        Ok(())
    }

    async fn insert_role(&mut self, role: &Role) -> Result<(), StoreError> {
        self.check_step(TenantWrite::Role)?;
        self.staged.roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn insert_department(&mut self, department: &Department) -> Result<(), StoreError> {
        self.check_step(TenantWrite::Department)?;
        self.staged
            .departments
            .insert(department.id.clone(), department.clone());
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.check_step(TenantWrite::User)?;
        if self.store.collections().user_email_taken(&user.email)
            || self.staged.user_email_taken(&user.email)
        {
            return Err(StoreError::Duplicate("user"));
        }
        self.staged.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn set_department_creator(
        &mut self,
        department_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.check_step(TenantWrite::DepartmentCreator)?;
        let department = self
            .staged
            .departments
            .get_mut(department_id)
            .ok_or_else(|| StoreError::Backend(format!("Department {department_id} not found")))?;
        department.created_by = Some(user_id.to_string());
        Ok(())
    }

    async fn set_organization_owner(
        &mut self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.check_step(TenantWrite::OrganizationOwner)?;
        let organization = self
            .staged
            .organizations
            .get_mut(organization_id)
            .ok_or_else(|| {
                StoreError::Backend(format!("Organization {organization_id} not found"))
            })?;
        organization.owner = Some(user_id.to_string());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut committed = self.store.collections();

        // A concurrent registration may have committed since the checks ran.
        if self
            .staged
            .organizations
            .values()
            .any(|o| committed.organization_email_taken(&o.email))
        {
            return Err(StoreError::Duplicate("organization"));
        }
        if self
            .staged
            .users
            .values()
            .any(|u| committed.user_email_taken(&u.email))
        {
            return Err(StoreError::Duplicate("user"));
        }

        let staged = self.staged.clone();
        committed.organizations.extend(staged.organizations);
        committed.roles.extend(staged.roles);
        committed.departments.extend(staged.departments);
        committed.users.extend(staged.users);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::OneTimeToken;
    use crate::utils::tokens::{hash_token, hashes_match};

    fn user(email: &str) -> User {
        User::new(
            "org-1".to_string(),
            "Kofi Boateng".to_string(),
            email.to_string(),
            "admin".to_string(),
        )
    }

    #[tokio::test]
    async fn consumed_token_cannot_be_used_twice() {
        let store = InMemoryStore::new();
        let mut u = user("kofi@school.org");
        u.magic_link = Some(OneTimeToken::issue("raw", Duration::minutes(15)));
        store.insert_user(u);

        let hash = hash_token("raw");
        let first = store
            .consume_token(TokenKind::MagicLink, TokenScope::Any, &hash, Utc::now())
            .await
            .unwrap();
        let second = store
            .consume_token(TokenKind::MagicLink, TokenScope::Any, &hash, Utc::now())
            .await
            .unwrap();

        assert!(first.is_some_and(|u| u.magic_link.is_none()));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn token_outside_scope_is_not_consumed() {
        let store = InMemoryStore::new();
        let mut u = user("kofi@school.org");
        u.phone = Some("+233200000001".to_string());
        u.phone_verification = Some(OneTimeToken::issue("123456", Duration::minutes(10)));
        let id = u.id.clone();
        store.insert_user(u);

        let hash = hash_token("123456");
        let wrong_phone = store
            .consume_token(
                TokenKind::PhoneVerification,
                TokenScope::Phone("+233200000002"),
                &hash,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(wrong_phone.is_none());
        assert!(store.user(&id).unwrap().phone_verification.is_some());
    }

    #[tokio::test]
    async fn failed_logins_lock_at_threshold() {
        let store = InMemoryStore::new();
        let u = user("kofi@school.org");
        let id = u.id.clone();
        store.insert_user(u);
        let until = Utc::now() + Duration::minutes(30);

        for _ in 0..4 {
            let updated = store.record_failed_login(&id, 5, until).await.unwrap().unwrap();
            assert!(updated.lockout_until.is_none());
        }
        let updated = store.record_failed_login(&id, 5, until).await.unwrap().unwrap();
        assert_eq!(updated.login_attempts, 5);
        assert_eq!(updated.lockout_until, Some(until));
    }

    #[tokio::test]
    async fn aborted_transaction_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        let mut tx = store.begin_tenant_transaction().await.unwrap();
        tx.insert_user(&user("staged@school.org")).await.unwrap();
        tx.abort().await.unwrap();

        assert_eq!(store.counts(), StoreCounts::default());
    }

    #[tokio::test]
    async fn refresh_token_revokes_once() {
        let store = InMemoryStore::new();
        let token = RefreshToken::new("jti".into(), "u".into(), "t", Duration::days(1));
        store.insert_refresh_token(&token).await.unwrap();

        assert!(store.revoke_refresh_token("jti").await.unwrap());
        assert!(!store.revoke_refresh_token("jti").await.unwrap());
        assert!(hashes_match(
            &store.find_refresh_token("jti").await.unwrap().unwrap().token_hash,
            &hash_token("t"),
        ));
    }

    #[tokio::test]
    async fn field_update_keeps_a_lockout_recorded_after_the_read() {
        let store = InMemoryStore::new();
        let u = user("kofi@school.org");
        let id = u.id.clone();
        store.insert_user(u);
        let until = Utc::now() + Duration::minutes(30);

        // Another request holds a copy read before the failures landed.
        let stale = store.find_user_by_id(&id).await.unwrap().unwrap();
        for _ in 0..5 {
            store.record_failed_login(&id, 5, until).await.unwrap();
        }
        assert_eq!(stale.login_attempts, 0);

        let update = UserUpdate::IssueToken {
            kind: TokenKind::MagicLink,
            token: OneTimeToken::issue("raw", Duration::minutes(15)),
        };
        let updated = store
            .apply_user_update(&stale.id, &update, Utc::now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.login_attempts, 5);
        assert_eq!(updated.lockout_until, Some(until));
        assert!(updated.magic_link.is_some());
    }

    #[tokio::test]
    async fn profile_update_rejects_a_taken_email() {
        let store = InMemoryStore::new();
        store.insert_user(user("taken@school.org"));
        let u = user("kofi@school.org");
        let mut fields = crate::models::ProfileFields::of(&u);
        let id = u.id.clone();
        store.insert_user(u);

        fields.email = "taken@school.org".to_string();
        let result = store
            .apply_user_update(&id, &UserUpdate::Profile(fields), Utc::now())
            .await;

        assert!(matches!(result, Err(StoreError::Duplicate("user"))));
        assert_eq!(store.user(&id).unwrap().email, "kofi@school.org");
    }

    #[tokio::test]
    async fn update_of_missing_user_is_none() {
        let store = InMemoryStore::new();
        let updated = store
            .apply_user_update("nobody", &UserUpdate::EnableMfa, Utc::now())
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
