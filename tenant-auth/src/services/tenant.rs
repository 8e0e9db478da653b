use std::sync::Arc;

use chrono::Utc;

use crate::{
    models::{
        Department, Employment, NewOrganization, Organization, Role, User, UserSummary, ADMIN_ROLE,
    },
    services::{
        metrics::record_auth_event, AuthError, AuthStore, StoreError, TenantTransaction,
    },
    utils::{hash_password, tokens::generate_reference_code, Password},
};

const DUPLICATE_ORGANIZATION: &str = "Organization with this email already exists";
const DUPLICATE_USER: &str = "User with this email already exists";

/// First user of a new organization.
#[derive(Debug)]
pub struct AdminAccount {
    pub full_name: String,
    pub email: String,
    pub password: Password,
    pub position: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug)]
pub struct OrganizationRegistration {
    pub organization: NewOrganization,
    pub admin: AdminAccount,
}

#[derive(Debug, Clone)]
pub struct RegisteredTenant {
    pub organization_id: String,
    pub organization_code: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct OrganizationOverview {
    pub organization: Organization,
    pub owner: Option<UserSummary>,
}

fn duplicate_message(err: StoreError) -> AuthError {
    match err {
        StoreError::Duplicate("user") => AuthError::DuplicateTenant(DUPLICATE_USER),
        StoreError::Duplicate(_) => AuthError::DuplicateTenant(DUPLICATE_ORGANIZATION),
        other => AuthError::Store(other),
    }
}

#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn AuthStore>,
}

impl TenantService {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Creates the organization, its admin role, the Administration
    /// department and the admin user as one unit: either all four exist
    /// afterwards, linked to each other, or none do.
    #[tracing::instrument(skip_all)]
    pub async fn register_organization(
        &self,
        registration: OrganizationRegistration,
    ) -> Result<RegisteredTenant, AuthError> {
        let OrganizationRegistration {
            organization,
            admin,
        } = registration;

        // Hashing is slow; keep it outside the transaction.
        let password_hash = hash_password(&admin.password)?;

        let mut tx = self.store.begin_tenant_transaction().await?;
        let result = bootstrap(tx.as_mut(), organization, admin, password_hash.into_string()).await;

        match result {
            Ok(tenant) => {
                tx.commit().await.map_err(duplicate_message)?;
                tracing::info!(
                    organization_id = %tenant.organization_id,
                    user_id = %tenant.user_id,
                    "Organization registered"
                );
                record_auth_event("register_organization", "success");
                Ok(tenant)
            }
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::warn!(error = %abort_err, "Failed to abort registration transaction");
                }
                tracing::info!(error = %e, "Organization registration rolled back");
                record_auth_event("register_organization", "failure");
                Err(e)
            }
        }
    }

    /// The caller's organization and its owner.
    pub async fn organization_for_user(&self, user_id: &str) -> Result<OrganizationOverview, AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("User not found"))?;

        let organization = self
            .store
            .find_organization(&user.organization_id)
            .await?
            .ok_or(AuthError::NotFound("Organization not found"))?;

        let owner = match &organization.owner {
            Some(owner_id) if *owner_id == user.id => Some(user.summary()),
            Some(owner_id) => self
                .store
                .find_user_by_id(owner_id)
                .await?
                .map(|owner| owner.summary()),
            None => None,
        };

        Ok(OrganizationOverview {
            organization,
            owner,
        })
    }
}

async fn bootstrap(
    tx: &mut dyn TenantTransaction,
    details: NewOrganization,
    admin: AdminAccount,
    password_hash: String,
) -> Result<RegisteredTenant, AuthError> {
    if tx.organization_email_taken(&details.email).await? {
        return Err(AuthError::DuplicateTenant(DUPLICATE_ORGANIZATION));
    }
    if tx.user_email_taken(&admin.email).await? {
        return Err(AuthError::DuplicateTenant(DUPLICATE_USER));
    }

    let organization = Organization::new(details);
    tx.insert_organization(&organization)
        .await
        .map_err(duplicate_message)?;

    let role = Role::administrator(&organization.id);
    tx.insert_role(&role).await?;

    let department = Department::administration(&organization.id);
    tx.insert_department(&department).await?;

    let mut user = User::new(
        organization.id.clone(),
        admin.full_name,
        admin.email,
        ADMIN_ROLE.to_string(),
    );
    user.password_hash = Some(password_hash);
    user.position = admin.position;
    user.phone = admin.phone;
    user.employment = Some(Employment {
        employee_id: generate_reference_code("EMP"),
        date_of_joining: Utc::now(),
        department_id: Some(department.id.clone()),
    });
    tx.insert_user(&user).await.map_err(duplicate_message)?;

    tx.set_department_creator(&department.id, &user.id).await?;
    tx.set_organization_owner(&organization.id, &user.id).await?;

    Ok(RegisteredTenant {
        organization_id: organization.id,
        organization_code: organization.organization_code,
        user_id: user.id,
    })
}
