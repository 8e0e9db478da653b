use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Dashboard,
    SystemConfig,
    UserManagement,
    HrManagement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RolePermissions {
    pub dashboard: bool,
    pub system_config: bool,
    pub user_management: bool,
    pub hr_management: bool,
}

impl RolePermissions {
    pub fn full_access() -> Self {
        Self {
            dashboard: true,
            system_config: true,
            user_management: true,
            hr_management: true,
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Dashboard => self.dashboard,
            Permission::SystemConfig => self.system_config,
            Permission::UserManagement => self.user_management,
            Permission::HrManagement => self.hr_management,
        }
    }
}

/// Named permission set within one organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: RolePermissions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// The role every new tenant's first user holds.
    pub fn administrator(organization_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            name: ADMIN_ROLE.to_string(),
            display_name: "Administrator".to_string(),
            description: Some("Full system access".to_string()),
            permissions: RolePermissions::full_access(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_has_every_permission() {
        let role = Role::administrator("org-1");
        for permission in [
            Permission::Dashboard,
            Permission::SystemConfig,
            Permission::UserManagement,
            Permission::HrManagement,
        ] {
            assert!(role.permissions.allows(permission));
        }
        assert_eq!(role.name, ADMIN_ROLE);
    }

    #[test]
    fn default_permissions_deny() {
        assert!(!RolePermissions::default().allows(Permission::SystemConfig));
    }
}
