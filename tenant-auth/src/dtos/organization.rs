use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Address, ModuleFlags, NewOrganization, Organization, PlanTier, UserSummary};
use crate::services::{AdminAccount, OrganizationOverview, OrganizationRegistration};
use crate::utils::{normalize_email, Password};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOrganizationRequest {
    #[validate(length(min = 2, max = 200, message = "Organization name must be 2-200 characters"))]
    #[schema(example = "Greenfield Academy")]
    pub name: String,

    #[validate(nested)]
    pub addresses: AddressRequest,

    #[validate(length(min = 6, max = 20, message = "Invalid phone number"))]
    #[schema(example = "+233302000000")]
    pub phone: String,

    #[validate(url(message = "Website must be a URL"))]
    #[serde(default)]
    pub website: Option<String>,

    #[validate(range(min = 1800, max = 2100, message = "Invalid founded year"))]
    #[schema(example = 1998)]
    pub founded_year: i32,

    #[serde(default)]
    pub description: Option<String>,

    #[validate(length(min = 2, max = 120, message = "Full name must be 2-120 characters"))]
    #[schema(example = "Ama Mensah")]
    pub full_name: String,

    /// Used for both the organization and its admin user.
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "head@greenfield.edu")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[serde(default)]
    pub position: Option<String>,

    /// Admin's personal number.
    #[validate(length(min = 6, max = 20, message = "Invalid phone number"))]
    #[serde(default)]
    pub phone_number: Option<String>,

    /// Module name to enabled flag, applied over the defaults.
    #[serde(default)]
    pub modules: BTreeMap<String, bool>,

    pub plan: PlanTier,
}

impl RegisterOrganizationRequest {
    /// Rejects unknown module names.
    pub fn into_registration(self) -> Result<OrganizationRegistration, String> {
        let modules = ModuleFlags::from_selection(&self.modules)?;
        let email = normalize_email(&self.email);

        Ok(OrganizationRegistration {
            organization: NewOrganization {
                name: self.name.trim().to_string(),
                email: email.clone(),
                phone: self.phone.trim().to_string(),
                website: self.website,
                description: self.description,
                founded_year: self.founded_year,
                addresses: Address {
                    street: self.addresses.street,
                    city: self.addresses.city,
                    state: self.addresses.state,
                    zip_code: self.addresses.zip_code,
                    country: self.addresses.country,
                },
                modules,
                plan: self.plan,
            },
            admin: AdminAccount {
                full_name: self.full_name.trim().to_string(),
                email,
                password: Password::new(self.password),
                position: self.position,
                phone: self.phone_number.map(|p| p.trim().to_string()),
            },
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOrganizationResponse {
    pub success: bool,
    pub organization_id: String,
    #[schema(example = "ORG-1718000000000-K3P9QZ")]
    pub organization_code: String,
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub success: bool,
    pub organization: Organization,
    pub owner: Option<UserSummary>,
}

impl From<OrganizationOverview> for OrganizationResponse {
    fn from(overview: OrganizationOverview) -> Self {
        Self {
            success: true,
            organization: overview.organization,
            owner: overview.owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(modules: &[(&str, bool)]) -> RegisterOrganizationRequest {
        serde_json::from_value(serde_json::json!({
            "name": "Greenfield Academy",
            "addresses": { "street": "1 Main St", "city": "Accra", "country": "Ghana" },
            "phone": "+233302000000",
            "foundedYear": 1998,
            "fullName": "Ama Mensah",
            "email": "Head@Greenfield.edu",
            "password": "password123",
            "phoneNumber": "+233201234567",
            "modules": modules.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
            "plan": "basic"
        }))
        .unwrap()
    }

    #[test]
    fn registration_shares_normalized_email() {
        let registration = request(&[]).into_registration().unwrap();
        assert_eq!(registration.organization.email, "head@greenfield.edu");
        assert_eq!(registration.admin.email, "head@greenfield.edu");
        assert_eq!(registration.admin.phone.as_deref(), Some("+233201234567"));
    }

    #[test]
    fn unknown_modules_are_refused() {
        assert!(request(&[("teleportation", true)]).into_registration().is_err());
        assert!(request(&[("library", true)]).into_registration().is_ok());
    }

    #[test]
    fn nested_address_is_validated() {
        let mut req = request(&[]);
        assert!(req.validate().is_ok());
        req.addresses.city = String::new();
        assert!(req.validate().is_err());
    }
}
