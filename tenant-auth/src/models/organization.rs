use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::tokens::generate_reference_code;

/// Feature areas a tenant can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Module {
    Dashboard,
    SystemConfig,
    ClassManagement,
    StudentManagement,
    EmployeeManagement,
    ManageAttendance,
    OnlineLearning,
    ExamsManagement,
    Inventory,
    HostelManagement,
    Library,
    DepositAndExpense,
    Message,
    Report,
    CanteenManagement,
    TransportManagement,
    FeesManagement,
    HrManagement,
    HealthManagement,
    History,
    Trash,
}

impl Module {
    pub const ALL: [Module; 21] = [
        Module::Dashboard,
        Module::SystemConfig,
        Module::ClassManagement,
        Module::StudentManagement,
        Module::EmployeeManagement,
        Module::ManageAttendance,
        Module::OnlineLearning,
        Module::ExamsManagement,
        Module::Inventory,
        Module::HostelManagement,
        Module::Library,
        Module::DepositAndExpense,
        Module::Message,
        Module::Report,
        Module::CanteenManagement,
        Module::TransportManagement,
        Module::FeesManagement,
        Module::HrManagement,
        Module::HealthManagement,
        Module::History,
        Module::Trash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Module::Dashboard => "dashboard",
            Module::SystemConfig => "systemConfig",
            Module::ClassManagement => "classManagement",
            Module::StudentManagement => "studentManagement",
            Module::EmployeeManagement => "employeeManagement",
            Module::ManageAttendance => "manageAttendance",
            Module::OnlineLearning => "onlineLearning",
            Module::ExamsManagement => "examsManagement",
            Module::Inventory => "inventory",
            Module::HostelManagement => "hostelManagement",
            Module::Library => "library",
            Module::DepositAndExpense => "depositAndExpense",
            Module::Message => "message",
            Module::Report => "report",
            Module::CanteenManagement => "canteenManagement",
            Module::TransportManagement => "transportManagement",
            Module::FeesManagement => "feesManagement",
            Module::HrManagement => "hrManagement",
            Module::HealthManagement => "healthManagement",
            Module::History => "history",
            Module::Trash => "trash",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("Unknown module: {}", s))
    }
}

/// Enabled/disabled state of every [`Module`] for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleFlags {
    pub dashboard: bool,
    pub system_config: bool,
    pub class_management: bool,
    pub student_management: bool,
    pub employee_management: bool,
    pub manage_attendance: bool,
    pub online_learning: bool,
    pub exams_management: bool,
    pub inventory: bool,
    pub hostel_management: bool,
    pub library: bool,
    pub deposit_and_expense: bool,
    pub message: bool,
    pub report: bool,
    pub canteen_management: bool,
    pub transport_management: bool,
    pub fees_management: bool,
    pub hr_management: bool,
    pub health_management: bool,
    pub history: bool,
    pub trash: bool,
}

impl Default for ModuleFlags {
    fn default() -> Self {
        Self {
            dashboard: true,
            system_config: true,
            class_management: true,
            student_management: true,
            employee_management: true,
            manage_attendance: false,
            online_learning: false,
            exams_management: false,
            inventory: false,
            hostel_management: false,
            library: false,
            deposit_and_expense: false,
            message: false,
            report: false,
            canteen_management: false,
            transport_management: false,
            fees_management: false,
            hr_management: false,
            health_management: false,
            history: false,
            trash: false,
        }
    }
}

impl ModuleFlags {
    fn flag_mut(&mut self, module: Module) -> &mut bool {
        match module {
            Module::Dashboard => &mut self.dashboard,
            Module::SystemConfig => &mut self.system_config,
            Module::ClassManagement => &mut self.class_management,
            Module::StudentManagement => &mut self.student_management,
            Module::EmployeeManagement => &mut self.employee_management,
            Module::ManageAttendance => &mut self.manage_attendance,
            Module::OnlineLearning => &mut self.online_learning,
            Module::ExamsManagement => &mut self.exams_management,
            Module::Inventory => &mut self.inventory,
            Module::HostelManagement => &mut self.hostel_management,
            Module::Library => &mut self.library,
            Module::DepositAndExpense => &mut self.deposit_and_expense,
            Module::Message => &mut self.message,
            Module::Report => &mut self.report,
            Module::CanteenManagement => &mut self.canteen_management,
            Module::TransportManagement => &mut self.transport_management,
            Module::FeesManagement => &mut self.fees_management,
            Module::HrManagement => &mut self.hr_management,
            Module::HealthManagement => &mut self.health_management,
            Module::History => &mut self.history,
            Module::Trash => &mut self.trash,
        }
    }

    pub fn is_enabled(&self, module: Module) -> bool {
        match module {
            Module::Dashboard => self.dashboard,
            Module::SystemConfig => self.system_config,
            Module::ClassManagement => self.class_management,
            Module::StudentManagement => self.student_management,
            Module::EmployeeManagement => self.employee_management,
            Module::ManageAttendance => self.manage_attendance,
            Module::OnlineLearning => self.online_learning,
            Module::ExamsManagement => self.exams_management,
            Module::Inventory => self.inventory,
            Module::HostelManagement => self.hostel_management,
            Module::Library => self.library,
            Module::DepositAndExpense => self.deposit_and_expense,
            Module::Message => self.message,
            Module::Report => self.report,
            Module::CanteenManagement => self.canteen_management,
            Module::TransportManagement => self.transport_management,
            Module::FeesManagement => self.fees_management,
            Module::HrManagement => self.hr_management,
            Module::HealthManagement => self.health_management,
            Module::History => self.history,
            Module::Trash => self.trash,
        }
    }

    pub fn set(&mut self, module: Module, enabled: bool) {
        *self.flag_mut(module) = enabled;
    }

    pub fn enabled(&self) -> Vec<Module> {
        Module::ALL
            .iter()
            .copied()
            .filter(|m| self.is_enabled(*m))
            .collect()
    }

    /// Defaults overlaid with the caller's choices; unknown names are rejected.
    pub fn from_selection(selection: &BTreeMap<String, bool>) -> Result<Self, String> {
        let mut flags = Self::default();
        for (name, enabled) in selection {
            let module: Module = name.parse()?;
            flags.set(module, *enabled);
        }
        Ok(flags)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Basic,
    Pro,
    Custom,
}

impl PlanTier {
    /// Monthly price per the published plans.
    pub fn monthly_price(self) -> f64 {
        match self {
            PlanTier::Basic => 5.0,
            PlanTier::Pro | PlanTier::Custom => 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillingPeriod {
    pub frequency: String,
    pub value: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionPlan {
    pub plan: PlanTier,
    pub period: BillingPeriod,
    pub current_student: u32,
}

impl SubscriptionPlan {
    pub fn monthly(plan: PlanTier) -> Self {
        Self {
            plan,
            period: BillingPeriod {
                frequency: "monthly".to_string(),
                value: 1,
                price: plan.monthly_price(),
            },
            current_student: 0,
        }
    }
}

/// Tenant root document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_code: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub founded_year: i32,
    pub addresses: Address,
    /// Admin user id, set once the bootstrap user exists.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub modules: ModuleFlags,
    pub subscription_plan: SubscriptionPlan,
    pub accepted_terms: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub freezed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tenant details supplied at registration.
#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub founded_year: i32,
    pub addresses: Address,
    pub modules: ModuleFlags,
    pub plan: PlanTier,
}

impl Organization {
    pub fn new(details: NewOrganization) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            organization_code: generate_reference_code("ORG"),
            name: details.name,
            email: details.email,
            phone: details.phone,
            website: details.website,
            description: details.description,
            founded_year: details.founded_year,
            addresses: details.addresses,
            owner: None,
            modules: details.modules,
            subscription_plan: SubscriptionPlan::monthly(details.plan),
            accepted_terms: true,
            banned: false,
            freezed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_modules_enable_the_core_five() {
        let flags = ModuleFlags::default();
        assert_eq!(
            flags.enabled(),
            vec![
                Module::Dashboard,
                Module::SystemConfig,
                Module::ClassManagement,
                Module::StudentManagement,
                Module::EmployeeManagement,
            ]
        );
    }

    #[test]
    fn selection_overlays_defaults() {
        let mut selection = BTreeMap::new();
        selection.insert("library".to_string(), true);
        selection.insert("dashboard".to_string(), false);

        let flags = ModuleFlags::from_selection(&selection).unwrap();
        assert!(flags.is_enabled(Module::Library));
        assert!(!flags.is_enabled(Module::Dashboard));
        assert!(flags.is_enabled(Module::SystemConfig));
    }

    #[test]
    fn unknown_module_names_are_rejected() {
        let mut selection = BTreeMap::new();
        selection.insert("spaceProgram".to_string(), true);
        assert!(ModuleFlags::from_selection(&selection).is_err());
    }

    #[test]
    fn module_names_round_trip() {
        for module in Module::ALL {
            assert_eq!(module.as_str().parse::<Module>(), Ok(module));
        }
    }

    #[test]
    fn plan_pricing() {
        assert_eq!(SubscriptionPlan::monthly(PlanTier::Basic).period.price, 5.0);
        assert_eq!(SubscriptionPlan::monthly(PlanTier::Pro).period.price, 10.0);
        assert_eq!(SubscriptionPlan::monthly(PlanTier::Custom).period.frequency, "monthly");
    }
}
