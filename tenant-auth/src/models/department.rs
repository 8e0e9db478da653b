use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// Set after the creating user exists.
    #[serde(default)]
    pub created_by: Option<String>,
    pub action_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Department {
    pub fn administration(organization_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            name: "Administration".to_string(),
            created_by: None,
            action_type: "create".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
