use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Practitioner record shared across caregiving sub-types. The role-specific
/// shape rides in a tagged variant so each variant validates on its own terms
/// instead of sharing mutable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Practitioner {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
    #[serde(flatten)]
    pub role_data: PractitionerRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", content = "role_data", rename_all = "snake_case")]
pub enum PractitionerRole {
    Doctor {
        #[serde(default)]
        specialties: Vec<String>,
    },
    Nurse {
        #[serde(default)]
        certifications: Vec<String>,
    },
}

impl PractitionerRole {
    pub fn label(&self) -> &'static str {
        match self {
            PractitionerRole::Doctor { .. } => "doctor",
            PractitionerRole::Nurse { .. } => "nurse",
        }
    }
}
