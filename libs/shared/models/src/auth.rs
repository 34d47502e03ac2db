use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub iat: Option<u64>,
}

/// Staff roles recognised by the clinic back office.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    Manager,
    Doctor,
    /// Consultant-receptionist; stored as `creceptionist` by the legacy system.
    #[serde(alias = "creceptionist")]
    ConsultantReceptionist,
    Receptionist,
}

impl StaffRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(StaffRole::Admin),
            "manager" => Some(StaffRole::Manager),
            "doctor" => Some(StaffRole::Doctor),
            "creceptionist" | "consultant_receptionist" => Some(StaffRole::ConsultantReceptionist),
            "receptionist" => Some(StaffRole::Receptionist),
            _ => None,
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffRole::Admin => write!(f, "admin"),
            StaffRole::Manager => write!(f, "manager"),
            StaffRole::Doctor => write!(f, "doctor"),
            StaffRole::ConsultantReceptionist => write!(f, "creceptionist"),
            StaffRole::Receptionist => write!(f, "receptionist"),
        }
    }
}

/// The authenticated staff member acting on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Option<StaffRole>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_role_names() {
        assert_eq!(StaffRole::parse("creceptionist"), Some(StaffRole::ConsultantReceptionist));
        assert_eq!(StaffRole::parse(" Doctor "), Some(StaffRole::Doctor));
        assert_eq!(StaffRole::parse("patient"), None);
        assert_eq!(StaffRole::ConsultantReceptionist.to_string(), "creceptionist");
    }
}
