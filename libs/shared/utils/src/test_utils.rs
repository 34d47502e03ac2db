use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{StaffRole, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Points the Supabase client at a mock server (e.g. `MockServer::uri()`).
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub role: StaffRole,
}

impl TestUser {
    pub fn new(email: &str, role: StaffRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, StaffRole::Doctor)
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, StaffRole::Receptionist)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: Some(self.email.clone()),
            role: Some(self.role),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

/// HS256 tokens shaped like the ones Supabase auth hands to staff.
pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let issued = Utc::now();
        let expires = issued + Duration::hours(exp_hours.unwrap_or(24));

        Self::sign(
            &json!({
                "sub": user.id,
                "email": user.email,
                "role": user.role.to_string(),
                "iat": issued.timestamp(),
                "exp": expires.timestamp(),
            }),
            secret,
        )
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-clinic-secret", None)
    }

    pub fn bearer(user: &TestUser, config: &TestConfig) -> String {
        format!("Bearer {}", Self::create_test_token(user, &config.jwt_secret, None))
    }

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());
        let unsigned = format!("{}.{}", header, body);

        let signature = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(unsigned.as_bytes());
                URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        };

        format!("{}.{}", unsigned, signature)
    }
}

/// PostgREST-shaped rows for mocking the `appointments` and
/// `appointment_history` tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(
        id: Uuid,
        doctor_id: Uuid,
        date: &str,
        start: &str,
        duration_minutes: u32,
        customer_name: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "customer_name": customer_name,
            "customer_phone": "0900000000",
            "doctor_id": doctor_id,
            "branch_id": Uuid::nil(),
            "service_ids": [],
            "services_with_quantity": [],
            "appointment_date": date,
            "appointment_time": start,
            "end_time": null,
            "duration_minutes": duration_minutes,
            "appointment_type": "consultation",
            "status": status,
            "is_waitlist": false,
            "waitlist_position": null,
            "consultant_id": null,
            "notes": null,
            "created_by": null,
            "created_at": "2024-06-01T00:00:00Z",
            "updated_at": "2024-06-01T00:00:00Z"
        })
    }

    pub fn history_row(appointment_id: Uuid, old_value: &str, new_value: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": appointment_id,
            "changed_by": null,
            "change_type": "status_change",
            "old_value": old_value,
            "new_value": new_value,
            "notes": null,
            "created_at": "2024-06-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_point_at_local_supabase() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert_eq!(app_config.clinic_utc_offset_minutes, 420);
    }

    #[test]
    fn test_user_maps_to_staff_user() {
        let user = TestUser::doctor("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, StaffRole::Doctor);

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(StaffRole::Doctor));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn tokens_have_three_segments() {
        let user = TestUser::new("boss@example.com", StaffRole::Manager);
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').filter(|part| !part.is_empty()).count(), 3);
    }
}
