use std::sync::Arc;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::jwt::encode_hs256;

pub struct TestConfig {
    pub jwt_secret: String,
    pub datastore_url: String,
    pub datastore_api_key: String,
    pub email_api_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            datastore_url: "http://localhost:54321".to_string(),
            datastore_api_key: "test-api-key".to_string(),
            email_api_url: "http://localhost:54322".to_string(),
        }
    }
}

impl TestConfig {
    /// Point both the datastore and the email API at a mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            datastore_url: uri.to_string(),
            email_api_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            datastore_url: self.datastore_url.clone(),
            datastore_api_key: self.datastore_api_key.clone(),
            auth_jwt_secret: self.jwt_secret.clone(),
            email_api_url: self.email_api_url.clone(),
            email_api_key: "test-email-key".to_string(),
            email_from: "Clinic <test@example.com>".to_string(),
            server_port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: Some("reception".to_string()),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.map(str::to_string),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, Some("doctor"))
    }

    pub fn reception(email: &str) -> Self {
        Self::new(email, Some("reception"))
    }

    /// A signed-in user whose role lives only in role storage.
    pub fn unassigned(email: &str) -> Self {
        Self::new(email, None)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: self.role.clone(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        encode_hs256(&header, &payload, secret).expect("HMAC can take key of any size")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned datastore rows in the shape the clinic collections use.
pub struct MockDatastoreResponses;

impl MockDatastoreResponses {
    pub fn appointment_record(id: &str, date: &str, time: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patientId": "patient-1",
            "patientName": "Test Patient",
            "date": date,
            "time": time,
            "reason": "Routine check-up",
            "notes": null,
            "status": status,
            "createdAt": "2024-01-01T00:00:00Z"
        })
    }

    pub fn booked_record(id: &str, time: &str) -> serde_json::Value {
        json!({
            "id": id,
            "time": time
        })
    }

    pub fn patient_record(id: &str, full_name: &str, email: Option<&str>) -> serde_json::Value {
        json!({
            "id": id,
            "fullName": full_name,
            "email": email,
            "phone": "0851234567",
            "dateOfBirth": "1990-01-01",
            "address": "12 Main Street",
            "createdAt": "2024-01-01T00:00:00Z"
        })
    }

    pub fn user_role_record(role: Option<&str>) -> serde_json::Value {
        json!({
            "role": role
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
    use crate::jwt::validate_token;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.datastore_url, "http://localhost:54321");
        assert_eq!(app_config.datastore_api_key, "test-api-key");
        assert!(app_config.is_configured());
        assert!(app_config.is_email_configured());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role.as_deref(), Some("doctor"));

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, user.role);
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_round_trips_through_validation() {
        let user = TestUser::reception("desk@example.com");
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert_eq!(token.split('.').count(), 3);
        let validated = validate_token(&token, secret).unwrap();
        assert_eq!(validated.id, user.id);
    }

    #[test]
    fn test_expired_and_forged_tokens_fail() {
        let user = TestUser::default();
        let secret = "test-secret";

        assert!(validate_token(&JwtTestUtils::create_expired_token(&user, secret), secret).is_err());
        assert!(validate_token(&JwtTestUtils::create_invalid_signature_token(&user), secret).is_err());
        assert!(validate_token(&JwtTestUtils::create_malformed_token(), secret).is_err());
    }
}
