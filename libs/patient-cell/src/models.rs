use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc, NaiveDate};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    /// Older records carry the name under `name`.
    #[serde(alias = "name")]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub body_weight: Option<f64>,
    pub address: String,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub insurance_number: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub guardian: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn age(&self) -> Option<u32> {
        let today = chrono::Utc::now().date_naive();
        self.date_of_birth.and_then(|dob| today.years_since(dob))
    }

    /// Case-insensitive match against name, phone and email.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }

        self.full_name.to_lowercase().contains(&term)
            || self.phone.to_lowercase().contains(&term)
            || self.email.as_deref().is_some_and(|email| email.to_lowercase().contains(&term))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub body_weight: Option<f64>,
    pub address: String,
    pub medical_history: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub gender: Option<String>,
    pub guardian: Option<String>,
    pub blood_group: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub body_weight: Option<f64>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub gender: Option<String>,
    pub guardian: Option<String>,
    pub blood_group: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    pub term: Option<String>,
}

/// Result of registering a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientCreated {
    pub patient: Patient,
    pub welcome_email_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<shared_database::DatastoreError> for PatientError {
    fn from(error: shared_database::DatastoreError) -> Self {
        match error {
            shared_database::DatastoreError::Unavailable(msg) => PatientError::Unavailable(msg),
            other => PatientError::DatabaseError(other.to_string()),
        }
    }
}
