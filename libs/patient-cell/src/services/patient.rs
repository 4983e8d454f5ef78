use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::{DatastoreClient, DatastoreError};

use crate::models::{
    CreatePatientRequest, Patient, PatientCreated, PatientError, PatientSearchQuery, UpdatePatientRequest,
};
use crate::services::notification::WelcomeEmailService;

const MIN_NAME_LEN: usize = 2;
const MIN_PHONE_LEN: usize = 10;
const MIN_ADDRESS_LEN: usize = 5;
const MAX_EMAIL_LEN: usize = 254;

static EMAIL_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$"));

static PHONE_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9\s().-]*[0-9]$"));

fn compiled(pattern: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex, PatientError> {
    LazyLock::force(pattern)
        .as_ref()
        .map_err(|e| PatientError::Internal(format!("Invalid validation pattern: {}", e)))
}

pub struct PatientService {
    datastore: DatastoreClient,
    email: WelcomeEmailService,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            datastore: DatastoreClient::new(config),
            email: WelcomeEmailService::new(config),
        }
    }

    /// Register a patient, then try to send the welcome email.
    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<PatientCreated> {
        debug!("Creating new patient record for: {}", request.full_name);

        validate_name(&request.full_name)?;
        validate_phone(&request.phone)?;
        validate_address(&request.address)?;
        validate_email(request.email.as_deref())?;

        let patient_data = json!({
            "id": Uuid::new_v4().to_string(),
            "fullName": request.full_name.trim(),
            "email": normalize_email(request.email),
            "phone": request.phone.trim(),
            "dateOfBirth": request.date_of_birth.map(|dob| dob.format("%Y-%m-%d").to_string()),
            "bodyWeight": request.body_weight,
            "address": request.address.trim(),
            "medicalHistory": request.medical_history,
            "insuranceProvider": request.insurance_provider,
            "insuranceNumber": request.insurance_number,
            "gender": request.gender,
            "guardian": request.guardian,
            "bloodGroup": request.blood_group,
            "notes": request.notes,
            "createdAt": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.datastore.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(patient_data),
            Some(DatastoreClient::representation_headers()),
        ).await.map_err(PatientError::from)?;

        let row = result.into_iter().next()
            .ok_or_else(|| PatientError::DatabaseError("Failed to create patient record".to_string()))?;
        let patient: Patient = serde_json::from_value(row)?;
        info!("Patient record created with ID: {}", patient.id);

        let welcome_email_sent = self.email.send_welcome(&patient).await;

        Ok(PatientCreated { patient, welcome_email_sent })
    }

    pub async fn get_patient(
        &self,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Patient> {
        debug!("Fetching patient record: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", urlencoding::encode(patient_id));
        let result: Vec<Value> = self.datastore.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(PatientError::from)?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        let patient: Patient = serde_json::from_value(row)?;
        Ok(patient)
    }

    pub async fn update_patient(
        &self,
        patient_id: &str,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient> {
        debug!("Updating patient record: {}", patient_id);

        let mut update_data = Map::new();

        if let Some(full_name) = request.full_name {
            validate_name(&full_name)?;
            update_data.insert("fullName".to_string(), json!(full_name.trim()));
        }
        if let Some(phone) = request.phone {
            validate_phone(&phone)?;
            update_data.insert("phone".to_string(), json!(phone.trim()));
        }
        if let Some(address) = request.address {
            validate_address(&address)?;
            update_data.insert("address".to_string(), json!(address.trim()));
        }
        if let Some(email) = request.email {
            validate_email(Some(&email))?;
            update_data.insert("email".to_string(), json!(normalize_email(Some(email))));
        }
        if let Some(date_of_birth) = request.date_of_birth {
            update_data.insert("dateOfBirth".to_string(), json!(date_of_birth.format("%Y-%m-%d").to_string()));
        }
        if let Some(body_weight) = request.body_weight {
            update_data.insert("bodyWeight".to_string(), json!(body_weight));
        }
        if let Some(medical_history) = request.medical_history {
            update_data.insert("medicalHistory".to_string(), json!(medical_history));
        }
        if let Some(insurance_provider) = request.insurance_provider {
            update_data.insert("insuranceProvider".to_string(), json!(insurance_provider));
        }
        if let Some(insurance_number) = request.insurance_number {
            update_data.insert("insuranceNumber".to_string(), json!(insurance_number));
        }
        if let Some(gender) = request.gender {
            update_data.insert("gender".to_string(), json!(gender));
        }
        if let Some(guardian) = request.guardian {
            update_data.insert("guardian".to_string(), json!(guardian));
        }
        if let Some(blood_group) = request.blood_group {
            update_data.insert("bloodGroup".to_string(), json!(blood_group));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }

        if update_data.is_empty() {
            return Err(PatientError::ValidationError("No fields to update".to_string()).into());
        }

        update_data.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", urlencoding::encode(patient_id));
        let result: Vec<Value> = self.datastore.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(DatastoreClient::representation_headers()),
        ).await.map_err(PatientError::from)?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        let updated_patient: Patient = serde_json::from_value(row)?;
        info!("Patient record {} updated", updated_patient.id);
        Ok(updated_patient)
    }

    pub async fn delete_patient(
        &self,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<()> {
        debug!("Deleting patient record: {}", patient_id);

        let patient = self.get_patient(patient_id, auth_token).await?;
        let path = format!("/rest/v1/patients?id=eq.{}", urlencoding::encode(&patient.id));
        self.datastore.execute(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(PatientError::from)?;

        info!("Patient record {} deleted", patient_id);
        Ok(())
    }

    /// All patients ordered by full name.
    pub async fn list_patients(&self, auth_token: &str) -> Result<Vec<Patient>> {
        debug!("Listing patients");

        let result: Result<Vec<Value>, DatastoreError> = self.datastore.request(
            Method::GET,
            "/rest/v1/patients?order=fullName.asc",
            Some(auth_token),
            None,
        ).await;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if e.is_query_rejected() => {
                warn!("Ordered patient query rejected ({}), sorting in memory", e);
                self.datastore.request(Method::GET, "/rest/v1/patients", Some(auth_token), None)
                    .await
                    .map_err(PatientError::from)?
            }
            Err(e) => return Err(PatientError::from(e).into()),
        };

        let mut patients: Vec<Patient> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Patient>(row) {
                Ok(patient) => Some(patient),
                Err(e) => {
                    warn!("Skipping unreadable patient row: {}", e);
                    None
                }
            })
            .collect();
        patients.sort_by_key(|patient| patient.full_name.to_lowercase());

        Ok(patients)
    }

    /// In-memory search over name, phone and email.
    pub async fn search_patients(
        &self,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>> {
        debug!("Searching patients with query: {:?}", query);

        let patients = self.list_patients(auth_token).await?;
        let term = query.term.unwrap_or_default();

        Ok(patients
            .into_iter()
            .filter(|patient| patient.matches_term(&term))
            .collect())
    }
}

fn validate_name(full_name: &str) -> Result<(), PatientError> {
    if full_name.trim().chars().count() < MIN_NAME_LEN {
        return Err(PatientError::ValidationError("Full name must be at least 2 characters".to_string()));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), PatientError> {
    let phone = phone.trim();
    if phone.chars().count() < MIN_PHONE_LEN || !compiled(&PHONE_PATTERN)?.is_match(phone) {
        return Err(PatientError::ValidationError("Please enter a valid phone number".to_string()));
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<(), PatientError> {
    if address.trim().chars().count() < MIN_ADDRESS_LEN {
        return Err(PatientError::ValidationError("Address must be at least 5 characters".to_string()));
    }
    Ok(())
}

/// Email is optional; an empty string counts as absent.
fn validate_email(email: Option<&str>) -> Result<(), PatientError> {
    let Some(email) = email.map(str::trim).filter(|email| !email.is_empty()) else {
        return Ok(());
    };

    let looks_valid = email.len() <= MAX_EMAIL_LEN && compiled(&EMAIL_PATTERN)?.is_match(email);

    if !looks_valid {
        return Err(PatientError::ValidationError("Please enter a valid email address".to_string()));
    }
    Ok(())
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
}
