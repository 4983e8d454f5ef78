use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::access::{authorize, STAFF};

use crate::models::{CreatePatientRequest, UpdatePatientRequest, PatientSearchQuery, PatientError};
use crate::services::PatientService;

fn to_app_error(e: anyhow::Error) -> AppError {
    match e.downcast_ref::<PatientError>() {
        Some(PatientError::NotFound) => AppError::NotFound("Patient not found".to_string()),
        Some(PatientError::ValidationError(msg)) => AppError::ValidationError(msg.clone()),
        Some(PatientError::Unavailable(msg)) => AppError::ServiceUnavailable(msg.clone()),
        Some(PatientError::DatabaseError(msg)) => AppError::Database(msg.clone()),
        Some(PatientError::Internal(msg)) => AppError::Internal(msg.clone()),
        None => AppError::Internal(e.to_string()),
    }
}

#[axum::debug_handler]
pub async fn create_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&config, &user, auth.token(), &[Role::Reception]).await?;
    let service = PatientService::new(&config);

    let created = service.create_patient(request, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "patient": created.patient,
        "welcome_email_sent": created.welcome_email_sent
    })))
}

#[axum::debug_handler]
pub async fn list_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    authorize(&config, &user, auth.token(), STAFF).await?;
    let service = PatientService::new(&config);

    let patients = service.list_patients(auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    authorize(&config, &user, auth.token(), STAFF).await?;
    let service = PatientService::new(&config);

    let patient = service.get_patient(&patient_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&config, &user, auth.token(), &[Role::Reception]).await?;
    let service = PatientService::new(&config);

    let patient = service.update_patient(&patient_id, request, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    authorize(&config, &user, auth.token(), &[Role::Reception]).await?;
    let service = PatientService::new(&config);

    service.delete_patient(&patient_id, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Patient deleted successfully"
    })))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    authorize(&config, &user, auth.token(), STAFF).await?;
    let service = PatientService::new(&config);

    let patients = service.search_patients(query, auth.token())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}
