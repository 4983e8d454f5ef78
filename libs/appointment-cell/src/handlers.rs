// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use axum_extra::TypedHeader;
use futures::stream::{self, Stream};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::access::{authorize, STAFF};

use crate::models::{
    AppointmentError, AvailabilityQuery, AvailabilityResponse, BookAppointmentRequest, DateQuery,
    UpdateAppointmentRequest, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::slots::SlotGrid;
use crate::services::watch::{AppointmentSubscription, AppointmentWatchService, WatchFilter};

/// Shared state of the appointment routes.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub watcher: AppointmentWatchService,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, watcher: AppointmentWatchService) -> Self {
        Self { config, watcher }
    }

    fn booking_service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(&self.config).with_watcher(self.watcher.clone())
    }
}

fn to_app_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotNoLongerAvailable { date, time, ref available_slots } => {
            let labels: Vec<String> = available_slots.iter().map(|slot| slot.label()).collect();
            AppError::ConflictWithDetails {
                message: e.to_string(),
                details: json!({
                    "date": date.format("%Y-%m-%d").to_string(),
                    "time": time.label(),
                    "available_slots": labels,
                }),
            }
        }
        AppointmentError::InvalidStatusTransition { .. } | AppointmentError::AppointmentLocked => {
            AppError::Conflict(e.to_string())
        }
        AppointmentError::PermissionDenied(msg) => AppError::Forbidden(msg),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatastoreUnavailable(msg) => AppError::ServiceUnavailable(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    authorize(&state.config, &user, auth.token(), STAFF).await?;

    let grid = SlotGrid::standard();
    Ok(Json(json!({
        "slots": grid.labels(),
        "total": grid.len()
    })))
}

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<AppointmentState>,
    Query(query): Query<AvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let booking_service = state.booking_service();
    let availability = booking_service.availability();
    let available_slots = availability
        .available_slots(query.date, query.exclude_appointment_id.as_deref(), token)
        .await;

    Ok(Json(AvailabilityResponse {
        date: query.date,
        total_slots: availability.grid().len(),
        available_slots,
    }))
}

#[axum::debug_handler]
pub async fn get_booked_slots(
    State(state): State<AppointmentState>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let date = query.date
        .ok_or_else(|| AppError::BadRequest("date query parameter is required".to_string()))?;

    let booked = state.booking_service()
        .availability()
        .booked_slots(date, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "date": date,
        "booked_slots": booked,
        "total": booked.len()
    })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, &[Role::Reception]).await?;

    let appointment = state.booking_service()
        .book_appointment(request, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let booking_service = state.booking_service();
    let appointments = match query.date {
        Some(date) => booking_service.appointments_for_date(date, token).await,
        None => booking_service.list_appointments(token).await,
    }
    .map_err(to_app_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let stats = state.booking_service()
        .appointment_stats(token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<AppointmentState>,
    Path(patient_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let appointments = state.booking_service()
        .appointments_for_patient(&patient_id, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let appointment = state.booking_service()
        .get_appointment(&appointment_id, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(appointment)))
}

/// Reception may edit every field; doctors only status and notes.
#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let role = authorize(&state.config, &user, token, STAFF).await?;

    if role == Role::Doctor && !request.is_clinical_only() {
        return Err(AppError::Forbidden("Doctors may only update status and notes".to_string()));
    }

    let appointment = state.booking_service()
        .update_appointment(&appointment_id, request, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let appointment = state.booking_service()
        .update_status(&appointment_id, request.status, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment is now {}", appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, &[Role::Reception]).await?;

    state.booking_service()
        .delete_appointment(&appointment_id, token)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted successfully"
    })))
}

// ==============================================================================
// LIVE WATCH HANDLERS
// ==============================================================================

fn event_stream(subscription: AppointmentSubscription) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next().await?;
        let sse_event = Event::default()
            .event(event.kind.as_str())
            .json_data(&event);
        Some((sse_event, subscription))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn watch_appointments(
    State(state): State<AppointmentState>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    authorize(&state.config, &user, auth.token(), STAFF).await?;

    let filter = match query.date {
        Some(date) => WatchFilter::Date(date),
        None => WatchFilter::All,
    };
    debug!("User {} watching appointments: {:?}", user.id, filter);

    Ok(event_stream(state.watcher.watch(filter)))
}

pub async fn watch_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let token = auth.token();
    authorize(&state.config, &user, token, STAFF).await?;

    let appointment = state.booking_service()
        .get_appointment(&appointment_id, token)
        .await
        .map_err(to_app_error)?;
    debug!("User {} watching appointment {}", user.id, appointment.id);

    Ok(event_stream(state.watcher.watch(WatchFilter::Appointment(appointment.id))))
}
