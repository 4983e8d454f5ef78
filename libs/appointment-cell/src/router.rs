// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};
use crate::services::watch::AppointmentWatchService;

pub fn appointment_routes(config: Arc<AppConfig>, watcher: AppointmentWatchService) -> Router {
    let state = AppointmentState::new(Arc::clone(&config), watcher);

    // All appointment operations require authentication
    let protected_routes = Router::new()
        // Slot grid and availability
        .route("/slots", get(handlers::list_slots))
        .route("/availability", get(handlers::get_availability))
        .route("/booked", get(handlers::get_booked_slots))

        // Appointment management
        .route("/", get(handlers::list_appointments).post(handlers::book_appointment))
        .route("/stats", get(handlers::get_appointment_stats))
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route("/watch", get(handlers::watch_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/watch", get(handlers::watch_appointment))

        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
