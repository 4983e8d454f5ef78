use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::{users::fetch_user_role, DatastoreClient, DatastoreError};
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

/// Resolve the caller's staff role: the token claim wins, otherwise the
/// role stored for the user id in the `users` collection.
pub async fn resolve_role(
    config: &AppConfig,
    user: &User,
    auth_token: &str,
) -> Result<Option<Role>, AppError> {
    if let Some(role) = user.claimed_role() {
        return Ok(Some(role));
    }

    debug!("No staff role claim for user {}, consulting role storage", user.id);
    let datastore = DatastoreClient::new(config);
    fetch_user_role(&datastore, &user.id, auth_token)
        .await
        .map_err(|e| match e {
            DatastoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::Database(other.to_string()),
        })
}

/// Require one of `allowed` roles, returning the role the caller holds.
pub async fn authorize(
    config: &AppConfig,
    user: &User,
    auth_token: &str,
    allowed: &[Role],
) -> Result<Role, AppError> {
    match resolve_role(config, user, auth_token).await? {
        Some(role) if allowed.contains(&role) => Ok(role),
        Some(role) => {
            warn!("User {} with role {} denied; requires one of {:?}", user.id, role, allowed);
            Err(AppError::Forbidden(format!("Role '{}' may not perform this action", role)))
        }
        None => {
            warn!("User {} has no staff role", user.id);
            Err(AppError::Forbidden("A doctor or reception role is required".to_string()))
        }
    }
}

/// Every staff role.
pub const STAFF: &[Role] = &[Role::Doctor, Role::Reception];
