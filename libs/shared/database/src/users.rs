use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use shared_models::auth::Role;

use crate::datastore::DatastoreClient;
use crate::error::DatastoreError;

#[derive(Debug, Deserialize)]
struct UserRoleRecord {
    role: Option<String>,
}

/// Look up the staff role stored for a user in the `users` collection.
/// A missing user or an unknown role value yields `None`.
pub async fn fetch_user_role(
    datastore: &DatastoreClient,
    user_id: &str,
    auth_token: &str,
) -> Result<Option<Role>, DatastoreError> {
    debug!("Fetching stored role for user {}", user_id);

    let path = format!("/rest/v1/users?id=eq.{}&select=role", urlencoding::encode(user_id));
    let records: Vec<UserRoleRecord> = datastore.request(
        Method::GET,
        &path,
        Some(auth_token),
        None,
    ).await?;

    Ok(records
        .into_iter()
        .next()
        .and_then(|record| record.role)
        .and_then(|role| Role::parse(&role)))
}
