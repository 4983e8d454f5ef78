use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatastoreError {
    /// The datastore refused the query shape, e.g. a composite filter with no index.
    #[error("Query rejected by datastore: {0}")]
    QueryRejected(String),

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode datastore response: {0}")]
    Decode(String),

    #[error("Datastore client misconfigured: {0}")]
    Configuration(String),

    #[error("Unexpected datastore response ({status}): {message}")]
    Unexpected { status: u16, message: String },
}

impl DatastoreError {
    pub fn is_query_rejected(&self) -> bool {
        matches!(self, DatastoreError::QueryRejected(_))
    }
}
