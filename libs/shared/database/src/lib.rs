pub mod datastore;
pub mod error;
pub mod users;

pub use datastore::DatastoreClient;
pub use error::DatastoreError;
