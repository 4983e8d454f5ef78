pub mod notification;
pub mod patient;

pub use patient::PatientService;
