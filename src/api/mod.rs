pub mod inspection;
pub mod models;

pub use inspection::{InspectionService, RunHandle};
pub use models::run::RunRequest;
