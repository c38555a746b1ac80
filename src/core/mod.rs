pub mod capture;
pub mod config;
pub mod error;
pub mod ml;
pub mod report;

pub use config::InspectionConfig;
pub use error::InspectionError;
pub use report::{ReportBuilder, ScanReport};
