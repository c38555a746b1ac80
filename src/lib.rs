pub mod api;
pub mod core;
pub mod scan;

pub use crate::api::{InspectionService, RunHandle, RunRequest};
pub use crate::core::{InspectionConfig, InspectionError};
pub use crate::scan::InspectionEvent;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("textile_inspect"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
