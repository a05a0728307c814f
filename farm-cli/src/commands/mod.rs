//! CLI command implementations

pub mod config;
pub mod plan;
pub mod status;
pub mod sync;

pub use config::ConfigArgs;
pub use plan::PlanArgs;
pub use status::StatusArgs;
pub use sync::SyncArgs;
