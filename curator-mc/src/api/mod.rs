//! HTTP API endpoints for curator-mc

pub mod automation;
pub mod duplicates;
pub mod health;
pub mod history;
pub mod settings;
pub mod sse;
pub mod status;

pub use automation::automation_routes;
pub use duplicates::duplicate_routes;
pub use health::health_routes;
pub use history::history_routes;
pub use settings::settings_routes;
pub use sse::sse_routes;
pub use status::status_routes;
