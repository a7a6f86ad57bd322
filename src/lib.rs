pub mod auth;
pub mod buffer;
pub mod config;
pub mod delivery;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod openapi;
pub mod policy;
pub mod quota;
pub mod render;
pub mod repo;
pub mod routes;
pub mod tasks;
pub mod telemetry;

// Re-export commonly used items for tests / external users
pub use lifecycle::{Engine, Outcome, Refusal};
pub use routes::{config as routes_config, AppState};
