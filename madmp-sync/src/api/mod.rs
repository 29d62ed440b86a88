//! HTTP API handlers

pub mod auth;
pub mod datasets;
pub mod dmps;
pub mod error;
pub mod health;

pub use auth::auth_middleware;
pub use datasets::{list_orphans, list_zombies};
pub use dmps::{delete_dmp, get_dmp, list_dmps, reconcile_dmp};
pub use error::{ApiError, ApiResult};
pub use health::health_routes;
