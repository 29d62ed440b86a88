//! # maDMP Common Library
//!
//! Shared code for the maDMP synchronization service:
//! - Configuration loading and validation
//! - Database schema setup
//! - Lifecycle event types and the EventBus
//! - Typed maDMP document model
//! - Error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod madmp;
pub mod uuid_utils;

pub use config::MadmpConfig;
pub use error::{Error, Result};
pub use events::{EventBus, MadmpEvent, PidRef};
