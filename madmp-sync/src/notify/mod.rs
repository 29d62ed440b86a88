//! Outbound notifications to the DMP tool
//!
//! The [`Observer`] turns committed lifecycle events into partial maDMP
//! fragments and hands them to the [`DmpToolClient`]. Delivery is best effort:
//! a failed notification never touches the committed reconciliation.

pub mod client;
pub mod observer;

pub use client::{is_simple_identifier, prepare_endpoint_url, DmpToolClient, NotifyError, NotifyPolicy};
pub use observer::Observer;
