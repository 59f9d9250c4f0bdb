//! Lease Coordinator core: task lifecycle, lease acquisition, and the
//! Expiry Reaper (§4.3-4.5). Free of any web framework dependency —
//! `fabric-coordinator-service` adapts this to HTTP.

pub mod api_types;
pub mod config;
pub mod error;
pub mod reaper;
pub mod service;

pub use api_types::*;
pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, CoordinatorResult};
pub use reaper::ExpiryReaper;
pub use service::Coordinator;
