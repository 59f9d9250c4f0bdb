//! Explicit coordinator configuration (SPEC_FULL.md §6, §9), threaded
//! through construction rather than read from ambient globals.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// L — lease duration in seconds (default 900, the source's
    /// `LEASE_DURATION_SECONDS`).
    pub lease_duration_secs: i64,
    /// P — Expiry Reaper cadence.
    pub reaper_interval: Duration,
    /// The fabric's fallback escalation recipient (§4.4, Open Question 1).
    pub default_escalation_recipient: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: 900,
            reaper_interval: Duration::from_secs(30),
            default_escalation_recipient: "delegate".to_string(),
        }
    }
}
