//! Shared configuration defaults.
//!
//! Constants used by more than one crate, plus the environment variables that
//! override them.

use std::time::Duration;

/// Exchange timing, in milliseconds.
pub mod timing {
    /// Time allowed for the slave to answer a request
    pub const RECEIVE_TIMEOUT_MS: u64 = 834;
    /// Upper bound for a whole request/response exchange
    pub const MAX_EXCHANGE_MS: u64 = 1150;
}

/// Endpoint defaults.
pub mod endpoint {
    /// Default step of a number endpoint: one q7.8 resolution unit (1/256)
    pub const DEFAULT_NUMBER_STEP: f32 = 0.003_906_25;
}

/// Environment variable names.
pub mod env_vars {
    use super::timing;
    use std::time::Duration;

    /// Emit logs as JSON when set to `true`
    pub const LOG_JSON: &str = "OTBRIDGE_LOG_JSON";
    /// Override the receive timeout (milliseconds)
    pub const RECEIVE_TIMEOUT_MS: &str = "OTBRIDGE_RECEIVE_TIMEOUT_MS";

    /// Whether JSON logging is requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }

    /// Receive timeout from the environment, or the protocol default.
    ///
    /// Overrides are capped at the exchange bound.
    pub fn receive_timeout() -> Duration {
        std::env::var(RECEIVE_TIMEOUT_MS)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|ms| Duration::from_millis(ms.min(timing::MAX_EXCHANGE_MS)))
            .unwrap_or_else(super::default_receive_timeout)
    }
}

/// Default receive timeout.
pub fn default_receive_timeout() -> Duration {
    Duration::from_millis(timing::RECEIVE_TIMEOUT_MS)
}
