//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Malformed waterfall configuration. Surfaced before any run starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("waterfall has no entries")]
    EmptyWaterfall,

    #[error("carrier {0} has a non-positive response window")]
    NonPositiveWindow(String),

    #[error("carrier {0} appears more than once in the waterfall")]
    DuplicateEntry(String),

    #[error("carrier {carrier} is in custom tiers {first} and {second}")]
    OverlappingTiers {
        carrier: String,
        first: String,
        second: String,
    },

    #[error("custom tier {tier} references carrier {carrier} which is not in the waterfall")]
    UnknownTierMember { tier: String, carrier: String },

    #[error("unknown carrier: {0}")]
    UnknownCarrier(String),

    #[error("carrier {carrier} has more than one capacity rule for {day}")]
    OverlappingCapacity { carrier: String, day: String },
}
