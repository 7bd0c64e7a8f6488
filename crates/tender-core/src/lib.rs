//! tender-core — shared domain records for the Tender dispatch engine.
//!
//! Carriers, lanes, waterfall entries and custom tiers are plain data
//! supplied by the CRUD layer. The engine crates consume them but never
//! mutate them.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{LaneConfig, ScriptAction, ScriptStep, SimulationScript};
pub use error::{ConfigError, ConfigResult};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
pub use types::*;
