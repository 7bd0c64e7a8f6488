//! Tender waterfall engine — sequencing carrier offers for a load.
//!
//! This crate turns a lane's waterfall configuration into an ordered list
//! of stages and drives a single load through them. Carriers in a stage
//! are offered simultaneously; when every offer in a stage is declined or
//! the stage's response window lapses, the run escalates to the next stage.
//!
//! # Components
//!
//! - **`tiers`** — Resolve entries and custom tiers into ordered stages
//! - **`clock`** — Passive per-stage response-window countdown
//! - **`log`** — Append-only execution log and replay
//! - **`runner`** — Run state machine (start, respond, tick, pause, cancel)
//!
//! The engine is synchronous and never reads the wall clock. Hosts drive
//! it with `tick(now)` and `record_response(..)` calls.

pub mod clock;
pub mod error;
pub mod log;
pub mod runner;
pub mod tiers;

pub use clock::OfferClock;
pub use error::{RunError, RunResult};
pub use log::{replay, EventListener, ExecutionLog, LogEntry, LogKind, ReplayedRun};
pub use runner::{CarrierOutcome, Response, RunState, RunStatus, WaterfallRunner};
pub use tiers::{resolve, resolve_lane, Stage, StageKind, StageMember};
