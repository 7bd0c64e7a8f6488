//! Waterfall runner — drives one load through its resolved stages.
//!
//! The runner offers the current stage to all its carriers at once and
//! waits for the first acceptance. A stage escalates when every member
//! has declined or when its response window lapses; after the last stage
//! the run is exhausted. Every transition is written to the execution log
//! before the mutator returns.
//!
//! Mutators validate first and only then change state, so a rejected call
//! leaves the run exactly as it was.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tender_core::{CarrierId, LaneId, LoadId, Timestamp};

use crate::clock::OfferClock;
use crate::error::{RunError, RunResult};
use crate::log::{EventListener, ExecutionLog, LogKind};
use crate::tiers::Stage;

/// Overall status of a run. `Succeeded`, `Exhausted` and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Paused,
    Succeeded,
    Exhausted,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Exhausted | RunStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not started",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Exhausted => "exhausted",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a carrier's offer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierOutcome {
    Pending,
    Accepted,
    Declined,
    TimedOut,
}

impl fmt::Display for CarrierOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CarrierOutcome::Pending => "pending",
            CarrierOutcome::Accepted => "accepted",
            CarrierOutcome::Declined => "declined",
            CarrierOutcome::TimedOut => "timed out",
        })
    }
}

/// A carrier's answer to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Accepted,
    Declined,
}

/// Full state of a single run.
///
/// `outcomes` holds an entry for every carrier that has been offered the
/// load; carriers in stages not yet reached are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub lane_id: LaneId,
    pub load_id: LoadId,
    pub stages: Vec<Stage>,
    pub current_stage_index: usize,
    pub stage_started_at: Option<Timestamp>,
    pub clock: Option<OfferClock>,
    pub outcomes: BTreeMap<CarrierId, CarrierOutcome>,
    pub status: RunStatus,
    pub accepted_by: Option<CarrierId>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl RunState {
    pub fn current_stage(&self) -> Option<&Stage> {
        match self.status {
            RunStatus::NotStarted => None,
            _ => self.stages.get(self.current_stage_index),
        }
    }

    /// Time left in the current stage's window, while the run is live.
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        match self.status {
            RunStatus::Running | RunStatus::Paused => {
                self.clock.as_ref().map(|c| c.remaining(now))
            }
            _ => None,
        }
    }

    /// Active time spent in the current stage, while the run is live.
    pub fn elapsed(&self, now: Timestamp) -> Option<Duration> {
        match self.status {
            RunStatus::Running | RunStatus::Paused => {
                self.clock.as_ref().map(|c| c.elapsed(now))
            }
            _ => None,
        }
    }

    pub fn outcome(&self, carrier_id: &str) -> Option<CarrierOutcome> {
        self.outcomes.get(carrier_id).copied()
    }

    /// True when no member of the current stage is still pending.
    fn stage_settled(&self) -> bool {
        self.current_stage().is_some_and(|stage| {
            stage
                .carrier_ids()
                .all(|id| self.outcome(id) != Some(CarrierOutcome::Pending))
        })
    }
}

/// State machine for one (lane, load) waterfall run.
pub struct WaterfallRunner {
    state: RunState,
    log: ExecutionLog,
    listener: Option<EventListener>,
}

impl fmt::Debug for WaterfallRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaterfallRunner")
            .field("state", &self.state)
            .field("log_len", &self.log.len())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl WaterfallRunner {
    /// Create a run in `NotStarted`.
    pub fn new(lane_id: &str, load_id: &str, stages: Vec<Stage>) -> Self {
        Self {
            state: RunState {
                lane_id: lane_id.to_string(),
                load_id: load_id.to_string(),
                stages,
                current_stage_index: 0,
                stage_started_at: None,
                clock: None,
                outcomes: BTreeMap::new(),
                status: RunStatus::NotStarted,
                accepted_by: None,
                started_at: None,
                finished_at: None,
            },
            log: ExecutionLog::new(),
            listener: None,
        }
    }

    /// Rebuild a runner from a saved state and log.
    pub fn from_parts(state: RunState, log: ExecutionLog) -> Self {
        Self {
            state,
            log,
            listener: None,
        }
    }

    /// Register a callback for every log entry this run appends.
    pub fn with_listener(mut self, listener: EventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_listener(&mut self, listener: Option<EventListener>) {
        self.listener = listener;
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    pub fn into_parts(self) -> (RunState, ExecutionLog) {
        (self.state, self.log)
    }

    /// Start the run: open stage 0 and offer it to every member.
    ///
    /// Stages built by hand rather than by `resolve` are checked here: every
    /// stage needs at least one carrier and a non-zero window, and a carrier
    /// may be offered in one stage only.
    pub fn start(&mut self, now: Timestamp) -> RunResult<()> {
        self.require(RunStatus::NotStarted, "start")?;
        validate_stages(&self.state.stages)?;

        self.state.status = RunStatus::Running;
        self.state.started_at = Some(now);
        info!(
            lane = %self.state.lane_id,
            load = %self.state.load_id,
            stages = self.state.stages.len(),
            "waterfall run started"
        );

        let detail = self.stage_detail(0);
        self.emit(now, None, LogKind::StageStarted, detail);
        self.open_stage(0, now);
        Ok(())
    }

    /// Apply a carrier's accept/decline for the current stage.
    ///
    /// The response window is not checked here. A response that arrives
    /// after the window lapsed but before the next `tick` is still applied,
    /// so hosts that want late answers refused should `tick(now)` before
    /// recording them.
    pub fn record_response(
        &mut self,
        carrier_id: &str,
        response: Response,
        now: Timestamp,
    ) -> RunResult<()> {
        self.require(RunStatus::Running, "record a response for")?;

        let stage_index = self.state.current_stage_index;
        let in_stage = self
            .state
            .current_stage()
            .is_some_and(|s| s.contains(carrier_id));
        if !in_stage {
            warn!(
                lane = %self.state.lane_id,
                load = %self.state.load_id,
                carrier = %carrier_id,
                stage = stage_index,
                "response from carrier outside the current stage"
            );
            return Err(RunError::CarrierNotInStage {
                carrier: carrier_id.to_string(),
                stage: stage_index,
            });
        }
        match self.state.outcome(carrier_id) {
            Some(CarrierOutcome::Pending) => {}
            other => {
                return Err(RunError::CarrierNotPending {
                    carrier: carrier_id.to_string(),
                    outcome: other.map_or_else(|| "not offered".to_string(), |o| o.to_string()),
                });
            }
        }

        match response {
            Response::Accepted => {
                self.state
                    .outcomes
                    .insert(carrier_id.to_string(), CarrierOutcome::Accepted);
                self.state.accepted_by = Some(carrier_id.to_string());
                self.emit(now, Some(carrier_id), LogKind::Accepted, "offer accepted");
                self.finish(RunStatus::Succeeded, now);
                info!(
                    lane = %self.state.lane_id,
                    load = %self.state.load_id,
                    carrier = %carrier_id,
                    stage = stage_index,
                    "load accepted"
                );
                let detail = format!("load booked with {carrier_id}");
                self.emit(now, None, LogKind::RunSucceeded, detail);
            }
            Response::Declined => {
                self.state
                    .outcomes
                    .insert(carrier_id.to_string(), CarrierOutcome::Declined);
                debug!(
                    lane = %self.state.lane_id,
                    load = %self.state.load_id,
                    carrier = %carrier_id,
                    stage = stage_index,
                    "offer declined"
                );
                self.emit(now, Some(carrier_id), LogKind::Declined, "offer declined");
                if self.state.stage_settled() {
                    self.escalate(now);
                }
            }
        }
        Ok(())
    }

    /// Check the current stage's window and escalate if it has lapsed.
    ///
    /// Returns whether anything changed. A paused run ignores ticks.
    pub fn tick(&mut self, now: Timestamp) -> RunResult<bool> {
        match self.state.status {
            RunStatus::Paused => return Ok(false),
            RunStatus::Running => {}
            status => return Err(RunError::InvalidState { op: "tick", status }),
        }

        let expired = self
            .state
            .clock
            .as_ref()
            .is_some_and(|c| c.is_expired(now));
        if !expired {
            return Ok(false);
        }

        let pending: Vec<CarrierId> = self
            .state
            .current_stage()
            .map(|stage| {
                stage
                    .carrier_ids()
                    .filter(|id| self.state.outcome(id) == Some(CarrierOutcome::Pending))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            lane = %self.state.lane_id,
            load = %self.state.load_id,
            stage = self.state.current_stage_index,
            timed_out = pending.len(),
            "response window lapsed"
        );
        for id in pending {
            self.state
                .outcomes
                .insert(id.clone(), CarrierOutcome::TimedOut);
            self.emit(now, Some(&id), LogKind::TimedOut, "no response within window");
        }
        self.escalate(now);
        Ok(true)
    }

    /// Suspend window evaluation. Paused time does not count against the
    /// stage's response window.
    pub fn pause(&mut self, now: Timestamp) -> RunResult<()> {
        self.require(RunStatus::Running, "pause")?;
        self.state.status = RunStatus::Paused;
        if let Some(clock) = self.state.clock.as_mut() {
            clock.pause(now);
        }
        info!(lane = %self.state.lane_id, load = %self.state.load_id, "run paused");
        self.emit(now, None, LogKind::RunPaused, "run paused");
        Ok(())
    }

    pub fn resume(&mut self, now: Timestamp) -> RunResult<()> {
        self.require(RunStatus::Paused, "resume")?;
        self.state.status = RunStatus::Running;
        if let Some(clock) = self.state.clock.as_mut() {
            clock.resume(now);
        }
        info!(lane = %self.state.lane_id, load = %self.state.load_id, "run resumed");
        self.emit(now, None, LogKind::RunResumed, "run resumed");
        Ok(())
    }

    /// Stop the run. Offers already delivered are not recalled.
    pub fn cancel(&mut self, now: Timestamp) -> RunResult<()> {
        if self.state.status.is_terminal() {
            return Err(RunError::InvalidState {
                op: "cancel",
                status: self.state.status,
            });
        }
        self.finish(RunStatus::Cancelled, now);
        info!(lane = %self.state.lane_id, load = %self.state.load_id, "run cancelled");
        self.emit(now, None, LogKind::RunCancelled, "run cancelled");
        Ok(())
    }

    // ── internals ─────────────────────────────────────────────────

    fn require(&self, expected: RunStatus, op: &'static str) -> RunResult<()> {
        if self.state.status == expected {
            return Ok(());
        }
        warn!(
            lane = %self.state.lane_id,
            load = %self.state.load_id,
            status = %self.state.status,
            op,
            "rejected run mutation"
        );
        Err(RunError::InvalidState {
            op,
            status: self.state.status,
        })
    }

    fn stage_detail(&self, index: usize) -> String {
        match self.state.stages.get(index) {
            Some(stage) => format!(
                "stage {} of {}: {} ({} min window)",
                index + 1,
                self.state.stages.len(),
                stage.label(),
                stage.response_window_mins
            ),
            None => format!("stage {}", index + 1),
        }
    }

    /// Start the clock for `index` and offer the load to its members.
    fn open_stage(&mut self, index: usize, now: Timestamp) {
        let Some(stage) = self.state.stages.get(index) else {
            return;
        };
        let window = stage.response_window_mins;
        let members: Vec<(CarrierId, String)> = stage
            .members
            .iter()
            .map(|m| (m.carrier.id.clone(), m.carrier.name.clone()))
            .collect();

        self.state.current_stage_index = index;
        self.state.stage_started_at = Some(now);
        self.state.clock = Some(OfferClock::start(window, now));

        for (id, name) in members {
            self.state.outcomes.insert(id.clone(), CarrierOutcome::Pending);
            debug!(
                lane = %self.state.lane_id,
                load = %self.state.load_id,
                stage = index,
                carrier = %id,
                "offer sent"
            );
            let detail = format!("offered to {name} ({window} min window)");
            self.emit(now, Some(&id), LogKind::OfferSent, detail);
        }
    }

    /// Move to the next stage, or exhaust the run after the last one.
    fn escalate(&mut self, now: Timestamp) {
        let next = self.state.current_stage_index + 1;
        if next < self.state.stages.len() {
            info!(
                lane = %self.state.lane_id,
                load = %self.state.load_id,
                from = self.state.current_stage_index,
                to = next,
                "escalating waterfall"
            );
            self.state.current_stage_index = next;
            let detail = self.stage_detail(next);
            self.emit(now, None, LogKind::StageEscalated, detail);
            self.open_stage(next, now);
        } else {
            self.finish(RunStatus::Exhausted, now);
            warn!(
                lane = %self.state.lane_id,
                load = %self.state.load_id,
                stages = self.state.stages.len(),
                "waterfall exhausted without acceptance"
            );
            self.emit(now, None, LogKind::RunExhausted, "no carrier accepted the load");
        }
    }

    fn finish(&mut self, status: RunStatus, now: Timestamp) {
        self.state.status = status;
        self.state.finished_at = Some(now);
    }

    fn emit(
        &mut self,
        now: Timestamp,
        carrier_id: Option<&str>,
        kind: LogKind,
        detail: impl Into<String>,
    ) {
        let entry = self
            .log
            .append(now, self.state.current_stage_index, carrier_id, kind, detail);
        if let Some(listener) = &self.listener {
            listener(entry);
        }
    }
}

fn validate_stages(stages: &[Stage]) -> RunResult<()> {
    if stages.is_empty() {
        return Err(RunError::NoStages);
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (index, stage) in stages.iter().enumerate() {
        if stage.members.is_empty() {
            return Err(RunError::EmptyStage { stage: index });
        }
        if stage.response_window_mins == 0 {
            return Err(RunError::ZeroWindowStage { stage: index });
        }
        for id in stage.carrier_ids() {
            if let Some(&first) = seen.get(id) {
                return Err(RunError::CarrierInMultipleStages {
                    carrier: id.to_string(),
                    first,
                    second: index,
                });
            }
            seen.insert(id, index);
        }
    }
    Ok(())
}
