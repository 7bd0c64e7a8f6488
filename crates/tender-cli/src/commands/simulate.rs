//! `tender simulate` — deterministic replay of a scripted dispatch.
//!
//! Script steps carry minute offsets from the run start. Before each step
//! the run is advanced to that instant, letting any stage windows lapse at
//! their exact deadlines, so escalation times match what a live run would
//! have produced.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::warn;

use tender_core::time::minutes;
use tender_core::{Lane, LaneConfig, ScriptAction, ScriptStep, SimulationScript, Timestamp};
use tender_registry::{RegistryResult, RunHandle, RunRegistry};
use tender_waterfall::{LogEntry, Response, RunState, RunStatus, Stage};

use super::report;

/// Result of replaying a script.
#[derive(Debug, Serialize)]
pub struct SimulationOutcome {
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub stages: Vec<Stage>,
    pub log: Vec<LogEntry>,
    pub state: RunState,
    pub rejected: Vec<RejectedStep>,
}

/// A script step the engine refused, with the reason.
#[derive(Debug, Serialize)]
pub struct RejectedStep {
    pub step: ScriptStep,
    pub error: String,
}

pub fn simulate(
    lane_path: &Path,
    script_path: &Path,
    load_id: &str,
    until_done: bool,
    format: &str,
) -> anyhow::Result<()> {
    let lane = LaneConfig::from_file(lane_path)
        .with_context(|| format!("reading lane {}", lane_path.display()))?
        .into_lane()?;
    let script = SimulationScript::from_file(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;

    let outcome = run_script(&lane, &script, load_id, until_done)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        _ => {
            print!("{}", report::format_stages(&lane.id, &outcome.stages));
            println!();
            println!("Execution log:");
            print!("{}", report::format_log(outcome.started_at, &outcome.log));
            println!();
            print!("{}", report::format_summary(&outcome.state, outcome.ended_at));
            for r in &outcome.rejected {
                println!(
                    "  rejected step at {} min ({:?}): {}",
                    r.step.at_mins, r.step.action, r.error
                );
            }
        }
    }

    Ok(())
}

/// Replay `script` against a fresh run of `lane`, starting at time zero.
pub fn run_script(
    lane: &Lane,
    script: &SimulationScript,
    load_id: &str,
    until_done: bool,
) -> anyhow::Result<SimulationOutcome> {
    let start = Timestamp::from_millis(0);
    let mut registry = RunRegistry::new();
    let handle = registry.begin_lane(lane, load_id, start)?;
    let mut rejected = Vec::new();
    let mut now = start;

    for step in &script.steps {
        now = start + minutes(step.at_mins);
        advance_to(&mut registry, &handle, now)?;

        if let Err(e) = apply(&mut registry, &handle, step, now) {
            warn!(at_mins = step.at_mins, action = ?step.action, error = %e, "script step rejected");
            rejected.push(RejectedStep {
                step: step.clone(),
                error: e.to_string(),
            });
        }
    }

    if until_done {
        now = advance_to(&mut registry, &handle, Timestamp::from_millis(u64::MAX))?.max(now);
    }

    let runner = registry
        .runner(&lane.id, load_id)
        .context("simulated run disappeared from the registry")?;
    Ok(SimulationOutcome {
        started_at: start,
        ended_at: now,
        stages: runner.state().stages.clone(),
        log: runner.log().entries().to_vec(),
        state: runner.state().clone(),
        rejected,
    })
}

/// Let stage windows lapse at their deadlines up to `until`.
///
/// Returns the time of the last lapse applied, or time zero if none.
fn advance_to(
    registry: &mut RunRegistry,
    handle: &RunHandle,
    until: Timestamp,
) -> RegistryResult<Timestamp> {
    let mut last = Timestamp::from_millis(0);
    loop {
        let Some(state) = registry.get(&handle.key.lane_id, &handle.key.load_id) else {
            return Ok(last);
        };
        if state.status != RunStatus::Running {
            return Ok(last);
        }
        let Some(clock) = state.clock.as_ref() else {
            return Ok(last);
        };
        let deadline = clock.deadline(until);
        if deadline > until {
            return Ok(last);
        }
        registry.tick(handle, deadline)?;
        last = deadline;
    }
}

fn apply(
    registry: &mut RunRegistry,
    handle: &RunHandle,
    step: &ScriptStep,
    now: Timestamp,
) -> RegistryResult<()> {
    let carrier = step.carrier.as_deref().unwrap_or_default();
    match step.action {
        ScriptAction::Accept => registry
            .record_response(handle, carrier, Response::Accepted, now)
            .map(|_| ()),
        ScriptAction::Decline => registry
            .record_response(handle, carrier, Response::Declined, now)
            .map(|_| ()),
        ScriptAction::Tick => registry.tick(handle, now).map(|_| ()),
        ScriptAction::Pause => registry.pause(handle, now),
        ScriptAction::Resume => registry.resume(handle, now),
        ScriptAction::Cancel => registry.cancel(handle, now),
    }
}
