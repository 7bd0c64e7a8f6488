//! Plain-text rendering of stages and execution logs.

use std::fmt::Write;
use std::time::Duration;

use tender_core::Timestamp;
use tender_waterfall::{LogEntry, RunState, Stage};

/// `mm:ss` offset of `at` from `start`.
pub fn offset(start: Timestamp, at: Timestamp) -> String {
    let secs = at.since(start).as_secs();
    format!("+{:02}:{:02}", secs / 60, secs % 60)
}

fn mins(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}m{:02}s", secs / 60, secs % 60)
}

pub fn format_stages(lane_id: &str, stages: &[Stage]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Waterfall for lane {lane_id}: {} stage(s)", stages.len());
    for (i, stage) in stages.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} — {} min window",
            i + 1,
            stage.label(),
            stage.response_window_mins
        );
        for m in &stage.members {
            let _ = writeln!(
                out,
                "       {:<12} {:<24} {:>12}  {} min",
                m.carrier.id,
                m.carrier.name,
                m.carrier.rate.to_string(),
                m.response_window_mins()
            );
        }
    }
    out
}

pub fn format_log<'a>(start: Timestamp, entries: impl IntoIterator<Item = &'a LogEntry>) -> String {
    let mut out = String::new();
    for e in entries {
        let _ = writeln!(
            out,
            "  {} [stage {}] {:<16} {:<10} {}",
            offset(start, e.timestamp),
            e.stage_index + 1,
            e.kind.label(),
            e.carrier_id.as_deref().unwrap_or("-"),
            e.detail
        );
    }
    out
}

pub fn format_summary(state: &RunState, now: Timestamp) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "Run {} / {}: {} at stage {} of {}",
        state.lane_id,
        state.load_id,
        state.status,
        state.current_stage_index + 1,
        state.stages.len()
    );
    if let Some(carrier) = &state.accepted_by {
        let _ = write!(out, ", booked with {carrier}");
    }
    if let Some(remaining) = state.remaining(now) {
        let _ = write!(out, ", {} left in window", mins(remaining));
    }
    out.push('\n');
    for (carrier, outcome) in &state.outcomes {
        let _ = writeln!(out, "  {carrier:<12} {outcome}");
    }
    out
}
