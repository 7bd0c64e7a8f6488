//! Execution log — ordered audit trail of everything a run does.
//!
//! Entries are only ever appended. Each carries a sequence number that
//! breaks ties between entries written in the same millisecond, and
//! timestamps never go backwards even if the host's clock does.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tender_core::{CarrierId, Timestamp};

use crate::runner::{CarrierOutcome, RunStatus};

/// Callback invoked for every appended entry.
///
/// Hosts use this to deliver offers (email, SMS, portal) when an
/// `OfferSent` entry appears. It runs synchronously inside the mutator.
pub type EventListener = Arc<dyn Fn(&LogEntry) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    StageStarted,
    OfferSent,
    Accepted,
    Declined,
    TimedOut,
    StageEscalated,
    RunPaused,
    RunResumed,
    RunSucceeded,
    RunExhausted,
    RunCancelled,
}

impl LogKind {
    pub fn label(&self) -> &'static str {
        match self {
            LogKind::StageStarted => "stage_started",
            LogKind::OfferSent => "offer_sent",
            LogKind::Accepted => "accepted",
            LogKind::Declined => "declined",
            LogKind::TimedOut => "timed_out",
            LogKind::StageEscalated => "stage_escalated",
            LogKind::RunPaused => "run_paused",
            LogKind::RunResumed => "run_resumed",
            LogKind::RunSucceeded => "run_succeeded",
            LogKind::RunExhausted => "run_exhausted",
            LogKind::RunCancelled => "run_cancelled",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub stage_index: usize,
    pub carrier_id: Option<CarrierId>,
    pub kind: LogKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, assigning the next sequence number.
    pub fn append(
        &mut self,
        timestamp: Timestamp,
        stage_index: usize,
        carrier_id: Option<&str>,
        kind: LogKind,
        detail: impl Into<String>,
    ) -> &LogEntry {
        let (seq, timestamp) = match self.entries.last() {
            Some(last) => (last.seq + 1, timestamp.max(last.timestamp)),
            None => (0, timestamp),
        };
        self.entries.push(LogEntry {
            seq,
            timestamp,
            stage_index,
            carrier_id: carrier_id.map(str::to_string),
            kind,
            detail: detail.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Iterate every entry in order. Can be called any number of times.
    pub fn all(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Kinds only, in order. Handy for assertions and summaries.
    pub fn kinds(&self) -> Vec<LogKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }
}

/// Run progress reconstructed from a log alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedRun {
    pub status: RunStatus,
    pub stage_index: usize,
    pub outcomes: BTreeMap<CarrierId, CarrierOutcome>,
    pub accepted_by: Option<CarrierId>,
}

/// Rebuild status, stage and per-carrier outcomes by replaying `entries`.
pub fn replay<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> ReplayedRun {
    let mut run = ReplayedRun {
        status: RunStatus::NotStarted,
        stage_index: 0,
        outcomes: BTreeMap::new(),
        accepted_by: None,
    };

    for entry in entries {
        let carrier = entry.carrier_id.clone();
        match entry.kind {
            LogKind::StageStarted | LogKind::RunResumed => {
                run.status = RunStatus::Running;
                run.stage_index = entry.stage_index;
            }
            LogKind::StageEscalated => run.stage_index = entry.stage_index,
            LogKind::OfferSent => {
                if let Some(id) = carrier {
                    run.outcomes.insert(id, CarrierOutcome::Pending);
                }
            }
            LogKind::Accepted => {
                if let Some(id) = carrier {
                    run.outcomes.insert(id.clone(), CarrierOutcome::Accepted);
                    run.accepted_by = Some(id);
                }
            }
            LogKind::Declined => {
                if let Some(id) = carrier {
                    run.outcomes.insert(id, CarrierOutcome::Declined);
                }
            }
            LogKind::TimedOut => {
                if let Some(id) = carrier {
                    run.outcomes.insert(id, CarrierOutcome::TimedOut);
                }
            }
            LogKind::RunPaused => run.status = RunStatus::Paused,
            LogKind::RunSucceeded => run.status = RunStatus::Succeeded,
            LogKind::RunExhausted => run.status = RunStatus::Exhausted,
            LogKind::RunCancelled => run.status = RunStatus::Cancelled,
        }
    }

    run
}
