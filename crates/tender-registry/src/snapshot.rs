//! Registry snapshots for hosts that need runs to survive a restart.
//!
//! The engine itself keeps runs in memory only. A snapshot captures every
//! registered run (state and full log) as JSON; restoring rebuilds the
//! registry exactly, including handle generations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use tender_waterfall::{ExecutionLog, RunState, WaterfallRunner};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{RunKey, RunRegistry, RunSlot};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub next_generation: u64,
    pub runs: Vec<RunSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub key: RunKey,
    pub generation: u64,
    pub state: RunState,
    pub log: ExecutionLog,
}

impl RegistrySnapshot {
    pub fn to_json(&self) -> RegistryResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| RegistryError::Snapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> RegistryResult<Self> {
        serde_json::from_str(json).map_err(|e| RegistryError::Snapshot(e.to_string()))
    }
}

impl RunRegistry {
    /// Capture every registered run. Archived runs are not included.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut runs: Vec<RunSnapshot> = self
            .active
            .iter()
            .map(|(key, slot)| RunSnapshot {
                key: key.clone(),
                generation: slot.generation,
                state: slot.runner.state().clone(),
                log: slot.runner.log().clone(),
            })
            .collect();
        runs.sort_by(|a, b| a.key.cmp(&b.key));

        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            next_generation: self.next_generation,
            runs,
        }
    }

    /// Rebuild a registry from a snapshot.
    ///
    /// Listeners are not part of a snapshot; attach one afterwards with
    /// [`RunRegistry::with_listener`] if needed.
    pub fn restore(snapshot: RegistrySnapshot) -> RegistryResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RegistryError::Snapshot(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }

        let mut registry = RunRegistry::new();
        let mut seen = HashSet::new();
        let mut max_generation = None;

        for run in snapshot.runs {
            if run.key.lane_id != run.state.lane_id || run.key.load_id != run.state.load_id {
                return Err(RegistryError::Snapshot(format!(
                    "run key {} does not match its state",
                    run.key
                )));
            }
            if !seen.insert(run.key.clone()) {
                return Err(RegistryError::Conflict(run.key.to_string()));
            }
            max_generation = max_generation.max(Some(run.generation));
            registry.active.insert(
                run.key,
                RunSlot {
                    generation: run.generation,
                    runner: WaterfallRunner::from_parts(run.state, run.log),
                },
            );
        }

        registry.next_generation = match max_generation {
            Some(g) => snapshot.next_generation.max(g + 1),
            None => snapshot.next_generation,
        };
        info!(runs = registry.len(), "registry restored from snapshot");
        Ok(registry)
    }
}
