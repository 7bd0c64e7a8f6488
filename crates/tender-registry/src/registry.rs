//! Run registry — one waterfall run per (lane, load).
//!
//! The registry is the only shared mutable state in the engine. It is a
//! plain keyed map: callers serialize access to it (a single lock around
//! the registry is enough at freight-dispatch volumes).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tender_core::{Lane, LaneId, LoadId, Timestamp};
use tender_waterfall::{
    resolve_lane, EventListener, ExecutionLog, Response, RunState, RunStatus, Stage,
    WaterfallRunner,
};

use crate::error::{RegistryError, RegistryResult};

/// Registry key: the lane and load a run dispatches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub lane_id: LaneId,
    pub load_id: LoadId,
}

impl RunKey {
    pub fn new(lane_id: &str, load_id: &str) -> Self {
        Self {
            lane_id: lane_id.to_string(),
            load_id: load_id.to_string(),
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane {} / load {}", self.lane_id, self.load_id)
    }
}

/// Reference to a specific registered run.
///
/// The generation distinguishes successive runs under the same key, so a
/// handle kept from an earlier run cannot drive its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    pub key: RunKey,
    pub generation: u64,
}

/// A finished run moved out of the active map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRun {
    pub key: RunKey,
    pub generation: u64,
    pub state: RunState,
    pub log: ExecutionLog,
}

pub(crate) struct RunSlot {
    pub(crate) generation: u64,
    pub(crate) runner: WaterfallRunner,
}

/// Keyed map of active runs plus an archive of ended ones.
#[derive(Default)]
pub struct RunRegistry {
    pub(crate) active: HashMap<RunKey, RunSlot>,
    pub(crate) archived: Vec<ArchivedRun>,
    pub(crate) next_generation: u64,
    pub(crate) listener: Option<EventListener>,
}

impl fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRegistry")
            .field("active", &self.active.len())
            .field("archived", &self.archived.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener to every run begun from now on.
    pub fn with_listener(mut self, listener: EventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Register and start a run for `(lane_id, load_id)`.
    ///
    /// Fails with `Conflict` if a non-terminal run already exists for the
    /// key. A terminal run still registered under the key is archived.
    pub fn begin(
        &mut self,
        lane_id: &str,
        load_id: &str,
        stages: Vec<Stage>,
        now: Timestamp,
    ) -> RegistryResult<RunHandle> {
        let key = RunKey::new(lane_id, load_id);

        if let Some(existing) = self.active.get(&key) {
            if !existing.runner.status().is_terminal() {
                warn!(%key, status = %existing.runner.status(), "dispatch already running");
                return Err(RegistryError::Conflict(key.to_string()));
            }
        }

        let mut runner = WaterfallRunner::new(lane_id, load_id, stages);
        runner.set_listener(self.listener.clone());
        runner.start(now)?;

        if let Some(previous) = self.active.remove(&key) {
            debug!(%key, generation = previous.generation, "archiving finished run");
            self.archive(key.clone(), previous);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.active.insert(key.clone(), RunSlot { generation, runner });

        info!(%key, generation, "run registered");
        Ok(RunHandle { key, generation })
    }

    /// Resolve a lane's waterfall and begin a run for `load_id`.
    pub fn begin_lane(
        &mut self,
        lane: &Lane,
        load_id: &str,
        now: Timestamp,
    ) -> RegistryResult<RunHandle> {
        let stages = resolve_lane(lane)?;
        self.begin(&lane.id, load_id, stages, now)
    }

    /// Current state of the run registered for `(lane_id, load_id)`.
    pub fn get(&self, lane_id: &str, load_id: &str) -> Option<&RunState> {
        self.runner(lane_id, load_id).map(WaterfallRunner::state)
    }

    pub fn runner(&self, lane_id: &str, load_id: &str) -> Option<&WaterfallRunner> {
        self.active
            .get(&RunKey::new(lane_id, load_id))
            .map(|slot| &slot.runner)
    }

    /// Handle for the run currently registered under the key.
    pub fn handle(&self, lane_id: &str, load_id: &str) -> Option<RunHandle> {
        let key = RunKey::new(lane_id, load_id);
        self.active.get(&key).map(|slot| RunHandle {
            generation: slot.generation,
            key,
        })
    }

    pub fn record_response(
        &mut self,
        handle: &RunHandle,
        carrier_id: &str,
        response: Response,
        now: Timestamp,
    ) -> RegistryResult<RunStatus> {
        let runner = self.runner_mut(handle)?;
        runner.record_response(carrier_id, response, now)?;
        Ok(runner.status())
    }

    pub fn tick(&mut self, handle: &RunHandle, now: Timestamp) -> RegistryResult<bool> {
        Ok(self.runner_mut(handle)?.tick(now)?)
    }

    /// Tick every running run. Returns the keys that reached a terminal
    /// status during this pass.
    pub fn tick_all(&mut self, now: Timestamp) -> Vec<RunKey> {
        let mut finished = Vec::new();
        for (key, slot) in self.active.iter_mut() {
            if slot.runner.status() != RunStatus::Running {
                continue;
            }
            match slot.runner.tick(now) {
                Ok(true) if slot.runner.status().is_terminal() => finished.push(key.clone()),
                Ok(_) => {}
                Err(e) => warn!(%key, error = %e, "tick rejected"),
            }
        }
        finished.sort();
        finished
    }

    pub fn pause(&mut self, handle: &RunHandle, now: Timestamp) -> RegistryResult<()> {
        Ok(self.runner_mut(handle)?.pause(now)?)
    }

    pub fn resume(&mut self, handle: &RunHandle, now: Timestamp) -> RegistryResult<()> {
        Ok(self.runner_mut(handle)?.resume(now)?)
    }

    pub fn cancel(&mut self, handle: &RunHandle, now: Timestamp) -> RegistryResult<()> {
        Ok(self.runner_mut(handle)?.cancel(now)?)
    }

    /// Remove a finished run and move it to the archive.
    ///
    /// Fails with `StillActive` if the run has not reached a terminal
    /// status; cancel it first.
    pub fn end(&mut self, handle: &RunHandle) -> RegistryResult<RunState> {
        let status = self.runner_mut(handle)?.status();
        if !status.is_terminal() {
            return Err(RegistryError::StillActive {
                key: handle.key.to_string(),
                status,
            });
        }
        let slot = self
            .active
            .remove(&handle.key)
            .ok_or_else(|| RegistryError::NotFound(handle.key.to_string()))?;
        let state = slot.runner.state().clone();
        info!(key = %handle.key, generation = slot.generation, %status, "run ended");
        self.archive(handle.key.clone(), slot);
        Ok(state)
    }

    /// Keys of all registered runs, sorted.
    pub fn keys(&self) -> Vec<RunKey> {
        let mut keys: Vec<_> = self.active.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered runs that are not yet terminal.
    pub fn active_count(&self) -> usize {
        self.active
            .values()
            .filter(|slot| !slot.runner.status().is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn archived(&self) -> &[ArchivedRun] {
        &self.archived
    }

    /// Take every archived run, leaving the archive empty.
    pub fn drain_archived(&mut self) -> Vec<ArchivedRun> {
        std::mem::take(&mut self.archived)
    }

    fn runner_mut(&mut self, handle: &RunHandle) -> RegistryResult<&mut WaterfallRunner> {
        let slot = self
            .active
            .get_mut(&handle.key)
            .ok_or_else(|| RegistryError::NotFound(handle.key.to_string()))?;
        if slot.generation != handle.generation {
            return Err(RegistryError::StaleHandle(handle.key.to_string()));
        }
        Ok(&mut slot.runner)
    }

    fn archive(&mut self, key: RunKey, slot: RunSlot) {
        let (state, log) = slot.runner.into_parts();
        self.archived.push(ArchivedRun {
            key,
            generation: slot.generation,
            state,
            log,
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use tender_core::time::minutes;
    use tender_core::{Carrier, ContactInfo, CustomTier, Rate, WaterfallEntry};
    use tender_waterfall::{LogEntry, LogKind, RunError};

    pub(crate) fn at(mins: u64) -> Timestamp {
        Timestamp::from_millis(1_700_000_000_000) + minutes(mins)
    }

    pub(crate) fn lane(id: &str, windows: &[u32]) -> Lane {
        let entries = windows
            .iter()
            .enumerate()
            .map(|(i, w)| {
                WaterfallEntry::new(Carrier {
                    id: format!("c{i}"),
                    name: format!("Carrier {i}"),
                    mc_number: format!("MC-{i}"),
                    rate: Rate::from_cents(100_000 + i as u64),
                    contact: ContactInfo::default(),
                    default_response_window_mins: *w,
                    capacity: vec![],
                })
            })
            .collect();
        Lane {
            id: id.to_string(),
            origin: "Chicago, IL".to_string(),
            destination: "Dallas, TX".to_string(),
            equipment: "dry_van".to_string(),
            auto_tier: false,
            entries,
            custom_tiers: Vec::<CustomTier>::new(),
        }
    }

    #[test]
    fn begin_twice_conflicts() {
        let mut registry = RunRegistry::new();
        let l = lane("lane1", &[10, 20]);
        registry.begin_lane(&l, "load1", at(0)).unwrap();

        let err = registry.begin_lane(&l, "load1", at(1)).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert_eq!(
            err.to_string(),
            "a dispatch is already running for lane lane1 / load load1"
        );

        // Different load on the same lane is fine.
        registry.begin_lane(&l, "load2", at(1)).unwrap();
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn conflict_does_not_emit_offers() {
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let mut registry = RunRegistry::new().with_listener(Arc::new(move |e: &LogEntry| {
            if e.kind == LogKind::OfferSent {
                *counter.lock().unwrap() += 1;
            }
        }));
        let l = lane("lane1", &[10]);
        registry.begin_lane(&l, "load1", at(0)).unwrap();
        assert!(registry.begin_lane(&l, "load1", at(0)).is_err());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn end_requires_terminal_then_archives() {
        let mut registry = RunRegistry::new();
        let handle = registry.begin_lane(&lane("lane1", &[10]), "load1", at(0)).unwrap();

        assert!(matches!(
            registry.end(&handle),
            Err(RegistryError::StillActive { status: RunStatus::Running, .. })
        ));

        registry.cancel(&handle, at(1)).unwrap();
        let state = registry.end(&handle).unwrap();
        assert_eq!(state.status, RunStatus::Cancelled);
        assert!(registry.get("lane1", "load1").is_none());
        assert_eq!(registry.archived().len(), 1);
        assert_eq!(registry.drain_archived().len(), 1);
        assert!(registry.archived().is_empty());

        assert!(matches!(registry.end(&handle), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn begin_after_terminal_archives_previous_and_stales_handle() {
        let mut registry = RunRegistry::new();
        let l = lane("lane1", &[10]);
        let first = registry.begin_lane(&l, "load1", at(0)).unwrap();
        registry
            .record_response(&first, "c0", Response::Declined, at(1))
            .unwrap();
        assert_eq!(registry.get("lane1", "load1").unwrap().status, RunStatus::Exhausted);

        let second = registry.begin_lane(&l, "load1", at(2)).unwrap();
        assert_ne!(first.generation, second.generation);
        assert_eq!(registry.archived().len(), 1);
        assert_eq!(registry.archived()[0].state.status, RunStatus::Exhausted);

        assert!(matches!(
            registry.cancel(&first, at(3)),
            Err(RegistryError::StaleHandle(_))
        ));
        assert_eq!(registry.handle("lane1", "load1"), Some(second));
    }

    #[test]
    fn tick_all_reports_finished_runs() {
        let mut registry = RunRegistry::new();
        registry.begin_lane(&lane("a", &[10]), "l1", at(0)).unwrap();
        registry.begin_lane(&lane("b", &[10, 10]), "l1", at(0)).unwrap();
        let paused = registry.begin_lane(&lane("c", &[10]), "l1", at(0)).unwrap();
        registry.pause(&paused, at(1)).unwrap();

        let finished = registry.tick_all(at(11));
        assert_eq!(finished, vec![RunKey::new("a", "l1")]);
        assert_eq!(registry.get("b", "l1").unwrap().current_stage_index, 1);
        assert_eq!(registry.get("c", "l1").unwrap().status, RunStatus::Paused);

        // Terminal runs are skipped rather than erroring.
        assert!(registry.tick_all(at(11)).is_empty());
        assert_eq!(registry.tick_all(at(22)), vec![RunKey::new("b", "l1")]);
    }

    #[test]
    fn run_errors_surface_through_registry() {
        let mut registry = RunRegistry::new();
        let handle = registry.begin_lane(&lane("lane1", &[10]), "load1", at(0)).unwrap();
        registry.cancel(&handle, at(1)).unwrap();

        let err = registry.resume(&handle, at(2)).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Run(RunError::InvalidState { status: RunStatus::Cancelled, .. })
        ));
    }

    #[test]
    fn empty_lane_rejected_before_registration() {
        let mut registry = RunRegistry::new();
        let err = registry.begin_lane(&lane("lane1", &[]), "load1", at(0)).unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
        assert!(registry.is_empty());

        let err = registry.begin("lane1", "load1", vec![], at(0)).unwrap_err();
        assert!(matches!(err, RegistryError::Run(RunError::NoStages)));
        assert!(registry.is_empty());
    }

    #[test]
    fn hand_built_stages_with_repeated_carrier_rejected() {
        let mut registry = RunRegistry::new();
        let mut stages = resolve_lane(&lane("lane1", &[10, 10])).unwrap();
        stages.push(stages[0].clone());

        let err = registry.begin("lane1", "load1", stages, at(0)).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Run(RunError::CarrierInMultipleStages { first: 0, second: 2, .. })
        ));
        assert!(registry.is_empty());
        assert!(registry.get("lane1", "load1").is_none());
    }
}
