//! Dispatcher — async host wrapper around the run registry.
//!
//! The engine never ticks itself. `Dispatcher` is the host side: it puts
//! the registry behind a lock, reads time from an injected `Clock`, and
//! can spawn a background loop that ticks every running waterfall on a
//! fixed interval until told to shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tender_core::{Clock, Lane};
use tender_waterfall::{ExecutionLog, Response, RunState, RunStatus};

use crate::error::RegistryResult;
use crate::registry::{RunHandle, RunKey, RunRegistry};

/// Callback invoked with the keys of runs that finished during a tick.
pub type FinishedCallback = Arc<dyn Fn(&[RunKey]) + Send + Sync>;

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RwLock<RunRegistry>>,
    clock: Arc<dyn Clock>,
    on_finished: Option<FinishedCallback>,
}

impl Dispatcher {
    pub fn new(registry: RunRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            clock,
            on_finished: None,
        }
    }

    /// Set a callback for runs that reach a terminal status on a tick.
    pub fn with_callback(mut self, callback: FinishedCallback) -> Self {
        self.on_finished = Some(callback);
        self
    }

    /// Shared access to the underlying registry.
    pub fn registry(&self) -> Arc<RwLock<RunRegistry>> {
        Arc::clone(&self.registry)
    }

    pub async fn begin(&self, lane: &Lane, load_id: &str) -> RegistryResult<RunHandle> {
        let now = self.clock.now();
        self.registry.write().await.begin_lane(lane, load_id, now)
    }

    pub async fn record_response(
        &self,
        handle: &RunHandle,
        carrier_id: &str,
        response: Response,
    ) -> RegistryResult<RunStatus> {
        let now = self.clock.now();
        self.registry
            .write()
            .await
            .record_response(handle, carrier_id, response, now)
    }

    pub async fn pause(&self, handle: &RunHandle) -> RegistryResult<()> {
        let now = self.clock.now();
        self.registry.write().await.pause(handle, now)
    }

    pub async fn resume(&self, handle: &RunHandle) -> RegistryResult<()> {
        let now = self.clock.now();
        self.registry.write().await.resume(handle, now)
    }

    pub async fn cancel(&self, handle: &RunHandle) -> RegistryResult<()> {
        let now = self.clock.now();
        self.registry.write().await.cancel(handle, now)
    }

    pub async fn end(&self, handle: &RunHandle) -> RegistryResult<RunState> {
        self.registry.write().await.end(handle)
    }

    pub async fn state(&self, lane_id: &str, load_id: &str) -> Option<RunState> {
        self.registry.read().await.get(lane_id, load_id).cloned()
    }

    pub async fn log(&self, lane_id: &str, load_id: &str) -> Option<ExecutionLog> {
        self.registry
            .read()
            .await
            .runner(lane_id, load_id)
            .map(|r| r.log().clone())
    }

    /// Tick every running waterfall once at the clock's current time.
    pub async fn tick_once(&self) -> Vec<RunKey> {
        let now = self.clock.now();
        let finished = self.registry.write().await.tick_all(now);
        if !finished.is_empty() {
            for key in &finished {
                info!(%key, "run finished on tick");
            }
            if let Some(cb) = &self.on_finished {
                cb(&finished);
            }
        }
        finished
    }

    /// Spawn the background tick loop. It stops on the first signal sent
    /// through `shutdown`, or when its sender is dropped.
    pub fn spawn_ticker(
        &self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            debug!(?period, "dispatch ticker starting");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        dispatcher.tick_once().await;
                    }
                    _ = shutdown.changed() => {
                        debug!("dispatch ticker shutting down");
                        break;
                    }
                }
            }
        })
    }
}
