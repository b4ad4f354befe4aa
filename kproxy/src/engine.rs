use std::sync::{Arc, Mutex, OnceLock};

use kproxy_api::Service;
use kproxy_service::{
    ApplyResult, EventRecorder, MakeServicePortFn, ServiceChangeTracker, ServicesSnapshot,
};
use kproxy_sync::{BoundedFrequencyRunner, RunnerHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EngineConfig;
use crate::{Error, Result};

/// The tracker and snapshot form a single consistency domain: producers
/// write the tracker and the sync loop applies it into the snapshot, both
/// under the engine's lock.
pub struct ProxyState {
    pub tracker: ServiceChangeTracker,
    pub snapshot: ServicesSnapshot,
}

impl ProxyState {
    fn new(
        config: &EngineConfig,
        make_service_port: Option<MakeServicePortFn>,
        recorder: Option<Box<dyn EventRecorder>>,
    ) -> Self {
        Self {
            tracker: ServiceChangeTracker::new(config.family, make_service_port, recorder),
            snapshot: ServicesSnapshot::new(),
        }
    }

    /// Folds pending changes into the snapshot and reports side effects.
    pub fn apply(&mut self) -> ApplyResult {
        self.snapshot.apply(&mut self.tracker)
    }
}

/// Ties the change tracker, snapshot and sync runner together: service
/// events stage changes and kick the runner; the runner invokes the
/// backend's sync function on its own task, where it applies the staged
/// changes and emits rules.
pub struct Engine {
    state: Arc<Mutex<ProxyState>>,
    handle: RunnerHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Engine {
    /// Validates `config`, wires the state to a sync runner and spawns the
    /// runner's loop. `sync_fn` runs serialized on that loop with the state
    /// lock held; it applies the tracker into the snapshot, emits rules, and
    /// may request a retry through the handle when only partially applied.
    pub fn new<F>(
        config: EngineConfig,
        make_service_port: Option<MakeServicePortFn>,
        recorder: Option<Box<dyn EventRecorder>>,
        mut sync_fn: F,
    ) -> Result<Self>
    where
        F: FnMut(&mut ProxyState, &RunnerHandle) + Send + 'static,
    {
        config.validate()?;

        let state = Arc::new(Mutex::new(ProxyState::new(
            &config,
            make_service_port,
            recorder,
        )));

        // the handle only exists once the runner does; the loop cannot start
        // before new() returns, so the cell is always populated by then
        let handle_cell: Arc<OnceLock<RunnerHandle>> = Arc::new(OnceLock::new());
        let sync_state = state.clone();
        let fn_cell = handle_cell.clone();
        let (runner, handle) = BoundedFrequencyRunner::new(
            format!("sync-{}", config.family),
            move || {
                let Some(handle) = fn_cell.get() else {
                    return;
                };
                let mut state = sync_state.lock().unwrap();
                sync_fn(&mut state, handle);
            },
            config.min_sync_interval(),
            config.max_sync_interval(),
            config.burst_syncs,
        )?;
        handle_cell.set(handle.clone()).ok();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(runner.start(cancel.clone()));
        debug!("engine started for {}", config.family);

        Ok(Self {
            state,
            handle,
            cancel,
            task,
        })
    }

    /// Stages the post-image of one service and kicks the sync loop.
    pub fn update(&self, service: &Service) {
        let changed = self.state.lock().unwrap().tracker.update(service);
        if changed {
            self.handle.run();
        }
    }

    /// Stages a service deletion and kicks the sync loop.
    pub fn delete(&self, namespace: &str, name: &str) {
        let changed = self.state.lock().unwrap().tracker.delete(namespace, name);
        if changed {
            self.handle.run();
        }
    }

    /// Requests a sync without staging a change, e.g. after backend-side
    /// state loss.
    pub fn sync(&self) {
        self.handle.run();
    }

    /// A handle for signalling the sync loop from elsewhere.
    pub fn handle(&self) -> RunnerHandle {
        self.handle.clone()
    }

    /// Stops the sync loop and waits for it to wind down.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|err| Error::Other(format!("sync loop task failed: {err}")))
    }
}
