//! Fan-out of the per-kind loads and the readiness barrier.
//!
//! `initialize` spawns one task per kind on the tokio runtime and a join task
//! that waits for all four; it never blocks its caller. Each kind task runs its
//! loader through `run_with_retry`, commits the snapshot on success and records
//! the kind's terminal state. The join task closes the pass and logs a summary.
//!
//! Pass state lives behind a `std::sync::Mutex` paired with a `Condvar` for
//! blocking waiters, and is mirrored into a `tokio::sync::watch` channel for
//! async waiters.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, KindSnapshot};
use crate::loader::EntityLoader;
use crate::models::EntityKind;
use crate::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::status::{CacheStatus, KindStatus, LoadState, OverallState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    Finished,
}

#[derive(Debug, Default, Clone)]
struct KindEntry {
    state: LoadState,
    last_error: Option<String>,
}

/// Published to async waiters after every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Readiness {
    epoch: u64,
    overall: OverallState,
}

struct PassState {
    phase: Phase,
    kinds: [KindEntry; 4],
    /// Aggregated error of the last joined pass
    last_error: Option<String>,
    pass_count: u64,
    /// Identifies the running pass; results from any other pass are dropped
    generation: u64,
    /// Bumped by shutdown so waiters from before it give up
    epoch: u64,
    started_at: Option<Instant>,
    tasks: Vec<AbortHandle>,
}

impl PassState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            kinds: Default::default(),
            last_error: None,
            pass_count: 0,
            generation: 0,
            epoch: 0,
            started_at: None,
            tasks: Vec::new(),
        }
    }

    fn states(&self) -> [LoadState; 4] {
        [
            self.kinds[0].state,
            self.kinds[1].state,
            self.kinds[2].state,
            self.kinds[3].state,
        ]
    }

    /// Overall state; a pass stays Loading until its join step has run.
    fn overall(&self) -> OverallState {
        match self.phase {
            Phase::Loading => OverallState::Loading,
            Phase::Idle | Phase::Finished => OverallState::derive(&self.states()),
        }
    }

    fn readiness(&self) -> Readiness {
        Readiness {
            epoch: self.epoch,
            overall: self.overall(),
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

struct Shared {
    store: Arc<CacheStore>,
    pass: Mutex<PassState>,
    changed: Condvar,
    readiness: watch::Sender<Readiness>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PassState> {
        self.pass.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, pass: &PassState) {
        self.readiness.send_replace(pass.readiness());
        self.changed.notify_all();
    }

    /// Commit a kind's result if it belongs to the running pass.
    ///
    /// The commit happens under the pass lock so a shutdown cannot slip in
    /// between the generation check and the store update.
    fn finish_kind(&self, generation: u64, kind: EntityKind, result: Result<KindSnapshot, String>) {
        let mut pass = self.lock();
        if pass.generation != generation || pass.phase != Phase::Loading {
            debug!(kind = %kind, generation, "Discarding result of superseded pass");
            return;
        }

        let entry = &mut pass.kinds[kind.index()];
        match result {
            Ok(snapshot) => {
                self.store.commit(snapshot);
                entry.state = LoadState::Succeeded;
                entry.last_error = None;
            }
            Err(e) => {
                entry.state = LoadState::Failed;
                entry.last_error = Some(e);
            }
        }
        self.publish(&pass);
    }

    fn complete_pass(&self, generation: u64) {
        let mut pass = self.lock();
        if pass.generation != generation || pass.phase != Phase::Loading {
            return;
        }

        // A kind task that never reported (cancelled outside the retry boundary) counts as failed
        for kind in EntityKind::ALL {
            let entry = &mut pass.kinds[kind.index()];
            if !entry.state.is_terminal() {
                entry.state = LoadState::Failed;
                entry.last_error = Some("load task ended without a result".to_string());
            }
        }

        pass.phase = Phase::Finished;
        pass.tasks.clear();
        let elapsed_ms = pass
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or_default();

        let failures: Vec<String> = EntityKind::ALL
            .iter()
            .filter_map(|kind| {
                pass.kinds[kind.index()]
                    .last_error
                    .as_ref()
                    .map(|e| format!("{}: {}", kind, e))
            })
            .collect();

        if failures.is_empty() {
            pass.last_error = None;
            info!(
                pass = pass.pass_count,
                elapsed_ms,
                rooms = self.store.record_count(EntityKind::Room),
                lines = self.store.record_count(EntityKind::Line),
                manufacturers = self.store.record_count(EntityKind::Manufacturer),
                types = self.store.record_count(EntityKind::Type),
                "Reference cache ready"
            );
        } else {
            let aggregated = failures.join("; ");
            warn!(
                pass = pass.pass_count,
                elapsed_ms,
                failed = failures.len(),
                error = %aggregated,
                "Reference cache load finished with failures"
            );
            pass.last_error = Some(aggregated);
        }
        self.publish(&pass);
    }
}

/// Runs population passes and tracks their outcome.
pub struct InitializationCoordinator {
    shared: Arc<Shared>,
    loaders: [EntityLoader; 4],
    policy: RetryPolicy,
    runtime: Handle,
}

impl InitializationCoordinator {
    pub fn new(
        store: Arc<CacheStore>,
        loaders: [EntityLoader; 4],
        policy: RetryPolicy,
        runtime: Handle,
    ) -> Self {
        let pass = PassState::new();
        let (readiness, _) = watch::channel(pass.readiness());
        Self {
            shared: Arc::new(Shared {
                store,
                pass: Mutex::new(pass),
                changed: Condvar::new(),
                readiness,
            }),
            loaders,
            policy,
            runtime,
        }
    }

    /// Start a population pass unless one is running or has already finished.
    ///
    /// Returns whether a pass was started. Never blocks on the loads.
    pub fn initialize(&self) -> bool {
        let mut pass = self.shared.lock();
        if pass.phase != Phase::Idle {
            debug!(phase = ?pass.phase, "Initialize ignored, pass already started");
            return false;
        }
        self.start_pass(&mut pass);
        true
    }

    /// Start a new pass after a finished one. Prior snapshots stay readable
    /// until each kind's new commit lands.
    ///
    /// A reload requested while a pass is running is folded into that pass.
    pub fn reload(&self) -> bool {
        let mut pass = self.shared.lock();
        if pass.phase == Phase::Loading {
            debug!("Reload ignored, pass in flight");
            return false;
        }
        info!(previous = pass.pass_count, "Reloading reference cache");
        self.start_pass(&mut pass);
        true
    }

    /// Abort in-flight work and drop all loaded data.
    pub fn shutdown(&self) {
        let mut pass = self.shared.lock();
        pass.abort_tasks();
        pass.generation += 1;
        pass.epoch += 1;
        pass.phase = Phase::Idle;
        pass.kinds = Default::default();
        pass.last_error = None;
        pass.pass_count = 0;
        pass.started_at = None;
        self.shared.store.clear();
        info!("Reference cache shut down");
        self.shared.publish(&pass);
    }

    fn start_pass(&self, pass: &mut PassState) {
        pass.phase = Phase::Loading;
        pass.generation += 1;
        pass.pass_count += 1;
        pass.started_at = Some(Instant::now());
        pass.last_error = None;
        for entry in pass.kinds.iter_mut() {
            entry.state = LoadState::InProgress;
            entry.last_error = None;
        }

        let generation = pass.generation;
        info!(pass = pass.pass_count, "Starting reference cache population");

        let handles: Vec<JoinHandle<()>> = self
            .loaders
            .iter()
            .map(|loader| {
                let task = load_kind(loader.clone(), self.policy, Arc::clone(&self.shared), generation);
                self.runtime.spawn(task)
            })
            .collect();

        pass.tasks = handles.iter().map(|h| h.abort_handle()).collect();
        let join = self
            .runtime
            .spawn(join_pass(handles, Arc::clone(&self.shared), generation));
        pass.tasks.push(join.abort_handle());

        self.shared.publish(pass);
    }

    // ===== Queries =====

    pub fn overall_state(&self) -> OverallState {
        self.shared.lock().overall()
    }

    pub fn is_ready(&self) -> bool {
        self.overall_state() == OverallState::Ready
    }

    pub fn has_failed(&self) -> bool {
        self.overall_state() == OverallState::Failed
    }

    /// Aggregated error of the last joined pass. `None` while a pass is
    /// running, matching `has_failed`; per-kind errors of a running pass are
    /// in `status()`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn load_state(&self, kind: EntityKind) -> LoadState {
        self.shared.lock().kinds[kind.index()].state
    }

    /// Block the calling thread until the cache leaves Loading or `timeout`
    /// elapses. `None` waits indefinitely. True only when Ready.
    ///
    /// Loads are never cancelled by a timeout. A shutdown releases waiters.
    pub fn wait_until_ready(&self, timeout: Option<Duration>) -> bool {
        let pass = self.shared.lock();
        let epoch = pass.epoch;
        let still_loading =
            |p: &mut PassState| p.epoch == epoch && p.overall() == OverallState::Loading;

        let pass = match timeout {
            Some(timeout) => {
                self.shared
                    .changed
                    .wait_timeout_while(pass, timeout, still_loading)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .shared
                .changed
                .wait_while(pass, still_loading)
                .unwrap_or_else(PoisonError::into_inner),
        };
        pass.epoch == epoch && pass.overall() == OverallState::Ready
    }

    /// Async counterpart of `wait_until_ready(None)`.
    pub async fn ready(&self) -> bool {
        let mut rx = self.shared.readiness.subscribe();
        let epoch = rx.borrow().epoch;
        let settled = rx
            .wait_for(|r| r.epoch != epoch || r.overall != OverallState::Loading)
            .await
            .map(|r| *r);
        match settled {
            Ok(r) => r.epoch == epoch && r.overall == OverallState::Ready,
            Err(_) => false,
        }
    }

    pub async fn ready_within(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.ready())
            .await
            .unwrap_or(false)
    }

    pub fn status(&self) -> CacheStatus {
        let pass = self.shared.lock();
        let store = &self.shared.store;
        let kinds = EntityKind::ALL
            .iter()
            .map(|&kind| {
                let entry = &pass.kinds[kind.index()];
                KindStatus {
                    kind,
                    state: entry.state,
                    last_error: entry.last_error.clone(),
                    record_count: store.record_count(kind),
                    loaded_at: store.loaded_at(kind),
                }
            })
            .collect();
        CacheStatus {
            overall: pass.overall(),
            kinds,
            pass_count: pass.pass_count,
        }
    }
}

impl Drop for InitializationCoordinator {
    fn drop(&mut self) {
        self.shared.lock().abort_tasks();
    }
}

async fn load_kind(loader: EntityLoader, policy: RetryPolicy, shared: Arc<Shared>, generation: u64) {
    let kind = loader.kind();
    let operation = format!("load {}", kind);

    match run_with_retry(&operation, &policy, move || loader.load()).await {
        RetryOutcome::Succeeded { value, attempts } => {
            if value.is_empty() {
                warn!(kind = %kind, attempts, "Loaded an empty dataset");
            } else {
                info!(kind = %kind, records = value.len(), attempts, "Reference data loaded");
            }
            shared.finish_kind(generation, kind, Ok(value));
        }
        RetryOutcome::Failed {
            attempts,
            last_error,
        } => {
            error!(kind = %kind, attempts, error = %last_error, "Reference data load failed");
            shared.finish_kind(generation, kind, Err(last_error));
        }
    }
}

async fn join_pass(handles: Vec<JoinHandle<()>>, shared: Arc<Shared>, generation: u64) {
    for (kind, result) in EntityKind::ALL.iter().zip(join_all(handles).await) {
        if let Err(e) = result {
            warn!(kind = %kind, error = %e, "Load task ended abnormally");
        }
    }
    shared.complete_pass(generation);
}
