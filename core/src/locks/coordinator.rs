//! Background refresh of the lock table with subscriber fan-out.
//!
//! A refresh runs the parse cycle on the blocking pool, swaps the published
//! table in one step, and only then notifies subscribers in registration
//! order. Requests that arrive while a cycle is in flight are coalesced into
//! a single re-run once the current cycle finishes.

use super::record::LockTable;
use crate::error::LockError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Produces a fresh lock table, typically by running `git-lfs locks`.
pub trait LockDataSource: Send + Sync {
    fn fetch_lock_table(&self) -> Result<LockTable, LockError>;
}

/// Receives lock data notifications.
///
/// Callbacks run on the thread that finished the cycle; subscribers that own
/// thread-affine state must marshal back themselves. A panicking callback is
/// logged and does not affect other subscribers or later cycles.
pub trait LockDataSubscriber: Send + Sync {
    /// Called after a new table has been published. Re-read it via
    /// [`RefreshCoordinator::table`].
    fn on_lock_data_update(&self);

    /// Called when a cycle fails. The previous table stays published.
    fn on_refresh_failed(&self, _error: &LockError) {}
}

/// Outcome of a refresh request.
#[derive(Debug)]
pub enum RefreshTicket {
    /// A new cycle was started. The handle resolves with the result of the
    /// last cycle it ran, including any coalesced re-run.
    Started(JoinHandle<Result<(), LockError>>),
    /// A cycle was already running; it will run once more when it finishes.
    Coalesced(PendingRerun),
}

impl RefreshTicket {
    /// Wait until the requested cycle has finished and its table (if any) is
    /// published.
    pub async fn wait(self) -> Result<(), LockError> {
        match self {
            Self::Started(handle) => handle
                .await
                .map_err(|e| LockError::io(format!("refresh task failed: {e}")))?,
            Self::Coalesced(pending) => pending.wait().await,
        }
    }
}

/// The re-run a coalesced request is waiting for.
#[derive(Debug)]
pub struct PendingRerun {
    settled: watch::Receiver<Settled>,
    generation: u64,
}

impl PendingRerun {
    async fn wait(mut self) -> Result<(), LockError> {
        let target = self.generation;
        let settled = self
            .settled
            .wait_for(|settled| settled.generation >= target)
            .await
            .map_err(|_| LockError::io("refresh coordinator dropped"))?;
        settled.result.clone()
    }
}

/// Count of finished cycles and the result of the latest one.
#[derive(Debug, Clone)]
struct Settled {
    generation: u64,
    result: Result<(), LockError>,
}

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    rerun_requested: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn LockDataSubscriber>)>,
}

struct Shared {
    source: Arc<dyn LockDataSource>,
    table: RwLock<Arc<LockTable>>,
    has_parsed_once: AtomicBool,
    subscribers: Mutex<Registry>,
    state: Mutex<RefreshState>,
    settled: watch::Sender<Settled>,
}

/// Handle that keeps a subscriber registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    /// Unsubscribe explicitly (same as dropping the handle).
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .subscribers
                .lock()
                .expect("subscriber registry mutex poisoned")
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Owns the published lock table and serializes refresh cycles.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn LockDataSource>, runtime: Handle) -> Self {
        let (settled, _) = watch::channel(Settled {
            generation: 0,
            result: Ok(()),
        });
        Self {
            shared: Arc::new(Shared {
                source,
                table: RwLock::new(Arc::new(LockTable::default())),
                has_parsed_once: AtomicBool::new(false),
                subscribers: Mutex::new(Registry::default()),
                state: Mutex::new(RefreshState::default()),
                settled,
            }),
            runtime,
        }
    }

    /// Snapshot of the currently published table.
    pub fn table(&self) -> Arc<LockTable> {
        Arc::clone(
            &self
                .shared
                .table
                .read()
                .expect("lock table rwlock poisoned"),
        )
    }

    /// True once any cycle has completed successfully.
    pub fn has_parsed_once(&self) -> bool {
        self.shared.has_parsed_once.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .expect("subscriber registry mutex poisoned")
            .entries
            .len()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn LockDataSubscriber>) -> Subscription {
        let mut registry = self
            .shared
            .subscribers
            .lock()
            .expect("subscriber registry mutex poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, subscriber));
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Schedule a parse cycle without blocking the caller.
    pub fn refresh_async(&self) -> RefreshTicket {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .expect("refresh state mutex poisoned");
            if state.in_flight {
                state.rerun_requested = true;
                // The generation only moves under the state lock: the running
                // cycle settles as +1, the re-run as +2
                let generation = self.shared.settled.borrow().generation + 2;
                log::debug!("[refresh] Cycle in flight, coalescing request");
                return RefreshTicket::Coalesced(PendingRerun {
                    settled: self.shared.settled.subscribe(),
                    generation,
                });
            }
            state.in_flight = true;
        }

        let guard = InFlightGuard {
            shared: Arc::clone(&self.shared),
            armed: true,
        };
        let shared = Arc::clone(&self.shared);
        RefreshTicket::Started(self.runtime.spawn(shared.run_until_settled(guard)))
    }
}

/// Clears the in-flight state if a refresh task ends without settling,
/// so later requests start a fresh cycle instead of coalescing forever.
struct InFlightGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::error!("[refresh] Refresh task ended abnormally, resetting state");
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        state.rerun_requested = false;
        // Release every waiter, including one waiting for a coalesced re-run
        self.shared.settled.send_modify(|settled| {
            settled.generation += 2;
            settled.result = Err(LockError::io("refresh cycle aborted"));
        });
    }
}

impl Shared {
    async fn run_until_settled(self: Arc<Self>, mut guard: InFlightGuard) -> Result<(), LockError> {
        loop {
            let source = Arc::clone(&self.source);
            let result = tokio::task::spawn_blocking(move || source.fetch_lock_table())
                .await
                .unwrap_or_else(|e| Err(LockError::io(format!("parse cycle panicked: {e}"))));
            let outcome = self.complete_cycle(result);

            let rerun = {
                let mut state = self.state.lock().expect("refresh state mutex poisoned");
                self.settled.send_modify(|settled| {
                    settled.generation += 1;
                    settled.result.clone_from(&outcome);
                });
                if state.rerun_requested {
                    state.rerun_requested = false;
                    true
                } else {
                    state.in_flight = false;
                    false
                }
            };
            if !rerun {
                guard.armed = false;
                return outcome;
            }
            log::debug!("[refresh] Running coalesced cycle");
        }
    }

    fn complete_cycle(&self, result: Result<LockTable, LockError>) -> Result<(), LockError> {
        match result {
            Ok(table) => {
                *self.table.write().expect("lock table rwlock poisoned") = Arc::new(table);
                self.has_parsed_once.store(true, Ordering::Release);
                self.notify(|subscriber| subscriber.on_lock_data_update());
                Ok(())
            }
            Err(e) => {
                log::error!("[refresh] Parse cycle failed: {e}");
                self.notify(|subscriber| subscriber.on_refresh_failed(&e));
                Err(e)
            }
        }
    }

    fn notify(&self, call: impl Fn(&dyn LockDataSubscriber)) {
        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking
        let subscribers: Vec<Arc<dyn LockDataSubscriber>> = self
            .subscribers
            .lock()
            .expect("subscriber registry mutex poisoned")
            .entries
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        log::debug!("[refresh] Notifying {} subscribers", subscribers.len());
        for subscriber in &subscribers {
            if catch_unwind(AssertUnwindSafe(|| call(subscriber.as_ref()))).is_err() {
                log::error!("[refresh] Subscriber panicked during notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::record::LockRecord;
    use std::sync::atomic::AtomicUsize;

    struct FakeSource {
        calls: AtomicUsize,
        fail: AtomicBool,
        gate: Mutex<()>,
    }

    impl FakeSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                gate: Mutex::new(()),
            })
        }
    }

    impl LockDataSource for FakeSource {
        fn fetch_lock_table(&self) -> Result<LockTable, LockError> {
            let _gate = self.gate.lock().unwrap();
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LockError::command("git-lfs locks", "exit 2"));
            }
            Ok(LockTable::from_records([LockRecord::new(
                call.to_string(),
                "alice",
                format!("file{call}.bin"),
                false,
                true,
            )]))
        }
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl LockDataSubscriber for Recorder {
        fn on_lock_data_update(&self) {
            self.log.lock().unwrap().push(format!("{}:update", self.name));
        }

        fn on_refresh_failed(&self, _error: &LockError) {
            self.log.lock().unwrap().push(format!("{}:failed", self.name));
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn test_refresh_publishes_and_notifies_in_order() {
        let source = FakeSource::new();
        let coordinator = RefreshCoordinator::new(source, Handle::current());
        assert!(!coordinator.has_parsed_once());
        assert!(coordinator.table().is_empty());

        let log = Arc::new(Mutex::new(Vec::new()));
        let _first = coordinator.subscribe(recorder("first", &log));
        let _second = coordinator.subscribe(recorder("second", &log));

        coordinator.refresh_async().wait().await.unwrap();

        assert!(coordinator.has_parsed_once());
        assert_eq!(coordinator.table().len(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:update".to_owned(), "second:update".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_table_and_reports() {
        let source = FakeSource::new();
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&source) as Arc<dyn LockDataSource>, Handle::current());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = coordinator.subscribe(recorder("ui", &log));

        coordinator.refresh_async().wait().await.unwrap();
        let before = coordinator.table();

        source.fail.store(true, Ordering::SeqCst);
        let result = coordinator.refresh_async().wait().await;

        assert!(matches!(result, Err(LockError::CommandFailed { .. })));
        assert!(Arc::ptr_eq(&before, &coordinator.table()));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["ui:update".to_owned(), "ui:failed".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_first_failure_never_marks_parsed() {
        let source = FakeSource::new();
        source.fail.store(true, Ordering::SeqCst);
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&source) as Arc<dyn LockDataSource>, Handle::current());
        assert!(coordinator.refresh_async().wait().await.is_err());
        assert!(!coordinator.has_parsed_once());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_requests_coalesce_into_one_rerun() {
        let source = FakeSource::new();
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&source) as Arc<dyn LockDataSource>, Handle::current());

        let gate = source.gate.lock().unwrap();
        let first = coordinator.refresh_async();
        assert!(matches!(first, RefreshTicket::Started(_)));
        let second = coordinator.refresh_async();
        assert!(matches!(second, RefreshTicket::Coalesced(_)));
        assert!(matches!(coordinator.refresh_async(), RefreshTicket::Coalesced(_)));
        drop(gate);

        // A coalesced request resolves only once the re-run is published
        second.wait().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.table().records()[0].lock_id, "1");

        first.wait().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // Idle again: the next request starts a fresh cycle
        assert!(matches!(
            coordinator.refresh_async(),
            RefreshTicket::Started(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_coalesced_request_reports_rerun_failure() {
        let source = FakeSource::new();
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&source) as Arc<dyn LockDataSource>, Handle::current());

        let gate = source.gate.lock().unwrap();
        let first = coordinator.refresh_async();
        let second = coordinator.refresh_async();
        source.fail.store(true, Ordering::SeqCst);
        drop(gate);

        assert!(matches!(
            second.wait().await,
            Err(LockError::CommandFailed { .. })
        ));
        assert!(first.wait().await.is_err());
    }

    struct PanicsOnce {
        panicked: AtomicBool,
    }

    impl LockDataSubscriber for PanicsOnce {
        fn on_lock_data_update(&self) {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("subscriber failure");
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_wedge_refresh() {
        let source = FakeSource::new();
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&source) as Arc<dyn LockDataSource>, Handle::current());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _panics = coordinator.subscribe(Arc::new(PanicsOnce {
            panicked: AtomicBool::new(false),
        }));
        let _after = coordinator.subscribe(recorder("after", &log));

        coordinator.refresh_async().wait().await.unwrap();
        let second = coordinator.refresh_async();
        assert!(matches!(second, RefreshTicket::Started(_)));
        second.wait().await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["after:update".to_owned(), "after:update".to_owned()]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aborted_refresh_releases_in_flight_state() {
        let source = FakeSource::new();
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&source) as Arc<dyn LockDataSource>, Handle::current());

        let gate = source.gate.lock().unwrap();
        let RefreshTicket::Started(handle) = coordinator.refresh_async() else {
            panic!("expected a fresh cycle");
        };
        let waiting = coordinator.refresh_async();
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        // Anyone waiting on the aborted cycle is released with an error
        assert!(matches!(waiting.wait().await, Err(LockError::Io { .. })));
        drop(gate);

        let next = coordinator.refresh_async();
        assert!(matches!(next, RefreshTicket::Started(_)));
        next.wait().await.unwrap();
        assert!(coordinator.has_parsed_once());
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let coordinator = RefreshCoordinator::new(FakeSource::new(), Handle::current());
        let log = Arc::new(Mutex::new(Vec::new()));

        let kept = coordinator.subscribe(recorder("kept", &log));
        let dropped = coordinator.subscribe(recorder("dropped", &log));
        assert_eq!(coordinator.subscriber_count(), 2);
        dropped.cancel();
        assert_eq!(coordinator.subscriber_count(), 1);

        coordinator.refresh_async().wait().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["kept:update".to_owned()]);
        drop(kept);
        assert_eq!(coordinator.subscriber_count(), 0);
    }
}
