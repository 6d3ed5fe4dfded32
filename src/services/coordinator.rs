//! Polling coordinator
//!
//! Owns the refresh cadence and the last snapshot. Refreshes are
//! single-flight: a refresh requested while another is running waits for
//! that one and shares its result instead of starting a second fetch.

use std::future::Future;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{Datelike, Local};
use tokio::time::MissedTickBehavior;

use super::catalogue::{Catalogue, CatalogueDiff};
use super::client::SnapshotSource;
use crate::types::{Snapshot, YearWindow};

/// Which years the catalogue surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// The current calendar year and this many before it
    Trailing(u32),
    /// A fixed range, independent of the clock
    #[allow(dead_code)] // Constructed by tests
    Fixed(YearWindow),
}

impl WindowPolicy {
    pub fn window(&self) -> YearWindow {
        match *self {
            WindowPolicy::Trailing(years_back) => {
                YearWindow::trailing(Local::now().year(), years_back)
            }
            WindowPolicy::Fixed(window) => window,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorState {
    /// No data yet
    Idle,
    /// Snapshot of the latest completed refresh
    Ready(Arc<Snapshot>),
}

/// What a `refresh()` call observed
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: Arc<Snapshot>,
    /// Catalogue change produced by the refresh
    pub diff: CatalogueDiff,
    /// True when this call waited for a refresh already in flight
    pub joined: bool,
}

struct Cache {
    state: CoordinatorState,
    catalogue: Catalogue,
    last_diff: CatalogueDiff,
}

/// Cache contents of a refresh, computed before the write lock is taken
struct Staged {
    snapshot: Arc<Snapshot>,
    catalogue: Catalogue,
    diff: CatalogueDiff,
}

#[derive(Default)]
struct Flight {
    running: bool,
    generation: u64,
}

pub struct PollingCoordinator<S: SnapshotSource> {
    source: Mutex<S>,
    policy: WindowPolicy,
    cache: RwLock<Cache>,
    flight: Mutex<Flight>,
    landed: Condvar,
}

impl<S: SnapshotSource> PollingCoordinator<S> {
    pub fn new(source: S, policy: WindowPolicy) -> Self {
        Self {
            source: Mutex::new(source),
            policy,
            cache: RwLock::new(Cache {
                state: CoordinatorState::Idle,
                catalogue: Catalogue::default(),
                last_diff: CatalogueDiff::default(),
            }),
            flight: Mutex::new(Flight::default()),
            landed: Condvar::new(),
        }
    }

    /// Fetch a fresh snapshot and replace the cached one, blocking until
    /// done. Joins a refresh already in flight instead of starting another.
    pub fn refresh(&self) -> RefreshOutcome {
        {
            let mut flight = lock(&self.flight);
            if flight.running {
                let joined = flight.generation;
                while flight.running && flight.generation == joined {
                    flight = self
                        .landed
                        .wait(flight)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                drop(flight);
                tracing::debug!("Joined in-flight refresh");
                return self.joined_outcome();
            }
            flight.running = true;
        }

        // Clears the flight flag and wakes joiners even if the fetch panics
        let _landing = Landing {
            flight: &self.flight,
            landed: &self.landed,
        };

        let snapshot = lock(&self.source).fetch_all();
        self.store(snapshot)
    }

    /// Cached snapshot, if any refresh has produced one. Never fetches.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        match &self.read_cache().state {
            CoordinatorState::Idle => None,
            CoordinatorState::Ready(snapshot) => Some(Arc::clone(snapshot)),
        }
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn state(&self) -> CoordinatorState {
        self.read_cache().state.clone()
    }

    /// Catalogue computed by the latest refresh
    pub fn catalogue(&self) -> Catalogue {
        self.read_cache().catalogue.clone()
    }

    /// Refresh on `period` until `shutdown` resolves. The first refresh runs
    /// immediately; fetches run on the blocking pool.
    pub async fn run<F, Fut>(self: Arc<Self>, period: Duration, shutdown: Fut, mut on_refresh: F)
    where
        S: 'static,
        F: FnMut(&RefreshOutcome),
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Polling stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let coordinator = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || coordinator.refresh()).await {
                        Ok(outcome) => on_refresh(&outcome),
                        Err(e) => tracing::error!("Refresh task failed: {}", e),
                    }
                }
            }
        }
    }

    fn store(&self, snapshot: Snapshot) -> RefreshOutcome {
        if snapshot.is_empty() {
            if self.read_cache().state == CoordinatorState::Idle {
                tracing::warn!("Fetch returned no data; still waiting for a first snapshot");
                return RefreshOutcome {
                    snapshot: Arc::new(snapshot),
                    diff: CatalogueDiff::default(),
                    joined: false,
                };
            }
            tracing::warn!("Fetch returned no data; replacing the cached snapshot");
        }

        let staged = self.stage(snapshot);
        self.commit(staged)
    }

    /// Build the next catalogue and its diff. Only a read lock is taken, so
    /// `current_snapshot` callers are never held up by the build. Single-flight
    /// guarantees no other refresh commits in between.
    fn stage(&self, snapshot: Snapshot) -> Staged {
        let snapshot = Arc::new(snapshot);
        let catalogue = Catalogue::build(&snapshot, self.policy.window());
        let diff = catalogue.diff(&self.read_cache().catalogue);
        tracing::debug!(
            "Refreshed: {} metrics ({} added, {} removed)",
            catalogue.len(),
            diff.added.len(),
            diff.removed.len()
        );
        Staged {
            snapshot,
            catalogue,
            diff,
        }
    }

    fn commit(&self, staged: Staged) -> RefreshOutcome {
        let Staged {
            snapshot,
            catalogue,
            diff,
        } = staged;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.state = CoordinatorState::Ready(Arc::clone(&snapshot));
        cache.catalogue = catalogue;
        cache.last_diff = diff.clone();

        RefreshOutcome {
            snapshot,
            diff,
            joined: false,
        }
    }

    fn joined_outcome(&self) -> RefreshOutcome {
        let cache = self.read_cache();
        let snapshot = match &cache.state {
            CoordinatorState::Ready(snapshot) => Arc::clone(snapshot),
            CoordinatorState::Idle => Arc::new(Snapshot::empty()),
        };
        RefreshOutcome {
            snapshot,
            diff: cache.last_diff.clone(),
            joined: true,
        }
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Landing<'a> {
    flight: &'a Mutex<Flight>,
    landed: &'a Condvar,
}

impl Drop for Landing<'_> {
    fn drop(&mut self) {
        let mut flight = lock(self.flight);
        flight.running = false;
        flight.generation = flight.generation.wrapping_add(1);
        self.landed.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bill, ConsumptionPoint, ContractKind, MetricKey, MetricKind};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    const WINDOW: YearWindow = YearWindow {
        min: 2024,
        max: 2025,
    };

    /// Replays snapshots in order (repeating the last) and counts fetches
    struct ScriptedSource {
        replies: VecDeque<Snapshot>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Snapshot>, delay: Duration) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                replies: replies.into(),
                calls: Arc::clone(&calls),
                delay,
            };
            (source, calls)
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn fetch_all(&mut self) -> Snapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.replies.len() > 1 {
                self.replies.pop_front().unwrap_or_default()
            } else {
                self.replies.front().cloned().unwrap_or_default()
            }
        }
    }

    fn account_snapshot(bill_year: i32) -> Snapshot {
        Snapshot {
            consumption_points: Some(vec![ConsumptionPoint {
                id: Some("A".into()),
                has_electricity_meter: true,
                has_electricity_contract: true,
                ..Default::default()
            }]),
            bills: Some(vec![Bill {
                consumption_point_id: Some("A".into()),
                contract_type: Some("EE".into()),
                issue_date: Some(format!("{}-03-01", bill_year)),
                billing_month: Some(format!("Februarie {}", bill_year)),
                amount_with_tax: Some("42.00".into()),
            }]),
            electricity_readings: Some(Vec::new()),
            gas_readings: Some(Vec::new()),
        }
    }

    fn bill_key(year: i32) -> MetricKey {
        MetricKey::new("A", MetricKind::BillCount(ContractKind::Electricity), year)
    }

    // ========== state machine tests ==========

    #[test]
    fn test_starts_idle_without_fetching() {
        let (source, calls) = ScriptedSource::new(vec![account_snapshot(2024)], Duration::ZERO);
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));

        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert!(coordinator.current_snapshot().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_refresh_becomes_ready() {
        let (source, _) = ScriptedSource::new(vec![account_snapshot(2024)], Duration::ZERO);
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));

        let outcome = coordinator.refresh();

        assert!(!outcome.joined);
        assert_eq!(outcome.diff.added, vec![bill_key(2024)]);
        assert_eq!(
            coordinator.current_snapshot().as_deref(),
            Some(&account_snapshot(2024))
        );
        assert!(coordinator.catalogue().contains(&bill_key(2024)));
    }

    #[test]
    fn test_failed_fetch_while_idle_stays_idle() {
        let (source, _) = ScriptedSource::new(vec![Snapshot::empty()], Duration::ZERO);
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));

        let outcome = coordinator.refresh();

        assert!(outcome.snapshot.is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn test_failed_fetch_after_ready_overwrites_with_empty() {
        let (source, _) = ScriptedSource::new(
            vec![account_snapshot(2024), Snapshot::empty()],
            Duration::ZERO,
        );
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));
        coordinator.refresh();

        let outcome = coordinator.refresh();

        assert_eq!(outcome.diff.removed, vec![bill_key(2024)]);
        let current = coordinator.current_snapshot().unwrap();
        assert!(current.is_empty());
        assert!(coordinator.catalogue().is_empty());
    }

    #[test]
    fn test_refresh_replaces_snapshot_wholesale() {
        let (source, calls) = ScriptedSource::new(
            vec![account_snapshot(2024), account_snapshot(2025)],
            Duration::ZERO,
        );
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));
        coordinator.refresh();

        let outcome = coordinator.refresh();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.diff.added, vec![bill_key(2025)]);
        assert_eq!(outcome.diff.removed, vec![bill_key(2024)]);
        assert_eq!(
            coordinator.current_snapshot().as_deref(),
            Some(&account_snapshot(2025))
        );
    }

    // ========== single-flight tests ==========

    #[test]
    fn test_concurrent_refreshes_fetch_once() {
        let (source, calls) =
            ScriptedSource::new(vec![account_snapshot(2024)], Duration::from_millis(300));
        let coordinator = Arc::new(PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW)));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.refresh()
                })
            })
            .collect();
        let outcomes: Vec<RefreshOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.iter().filter(|o| o.joined).count(), 1);
        for outcome in &outcomes {
            assert_eq!(*outcome.snapshot, account_snapshot(2024));
        }
    }

    #[test]
    fn test_sequential_refreshes_each_fetch() {
        let (source, calls) = ScriptedSource::new(vec![account_snapshot(2024)], Duration::ZERO);
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));

        coordinator.refresh();
        coordinator.refresh();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_current_snapshot_does_not_wait_for_refresh() {
        let (source, _) =
            ScriptedSource::new(vec![account_snapshot(2024)], Duration::from_millis(300));
        let coordinator = Arc::new(PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW)));

        let background = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.refresh())
        };
        thread::sleep(Duration::from_millis(50));
        let started = std::time::Instant::now();
        assert!(coordinator.current_snapshot().is_none());
        assert!(started.elapsed() < Duration::from_millis(200));

        background.join().unwrap();
        assert!(coordinator.current_snapshot().is_some());
    }

    #[test]
    fn test_staging_needs_no_write_lock() {
        let (source, _) = ScriptedSource::new(vec![account_snapshot(2024)], Duration::ZERO);
        let coordinator = PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW));
        let coordinator = &coordinator;
        let (tx, rx) = std::sync::mpsc::channel();

        thread::scope(|scope| {
            // A reader holding the cache while the catalogue is built
            let reader = coordinator.read_cache();
            scope.spawn(move || {
                let staged = coordinator.stage(account_snapshot(2024));
                let _ = tx.send(staged.diff);
            });
            let diff = rx.recv_timeout(Duration::from_secs(5));
            drop(reader);
            assert_eq!(diff.unwrap().added, vec![bill_key(2024)]);
        });

        // Staging alone leaves the cache untouched
        assert!(coordinator.current_snapshot().is_none());
    }

    // ========== window policy tests ==========

    #[test]
    fn test_trailing_policy_ends_at_current_year() {
        let window = WindowPolicy::Trailing(1).window();
        let year = Local::now().year();
        assert_eq!(window, YearWindow::trailing(year, 1));
    }

    // ========== run loop tests ==========

    #[tokio::test]
    async fn test_run_refreshes_until_shutdown() {
        let (source, calls) = ScriptedSource::new(vec![account_snapshot(2024)], Duration::ZERO);
        let coordinator = Arc::new(PollingCoordinator::new(source, WindowPolicy::Fixed(WINDOW)));
        let mut seen = 0usize;

        Arc::clone(&coordinator)
            .run(
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(60)),
                |_| seen += 1,
            )
            .await;

        assert!(seen >= 1);
        assert_eq!(seen, calls.load(Ordering::SeqCst));
        assert!(coordinator.current_snapshot().is_some());
    }
}
