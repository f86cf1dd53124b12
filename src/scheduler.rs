use crate::demand::{DemandTracker, DemandUnderflow};
use crate::ingestor::PositionSource;
use crate::observer::{RefreshEvent, RefreshObserver};
use crate::store::SnapshotStore;

pub const DEFAULT_PERIOD: std::time::Duration = std::time::Duration::from_secs(30);

pub trait SteppableTask: Send + 'static {
    fn step(&mut self) -> bool;
}

/// One fetch-and-store cycle. The result is stored even when empty, so an
/// upstream failure clears the cache instead of serving stale positions.
pub struct RefreshCycle {
    source: std::sync::Arc<dyn PositionSource>,
    store: std::sync::Arc<SnapshotStore>,
}

impl RefreshCycle {
    #[must_use]
    pub fn new(
        source: std::sync::Arc<dyn PositionSource>,
        store: std::sync::Arc<SnapshotStore>,
    ) -> Self {
        RefreshCycle { source, store }
    }
}

impl SteppableTask for RefreshCycle {
    fn step(&mut self) -> bool {
        let snapshot = self.source.fetch();
        self.store.replace(snapshot);
        true
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    demand: DemandTracker,
    running: bool,
    shutting_down: bool,
    handle: Option<std::thread::JoinHandle<()>>,
}

struct Shared {
    lifecycle: std::sync::Mutex<Lifecycle>,
    observer: std::sync::Arc<dyn RefreshObserver>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        // Nothing in Lifecycle is left half-updated by a panic, so poisoning is ignored.
        self.lifecycle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Decides, under the lifecycle lock, whether the loop may run another
    /// cycle. A `false` answer also moves the scheduler to idle, so a later
    /// `enter` starts a fresh loop rather than relying on this one.
    fn keep_running(&self) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.shutting_down || !lifecycle.demand.has_demand() {
            self.mark_idle(&mut lifecycle);
            return false;
        }
        true
    }

    fn stop_now(&self) {
        let mut lifecycle = self.lock();
        self.mark_idle(&mut lifecycle);
    }

    fn mark_idle(&self, lifecycle: &mut Lifecycle) {
        if lifecycle.running {
            lifecycle.running = false;
            self.observer.record(RefreshEvent::SchedulerStopped);
        }
    }
}

/// Polls a [`PositionSource`] on a fixed period while there is demand.
///
/// Demand is counted with [`RefreshScheduler::enter`] and
/// [`RefreshScheduler::leave`]. The first consumer starts a polling thread,
/// the last one asks it to stop. The stop request only wakes the thread;
/// whether it actually stops is decided under the same lock that guards the
/// demand count, so an `enter` that races a stop keeps the existing loop
/// alive instead of starting a second one.
pub struct RefreshScheduler {
    shared: std::sync::Arc<Shared>,
    source: std::sync::Arc<dyn PositionSource>,
    store: std::sync::Arc<SnapshotStore>,
    period: std::time::Duration,
    stop_sender: crossbeam_channel::Sender<()>,
    stop_receiver: crossbeam_channel::Receiver<()>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(
        source: std::sync::Arc<dyn PositionSource>,
        store: std::sync::Arc<SnapshotStore>,
        period: std::time::Duration,
        observer: std::sync::Arc<dyn RefreshObserver>,
    ) -> Self {
        let (stop_sender, stop_receiver) = crossbeam_channel::bounded::<()>(1);
        RefreshScheduler {
            shared: std::sync::Arc::new(Shared {
                lifecycle: std::sync::Mutex::new(Lifecycle::default()),
                observer,
            }),
            source,
            store,
            period,
            stop_sender,
            stop_receiver,
        }
    }

    /// Registers a consumer and starts polling if none is running.
    /// Returns `true` when this was the first consumer.
    pub fn enter(&self) -> bool {
        let mut lifecycle = self.shared.lock();
        let is_first = lifecycle.demand.enter();
        if lifecycle.running {
            if is_first {
                log::debug!("RefreshScheduler: demand resumed before loop stopped, keeping it");
            }
        } else if !lifecycle.shutting_down {
            self.start(&mut lifecycle);
        }
        is_first
    }

    /// Releases a consumer. The last one raises the stop signal.
    pub fn leave(&self) -> Result<bool, DemandUnderflow> {
        let mut lifecycle = self.shared.lock();
        let is_last = lifecycle.demand.leave().map_err(|err| {
            log::error!("RefreshScheduler: {err}");
            err
        })?;
        if is_last && lifecycle.running {
            // A full channel already holds a pending wake-up.
            let _ = self.stop_sender.try_send(());
        }
        Ok(is_last)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    #[must_use]
    pub fn demand(&self) -> usize {
        self.shared.lock().demand.count()
    }

    /// Stops polling regardless of demand and waits for the thread to exit.
    /// No loop is started afterwards.
    pub fn shutdown(&self) {
        let handle = {
            let mut lifecycle = self.shared.lock();
            lifecycle.shutting_down = true;
            lifecycle.handle.take()
        };
        let _ = self.stop_sender.try_send(());
        if let Some(handle) = handle {
            log::info!("RefreshScheduler: waiting for polling thread to finish");
            if handle.join().is_err() {
                log::error!("RefreshScheduler: polling thread panicked");
            }
        }
    }

    // Caller holds the lifecycle lock and has checked `running` is false.
    fn start(&self, lifecycle: &mut Lifecycle) {
        let first_run = self.first_run();
        let task = RefreshCycle::new(self.source.clone(), self.store.clone());
        let shared = self.shared.clone();
        let stop_receiver = self.stop_receiver.clone();
        let period = self.period;

        let spawned = std::thread::Builder::new()
            .name(String::from("refresh-scheduler"))
            .spawn(move || run_task_with_period(task, first_run, period, &shared, &stop_receiver));

        match spawned {
            Ok(handle) => {
                lifecycle.running = true;
                // The previous loop has already gone idle; its thread is only unwinding.
                lifecycle.handle = Some(handle);
                self.shared.observer.record(RefreshEvent::SchedulerStarted);
            }
            Err(err) => log::error!("RefreshScheduler: failed to spawn polling thread: {err}"),
        }
    }

    // Fetch straight away unless the stored snapshot is younger than one period.
    fn first_run(&self) -> FirstRun {
        let age = chrono::Utc::now() - self.store.read().captured_at;
        match age.to_std() {
            Ok(age) if age < self.period => {
                FirstRun::At(std::time::Instant::now() + (self.period - age))
            }
            _ => FirstRun::Immediately,
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shared.lock().shutting_down = true;
        let _ = self.stop_sender.try_send(());
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FirstRun {
    /// Start with one cycle that runs whatever happens to demand meanwhile.
    Immediately,
    /// The cached snapshot is still fresh; wait, then check demand as usual.
    At(std::time::Instant),
}

fn run_task_with_period<T: SteppableTask>(
    mut task: T,
    first_run: FirstRun,
    period: std::time::Duration,
    shared: &Shared,
    stop_receiver: &crossbeam_channel::Receiver<()>,
) {
    // A wake-up left over from a previous loop only costs one extra demand check.
    let (mut next_run, mut committed) = match first_run {
        FirstRun::Immediately => (std::time::Instant::now(), true),
        FirstRun::At(instant) => (instant, false),
    };
    loop {
        if !committed {
            if !wait_until(next_run, shared, stop_receiver) {
                break;
            }
            if !shared.keep_running() {
                break;
            }
        }
        committed = false;

        if !task.step() {
            shared.stop_now();
            break;
        }

        next_run += period;
        let now = std::time::Instant::now();
        if next_run <= now {
            log::debug!("RefreshScheduler: refresh cycle overran its period");
            next_run = now;
        }
    }
}

/// Sleeps until `deadline`, waking early on every stop signal to re-check
/// demand. Returns `false` when the loop must exit.
fn wait_until(
    deadline: std::time::Instant,
    shared: &Shared,
    stop_receiver: &crossbeam_channel::Receiver<()>,
) -> bool {
    loop {
        let now = std::time::Instant::now();
        if deadline <= now {
            return true;
        }
        match stop_receiver.recv_timeout(deadline - now) {
            Ok(()) => {
                if !shared.keep_running() {
                    return false;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => return true,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                shared.stop_now();
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RefreshScheduler, SteppableTask};
    use crate::ingestor::PositionSource;
    use crate::observer::testing::RecordingObserver;
    use crate::observer::RefreshEvent;
    use crate::store::SnapshotStore;
    use crate::types::{PositionRecord, Snapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and the largest number of overlapping calls.
    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fetch_duration: std::time::Duration,
        fresh: bool,
    }

    impl CountingSource {
        fn with_duration(fetch_duration: std::time::Duration) -> Self {
            CountingSource {
                fetch_duration,
                ..Default::default()
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl PositionSource for CountingSource {
        fn fetch(&self) -> Snapshot {
            let overlapping = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(overlapping, Ordering::SeqCst);
            std::thread::sleep(self.fetch_duration);
            let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let record =
                PositionRecord::new(format!("fetch{count}"), None, 1.0, 1.0, None, None, None);
            let captured_at = if self.fresh {
                chrono::Utc::now()
            } else {
                chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
            };
            Snapshot::new(vec![record], captured_at)
        }
    }

    /// Blocks inside `fetch` until the test releases it.
    struct GatedSource {
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
        fetches: AtomicUsize,
    }

    impl PositionSource for GatedSource {
        fn fetch(&self) -> Snapshot {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Snapshot::new(Vec::new(), chrono::DateTime::<chrono::Utc>::UNIX_EPOCH)
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        condition()
    }

    fn scheduler_with(
        source: std::sync::Arc<dyn PositionSource>,
        period: std::time::Duration,
    ) -> (
        RefreshScheduler,
        std::sync::Arc<SnapshotStore>,
        std::sync::Arc<RecordingObserver>,
    ) {
        let store = std::sync::Arc::new(SnapshotStore::new());
        let observer = std::sync::Arc::new(RecordingObserver::default());
        let scheduler = RefreshScheduler::new(source, store.clone(), period, observer.clone());
        (scheduler, store, observer)
    }

    // Started/stopped must alternate, beginning with a start.
    fn assert_lifecycle_alternates(events: &[RefreshEvent]) {
        let mut running = false;
        for event in events {
            match event {
                RefreshEvent::SchedulerStarted => {
                    assert!(!running, "second loop started while one was running");
                    running = true;
                }
                RefreshEvent::SchedulerStopped => {
                    assert!(running, "stopped without running");
                    running = false;
                }
                _ => {}
            }
        }
    }

    #[test]
    fn when_first_consumer_enters_then_polling_starts_and_stores_snapshot() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_secs(10));

        assert!(!scheduler.is_running());
        assert!(scheduler.enter());
        assert!(scheduler.is_running());

        assert!(wait_for(|| store.read().len() == 1));
        assert_eq!(source.fetches(), 1);
        assert_eq!(observer.count(&RefreshEvent::SchedulerStarted), 1);

        scheduler.leave().unwrap();
        scheduler.shutdown();
    }

    #[test]
    fn when_demand_persists_then_fetch_repeats_every_period() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, _store, _observer) =
            scheduler_with(source.clone(), std::time::Duration::from_millis(20));

        scheduler.enter();
        assert!(wait_for(|| source.fetches() >= 3));

        scheduler.leave().unwrap();
        assert!(wait_for(|| !scheduler.is_running()));
    }

    #[test]
    fn when_last_consumer_leaves_during_wait_then_loop_stops_promptly() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, _store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_secs(60));

        scheduler.enter();
        assert!(wait_for(|| source.fetches() == 1));
        let left_at = std::time::Instant::now();
        assert_eq!(scheduler.leave(), Ok(true));

        assert!(wait_for(
            || observer.count(&RefreshEvent::SchedulerStopped) == 1
        ));
        assert!(left_at.elapsed() < std::time::Duration::from_secs(5));
        assert!(!scheduler.is_running());
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn when_stop_raised_mid_fetch_then_fetch_completes_and_no_further_cycle_runs() {
        let (entered_sender, entered_receiver) = crossbeam_channel::unbounded();
        let (release_sender, release_receiver) = crossbeam_channel::unbounded();
        let source = std::sync::Arc::new(GatedSource {
            entered: entered_sender,
            release: release_receiver,
            fetches: AtomicUsize::new(0),
        });
        let (scheduler, store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_millis(1));
        store.replace(Snapshot::new(
            vec![PositionRecord::new(String::from("stale"), None, 0.0, 0.0, None, None, None)],
            chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        ));

        scheduler.enter();
        entered_receiver
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("fetch should begin");
        assert_eq!(scheduler.leave(), Ok(true));
        release_sender.send(()).unwrap();

        assert!(wait_for(
            || observer.count(&RefreshEvent::SchedulerStopped) == 1
        ));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        // the in-flight cycle still stored its (empty) result
        assert!(store.read().is_empty());
    }

    #[test]
    fn when_enter_leave_enter_then_exactly_one_loop_is_running() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, _store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_secs(60));

        assert!(scheduler.enter());
        assert_eq!(scheduler.leave(), Ok(true));
        assert!(scheduler.enter());

        assert!(scheduler.is_running());
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(scheduler.is_running());

        let events = observer.events();
        assert_lifecycle_alternates(&events);
        let started = observer.count(&RefreshEvent::SchedulerStarted);
        let stopped = observer.count(&RefreshEvent::SchedulerStopped);
        assert_eq!(started - stopped, 1);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 1);

        scheduler.shutdown();
    }

    #[test]
    fn when_concurrent_bursts_of_enter_and_leave_then_at_most_one_loop_runs() {
        let source = std::sync::Arc::new(CountingSource::with_duration(
            std::time::Duration::from_millis(2),
        ));
        let (scheduler, _store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_millis(1));
        let scheduler = std::sync::Arc::new(scheduler);
        let firsts = std::sync::Arc::new(AtomicUsize::new(0));
        let lasts = std::sync::Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = scheduler.clone();
                let firsts = firsts.clone();
                let lasts = lasts.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if scheduler.enter() {
                            firsts.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                        if scheduler.leave().unwrap() {
                            lasts.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(scheduler.demand(), 0);
        assert_eq!(
            firsts.load(Ordering::SeqCst),
            lasts.load(Ordering::SeqCst)
        );
        assert!(wait_for(|| !scheduler.is_running()));
        assert_lifecycle_alternates(&observer.events());
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn when_n_concurrent_consumers_then_first_and_last_reported_once() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, _store, _observer) =
            scheduler_with(source, std::time::Duration::from_secs(60));
        let scheduler = std::sync::Arc::new(scheduler);
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(16));

        let firsts: usize = (0..16)
            .map(|_| {
                let scheduler = scheduler.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    scheduler.enter()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();
        assert_eq!(firsts, 1);
        assert_eq!(scheduler.demand(), 16);

        let lasts: usize = (0..16)
            .map(|_| {
                let scheduler = scheduler.clone();
                std::thread::spawn(move || scheduler.leave().unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();
        assert_eq!(lasts, 1);
        assert_eq!(scheduler.demand(), 0);
    }

    #[test]
    fn when_leave_called_without_enter_then_underflow_is_signalled() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, _store, _observer) =
            scheduler_with(source.clone(), std::time::Duration::from_secs(60));

        assert!(scheduler.leave().is_err());
        assert_eq!(scheduler.demand(), 0);
        assert!(!scheduler.is_running());
        assert_eq!(source.fetches(), 0);
    }

    #[test]
    fn when_snapshot_is_fresh_then_restarted_loop_waits_for_next_period() {
        let source = std::sync::Arc::new(CountingSource {
            fresh: true,
            ..Default::default()
        });
        let (scheduler, _store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_secs(60));

        scheduler.enter();
        assert!(wait_for(|| source.fetches() == 1));
        scheduler.leave().unwrap();
        assert!(wait_for(|| !scheduler.is_running()));

        scheduler.enter();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(source.fetches(), 1);
        assert_eq!(observer.count(&RefreshEvent::SchedulerStarted), 2);

        scheduler.shutdown();
    }

    #[test]
    fn when_shutdown_then_loop_exits_and_does_not_restart() {
        let source = std::sync::Arc::new(CountingSource::default());
        let (scheduler, _store, observer) =
            scheduler_with(source.clone(), std::time::Duration::from_secs(60));

        scheduler.enter();
        assert!(wait_for(|| source.fetches() == 1));
        scheduler.shutdown();

        assert!(!scheduler.is_running());
        assert_eq!(observer.count(&RefreshEvent::SchedulerStopped), 1);

        scheduler.leave().unwrap();
        scheduler.enter();
        assert!(!scheduler.is_running());
    }

    struct StopAfter(usize);

    impl SteppableTask for StopAfter {
        fn step(&mut self) -> bool {
            self.0 = self.0.saturating_sub(1);
            self.0 > 0
        }
    }

    #[test]
    fn when_task_reports_done_then_loop_goes_idle() {
        let store = std::sync::Arc::new(SnapshotStore::new());
        let observer = std::sync::Arc::new(RecordingObserver::default());
        let scheduler = RefreshScheduler::new(
            std::sync::Arc::new(CountingSource::default()),
            store,
            std::time::Duration::from_millis(1),
            observer.clone(),
        );
        {
            let mut lifecycle = scheduler.shared.lock();
            lifecycle.demand.enter();
            lifecycle.running = true;
        }

        super::run_task_with_period(
            StopAfter(3),
            super::FirstRun::Immediately,
            std::time::Duration::from_millis(1),
            &scheduler.shared,
            &scheduler.stop_receiver,
        );

        assert!(!scheduler.is_running());
        assert_eq!(observer.count(&RefreshEvent::SchedulerStopped), 1);
    }
}
