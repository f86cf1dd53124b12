/// Lifecycle and fetch events of the refresh machinery.
#[derive(Debug, PartialEq, Clone)]
pub enum RefreshEvent {
    FetchAttempted,
    FetchSucceeded { records: usize },
    FetchFailed { reason: String },
    SchedulerStarted,
    SchedulerStopped,
}

/// Sink for [`RefreshEvent`]s. Called from the polling thread, so it must not block.
pub trait RefreshObserver: Send + Sync + 'static {
    fn record(&self, event: RefreshEvent);
}

/// Default sink, forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RefreshObserver for LogObserver {
    fn record(&self, event: RefreshEvent) {
        match event {
            RefreshEvent::FetchAttempted => log::debug!("Fetching positions from upstream"),
            RefreshEvent::FetchSucceeded { records } => {
                log::info!("Fetched {records} positions from upstream");
            }
            RefreshEvent::FetchFailed { reason } => {
                log::warn!("Upstream fetch failed: {reason}");
            }
            RefreshEvent::SchedulerStarted => log::info!("RefreshScheduler: polling started"),
            RefreshEvent::SchedulerStopped => log::info!("RefreshScheduler: polling stopped"),
        }
    }
}
