/// Returned by [`DemandTracker::leave`] when there is no consumer to release.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DemandUnderflow;

impl std::fmt::Display for DemandUnderflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leave() called with no active consumers")
    }
}

impl std::error::Error for DemandUnderflow {}

/// Count of in-flight consumers.
///
/// Not synchronized by itself: the scheduler keeps it behind the same mutex
/// as its running flag so the first/last decision and the start/stop
/// decision happen together.
#[derive(Debug, Default)]
pub struct DemandTracker {
    count: usize,
}

impl DemandTracker {
    #[must_use]
    pub fn new() -> Self {
        DemandTracker { count: 0 }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn has_demand(&self) -> bool {
        self.count > 0
    }

    /// Registers a consumer. Returns `true` when it is the only one.
    pub fn enter(&mut self) -> bool {
        self.count += 1;
        self.count == 1
    }

    /// Releases a consumer. Returns `true` when none are left.
    ///
    /// At zero the count is left untouched and [`DemandUnderflow`] is returned.
    pub fn leave(&mut self) -> Result<bool, DemandUnderflow> {
        if self.count == 0 {
            return Err(DemandUnderflow);
        }
        self.count -= 1;
        Ok(self.count == 0)
    }
}
