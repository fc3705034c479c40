//! Interrupt-to-deferred handoff.
//!
//! The interrupt-context callback must stay short, so all it does is count
//! the signal and hand the bulk work to the deferred queue. Coalescing is a
//! compare-and-set on a single pending flag: an arbitrary burst of signals
//! while a drain is already scheduled produces at most one additional
//! drain pass, never a pass-per-signal backlog. The flag is cleared when a
//! pass begins, so a signal arriving mid-drain schedules a fresh pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::platform::{CacheLock, DeferredJob, WorkQueue};

pub(crate) struct Notifier {
    /// Total signals delivered by the channel.
    signals: AtomicU64,
    /// Drain passes actually submitted (coalesced).
    drains_scheduled: AtomicU64,
    /// Whether dispatch scheduling is currently permitted.
    enabled: AtomicBool,
    /// Single-slot "a drain pass is queued" flag.
    pending: AtomicBool,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self {
            signals: AtomicU64::new(0),
            drains_scheduled: AtomicU64::new(0),
            enabled: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }

    /// Interrupt-context entry point. Counts the signal and, while the
    /// engine is enabled, schedules a coalesced drain pass. Always reports
    /// the signal as handled.
    pub(crate) fn signal(&self, queue: &dyn WorkQueue, job: &Arc<dyn DeferredJob>) -> bool {
        self.signals.fetch_add(1, Ordering::Relaxed);
        if self.enabled.load(Ordering::Acquire) {
            self.schedule(queue, job);
        }
        true
    }

    /// Schedule a drain pass unless one is already queued. Returns whether
    /// a new pass was submitted.
    pub(crate) fn schedule(&self, queue: &dyn WorkQueue, job: &Arc<dyn DeferredJob>) -> bool {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.drains_scheduled.fetch_add(1, Ordering::Relaxed);
            queue.submit(job.clone());
            true
        } else {
            false
        }
    }

    /// Called by the drain pass before it reads the cursors, so that a
    /// signal arriving during dispatch re-arms a fresh pass.
    pub(crate) fn begin_drain(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        assert_ne!(was, enabled, "enable/disable called out of turn");
    }

    pub(crate) fn signals(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }

    pub(crate) fn drains_scheduled(&self) -> u64 {
        self.drains_scheduled.load(Ordering::Relaxed)
    }

    /// Disconnect-time reset: forget delivered signals and any stale
    /// pending mark. The scheduled-drains count survives until teardown.
    pub(crate) fn reset_signals(&self) {
        self.signals.store(0, Ordering::Relaxed);
        self.pending.store(false, Ordering::Release);
    }
}

/// Spinlock handed to the grant cache as its serialization lock.
///
/// Critical sections are short and bounded (the cache's internal
/// callbacks); the lock is never held across a blocking call and never
/// nested.
pub(crate) struct SpinLock(AtomicBool);

impl SpinLock {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(false))
    }
}

impl CacheLock for SpinLock {
    fn lock(&self) {
        while self.0.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}
