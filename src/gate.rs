//! # Admission Gate
//!
//! A process-wide cap on concurrently running test sessions. The gate is
//! constructed once in `main` and injected into every session as an
//! `Arc<AdmissionGate>`, which keeps the lifecycle explicit and lets
//! tests build a gate per case instead of sharing a global.
//!
//! A refused session sends a single `SRV_QUEUE("9987")` frame and closes:
//! there is no queueing and no heartbeat, since client routing is assumed
//! to be handled by an upstream load balancer.

use parking_lot::Mutex;
use std::sync::Arc;

/// Counter bounding the number of sessions allowed to run tests at once.
#[derive(Debug)]
pub struct AdmissionGate {
    active: Mutex<usize>,
    cap: usize,
}

impl AdmissionGate {
    /// Create a gate admitting at most `cap` concurrent sessions.
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(0),
            cap,
        })
    }

    /// Try to claim a slot. Returns `None` when the gate is at capacity.
    ///
    /// The test-and-increment runs under the mutex, so concurrent callers
    /// never over-admit. The slot is held until the returned permit is
    /// dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut active = self.active.lock();
        if *active < self.cap {
            *active += 1;
            Some(AdmissionPermit {
                gate: Arc::clone(self),
            })
        } else {
            None
        }
    }

    /// Number of currently held slots.
    pub fn active(&self) -> usize {
        *self.active.lock()
    }

    /// Configured capacity.
    pub fn cap(&self) -> usize {
        self.cap
    }

    fn release(&self) {
        let mut active = self.active.lock();
        debug_assert!(*active > 0, "admission release without acquire");
        *active = active.saturating_sub(1);
    }
}

/// A held admission slot. Dropping the permit releases the slot, so the
/// release happens on every session exit path.
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
