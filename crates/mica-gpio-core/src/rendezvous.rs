//! Two-phase handshake between a synchronous reader and the polling engine
//!
//! A reader that wants a fresh measurement of a channel that is not
//! continuously armed must not read a snapshot taken before its arming
//! reached the hardware. The handshake therefore waits for two engine ticks:
//!
//! ```text
//! reader                          engine
//! pending = true
//! wait tick 1  <-----------------  tick 1 (iteration N done, old mask)
//! arm channel                      wait ack
//! ack  --------------------------> re-arm with new mask, measure (N+1)
//! wait tick 2  <-----------------  tick 2 (snapshot includes channel)
//! read snapshot, restore arming    wait ack
//! pending = false, ack  ---------> continue
//! ```
//!
//! Ticks and acks are counters guarded by one mutex, so the phases alternate
//! strictly. Readers are serialised by a separate lock. Closing the
//! rendezvous (engine shutdown) wakes a reader in any phase.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::registers::DiagnosisSnapshot;

#[derive(Debug, Default)]
struct Slots {
    pending: bool,
    ticks: u64,
    acks: u64,
    snapshot: DiagnosisSnapshot,
    closed: bool,
}

/// Rendezvous point owned by one polling engine run
#[derive(Debug, Default)]
pub struct Rendezvous {
    slots: Mutex<Slots>,
    turn: Condvar,
    readers: Mutex<()>,
}

impl Rendezvous {
    /// Create an open rendezvous
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Slots>) -> MutexGuard<'a, Slots> {
        self.turn
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a reader is waiting for the engine
    pub fn is_pending(&self) -> bool {
        self.slots().pending
    }

    /// Most recent snapshot handed over by the engine
    pub fn latest(&self) -> DiagnosisSnapshot {
        self.slots().snapshot
    }

    /// Engine side: publish `snapshot` and, if a reader is pending, tick and
    /// block until the reader acknowledges
    pub fn service(&self, snapshot: DiagnosisSnapshot) {
        let mut slots = self.slots();
        slots.snapshot = snapshot;
        if !slots.pending {
            return;
        }

        slots.ticks += 1;
        let tick = slots.ticks;
        log::trace!("Rendezvous tick {}", tick);
        self.turn.notify_all();

        while slots.acks < tick && !slots.closed {
            slots = self.wait(slots);
        }
    }

    /// Reader side: run the two-phase handshake
    ///
    /// `arm` runs after the first tick, `restore` after the second (or after
    /// the rendezvous was closed mid-way). Returns the snapshot of the second
    /// tick, or `None` if the engine shut down before delivering it.
    pub fn acquire<A, R>(&self, arm: A, restore: R) -> Option<DiagnosisSnapshot>
    where
        A: FnOnce(),
        R: FnOnce(),
    {
        let _reader = self.readers.lock().unwrap_or_else(PoisonError::into_inner);

        let mut slots = self.slots();
        if slots.closed {
            return None;
        }
        slots.pending = true;
        let start = slots.ticks;

        while slots.ticks < start + 1 && !slots.closed {
            slots = self.wait(slots);
        }
        if slots.closed {
            slots.pending = false;
            return None;
        }

        arm();
        slots.acks = slots.ticks;
        self.turn.notify_all();
        log::trace!("Rendezvous armed after tick {}", slots.ticks);

        while slots.ticks < start + 2 && !slots.closed {
            slots = self.wait(slots);
        }
        let snapshot = (!slots.closed).then_some(slots.snapshot);

        slots.pending = false;
        restore();
        slots.acks = slots.ticks;
        self.turn.notify_all();

        snapshot
    }

    /// Refuse new readers and release any waiting party
    pub fn close(&self) {
        let mut slots = self.slots();
        slots.closed = true;
        slots.pending = false;
        self.turn.notify_all();
    }

    /// Guard that closes the rendezvous when dropped
    pub fn close_on_drop(self: &Arc<Self>) -> CloseGuard {
        CloseGuard(Arc::clone(self))
    }
}

/// Closes a [`Rendezvous`] on drop, including during a panic unwind
pub struct CloseGuard(Arc<Rendezvous>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}
