//! Quiescence barrier
//!
//! Counts units of work that are in flight and lets a coordinator block
//! until all of them have finished. Registration is a token: [`Quiescence::enter`]
//! increments the counter and returns an [`InFlight`] guard, dropping the
//! guard decrements it. A unit that is rejected, dropped at shutdown or
//! unwinds from a panic still releases its registration exactly once.
//!
//! ```text
//!   enter() ──► InFlight ──► queue ──► worker runs unit ──► drop ──► count-1
//!                  │                                                   │
//!                  └─ rejected: dropped immediately ───────────────────┘
//! ```

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-flight counter with a blocking wait-until-zero
#[derive(Debug, Default)]
pub struct Quiescence {
    count: Mutex<i64>,
    drained: Condvar,
}

impl Quiescence {
    /// Create a barrier with nothing in flight
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one unit of work
    pub fn enter(self: &Arc<Self>) -> InFlight {
        *self.count.lock() += 1;
        InFlight {
            barrier: Arc::clone(self),
        }
    }

    /// Block until every registered unit has finished
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }

    /// Like [`wait`](Self::wait) with an upper bound. Returns true if drained.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.drained.wait_until(&mut count, deadline).timed_out() {
                return *count <= 0;
            }
        }
        true
    }

    /// Units currently registered
    pub fn pending(&self) -> i64 {
        *self.count.lock()
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count <= 0 {
            self.drained.notify_all();
        }
    }
}

/// Registration of one unit on a [`Quiescence`] barrier
///
/// Not `Clone`: one guard, one release.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the registration"]
pub struct InFlight {
    barrier: Arc<Quiescence>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.barrier.leave();
    }
}
