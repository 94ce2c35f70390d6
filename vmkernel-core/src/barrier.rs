//! Sense-reversing N-way barrier (spec §4.5 "`spin_barrier(b)` ... used
//! by the POST subsystem"). Grounded on spec.md §C.8: only the
//! primitive and its contract are in scope, not a POST reimplementation.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A barrier over a fixed number of parties (typically `numPCpus`).
/// Parties call [`SpinBarrier::wait`]; the last arrival flips the sense
/// bit, releasing everyone spinning on the previous sense.
pub struct SpinBarrier {
    parties: u32,
    count: AtomicU32,
    sense: AtomicBool,
}

impl SpinBarrier {
    pub const fn new(parties: u32) -> SpinBarrier {
        SpinBarrier {
            parties,
            count: AtomicU32::new(0),
            sense: AtomicBool::new(false),
        }
    }

    /// Block until all `parties` have called `wait`. Busy-spins; callers
    /// on a real PCPU are expected to call this only where blocking is
    /// acceptable (POST, not the hot dispatch path).
    pub fn wait(&self) {
        let local_sense = !self.sense.load(Ordering::Relaxed);
        let arrived = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.parties {
            self.count.store(0, Ordering::Relaxed);
            self.sense.store(local_sense, Ordering::Release);
        } else {
            while self.sense.load(Ordering::Acquire) != local_sense {
                core::hint::spin_loop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_party_releases_itself_immediately() {
        let barrier = SpinBarrier::new(1);
        barrier.wait();
        barrier.wait();
    }
}
