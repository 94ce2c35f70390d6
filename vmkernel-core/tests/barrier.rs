//! Integration test for the N-way spin barrier (spec §4.5, §C.8).

extern crate std;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use vmkernel_core::barrier::SpinBarrier;

#[test]
fn all_parties_observe_each_other_past_the_barrier() {
    let barrier = Arc::new(SpinBarrier::new(4));
    let counter = Arc::new(AtomicU32::new(0));
    let mut handles = std::vec::Vec::new();
    for _ in 0..4 {
        let b = barrier.clone();
        let c = counter.clone();
        handles.push(thread::spawn(move || {
            c.fetch_add(1, Ordering::SeqCst);
            b.wait();
            assert_eq!(c.load(Ordering::SeqCst), 4);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}
