//! Spin byte-locks, one per bucket or per k-mer. Held only for short
//! critical sections that never do I/O, so contention is handled with a
//! spin hint plus an occasional scheduler yield.

use std::sync::atomic::{AtomicU8, Ordering};

const SPINS_BEFORE_YIELD: u32 = 64;

pub struct ByteLocks {
    locks: Box<[AtomicU8]>,
}

impl ByteLocks {
    pub fn new(n: usize) -> Self {
        ByteLocks {
            locks: (0..n).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    pub fn acquire(&self, i: usize) {
        let lock = &self.locks[i];
        let mut spins = 0u32;
        while lock
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            if spins % SPINS_BEFORE_YIELD == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    pub fn release(&self, i: usize) {
        self.locks[i].store(0, Ordering::Release);
    }
}
