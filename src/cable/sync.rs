// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process counting semaphore. `os_cable.c` keeps `suspend_writer`,
// `suspend_reader` and each wait-slot's `suspend` as anonymous (unnamed)
// POSIX semaphores embedded directly in the heap-allocated endpoint struct —
// process-private, never mapped into shared memory. A `Mutex`+`Condvar`
// latch is the idiomatic Rust realization of the same unnamed-semaphore
// role used elsewhere in this crate for `Clock`'s suspend state.

use std::sync::{Condvar, Mutex};

pub struct InprocSemaphore {
    count: Mutex<u32>,
    ready: Condvar,
}

impl InprocSemaphore {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            ready: Condvar::new(),
        }
    }

    /// Increment the count and wake one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.ready.notify_one();
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.ready.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Non-blocking poll; returns `true` and decrements if the count was positive.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}
