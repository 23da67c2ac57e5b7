// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform named semaphore. The cable endpoint uses a pair of these
// (my-interrupt / other-interrupt) to wake a peer process blocked waiting
// for new control-ring traffic.

use std::io;

use crate::platform::PlatformSemaphore;

/// A named, cross-process counting semaphore.
pub struct NamedSemaphore {
    inner: PlatformSemaphore,
    name: String,
}

impl NamedSemaphore {
    /// Open (creating if necessary) a named semaphore starting at `initial_value`.
    pub fn open(name: &str, initial_value: u32) -> io::Result<Self> {
        let inner = PlatformSemaphore::open(name, initial_value)?;
        Ok(Self {
            inner,
            name: name.to_string(),
        })
    }

    /// Name this semaphore was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wake one thread blocked in [`wait`](Self::wait).
    pub fn post(&self) -> io::Result<()> {
        self.inner.post()
    }

    /// Block until signalled.
    pub fn wait(&self) -> io::Result<()> {
        self.inner.wait()
    }

    /// Non-blocking poll. Returns `true` if the semaphore was acquired.
    pub fn try_wait(&self) -> io::Result<bool> {
        self.inner.try_wait()
    }

    /// Remove the backing named semaphore from the system.
    pub fn unlink_by_name(name: &str) {
        PlatformSemaphore::unlink_by_name(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "/van_test_sem_{tag}_{}",
            std::process::id()
        )
    }

    #[test]
    fn post_then_wait_does_not_block() {
        let name = unique_name("post_wait");
        let sem = NamedSemaphore::open(&name, 0).expect("open");
        sem.post().expect("post");
        sem.wait().expect("wait");
        NamedSemaphore::unlink_by_name(&name);
    }

    #[test]
    fn try_wait_false_when_empty() {
        let name = unique_name("try_wait_empty");
        let sem = NamedSemaphore::open(&name, 0).expect("open");
        assert!(!sem.try_wait().expect("try_wait"));
        NamedSemaphore::unlink_by_name(&name);
    }

    #[test]
    fn try_wait_true_after_post() {
        let name = unique_name("try_wait_post");
        let sem = NamedSemaphore::open(&name, 0).expect("open");
        sem.post().expect("post");
        assert!(sem.try_wait().expect("try_wait"));
        NamedSemaphore::unlink_by_name(&name);
    }

    #[test]
    fn cross_thread_wakeup() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let name = unique_name("cross_thread");
        let sem = Arc::new(NamedSemaphore::open(&name, 0).expect("open"));
        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sem2.post().expect("post");
        });
        sem.wait().expect("wait");
        handle.join().unwrap();
        NamedSemaphore::unlink_by_name(&name);
    }
}
