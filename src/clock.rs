// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Periodic clock with per-cycle overrun detection.
// Port of the barrier algorithm described by `os_clock.c` / `os_timer.c`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::trap_if;

/// Process-wide clock table bound, matching `OS_CLOCK_LIMIT`.
pub const CLOCK_LIMIT: usize = 4;

static CLOCK_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Diagnostic mode for [`Clock::trace`], matching `OS_CT_FIRST`/`MIDDLE`/`LAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTraceMode {
    First,
    Middle,
    Last,
}

struct SuspendState {
    /// Set by `barrier` before sleeping; cleared by the timer thread when it
    /// wakes a waiting barrier. If the timer fires while this is false, the
    /// expiration is latched as a kernel-side overrun instead.
    waiting: bool,
    pending_expirations: u64,
}

struct Inner {
    name: String,
    interval: Duration,
    cycles: Mutex<u64>,
    k_overruns: Mutex<u64>,
    u_overruns: Mutex<u64>,
    min_busy: Mutex<Option<Duration>>,
    max_busy: Mutex<Option<Duration>>,
    c_start: Mutex<Instant>,
    suspend: Condvar,
    suspend_state: Mutex<SuspendState>,
    running: std::sync::atomic::AtomicBool,
}

/// A periodic timer producing a barrier the owner calls once per cycle.
pub struct Clock {
    inner: Arc<Inner>,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Reserve a slot (bound `OS_CLOCK_LIMIT`) and create (but do not start) a
    /// periodic clock with the given nominal interval.
    pub fn create(name: &str, interval_ms: u64) -> Self {
        let prev = CLOCK_COUNT.fetch_add(1, Ordering::AcqRel);
        trap_if!(prev + 1 > CLOCK_LIMIT, "clock table exhausted");

        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                interval: Duration::from_millis(interval_ms),
                cycles: Mutex::new(0),
                k_overruns: Mutex::new(0),
                u_overruns: Mutex::new(0),
                min_busy: Mutex::new(None),
                max_busy: Mutex::new(None),
                c_start: Mutex::new(Instant::now()),
                suspend: Condvar::new(),
                suspend_state: Mutex::new(SuspendState {
                    waiting: false,
                    pending_expirations: 0,
                }),
                running: std::sync::atomic::AtomicBool::new(false),
            }),
            timer_thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Start the periodic timer.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.inner.c_start.lock().unwrap() = Instant::now();
        let mut guard = self.timer_thread.lock().unwrap();
        *guard = Some(spawn_timer_thread(Arc::clone(&self.inner)));
    }

    /// Stop the periodic timer. `barrier` calls after this block forever
    /// unless `start` is called again.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(handle) = self.timer_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Stop the timer and release the clock table slot.
    pub fn delete(self) {
        self.stop();
        CLOCK_COUNT.fetch_sub(1, Ordering::AcqRel);
    }

    /// Called once per tick by the owning logic. See spec for the six-step
    /// algorithm: returns `0` after a normal sleep, `-1` immediately on
    /// overrun (the caller's own work already exceeded the interval).
    pub fn barrier(&self) -> i32 {
        *self.inner.cycles.lock().unwrap() += 1;

        let pending = {
            let mut state = self.inner.suspend_state.lock().unwrap();
            std::mem::replace(&mut state.pending_expirations, 0)
        };
        *self.inner.k_overruns.lock().unwrap() += pending;

        let now = Instant::now();
        let busy = now.duration_since(*self.inner.c_start.lock().unwrap());
        {
            let mut min_busy = self.inner.min_busy.lock().unwrap();
            *min_busy = Some(min_busy.map_or(busy, |m| m.min(busy)));
        }
        {
            let mut max_busy = self.inner.max_busy.lock().unwrap();
            *max_busy = Some(max_busy.map_or(busy, |m| m.max(busy)));
        }

        if busy > self.inner.interval {
            *self.inner.u_overruns.lock().unwrap() += 1;
            // Stop + restart the timer so the next tick's phase resets.
            self.restart_timer();
            *self.inner.c_start.lock().unwrap() = Instant::now();
            return -1;
        }

        {
            let mut state = self.inner.suspend_state.lock().unwrap();
            state.waiting = true;
            while state.waiting {
                state = self.inner.suspend.wait(state).unwrap();
            }
        }
        *self.inner.c_start.lock().unwrap() = Instant::now();
        0
    }

    fn restart_timer(&self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(handle) = self.timer_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.inner.running.store(true, Ordering::Release);
        let mut guard = self.timer_thread.lock().unwrap();
        *guard = Some(spawn_timer_thread(Arc::clone(&self.inner)));
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        *self.inner.cycles.lock().unwrap()
    }

    /// Kernel-side overrun count: expirations that fired while nobody had
    /// called `barrier` to wait on them yet.
    pub fn kernel_overruns(&self) -> u64 {
        *self.inner.k_overruns.lock().unwrap()
    }

    /// User-side overrun count: cycles where the caller's own work exceeded
    /// the nominal interval.
    pub fn user_overruns(&self) -> u64 {
        *self.inner.u_overruns.lock().unwrap()
    }

    /// High-resolution sleep, resumed transparently on interruption.
    pub fn msleep(ms: u64) {
        msleep_impl(ms);
    }

    /// Emit first/middle/last diagnostics for this cycle.
    pub fn trace(&self, mode: ClockTraceMode) {
        match mode {
            ClockTraceMode::First => tracing::trace!(clock = %self.inner.name, "cycle start"),
            ClockTraceMode::Middle => tracing::trace!(
                clock = %self.inner.name,
                cycles = self.cycles(),
                "cycle tick"
            ),
            ClockTraceMode::Last => tracing::trace!(
                clock = %self.inner.name,
                k_overruns = self.kernel_overruns(),
                u_overruns = self.user_overruns(),
                "cycle end"
            ),
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(handle) = self.timer_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn spawn_timer_thread(inner: Arc<Inner>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while inner.running.load(Ordering::Acquire) {
            msleep_impl(inner.interval.as_millis() as u64);
            if !inner.running.load(Ordering::Acquire) {
                break;
            }
            let mut state = inner.suspend_state.lock().unwrap();
            if state.waiting {
                state.waiting = false;
                inner.suspend.notify_one();
            } else {
                state.pending_expirations += 1;
            }
        }
    })
}

#[cfg(unix)]
fn msleep_impl(ms: u64) {
    let mut ts = libc::timespec {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_nsec: ((ms % 1000) * 1_000_000) as libc::c_long,
    };
    loop {
        let mut remaining = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::nanosleep(&ts, &mut remaining) };
        if ret == 0 {
            return;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return;
        }
        ts = remaining;
    }
}

#[cfg(windows)]
fn msleep_impl(ms: u64) {
    use windows_sys::Win32::System::Threading::Sleep;
    unsafe { Sleep(ms as u32) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_returns_zero_under_normal_cadence() {
        let clock = Clock::create("c1", 10);
        clock.start();
        let ret = clock.barrier();
        assert_eq!(ret, 0);
        clock.delete();
    }

    #[test]
    fn barrier_reports_overrun_then_resumes() {
        let clock = Clock::create("c2", 10);
        clock.start();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.barrier(), -1);
        assert!(clock.user_overruns() >= 1);

        std::thread::sleep(Duration::from_millis(3));
        let ret = clock.barrier();
        assert_eq!(ret, 0);
        clock.delete();
    }

    #[test]
    #[should_panic(expected = "clock table exhausted")]
    fn exceeding_clock_limit_traps() {
        let mut clocks = Vec::new();
        for i in 0..(CLOCK_LIMIT + 1) {
            clocks.push(Clock::create(&format!("c_{i}"), 1000));
        }
    }
}
