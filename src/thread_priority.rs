// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Thread priority shim for worker threads.
// Port of cpp-ipc/include/libipc/proto/rt_prio.h, adapted to the discrete
// priority classes a worker thread is created with rather than a raw
// period/computation/constraint triple.

/// Scheduling class requested when a worker thread is created.
///
/// Mirrors `os_thread_prio_t`: a small fixed set of priority classes rather
/// than an arbitrary numeric priority, so every platform backend only has to
/// map five cases instead of an open integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadPriority {
    /// Hard real-time: time-constraint scheduling, no preemption budget.
    HardRt = 99,
    /// Soft real-time: elevated but preemptible.
    SoftRt = 50,
    /// Background work, below normal.
    Background = 40,
    /// Foreground interactive work.
    Foreground = 35,
    /// Ordinary scheduling, no special treatment.
    Default = 5,
}

impl ThreadPriority {
    /// Numeric value matching the original `os_thread_prio_t` enum.
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Apply `prio` to the calling thread. Returns `true` on success.
///
/// `Default` is a no-op success on every platform: the thread already runs
/// at the scheduler's normal class.
pub fn apply(prio: ThreadPriority) -> bool {
    match prio {
        ThreadPriority::Default => true,
        ThreadPriority::HardRt => set_hard_realtime(),
        ThreadPriority::SoftRt => set_elevated(50),
        ThreadPriority::Background => set_elevated(40),
        ThreadPriority::Foreground => set_elevated(35),
    }
}

// ---------------------------------------------------------------------------
// macOS — Mach thread time constraint policy for HardRt, otherwise best-effort
// pthread priority within SCHED_OTHER's range.
// ---------------------------------------------------------------------------

#[cfg(target_os = "macos")]
fn set_hard_realtime() -> bool {
    #[repr(C)]
    struct MachTimebaseInfo {
        numer: u32,
        denom: u32,
    }

    extern "C" {
        fn mach_timebase_info(info: *mut MachTimebaseInfo) -> i32;
        fn pthread_mach_thread_np(thread: libc::pthread_t) -> u32;
        fn thread_policy_set(thread: u32, flavor: u32, policy_info: *const u32, count: u32) -> i32;
    }

    const THREAD_TIME_CONSTRAINT_POLICY: u32 = 2;
    const THREAD_TIME_CONSTRAINT_POLICY_COUNT: u32 = 4;

    #[repr(C)]
    struct ThreadTimeConstraintPolicy {
        period: u32,
        computation: u32,
        constraint: u32,
        preemptible: i32,
    }

    // No fixed callback period is known for a generic worker thread; use a
    // 1ms nominal period with half as computation budget, matching the
    // conservative default used elsewhere for non-audio real-time work.
    let mut tb = MachTimebaseInfo { numer: 0, denom: 0 };
    unsafe {
        mach_timebase_info(&mut tb);
    }
    if tb.numer == 0 || tb.denom == 0 {
        return false;
    }
    let to_abs = |ns: u64| -> u32 { ((ns * tb.denom as u64) / tb.numer as u64) as u32 };

    let period_ns = 1_000_000u64;
    let policy = ThreadTimeConstraintPolicy {
        period: to_abs(period_ns),
        computation: to_abs(period_ns / 2),
        constraint: to_abs(period_ns),
        preemptible: 1,
    };

    let kr = unsafe {
        let thread = libc::pthread_self();
        let mach_thread = pthread_mach_thread_np(thread);
        thread_policy_set(
            mach_thread,
            THREAD_TIME_CONSTRAINT_POLICY,
            &policy as *const _ as *const u32,
            THREAD_TIME_CONSTRAINT_POLICY_COUNT,
        )
    };
    kr == 0
}

#[cfg(target_os = "macos")]
fn set_elevated(_level: i32) -> bool {
    // SCHED_OTHER has no portable priority knob on macOS outside Mach policies;
    // leave the thread at the default class.
    true
}

// ---------------------------------------------------------------------------
// Linux — SCHED_FIFO for HardRt/SoftRt, nice() for Background/Foreground.
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
fn set_hard_realtime() -> bool {
    let param = libc::sched_param { sched_priority: 80 };
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    ret == 0
}

#[cfg(target_os = "linux")]
fn set_elevated(level: i32) -> bool {
    if level >= 50 {
        let param = libc::sched_param { sched_priority: 40 };
        let ret =
            unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
        return ret == 0;
    }
    // Background/Foreground map onto the nice scale: lower nice for
    // foreground, higher (less favorable) for background.
    let nice_value: i32 = if level >= 40 { 5 } else { -5 };
    unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice_value) == 0 }
}

// ---------------------------------------------------------------------------
// Windows — SetThreadPriority classes.
// ---------------------------------------------------------------------------

#[cfg(windows)]
fn set_hard_realtime() -> bool {
    use windows_sys::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL,
    };
    unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) != 0 }
}

#[cfg(windows)]
fn set_elevated(level: i32) -> bool {
    use windows_sys::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL,
        THREAD_PRIORITY_BELOW_NORMAL, THREAD_PRIORITY_HIGHEST,
    };
    let class = if level >= 50 {
        THREAD_PRIORITY_HIGHEST
    } else if level >= 40 {
        THREAD_PRIORITY_BELOW_NORMAL
    } else {
        THREAD_PRIORITY_ABOVE_NORMAL
    };
    unsafe { SetThreadPriority(GetCurrentThread(), class) != 0 }
}

#[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
fn set_hard_realtime() -> bool {
    false
}

#[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
fn set_elevated(_level: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priority_value_matches_original_enum() {
        assert_eq!(ThreadPriority::HardRt.value(), 99);
        assert_eq!(ThreadPriority::SoftRt.value(), 50);
        assert_eq!(ThreadPriority::Background.value(), 40);
        assert_eq!(ThreadPriority::Foreground.value(), 35);
        assert_eq!(ThreadPriority::Default.value(), 5);
    }

    #[test]
    fn applying_default_priority_always_succeeds() {
        assert!(apply(ThreadPriority::Default));
    }
}
