// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Multi-endpoint wait table. Port of `cab_wait_t` / `cab_wait_elem_s` and
// `os_c_wait_init` / `os_c_wait` / `os_c_wait_release` from `os_cable.c`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cable::sync::InprocSemaphore;
use crate::spin_lock::SpinLock;
use crate::trap_if;

/// Wait-slot table bound, matching `CAB_COUNT`: one slot per endpoint.
pub const WAIT_LIMIT: usize = 4;

struct Slot {
    probe: AtomicBool,
    suspend: InprocSemaphore,
}

impl Slot {
    fn new() -> Self {
        Self {
            probe: AtomicBool::new(false),
            suspend: InprocSemaphore::new(),
        }
    }
}

/// The process-wide wait-slot table. `assigned` is guarded by a short-held
/// spinlock since allocation/release are rare and brief; `probe` is a bare
/// atomic so the interrupt thread's hot-path trigger never blocks on it.
pub struct WaitTable {
    assign_lock: SpinLock,
    assigned: UnsafeCell<[bool; WAIT_LIMIT]>,
    slots: [Slot; WAIT_LIMIT],
}

// Safety: `assigned` is only ever touched while `assign_lock` is held.
unsafe impl Sync for WaitTable {}

impl WaitTable {
    pub fn new() -> Self {
        Self {
            assign_lock: SpinLock::new(),
            assigned: UnsafeCell::new([false; WAIT_LIMIT]),
            slots: [Slot::new(), Slot::new(), Slot::new(), Slot::new()],
        }
    }

    /// Reserve a free slot. Callers are expected to have already validated
    /// that every participating endpoint is non-blocking.
    pub fn reserve(&self) -> usize {
        self.assign_lock.lock();
        let assigned = unsafe { &mut *self.assigned.get() };
        let index = assigned
            .iter()
            .position(|taken| !taken)
            .unwrap_or_else(|| crate::trap!("wait-slot table exhausted"));
        assigned[index] = true;
        self.assign_lock.unlock();
        self.slots[index].probe.store(false, Ordering::Release);
        index
    }

    /// `wait(wait_id)`: atomic-exchange `probe` to false; block only if it
    /// was already false (no event latched since the last call).
    pub fn wait(&self, index: usize) {
        let was_set = self.slots[index].probe.swap(false, Ordering::AcqRel);
        if !was_set {
            self.slots[index].suspend.wait();
        }
    }

    /// The interrupt thread's "trigger wait-slot" step: atomic-exchange
    /// `probe` to true; wake the waiter only on the false→true edge so
    /// repeated events while unconsumed collapse into one wake.
    pub fn trigger(&self, index: usize) {
        let was_set = self.slots[index].probe.swap(true, Ordering::AcqRel);
        if !was_set {
            self.slots[index].suspend.post();
        }
    }

    /// `wait_release(wait_id)`: clear `assigned`, making the slot reusable.
    pub fn release(&self, index: usize) {
        self.assign_lock.lock();
        let assigned = unsafe { &mut *self.assigned.get() };
        trap_if!(!assigned[index], "wait_release on an unassigned slot");
        assigned[index] = false;
        self.assign_lock.unlock();
    }
}
