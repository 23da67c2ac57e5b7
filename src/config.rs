// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-wide runtime configuration and statistics. The original C source
// keeps these as file-scope statics (`os_statistics_t`); this crate bundles
// them into values owned by `VanRuntime` instead of module globals.

use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime-wide configuration, created before any component is initialised.
///
/// `trace` defaults to `false`: with no `tracing` subscriber installed by
/// this library, trace-level events are already free no-ops, so a default
/// trace-off config is the natural realization of the source's "install a
/// default trace-off config before any component init" fix.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub trace: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { trace: false }
    }
}

/// Mirrors `os_statistics_t`: counts of primitives created over the life of
/// the runtime. Purely observational; nothing reads these to make decisions.
#[derive(Debug, Default)]
pub struct Statistics {
    cs_count: AtomicU64,
    sem_count: AtomicU64,
    spin_count: AtomicU64,
    thread_count: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_mutex(&self) {
        self.cs_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_semaphore(&self) {
        self.sem_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spin(&self) {
        self.spin_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_thread(&self) {
        self.thread_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            cs_count: self.cs_count.load(Ordering::Relaxed),
            sem_count: self.sem_count.load(Ordering::Relaxed),
            spin_count: self.spin_count.load(Ordering::Relaxed),
            thread_count: self.thread_count.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`Statistics`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub cs_count: u64,
    pub sem_count: u64,
    pub spin_count: u64,
    pub thread_count: u64,
}
