// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-wide endpoint table. One slot per entry in `ENDPOINT_TABLE`
// (spec.md §9, "Global state… bundle them into a 'runtime' value created at
// startup"). The interrupt loop holds a `Weak<EndpointTable>` plus the
// endpoint's bare `id`, re-resolving the live `Arc<Endpoint>` on every wake
// rather than holding a strong reference — the "weak index, not raw
// pointer" realization the design notes call for.

use std::sync::{Arc, Mutex};

use crate::cable::endpoint::Endpoint;

/// Matches `ENDPOINT_TABLE.len()` / `CAB_COUNT`: one slot per configured
/// endpoint name.
pub const ENDPOINT_COUNT: usize = 4;

pub struct EndpointTable {
    slots: Mutex<[Option<Arc<Endpoint>>; ENDPOINT_COUNT]>,
}

impl EndpointTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new([None, None, None, None]),
        })
    }

    /// Re-resolve the live endpoint behind `id`, if it is currently open.
    pub fn get(&self, id: u8) -> Option<Arc<Endpoint>> {
        self.slots.lock().unwrap()[id as usize].clone()
    }

    pub(crate) fn insert(&self, id: u8, endpoint: Arc<Endpoint>) {
        self.slots.lock().unwrap()[id as usize] = Some(endpoint);
    }

    pub(crate) fn remove(&self, id: u8) -> Option<Arc<Endpoint>> {
        self.slots.lock().unwrap()[id as usize].take()
    }

    /// Ids of every endpoint currently open, used by teardown paths that
    /// must close whatever is left without the caller tracking it.
    pub(crate) fn open_ids(&self) -> Vec<u8> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i as u8))
            .collect()
    }
}
