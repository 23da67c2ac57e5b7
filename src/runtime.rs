// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The process-wide runtime context. Per spec.md §9's design note ("the
// endpoint table, worker-thread table, wait-slot table, and clock table are
// process-wide state... bundle them into a 'runtime' value created at
// startup and threaded through a context handle"), `VanRuntime` is that
// value: it owns the mapped shared-memory region, the endpoint table, and
// the wait-slot table, and exposes the public cable surface (§6) as methods.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use crate::cable::runtime::EndpointTable;
use crate::cable::wait::WaitTable;
use crate::cable::{self, layout, AsyncCallbacks, Endpoint, OpenMode, ZreadLease};
use crate::config::{RuntimeConfig, Statistics, StatisticsSnapshot};
use crate::error::CableError;
use crate::semaphore::NamedSemaphore;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::trap_if;

/// POSIX shm name for the single shared region backing all four endpoints.
/// Historically a well-known path (`/tmp/van.shm`); realized here as a named
/// segment through [`ShmHandle`], whose POSIX backend already resolves a
/// bare name to a shm-safe `/`-prefixed one.
const SHM_NAME: &str = "/van_shm";

/// The runtime context created by `init(creator)` and torn down by `exit()`.
///
/// One `VanRuntime` owns the entire mapped shared region and every endpoint
/// opened from it. Cross-process use means two processes each hold their
/// own `VanRuntime` (one `creator: true`, one `creator: false`) mapping the
/// same named segment; same-process use (most tests) shares a single
/// `VanRuntime` between both sides of a cable.
pub struct VanRuntime {
    creator: bool,
    shm: ShmHandle,
    endpoints: Arc<EndpointTable>,
    wait_table: Arc<WaitTable>,
    wait_members: Mutex<HashMap<usize, Vec<u8>>>,
    config: RuntimeConfig,
    stats: Statistics,
}

impl VanRuntime {
    /// `init(creator)`. Creates (or attaches to) the shared-memory region
    /// sized for both cable pairs, under the well-known name. The creator
    /// unconditionally zeroes the region before any endpoint opens it,
    /// resolving spec.md §9 Open Question (1) in favor of the "clean
    /// reimplementation."
    pub fn init(creator: bool) -> io::Result<Arc<Self>> {
        Self::init_named(creator, SHM_NAME)
    }

    /// As [`init`](Self::init), but against an explicitly named shared
    /// region instead of the well-known one. The public API surface (§6)
    /// only ever needs `init`; this exists so tests can run several
    /// independent cables within one process without colliding on the
    /// single well-known name.
    pub fn init_named(creator: bool, shm_name: &str) -> io::Result<Arc<Self>> {
        let mode = if creator {
            ShmOpenMode::Create
        } else {
            ShmOpenMode::Open
        };
        let shm = ShmHandle::acquire(shm_name, layout::region_size(), mode)?;
        if creator {
            unsafe {
                std::ptr::write_bytes(shm.as_mut_ptr(), 0, layout::region_size());
            }
        }

        let stats = Statistics::new();
        // The wait table's slot-assignment spinlock is the one spinlock this
        // runtime creates up front, at init time rather than per-open.
        stats.record_spin();

        Ok(Arc::new(Self {
            creator,
            shm,
            endpoints: EndpointTable::new(),
            wait_table: Arc::new(WaitTable::new()),
            wait_members: Mutex::new(HashMap::new()),
            config: RuntimeConfig::default(),
            stats,
        }))
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    fn endpoint(&self, id: u8) -> Arc<Endpoint> {
        self.endpoints
            .get(id)
            .unwrap_or_else(|| crate::trap!("unknown or closed endpoint id {id}"))
    }

    /// `open(name, mode) -> id`. See spec.md §4.D.2.
    pub fn open(self: &Arc<Self>, name: &str, mode: OpenMode) -> Result<u8, CableError> {
        let cfg = cable::lookup(name).ok_or_else(|| CableError::UnknownEndpoint(name.to_string()))?;
        trap_if!(
            self.endpoints.get(cfg.id).is_some(),
            "endpoint {} is already open",
            cfg.name
        );

        let pair_base = unsafe { self.shm.as_mut_ptr().add(cfg.start_offset) };
        let addrs = unsafe { layout::map_channels(pair_base, cfg.role) };

        let my_int = NamedSemaphore::open(cfg.my_int_name, 0).map_err(CableError::Io)?;
        let other_int = NamedSemaphore::open(cfg.other_int_name, 0).map_err(CableError::Io)?;
        self.stats.record_semaphore();
        self.stats.record_semaphore();
        // Each endpoint owns a pair of critical sections (`write_mutex`,
        // `read_mutex`) serializing its two call surfaces.
        self.stats.record_mutex();
        self.stats.record_mutex();

        let endpoint = Arc::new(Endpoint::new(
            cfg.id,
            cfg.name.to_string(),
            mode,
            my_int,
            other_int,
            addrs.in_ring,
            addrs.in_payload,
            addrs.out_ring,
            addrs.out_payload,
        ));
        // Install before spawning: the interrupt thread re-resolves `id`
        // through the table on every wake, including its very first pass,
        // and would exit immediately if it woke to an empty slot.
        self.endpoints.insert(cfg.id, Arc::clone(&endpoint));
        endpoint.spawn_worker(Arc::downgrade(&self.endpoints));
        self.stats.record_thread();
        tracing::debug!(endpoint = cfg.name, id = cfg.id, "cable endpoint opened");
        Ok(cfg.id)
    }

    /// `close(id)`. See spec.md §4.D.2 / §4.D.9.
    pub fn close(&self, id: u8) {
        if let Some(endpoint) = self.endpoints.remove(id) {
            tracing::debug!(id, "cable endpoint closing");
            endpoint.close();
        }
    }

    /// `write(id, buf, count) -> n`.
    pub fn write(&self, id: u8, buf: &[u8]) -> usize {
        self.endpoint(id).write(buf)
    }

    /// `read(id, buf, count) -> n`.
    pub fn read(&self, id: u8, dst: &mut [u8]) -> usize {
        self.endpoint(id).read(dst)
    }

    /// `zread(id, &buf, count) -> n`, returning a lease whose drop releases
    /// the payload back to the sender.
    pub fn zread(&self, id: u8, count: usize) -> Option<ZreadLease> {
        self.endpoint(id).zread(count)
    }

    /// `action(id, &callbacks)`.
    pub fn action(&self, id: u8, callbacks: AsyncCallbacks) {
        self.endpoint(id).action(callbacks)
    }

    /// `awrite(id)`.
    pub fn awrite(&self, id: u8) {
        self.endpoint(id).awrite()
    }

    /// `aread(id)`.
    pub fn aread(&self, id: u8) {
        self.endpoint(id).aread()
    }

    /// `wait_init(ids) -> wait_id`. All participating endpoints must already
    /// be in non-blocking mode.
    pub fn wait_init(&self, ids: &[u8]) -> usize {
        let endpoints: Vec<Arc<Endpoint>> = ids.iter().map(|&id| self.endpoint(id)).collect();
        for ep in &endpoints {
            trap_if!(
                ep.mode() != OpenMode::NonBlocking,
                "wait_init requires every endpoint to be non-blocking, endpoint {} is not",
                ep.name()
            );
        }

        let index = self.wait_table.reserve();
        self.wait_members
            .lock()
            .unwrap()
            .insert(index, ids.to_vec());
        for ep in &endpoints {
            ep.attach_wait_slot(Arc::clone(&self.wait_table), index);
        }
        index
    }

    /// `wait(wait_id)`. Blocks until any participating endpoint fires.
    pub fn wait(&self, wait_id: usize) {
        self.wait_table.wait(wait_id);
    }

    /// `wait_release(wait_id)`. Callers are expected to have drained any
    /// remaining events via `read`/`write` first.
    pub fn wait_release(&self, wait_id: usize) {
        self.wait_table.release(wait_id);
        if let Some(ids) = self.wait_members.lock().unwrap().remove(&wait_id) {
            for id in ids {
                if let Some(ep) = self.endpoints.get(id) {
                    ep.detach_wait_slot();
                }
            }
        }
    }

    /// Normal teardown: close every endpoint still open. The creator's
    /// named semaphores and shared-memory segment are unlinked on `Drop`.
    pub fn exit(&self) {
        for id in self.endpoints.open_ids() {
            self.close(id);
        }
    }

    /// Best-effort cleanup on abnormal exit: closes endpoints under
    /// `catch_unwind` so a panic mid-teardown does not prevent the
    /// creator's unlink of the shared file and named semaphores.
    /// `coverage` is accepted for API parity with the source's
    /// `os_cab_ripcord(coverage)` but does not change behaviour — this
    /// reimplementation has no separate coverage-instrumented build mode.
    pub fn ripcord(&self, _coverage: bool) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            for id in self.endpoints.open_ids() {
                self.close(id);
            }
        }));
        if self.creator {
            self.shm.unlink();
            for cfg in cable::ENDPOINT_TABLE.iter() {
                NamedSemaphore::unlink_by_name(cfg.my_int_name);
            }
        }
    }
}

impl Drop for VanRuntime {
    fn drop(&mut self) {
        for id in self.endpoints.open_ids() {
            self.close(id);
        }
        if self.creator {
            for cfg in cable::ENDPOINT_TABLE.iter() {
                NamedSemaphore::unlink_by_name(cfg.my_int_name);
            }
        }
    }
}
