// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// One side of a cable: the endpoint state, its control-ring protocol, and
// its interrupt-thread loop. Port of `cab_dev_t` and `cab_int_exec` /
// `cab_int_read` / `cab_int_write` / `cab_aio_q_add` from `os_cable.c`.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::cable::layout::{self, RingHeader, RingSlot, RING_CAPACITY};
use crate::cable::runtime::EndpointTable;
use crate::cable::sync::InprocSemaphore;
use crate::cable::wait::WaitTable;
use crate::semaphore::NamedSemaphore;
use crate::thread_priority::ThreadPriority;
use crate::trap_if;
use crate::worker::WorkerHandle;

/// Blocking discipline an endpoint was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Blocking,
    NonBlocking,
}

pub use crate::cable::layout::Role;

/// The static name table from which `open` resolves an endpoint.
pub struct EndpointConfig {
    pub id: u8,
    pub name: &'static str,
    pub role: Role,
    pub my_int_name: &'static str,
    pub other_int_name: &'static str,
    pub start_offset: usize,
}

pub static ENDPOINT_TABLE: [EndpointConfig; 4] = [
    EndpointConfig {
        id: 0,
        name: "/ctrl_batt",
        role: Role::Controller,
        my_int_name: "van_c_ba_int",
        other_int_name: "van_batt_int",
        start_offset: 0,
    },
    EndpointConfig {
        id: 1,
        name: "/ctrl_disp",
        role: Role::Controller,
        my_int_name: "van_c_di_int",
        other_int_name: "van_disp_int",
        start_offset: layout::second_pair_offset(),
    },
    EndpointConfig {
        id: 2,
        name: "/battery",
        role: Role::Follower,
        my_int_name: "van_batt_int",
        other_int_name: "van_c_ba_int",
        start_offset: 0,
    },
    EndpointConfig {
        id: 3,
        name: "/display",
        role: Role::Follower,
        my_int_name: "van_disp_int",
        other_int_name: "van_c_di_int",
        start_offset: layout::second_pair_offset(),
    },
];

pub fn lookup(name: &str) -> Option<&'static EndpointConfig> {
    ENDPOINT_TABLE.iter().find(|c| c.name == name)
}

/// One direction's ring + payload buffer, mapped into shared memory.
struct IoChannel {
    ring: *mut RingHeader,
    payload: *mut u8,
    payload_size: usize,
    pending_count: AtomicI32,
}

/// User-installed async callbacks, executed on the endpoint's interrupt
/// thread. `on_readable` returns how many of the delivered bytes it
/// consumed (0 ≤ consumed ≤ count); `on_writable` returns how many bytes it
/// produced into the buffer it was handed.
pub struct AsyncCallbacks {
    pub on_readable: Box<dyn Fn(u8, &[u8]) -> usize + Send + Sync>,
    pub on_writable: Box<dyn Fn(u8, &mut [u8]) -> usize + Send + Sync>,
}

struct WaitSlotRef {
    table: Arc<WaitTable>,
    index: usize,
}

/// One side of a cable. Heap-allocated per process, never placed in the
/// shared region itself — only `in_chan`/`out_chan` point into shared
/// memory.
pub struct Endpoint {
    id: u8,
    name: String,
    mode: OpenMode,
    my_int: NamedSemaphore,
    other_int: NamedSemaphore,
    in_chan: IoChannel,
    out_chan: IoChannel,
    pending_out: AtomicBool,
    pending_in: AtomicBool,
    down: AtomicBool,
    msg_id: AtomicU8,
    async_callbacks: Mutex<Option<AsyncCallbacks>>,
    async_use: AtomicBool,
    async_wr_trigger: AtomicBool,
    async_rd_trigger: AtomicBool,
    async_mutex: Mutex<()>,
    suspend_writer: InprocSemaphore,
    suspend_reader: InprocSemaphore,
    sync_read: AtomicBool,
    sync_write: AtomicBool,
    sync_wait: AtomicBool,
    wait_slot: Mutex<Option<WaitSlotRef>>,
    write_mutex: Mutex<()>,
    read_mutex: Mutex<()>,
    ring_mutex: Mutex<()>,
    worker: Mutex<Option<WorkerHandle>>,
}

// Safety: `in_chan`/`out_chan` raw pointers address a shared-memory region
// that outlives the endpoint (owned by the runtime's `ShmHandle`), and every
// access to the bytes they name is mediated by the atomics and mutexes
// above.
unsafe impl Send for Endpoint {}
unsafe impl Sync for Endpoint {}

/// A borrowed view of payload bytes lent by [`Endpoint::zread`]. Dropping it
/// sends the ring ack that releases the buffer back to the sender — the
/// idiomatic realization of the source's `zread(id, NULL, 0)` release call.
pub struct ZreadLease {
    endpoint: Arc<Endpoint>,
    ptr: *const u8,
    len: usize,
}

impl ZreadLease {
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ZreadLease {
    fn drop(&mut self) {
        self.endpoint.release_zread();
    }
}

impl Endpoint {
    /// Construct an endpoint over an already-mapped pair of channels and
    /// already-opened interrupt semaphores. Does not start the worker
    /// thread; call [`Endpoint::spawn_worker`] once the value is behind an
    /// `Arc`.
    pub(crate) fn new(
        id: u8,
        name: String,
        mode: OpenMode,
        my_int: NamedSemaphore,
        other_int: NamedSemaphore,
        in_ring: *mut RingHeader,
        in_payload: *mut u8,
        out_ring: *mut RingHeader,
        out_payload: *mut u8,
    ) -> Self {
        Self {
            id,
            name,
            mode,
            my_int,
            other_int,
            in_chan: IoChannel {
                ring: in_ring,
                payload: in_payload,
                payload_size: layout::BUF_SIZE,
                pending_count: AtomicI32::new(0),
            },
            out_chan: IoChannel {
                ring: out_ring,
                payload: out_payload,
                payload_size: layout::BUF_SIZE,
                pending_count: AtomicI32::new(0),
            },
            pending_out: AtomicBool::new(false),
            pending_in: AtomicBool::new(false),
            down: AtomicBool::new(false),
            msg_id: AtomicU8::new(0),
            async_callbacks: Mutex::new(None),
            async_use: AtomicBool::new(false),
            async_wr_trigger: AtomicBool::new(false),
            async_rd_trigger: AtomicBool::new(false),
            async_mutex: Mutex::new(()),
            suspend_writer: InprocSemaphore::new(),
            suspend_reader: InprocSemaphore::new(),
            sync_read: AtomicBool::new(false),
            sync_write: AtomicBool::new(false),
            sync_wait: AtomicBool::new(false),
            wait_slot: Mutex::new(None),
            write_mutex: Mutex::new(()),
            read_mutex: Mutex::new(()),
            ring_mutex: Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Spawn the dedicated worker thread and post the interrupt-loop task.
    /// `table` is a weak reference used by the loop to re-resolve this
    /// endpoint on every wake, per the "weak index, not raw pointer" design
    /// used throughout the process-wide tables.
    pub(crate) fn spawn_worker(self: &Arc<Self>, table: Weak<EndpointTable>) {
        let worker = WorkerHandle::create(&format!("van-int-{}", self.id), ThreadPriority::SoftRt, 8);
        let id = self.id;
        worker.send(move || super::endpoint::interrupt_loop(id, table));
        *self.worker.lock().unwrap() = Some(worker);
    }

    pub(crate) fn attach_wait_slot(&self, table: Arc<WaitTable>, index: usize) {
        *self.wait_slot.lock().unwrap() = Some(WaitSlotRef { table, index });
        self.sync_wait.store(true, Ordering::Release);
    }

    /// Detach this endpoint from whatever wait slot it was attached to by
    /// `wait_init`. Called by `wait_release`.
    pub(crate) fn detach_wait_slot(&self) {
        self.sync_wait.store(false, Ordering::Release);
        *self.wait_slot.lock().unwrap() = None;
    }

    fn next_msg_id(&self) -> u8 {
        self.msg_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Write `msg` to this endpoint's out ring and kick the peer. Serialised
    /// by `ring_mutex` since sync `write` (under `write_mutex`) and sync
    /// `read`/`release_zread` (under `read_mutex`) can both reach this on a
    /// full-duplex endpoint from two different user threads; the source
    /// takes the same lock around the whole of `cab_q_add`.
    fn ring_send(&self, msg: RingSlot) {
        let _guard = self.ring_mutex.lock().unwrap();
        unsafe {
            let ring = self.out_chan.ring;
            let head = (*ring).head.load(Ordering::Relaxed);
            let tail = (*ring).tail.load(Ordering::Acquire);
            let next = (head + 1) % RING_CAPACITY as i32;
            trap_if!(next == tail, "control ring overflow on endpoint {}", self.name);
            (*ring).slots[head as usize] = msg;
            (*ring).head.store(next, Ordering::Release);
        }
        tracing::trace!(
            endpoint = self.name,
            id = msg.id,
            size = msg.size,
            consumed = msg.consumed,
            "ring msg-snd"
        );
        let _ = self.other_int.post();
    }

    fn trigger_wait_slot(&self) {
        if let Some(slot) = self.wait_slot.lock().unwrap().as_ref() {
            slot.table.trigger(slot.index);
        }
    }

    /// `write(id, buf, count) -> n`. See 4.D.4.
    pub fn write(&self, buf: &[u8]) -> usize {
        let _guard = self.write_mutex.lock().unwrap();
        if self.mode == OpenMode::NonBlocking && self.pending_out.load(Ordering::Acquire) {
            return 0;
        }
        trap_if!(
            buf.len() > self.out_chan.payload_size,
            "write exceeds payload capacity on endpoint {}",
            self.name
        );
        trap_if!(
            self.pending_out.load(Ordering::Acquire),
            "write called while a payload is already in flight on endpoint {}",
            self.name
        );

        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), self.out_chan.payload, buf.len());
        }
        self.out_chan
            .pending_count
            .store(buf.len() as i32, Ordering::Release);
        self.pending_out.store(true, Ordering::Release);

        // Arm `sync_write` before `ring_send`, not after: the peer can
        // round-trip and this endpoint's interrupt thread can observe the
        // `consumed` ack before `ring_send` even returns, and that ack only
        // posts `suspend_writer` when it finds `sync_write` already set.
        // Setting it afterwards leaves a lost-wakeup window where the ack
        // is processed first and `suspend_writer.wait()` below blocks
        // forever.
        if self.mode == OpenMode::Blocking {
            self.sync_write.store(true, Ordering::Release);
        }
        self.ring_send(RingSlot {
            id: self.next_msg_id(),
            size: buf.len() as i32,
            consumed: 0,
        });

        if self.mode == OpenMode::Blocking {
            self.suspend_writer.wait();
        }
        buf.len()
    }

    /// `read(id, buf, count) -> n`. See 4.D.5.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let _guard = self.read_mutex.lock().unwrap();
        if self.mode == OpenMode::NonBlocking {
            if self.in_chan.pending_count.load(Ordering::Acquire) == 0 {
                return 0;
            }
        } else {
            self.sync_read.store(true, Ordering::Release);
            while self.in_chan.pending_count.load(Ordering::Acquire) == 0 {
                self.suspend_reader.wait();
            }
            self.sync_read.store(false, Ordering::Release);
        }

        let n = self.in_chan.pending_count.load(Ordering::Acquire) as usize;
        trap_if!(
            dst.len() < n,
            "read destination buffer too small on endpoint {}",
            self.name
        );
        unsafe { std::ptr::copy_nonoverlapping(self.in_chan.payload, dst.as_mut_ptr(), n) };
        self.in_chan.pending_count.store(0, Ordering::Release);
        self.ring_send(RingSlot {
            id: self.next_msg_id(),
            size: 0,
            consumed: 1,
        });
        n
    }

    /// `zread(id, &buf, count) -> n`, realized as a borrowed lease whose
    /// `Drop` sends the release ack. Calling this again before the previous
    /// lease drops is a contract violation ("stacked zread without
    /// release").
    pub fn zread(self: &Arc<Self>, count: usize) -> Option<ZreadLease> {
        let _guard = self.read_mutex.lock().unwrap();
        trap_if!(count == 0, "zread requires a positive byte count");
        trap_if!(
            self.pending_in.load(Ordering::Acquire),
            "zread called on endpoint {} while a previous lease is still outstanding",
            self.name
        );

        if self.mode == OpenMode::NonBlocking {
            if self.in_chan.pending_count.load(Ordering::Acquire) == 0 {
                return None;
            }
        } else {
            self.sync_read.store(true, Ordering::Release);
            while self.in_chan.pending_count.load(Ordering::Acquire) == 0 {
                self.suspend_reader.wait();
            }
            self.sync_read.store(false, Ordering::Release);
        }

        let n = self.in_chan.pending_count.load(Ordering::Acquire) as usize;
        trap_if!(
            count < n,
            "zread request smaller than the pending payload on endpoint {}",
            self.name
        );
        self.pending_in.store(true, Ordering::Release);
        Some(ZreadLease {
            endpoint: Arc::clone(self),
            ptr: self.in_chan.payload,
            len: n,
        })
    }

    fn release_zread(&self) {
        let _guard = self.read_mutex.lock().unwrap();
        trap_if!(
            !self.pending_in.swap(false, Ordering::AcqRel),
            "zread release called with no outstanding lease on endpoint {}",
            self.name
        );
        self.in_chan.pending_count.store(0, Ordering::Release);
        self.ring_send(RingSlot {
            id: self.next_msg_id(),
            size: 0,
            consumed: 1,
        });
    }

    /// `action(id, &callbacks)`. See 4.D.7.
    pub fn action(&self, callbacks: AsyncCallbacks) {
        let _guard = self.async_mutex.lock().unwrap();
        trap_if!(
            self.async_use.load(Ordering::Acquire),
            "action installed twice on endpoint {}",
            self.name
        );
        trap_if!(
            self.sync_read.load(Ordering::Acquire) || self.sync_write.load(Ordering::Acquire),
            "action installed on endpoint {} while a sync call is parked",
            self.name
        );
        trap_if!(
            self.pending_out.load(Ordering::Acquire),
            "action installed on endpoint {} while a payload is in flight",
            self.name
        );
        *self.async_callbacks.lock().unwrap() = Some(callbacks);
        self.async_use.store(true, Ordering::Release);
    }

    /// `awrite(id)`. See 4.D.7.
    pub fn awrite(&self) {
        let _guard = self.async_mutex.lock().unwrap();
        trap_if!(
            !self.async_use.load(Ordering::Acquire),
            "awrite called on endpoint {} before action",
            self.name
        );
        self.async_wr_trigger.store(true, Ordering::Release);
        let _ = self.my_int.post();
    }

    /// `aread(id)`. See 4.D.7.
    pub fn aread(&self) {
        let _guard = self.async_mutex.lock().unwrap();
        trap_if!(
            !self.async_use.load(Ordering::Acquire),
            "aread called on endpoint {} before action",
            self.name
        );
        self.async_rd_trigger.store(true, Ordering::Release);
        let _ = self.my_int.post();
    }

    /// `close(id)`. See 4.D.2 / 4.D.9. The worker thread and semaphores are
    /// released by ordinary `Drop` once the owning `Arc` is dropped by the
    /// runtime's endpoint table.
    pub fn close(&self) {
        self.down.store(true, Ordering::Release);
        let _ = self.my_int.post();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.destroy();
        }
        unsafe {
            let head = (*self.in_chan.ring).head.load(Ordering::Acquire);
            (*self.in_chan.ring).tail.store(head, Ordering::Release);
        }
    }

    fn deliver_input(&self, n: usize) {
        if self.async_use.load(Ordering::Acquire) {
            let consumed = {
                let slice = unsafe { std::slice::from_raw_parts(self.in_chan.payload, n) };
                let guard = self.async_callbacks.lock().unwrap();
                let cbs = guard.as_ref().expect("async callbacks installed");
                (cbs.on_readable)(self.id, slice)
            };
            trap_if!(
                consumed > n,
                "on_readable consumed more than delivered on endpoint {}",
                self.name
            );
            if consumed < n {
                let remaining = n - consumed;
                unsafe {
                    std::ptr::copy(
                        self.in_chan.payload.add(consumed),
                        self.in_chan.payload,
                        remaining,
                    );
                }
                self.in_chan
                    .pending_count
                    .store(remaining as i32, Ordering::Release);
            } else {
                self.in_chan.pending_count.store(0, Ordering::Release);
                self.ring_send(RingSlot {
                    id: self.next_msg_id(),
                    size: 0,
                    consumed: 1,
                });
            }
        } else {
            self.in_chan
                .pending_count
                .store(n as i32, Ordering::Release);
            if self.sync_read.load(Ordering::Acquire) {
                self.suspend_reader.post();
            } else if self.sync_wait.load(Ordering::Acquire) {
                self.trigger_wait_slot();
            }
        }
    }

    fn ask_for_output(&self) {
        if self.pending_out.load(Ordering::Acquire) {
            return;
        }
        let produced = {
            let slice = unsafe {
                std::slice::from_raw_parts_mut(self.out_chan.payload, self.out_chan.payload_size)
            };
            let guard = self.async_callbacks.lock().unwrap();
            let cbs = guard.as_ref().expect("async callbacks installed");
            (cbs.on_writable)(self.id, slice)
        };
        if produced > 0 {
            self.out_chan
                .pending_count
                .store(produced as i32, Ordering::Release);
            self.pending_out.store(true, Ordering::Release);
            self.ring_send(RingSlot {
                id: self.next_msg_id(),
                size: produced as i32,
                consumed: 0,
            });
        }
    }
}

/// The dedicated worker thread's entire body. Runs until `down` is set.
/// Re-resolves the endpoint through `table` on every wake rather than
/// holding a strong reference, so the endpoint's own lifetime is never
/// extended by its own interrupt thread.
fn interrupt_loop(id: u8, table: Weak<EndpointTable>) {
    loop {
        let Some(table) = table.upgrade() else {
            return;
        };
        let Some(endpoint) = table.get(id) else {
            return;
        };
        drop(table);

        if endpoint.async_use.load(Ordering::Acquire) {
            if endpoint.async_rd_trigger.swap(false, Ordering::AcqRel) {
                let n = endpoint.in_chan.pending_count.load(Ordering::Acquire) as usize;
                if n > 0 {
                    endpoint.deliver_input(n);
                }
            }
            if endpoint.async_wr_trigger.swap(false, Ordering::AcqRel) {
                endpoint.ask_for_output();
            }
        }

        endpoint
            .my_int
            .wait()
            .expect("interrupt semaphore wait must succeed");
        if endpoint.down.load(Ordering::Acquire) {
            return;
        }

        loop {
            let (head, tail) = unsafe {
                (
                    (*endpoint.in_chan.ring).head.load(Ordering::Acquire),
                    (*endpoint.in_chan.ring).tail.load(Ordering::Relaxed),
                )
            };
            if tail == head {
                break;
            }
            let msg = unsafe { (*endpoint.in_chan.ring).slots[tail as usize] };
            tracing::trace!(
                endpoint = endpoint.name,
                id = msg.id,
                size = msg.size,
                consumed = msg.consumed,
                "ring msg-rcv"
            );
            if msg.size > 0 {
                endpoint.deliver_input(msg.size as usize);
            }
            if msg.consumed != 0 {
                trap_if!(
                    !endpoint.pending_out.load(Ordering::Acquire),
                    "consumed ack on endpoint {} with no pending output",
                    endpoint.name
                );
                endpoint.pending_out.store(false, Ordering::Release);
                if endpoint.async_use.load(Ordering::Acquire) {
                    endpoint.ask_for_output();
                } else if endpoint.sync_write.swap(false, Ordering::AcqRel) {
                    endpoint.suspend_writer.post();
                } else if endpoint.sync_wait.load(Ordering::Acquire) {
                    endpoint.trigger_wait_slot();
                }
            }
            let next = (tail + 1) % RING_CAPACITY as i32;
            unsafe { (*endpoint.in_chan.ring).tail.store(next, Ordering::Release) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_table_has_four_entries_with_matching_offsets() {
        assert_eq!(ENDPOINT_TABLE.len(), 4);
        assert_eq!(ENDPOINT_TABLE[0].start_offset, ENDPOINT_TABLE[2].start_offset);
        assert_eq!(ENDPOINT_TABLE[1].start_offset, ENDPOINT_TABLE[3].start_offset);
        assert_ne!(ENDPOINT_TABLE[0].start_offset, ENDPOINT_TABLE[1].start_offset);
    }

    #[test]
    fn lookup_resolves_known_names() {
        assert_eq!(lookup("/display").unwrap().id, 3);
        assert!(lookup("/nonexistent").is_none());
    }
}
