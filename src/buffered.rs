// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The buffered endpoint layer (spec.md §4.E): wraps one cable endpoint in
// two record queues and drives the cable's async callbacks for
// back-pressure-driven shuffling. Port of `buf_dev_t` / `buf_read_cb` /
// `buf_write_cb` from `os_van.c`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cable::{AsyncCallbacks, OpenMode};
use crate::error::CableError;
use crate::record_queue::RecordQueue;
use crate::runtime::VanRuntime;
use crate::trap_if;

/// Queue capacity for each direction, matching `BUF_Q_SIZE`.
pub const BUF_Q_SIZE: usize = 2048;

/// The static name table a buffered endpoint resolves against. Preserved
/// literally per spec.md §9's design note ("the buffered endpoint's single
/// configuration entry (`/display`) — preserved literally for
/// compatibility; treat the table as data, not code").
pub static BUFFERED_TABLE: [&str; 1] = ["/display"];

fn lookup(name: &str) -> bool {
    BUFFERED_TABLE.iter().any(|&n| n == name)
}

struct Shared {
    in_queue: RecordQueue,
    out_queue: RecordQueue,
    read_trigger: AtomicBool,
    write_trigger: AtomicBool,
}

/// A cable endpoint fronted by two FIFO record queues. The underlying cable
/// endpoint is always opened non-blocking, since all traffic flows through
/// the async callbacks installed here.
pub struct BufferedEndpoint {
    runtime: Arc<VanRuntime>,
    id: u8,
    shared: Arc<Shared>,
}

impl BufferedEndpoint {
    /// `open(name) -> buf_id`.
    pub fn open(runtime: &Arc<VanRuntime>, name: &str) -> Result<Self, CableError> {
        if !lookup(name) {
            return Err(CableError::UnknownEndpoint(name.to_string()));
        }

        let id = runtime.open(name, OpenMode::NonBlocking)?;
        let shared = Arc::new(Shared {
            in_queue: RecordQueue::new(BUF_Q_SIZE),
            out_queue: RecordQueue::new(BUF_Q_SIZE),
            // Both triggers start armed: the interrupt loop's first pass
            // through `ask_for_output`/`deliver_input` needs a reason to
            // call into the callbacks before any user `read`/`write` has
            // happened yet.
            read_trigger: AtomicBool::new(true),
            write_trigger: AtomicBool::new(true),
        });

        let readable_shared = Arc::clone(&shared);
        let on_readable = move |_id: u8, buf: &[u8]| -> usize {
            if readable_shared.in_queue.write_record(buf) {
                buf.len()
            } else {
                // The in-queue can't host this payload yet; latch the read
                // trigger so the next `read()` call re-asks the cable for
                // it via `aread`, matching spec.md §9 Open Question (2)'s
                // "callback returns bytes the callback produced" contract.
                readable_shared.read_trigger.store(true, Ordering::Release);
                0
            }
        };

        let writable_shared = Arc::clone(&shared);
        let on_writable = move |_id: u8, buf: &mut [u8]| -> usize {
            let n = writable_shared.out_queue.read_record(buf);
            if n < 0 {
                writable_shared
                    .write_trigger
                    .store(true, Ordering::Release);
                0
            } else {
                // `read_record` writes `n` content bytes plus the restored
                // `'\0'` terminator into `buf` (`n + 1` bytes total) but
                // only returns the content length. The terminator must go
                // out on the wire too, or the peer's `on_readable` hands
                // `in_queue.write_record` a buffer with no sacrificial
                // trailing byte and it clobbers real content instead.
                n as usize + 1
            }
        };

        runtime.action(
            id,
            AsyncCallbacks {
                on_readable: Box::new(on_readable),
                on_writable: Box::new(on_writable),
            },
        );

        Ok(Self {
            runtime: Arc::clone(runtime),
            id,
            shared,
        })
    }

    /// `close(buf_id)`.
    pub fn close(self) {
        self.runtime.close(self.id);
    }

    /// `write(buf_id, src, n) -> n|0`. Writes `src` as one terminated
    /// record into the out-queue. On success, if the cable's write trigger
    /// had latched (the interrupt thread previously found the queue empty),
    /// kicks it with `awrite` so it re-asks immediately.
    pub fn write(&self, src: &[u8]) -> usize {
        trap_if!(src.len() > BUF_Q_SIZE, "buffered write exceeds queue capacity");
        if !self.shared.out_queue.write_record(src) {
            return 0;
        }
        if self.shared.write_trigger.swap(false, Ordering::AcqRel) {
            self.runtime.awrite(self.id);
        }
        src.len()
    }

    /// `read(buf_id, dst, n) -> n`. Reads one record from the in-queue, or
    /// `0` if none is available yet.
    pub fn read(&self, dst: &mut [u8]) -> i32 {
        let n = self.shared.in_queue.read_record(dst);
        if n < 0 {
            return 0;
        }
        if self.shared.read_trigger.swap(false, Ordering::AcqRel) {
            self.runtime.aread(self.id);
        }
        n
    }

    /// Free bytes in the out-queue, for external event loops to meter
    /// writability.
    pub fn writable(&self) -> usize {
        self.shared.out_queue.free_bytes()
    }

    /// Used bytes in the in-queue, for external event loops to meter
    /// readability.
    pub fn sync(&self) -> usize {
        self.shared.in_queue.used_bytes()
    }
}
