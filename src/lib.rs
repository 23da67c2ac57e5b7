// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A shared-memory cable transport and a tiny message-driven runtime: a
// bidirectional, in-order, flow-controlled byte-message channel between two
// cooperating endpoints (same-process or two processes sharing a
// memory-mapped file), plus the worker-thread, clock, and buffered-endpoint
// components built around it.

// `trap!`/`trap_if!` are `#[macro_export]`ed from `error` and so already
// live at the crate root (`crate::trap!`) regardless of this `pub mod`.
pub mod error;

pub mod shm_name;

mod platform;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod semaphore;
pub use semaphore::NamedSemaphore;

pub mod spin_lock;
pub use spin_lock::SpinLock;

pub mod thread_priority;
pub use thread_priority::ThreadPriority;

pub mod config;
pub use config::{RuntimeConfig, Statistics, StatisticsSnapshot};

pub mod record_queue;
pub use record_queue::{RecordQueue, Reservation};

pub mod worker;
pub use worker::{ThreadState, WorkerHandle};

pub mod clock;
pub use clock::{Clock, ClockTraceMode};

pub mod cable;
pub use cable::{AsyncCallbacks, Endpoint, OpenMode, Role, ZreadLease};

mod runtime;
pub use runtime::VanRuntime;

pub mod buffered;
pub use buffered::BufferedEndpoint;

pub use error::CableError;
