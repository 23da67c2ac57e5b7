// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named, priority-scheduled worker thread with a bounded FIFO message queue.
// Port of the dispatch loop described by `os_pthread.c`. A "message" in the
// source is a `{callback, param}` pair copied by value into the queue; the
// natural Rust realization of that pair is an owned `FnOnce` closure, which
// already captures its parameter and needs no separate size argument.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::thread_priority::{self, ThreadPriority};
use crate::trap_if;

/// Process-wide worker thread table bound, matching `OS_THREAD_LIMIT`.
pub const THREAD_LIMIT: usize = 16;
/// Maximum worker thread name length, matching `OS_MAX_NAME_LEN`.
pub const MAX_NAME_LEN: usize = 16;
/// Maximum bounded queue capacity, matching `OS_QUEUE_LIMIT`.
pub const QUEUE_LIMIT: usize = 1024;

static THREAD_COUNT: AtomicUsize = AtomicUsize::new(0);

/// A message queued for dispatch: an owned, type-erased unit of work.
type Task = Box<dyn FnOnce() + Send>;

/// Lifecycle state of a worker thread, mirrored by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Suspended,
    Running,
    Terminated,
    Finished,
    Deleted,
}

struct Shared {
    name: String,
    queue: Mutex<VecDeque<Task>>,
    not_empty: Condvar,
    capacity: usize,
    shutdown: Mutex<bool>,
    state: Mutex<ThreadState>,
}

/// An owning handle to a running worker thread.
///
/// Dropping the handle without calling [`destroy`](Self::destroy) is a
/// programmer error in the source's model (callers must stop sending before
/// tearing down); this type's `Drop` performs the same shutdown sequence for
/// safety, matching the teacher's RAII-on-drop convention elsewhere.
pub struct WorkerHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.shared.name)
            .field("state", &*self.shared.state.lock().unwrap())
            .finish()
    }
}

impl WorkerHandle {
    /// Allocate a slot from the process-wide table and spawn the thread.
    pub fn create(name: &str, priority: ThreadPriority, queue_capacity: usize) -> Self {
        trap_if!(
            name.len() > MAX_NAME_LEN,
            "worker thread name exceeds OS_MAX_NAME_LEN"
        );
        trap_if!(
            queue_capacity == 0 || queue_capacity > QUEUE_LIMIT,
            "worker thread queue capacity out of range"
        );

        let prev = THREAD_COUNT.fetch_add(1, Ordering::AcqRel);
        if prev + 1 > THREAD_LIMIT {
            // Give back the slot before trapping: a caller that catches this
            // panic and retries must not find the table permanently short
            // one slot for a `create` that never actually produced a thread.
            THREAD_COUNT.fetch_sub(1, Ordering::AcqRel);
            crate::trap!("worker thread table exhausted");
        }

        let shared = Arc::new(Shared {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::with_capacity(queue_capacity)),
            not_empty: Condvar::new(),
            capacity: queue_capacity,
            shutdown: Mutex::new(false),
            state: Mutex::new(ThreadState::Suspended),
        });

        let dispatch_shared = Arc::clone(&shared);
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                thread_priority::apply(priority);
                dispatch_loop(dispatch_shared);
            })
            .expect("spawning a worker thread must succeed");

        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// The name this thread was created with.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ThreadState {
        *self.shared.state.lock().unwrap()
    }

    /// Push `task` onto the queue; wake the thread if it was parked.
    /// Queue overflow is a contract violation, not a recoverable error.
    pub fn send(&self, task: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock().unwrap();
        trap_if!(
            queue.len() >= self.shared.capacity,
            "worker thread queue overflow"
        );
        queue.push_back(Box::new(task) as Task);
        self.shared.not_empty.notify_one();
    }

    /// Signal shutdown, wake the thread, join it, and drain any remaining
    /// queued tasks without running them.
    pub fn destroy(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.not_empty.notify_one();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.shared.queue.lock().unwrap().clear();
        *self.shared.state.lock().unwrap() = ThreadState::Deleted;
        THREAD_COUNT.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown_and_join();
        }
    }
}

fn dispatch_loop(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        *shared.state.lock().unwrap() = ThreadState::Suspended;
        while queue.is_empty() && !*shared.shutdown.lock().unwrap() {
            queue = shared.not_empty.wait(queue).unwrap();
        }
        if *shared.shutdown.lock().unwrap() && queue.is_empty() {
            drop(queue);
            *shared.state.lock().unwrap() = ThreadState::Terminated;
            return;
        }
        *shared.state.lock().unwrap() = ThreadState::Running;
        drop(queue);

        loop {
            let task = {
                let mut queue = shared.queue.lock().unwrap();
                match queue.pop_front() {
                    Some(task) => task,
                    None => break,
                }
            };
            task();
        }

        if *shared.shutdown.lock().unwrap() {
            *shared.state.lock().unwrap() = ThreadState::Finished;
            return;
        }
    }
}
