// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Binding threads to processes.

use alloc::sync::Arc;

use kerrno::{KError, KResult};
use spin::Mutex;

use crate::{Process, Tid, process::Lifecycle};

/// The back-reference a thread keeps to its process.
///
/// Schedulers embed one in their thread control block.
#[derive(Default)]
pub struct ThreadBinding {
    proc: Mutex<Option<Arc<Process>>>,
}

impl ThreadBinding {
    /// An unbound slot.
    pub const fn new() -> Self {
        Self {
            proc: Mutex::new(None),
        }
    }

    /// The process the thread belongs to.
    pub fn process(&self) -> Option<Arc<Process>> {
        self.proc.lock().clone()
    }

    /// Whether the thread belongs to some process.
    pub fn is_bound(&self) -> bool {
        self.proc.lock().is_some()
    }
}

/// An execution context as seen by the process subsystem.
pub trait ProcessThread: Send + Sync {
    /// The thread ID.
    fn tid(&self) -> Tid;

    /// The thread's process slot.
    fn binding(&self) -> &ThreadBinding;

    /// The process the thread belongs to.
    fn process(&self) -> Option<Arc<Process>> {
        self.binding().process()
    }
}

/// Adds `thread` to `proc`.
///
/// # Panics
///
/// Panics if `thread` already belongs to a process, or if `proc` has exited.
pub fn attach(proc: &Arc<Process>, thread: &dyn ProcessThread) -> KResult {
    let tid = thread.tid();
    assert!(
        !thread.binding().is_bound(),
        "thread {tid} is already bound to a process"
    );

    match &mut *proc.lifecycle() {
        Lifecycle::Active(res) => {
            res.threads.try_reserve(1).map_err(|_| KError::NoMemory)?;
            res.threads.push(tid);
        }
        _ => panic!(
            "thread {tid} attached to exited process {}",
            proc.pid()
        ),
    }

    *thread.binding().proc.lock() = Some(proc.clone());
    trace!("thread {tid} attached to process {}", proc.pid());
    Ok(())
}

/// Removes `thread` from its process and returns that process.
///
/// # Panics
///
/// Panics if `thread` is not bound, or if its process does not list it:
/// either way the bookkeeping is corrupt.
pub fn detach(thread: &dyn ProcessThread) -> Arc<Process> {
    let tid = thread.tid();
    let Some(proc) = thread.binding().proc.lock().take() else {
        panic!("thread {tid} is not bound to any process");
    };

    let found = match &mut *proc.lifecycle() {
        Lifecycle::Active(res) => match res.threads.iter().position(|&t| t == tid) {
            Some(idx) => {
                res.threads.swap_remove(idx);
                true
            }
            None => false,
        },
        _ => false,
    };
    if !found {
        panic!("thread {tid} has escaped from its process {}", proc.pid());
    }

    trace!("thread {tid} detached from process {}", proc.pid());
    proc
}
