// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Exit/wait rendezvous between an exiting child and its waiting parent.
//!
//! Lock order is `exit_lock(P)` → `children_lock(P)` → `exit_lock(child)`,
//! followed only by leaf locks (the record lock, the pid map). A waiter
//! never holds an exit lock while it is suspended.

use alloc::sync::Arc;

use event_listener::Event;
use kerrno::{KError, KResult};
use spin::{Mutex, MutexGuard};

use crate::{
    Pid, Process, ProcessTable,
    config::INIT_PID,
    process::destroy_aspace,
    status::WaitStatus,
    thread::{self, ProcessThread},
};

pub(crate) struct ExitState {
    pub(crate) exited: bool,
    pub(crate) status: WaitStatus,
    pub(crate) parent_exited: bool,
}

impl ExitState {
    /// Freezes `status`. Must happen before waiters are woken, they
    /// re-check `exited` as soon as they run.
    pub(crate) fn record_exit(&mut self, status: WaitStatus) {
        debug_assert!(!self.exited);
        self.status = status;
        self.exited = true;
    }
}

/// `exit_lock` plus `exit_cv`.
pub(crate) struct ExitRendezvous {
    state: Mutex<ExitState>,
    exited: Event,
}

impl ExitRendezvous {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ExitState {
                exited: false,
                status: WaitStatus::exited(0),
                parent_exited: false,
            }),
            exited: Event::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ExitState> {
        self.state.lock()
    }

    pub(crate) fn status(&self) -> Option<WaitStatus> {
        let state = self.state.lock();
        state.exited.then_some(state.status)
    }

    /// Wakes every waiter. Call with the exit lock held, after
    /// [`ExitState::record_exit`].
    pub(crate) fn broadcast(&self) {
        self.exited.notify(usize::MAX);
    }

    /// Suspends until the process has exited and returns its status.
    pub(crate) async fn wait(&self) -> WaitStatus {
        loop {
            let listener = {
                let state = self.state.lock();
                if state.exited {
                    return state.status;
                }
                // Registered before the lock is dropped, so a broadcast in
                // between is not lost.
                self.exited.listen()
            };
            listener.await;
        }
    }
}

impl ProcessTable {
    /// Runs the exit sequence for `proc` on behalf of its exiting `thread`.
    ///
    /// If a parent may still ask for the status, the process is recorded as
    /// exited, waiters are woken and the record stays behind as a zombie.
    /// Otherwise it is destroyed right away. Pids 0 and 1 never become
    /// zombies, whatever their parent does.
    ///
    /// `thread` is detached from `proc`; the caller terminates it afterwards.
    pub fn exit(&self, proc: &Arc<Process>, thread: &dyn ProcessThread, status: WaitStatus) {
        debug!("process {} ({}) exiting: {status:?}", proc.pid(), proc.name());

        // Address space and cwd teardown may sleep: never under the exit lock.
        if let Some(aspace) = proc.set_aspace(None) {
            destroy_aspace(aspace);
        }
        drop(proc.set_cwd(None));

        let mut exit = proc.exit.lock();
        let keep_zombie = !exit.parent_exited && proc.pid() > INIT_PID;

        // Recorded even when nobody can look the status up by pid any more:
        // a waiter that already found this record must not sleep forever.
        exit.record_exit(status);
        proc.exit.broadcast();
        self.notify_children_of_exit(proc);
        thread::detach(thread);

        // Still under the exit lock, so a parent exiting concurrently sees
        // either a running child or a finished teardown.
        if keep_zombie {
            self.semi_destroy(proc);
        } else {
            self.destroy(proc);
        }
        drop(exit);
    }

    /// Tells every child that `proc` is gone.
    ///
    /// Zombie children have nobody left to reap them and are destroyed now.
    /// Running children are flagged so they destroy themselves on exit.
    pub(crate) fn notify_children_of_exit(&self, proc: &Process) {
        proc.children.retain(|child| {
            let mut exit = child.exit.lock();
            if exit.exited {
                // Pids 0 and 1 tear themselves down on exit.
                if !child.is_destroyed() {
                    self.destroy(child);
                }
                drop(exit);
                false
            } else {
                exit.parent_exited = true;
                trace!("process {} orphaned by {}", child.pid(), proc.pid());
                true
            }
        });
    }

    /// Waits for the child `pid` of `parent` to exit and returns its status.
    ///
    /// The child is not reaped: asking again returns the same status, and
    /// the record lives on until `parent` itself exits.
    pub async fn waitpid(&self, parent: &Process, pid: Pid) -> KResult<WaitStatus> {
        let Some(child) = parent.children.find(pid) else {
            return Err(self.wait_error(pid));
        };
        let status = child.exit.wait().await;
        trace!("process {} collected status {status:?} of {pid}", parent.pid());
        Ok(status)
    }

    /// Classifies a `waitpid` target that is not a child of the caller.
    pub fn wait_error(&self, pid: Pid) -> KError {
        if pid == 0 || !self.pids().is_in_use(pid) {
            KError::NoSuchProcess
        } else {
            KError::NoChildProcess
        }
    }
}
