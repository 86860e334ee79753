// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Process creation and destruction.

use alloc::{
    boxed::Box,
    string::String,
    sync::{Arc, Weak},
};
use core::fmt;

use event_listener::Event;
use kerrno::{KError, KResult};
use spin::Mutex;
use weak_map::WeakMap;

use crate::{
    Pid, PidMap, Process, ProcessConfig,
    config::KERNEL_PROC_NAME,
    kernel::{ProgramLoader, Scheduler, TrapFrame},
    process::{Lifecycle, destroy_aspace},
};

/// Where a freshly `exec`ed program starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecImage {
    /// Program entry point.
    pub entry: usize,
    /// Initial user stack pointer.
    pub stack_ptr: usize,
    /// Number of arguments.
    pub argc: usize,
    /// User address of the `argv` array.
    pub argv_ptr: usize,
}

/// The process registry.
///
/// Built once at boot by [`ProcessTable::bootstrap`] and passed around by
/// handle. Owns the pid space and the kernel process. Records are owned by
/// their parents; the table only indexes them by pid.
pub struct ProcessTable {
    config: ProcessConfig,
    pids: PidMap,
    /// Every record from `create` until `destroy`. Leaf lock.
    procs: Mutex<WeakMap<Pid, Weak<Process>>>,
    kproc: Arc<Process>,
    sched: Arc<dyn Scheduler>,
    /// Processes created and not yet destroyed, the kernel process excluded.
    live: Mutex<usize>,
    idle: Event,
}

impl ProcessTable {
    /// Sets up the pid space and creates the kernel process.
    ///
    /// # Panics
    ///
    /// Panics if the kernel process cannot be created.
    pub fn bootstrap(config: ProcessConfig, sched: Arc<dyn Scheduler>) -> Arc<Self> {
        let pids = PidMap::new(config.pid_max);
        let pid = match pids.assign() {
            Ok(pid) => pid,
            Err(e) => panic!("failed to assign a pid to the kernel process: {e}"),
        };
        let kproc = Arc::new(Process::new(pid, String::from(KERNEL_PROC_NAME)));
        let mut procs: WeakMap<Pid, Weak<Process>> = WeakMap::new();
        procs.insert(pid, &kproc);
        info!(
            "process table ready: {} pids, kernel process is pid {pid}",
            config.pid_max
        );
        Arc::new(Self {
            config,
            pids,
            procs: Mutex::new(procs),
            kproc,
            sched,
            live: Mutex::new(0),
            idle: Event::new(),
        })
    }

    /// The configuration the table was built with.
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// The pid space.
    pub fn pids(&self) -> &PidMap {
        &self.pids
    }

    /// The kernel process, which owns all kernel-only threads.
    pub fn kernel_process(&self) -> &Arc<Process> {
        &self.kproc
    }

    /// The scheduler the table forks threads on.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.sched
    }

    /// Creates a bare process record with a fresh pid.
    ///
    /// The record has no threads, no address space and no working
    /// directory, and is not anybody's child.
    pub fn create(&self, name: &str) -> KResult<Arc<Process>> {
        let mut pname = String::new();
        pname.try_reserve_exact(name.len()).map_err(|_| KError::NoMemory)?;
        pname.push_str(name);

        let pid = self.pids.assign()?;
        let proc = Arc::new(Process::new(pid, pname));
        self.procs.lock().insert(pid, &proc);
        *self.live.lock() += 1;
        debug!("process {pid} ({name}) created");
        Ok(proc)
    }

    /// Creates a process for running a program as a child of `parent`.
    ///
    /// The child shares `parent`'s working directory.
    pub fn create_for_program(&self, parent: &Arc<Process>, name: &str) -> KResult<Arc<Process>> {
        let proc = self.create(name)?;
        proc.set_cwd(parent.cwd());

        if let Err(e) = parent.children.add(proc.clone()) {
            self.destroy(&proc);
            return Err(e);
        }
        Ok(proc)
    }

    /// Forks `parent`.
    ///
    /// The child gets a copy of the address space and a new thread that
    /// resumes `frame` with `fork` returning 0. Returns as soon as that
    /// thread is runnable.
    pub fn fork(&self, parent: &Arc<Process>, frame: &dyn TrapFrame) -> KResult<Arc<Process>> {
        let child = self.create_for_program(parent, parent.name())?;

        let aspace = parent.with_aspace(|aspace| aspace.map(|a| a.duplicate()).transpose());
        let aspace = match aspace {
            Ok(aspace) => aspace,
            Err(e) => {
                warn!(
                    "fork of process {}: address space copy failed: {e}",
                    parent.pid()
                );
                self.unlink_and_destroy(parent, &child);
                return Err(KError::NoMemory);
            }
        };
        child.set_aspace(aspace);

        let frame = frame.snapshot();
        let proc = child.clone();
        let entry = Box::new(move || {
            proc.activate_aspace();
            frame.enter_forked();
        });
        if let Err(e) = self.sched.thread_fork(parent.name(), &child, entry) {
            warn!("fork of process {}: thread_fork failed: {e}", parent.pid());
            self.unlink_and_destroy(parent, &child);
            return Err(e);
        }

        debug!("process {} forked child {}", parent.pid(), child.pid());
        Ok(child)
    }

    fn unlink_and_destroy(&self, parent: &Process, child: &Arc<Process>) {
        parent.children.remove(child.pid());
        self.destroy(child);
    }

    /// Replaces the address space of `proc` with the program at `path`.
    ///
    /// If loading fails, `proc` keeps running on its old address space.
    pub fn exec(
        &self,
        proc: &Process,
        path: &str,
        argv: &[&str],
        loader: &dyn ProgramLoader,
    ) -> KResult<ExecImage> {
        if path.is_empty() {
            return Err(KError::NotFound);
        }
        if argv.len() > self.config.max_exec_args {
            return Err(KError::ArgumentListTooLong);
        }

        let new = loader.create_aspace()?;
        new.activate();
        match loader.load(path, argv, &*new) {
            Ok(image) => {
                if let Some(old) = proc.set_aspace(Some(new)) {
                    destroy_aspace(old);
                }
                debug!("process {} exec {path}", proc.pid());
                Ok(image)
            }
            Err(e) => {
                destroy_aspace(new);
                proc.activate_aspace();
                debug!("process {} exec {path} failed: {e}", proc.pid());
                Err(e)
            }
        }
    }

    /// Tears down `proc` completely and releases its pid.
    ///
    /// The caller must hold the last interest in `proc`: its threads are
    /// gone and no parent will wait for it.
    ///
    /// # Panics
    ///
    /// Panics on the kernel process, on a process with threads still
    /// attached, and on a process destroyed twice.
    pub fn destroy(&self, proc: &Arc<Process>) {
        assert!(
            !Arc::ptr_eq(proc, &self.kproc),
            "the kernel process cannot be destroyed"
        );
        let pid = proc.pid();

        let prev = core::mem::replace(&mut *proc.lifecycle(), Lifecycle::Destroyed);
        match prev {
            Lifecycle::Active(res) => res.release(pid),
            Lifecycle::Zombie => {}
            Lifecycle::Destroyed => panic!("process {pid} destroyed twice"),
        }
        drop(proc.children.drain());
        // Unindexed before the pid can be handed out again.
        self.procs.lock().remove(&pid);
        self.pids.release(pid);
        debug!("process {pid} ({}) destroyed", proc.name());

        let mut live = self.live.lock();
        assert!(*live > 0);
        *live -= 1;
        if *live == 0 {
            self.idle.notify(usize::MAX);
        }
    }

    /// Releases what a finished process no longer needs while keeping the
    /// record itself: pid, exit status and child list stay for the parent.
    ///
    /// # Panics
    ///
    /// Panics on the kernel process and on a process that already exited.
    pub fn semi_destroy(&self, proc: &Process) {
        assert!(
            !core::ptr::eq(proc, Arc::as_ptr(&self.kproc)),
            "the kernel process cannot be destroyed"
        );
        let prev = core::mem::replace(&mut *proc.lifecycle(), Lifecycle::Zombie);
        match prev {
            Lifecycle::Active(res) => res.release(proc.pid()),
            _ => panic!("process {} retired twice", proc.pid()),
        }
        debug!("process {} ({}) is a zombie", proc.pid(), proc.name());
    }

    /// Number of processes not yet destroyed, the kernel process excluded.
    pub fn live_processes(&self) -> usize {
        *self.live.lock()
    }

    /// Waits until every process but the kernel process is destroyed.
    pub async fn wait_idle(&self) {
        loop {
            let listener = {
                let live = self.live.lock();
                if *live == 0 {
                    return;
                }
                self.idle.listen()
            };
            listener.await;
        }
    }

    /// Looks up a process that has not been destroyed yet by pid.
    ///
    /// Zombies and orphans whose parent record is gone are found as well.
    pub fn find(&self, pid: Pid) -> Option<Arc<Process>> {
        self.procs.lock().get(&pid)
    }
}

impl fmt::Debug for ProcessTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTable")
            .field("pids_in_use", &self.pids.in_use())
            .field("live", &self.live_processes())
            .finish()
    }
}
