// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

use alloc::{boxed::Box, string::String, sync::Arc, vec::Vec};
use core::fmt;

use spin::{Mutex, MutexGuard};

use crate::{
    Pid, Tid,
    kernel::{AddrSpace, VnodeRef},
    rendezvous::ExitRendezvous,
    status::WaitStatus,
    tree::ChildList,
};

/// Resources held only while a process is running.
pub(crate) struct Resources {
    pub(crate) threads: Vec<Tid>,
    pub(crate) aspace: Option<Box<dyn AddrSpace>>,
    pub(crate) cwd: Option<VnodeRef>,
}

impl Resources {
    pub(crate) const fn new() -> Self {
        Self {
            threads: Vec::new(),
            aspace: None,
            cwd: None,
        }
    }

    /// Tears the resources down in the order the VFS and VM expect: the
    /// working directory first, then the address space, which is switched
    /// off before it is destroyed so nobody reactivates it half-destroyed.
    pub(crate) fn release(self, pid: Pid) {
        let Resources {
            threads,
            aspace,
            cwd,
        } = self;
        assert!(
            threads.is_empty(),
            "process {pid} torn down with threads {threads:?} still attached"
        );
        drop(cwd);
        if let Some(aspace) = aspace {
            destroy_aspace(aspace);
        }
    }
}

/// Destroys an address space, switching it off first if the current CPU
/// runs on it.
pub(crate) fn destroy_aspace(aspace: Box<dyn AddrSpace>) {
    if aspace.is_active() {
        aspace.deactivate();
    }
    drop(aspace);
}

pub(crate) enum Lifecycle {
    Active(Resources),
    Zombie,
    Destroyed,
}

/// Externally visible lifecycle state of a [`Process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Running, owns its threads, address space and working directory.
    Active,
    /// Exited; exit status and pid are kept for the parent.
    Zombie,
    /// Fully torn down; the pid may belong to somebody else now.
    Destroyed,
}

/// A process record.
pub struct Process {
    pid: Pid,
    name: String,
    /// Short lock over the lifecycle state and everything inside it.
    inner: Mutex<Lifecycle>,
    pub(crate) exit: ExitRendezvous,
    pub(crate) children: ChildList,
}

impl Process {
    pub(crate) fn new(pid: Pid, name: String) -> Self {
        Self {
            pid,
            name,
            inner: Mutex::new(Lifecycle::Active(Resources::new())),
            exit: ExitRendezvous::new(),
            children: ChildList::new(),
        }
    }

    /// The [`Process`] ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The name given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ProcessState {
        match *self.inner.lock() {
            Lifecycle::Active(_) => ProcessState::Active,
            Lifecycle::Zombie => ProcessState::Zombie,
            Lifecycle::Destroyed => ProcessState::Destroyed,
        }
    }

    /// Whether the process exited and is waiting to be reaped.
    pub fn is_zombie(&self) -> bool {
        self.state() == ProcessState::Zombie
    }

    /// Whether the process has been fully destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state() == ProcessState::Destroyed
    }

    pub(crate) fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lock()
    }

    /// Runs `f` on the running-process resources.
    ///
    /// # Panics
    ///
    /// Panics if the process has already exited.
    pub(crate) fn with_resources<R>(&self, f: impl FnOnce(&mut Resources) -> R) -> R {
        match &mut *self.inner.lock() {
            Lifecycle::Active(res) => f(res),
            _ => panic!("process {} used after exit", self.pid),
        }
    }

    /// Threads currently bound to this process.
    pub fn threads(&self) -> Vec<Tid> {
        match &*self.inner.lock() {
            Lifecycle::Active(res) => res.threads.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether the process has an address space.
    pub fn has_aspace(&self) -> bool {
        match &*self.inner.lock() {
            Lifecycle::Active(res) => res.aspace.is_some(),
            _ => false,
        }
    }

    /// Runs `f` on the address space, if any.
    pub fn with_aspace<R>(&self, f: impl FnOnce(Option<&dyn AddrSpace>) -> R) -> R {
        match &*self.inner.lock() {
            Lifecycle::Active(res) => f(res.aspace.as_deref()),
            _ => f(None),
        }
    }

    /// Installs `aspace` and returns the previous address space.
    pub fn set_aspace(&self, aspace: Option<Box<dyn AddrSpace>>) -> Option<Box<dyn AddrSpace>> {
        self.with_resources(|res| core::mem::replace(&mut res.aspace, aspace))
    }

    /// Activates the address space on the current CPU, if there is one.
    pub fn activate_aspace(&self) {
        self.with_aspace(|aspace| {
            if let Some(aspace) = aspace {
                aspace.activate();
            }
        })
    }

    /// A new counted reference to the working directory.
    pub fn cwd(&self) -> Option<VnodeRef> {
        match &*self.inner.lock() {
            Lifecycle::Active(res) => res.cwd.clone(),
            _ => None,
        }
    }

    /// Replaces the working directory, returning the old one.
    pub fn set_cwd(&self, cwd: Option<VnodeRef>) -> Option<VnodeRef> {
        self.with_resources(|res| core::mem::replace(&mut res.cwd, cwd))
    }

    /// The exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<WaitStatus> {
        self.exit.status()
    }

    /// Whether the parent exited before this process did.
    pub fn is_parent_exited(&self) -> bool {
        self.exit.lock().parent_exited
    }

    /// Child processes that have not been destroyed.
    pub fn children(&self) -> Vec<Arc<Process>> {
        self.children.snapshot()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
