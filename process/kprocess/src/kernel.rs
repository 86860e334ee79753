// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Interfaces to the rest of the kernel.
//!
//! The process subsystem owns none of the scheduler, the page tables, the
//! VFS or the trap frame layout. Those subsystems implement these traits and
//! hand the implementations to [`ProcessTable`](crate::ProcessTable).

use alloc::{boxed::Box, sync::Arc};
use core::{fmt, future::Future, pin::Pin};

use kerrno::KResult;

use crate::{Process, table::ExecImage};

/// Body of a newly forked thread.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// The thread scheduler.
pub trait Scheduler: Send + Sync {
    /// Creates a thread named `name`, binds it to `proc` with
    /// [`attach`](crate::attach) and makes it runnable at `entry`.
    ///
    /// On error no thread has been bound to `proc`.
    fn thread_fork(&self, name: &str, proc: &Arc<Process>, entry: ThreadEntry) -> KResult;

    /// Runs `fut` to completion, suspending the calling thread whenever it
    /// is pending.
    fn block_on(&self, fut: Pin<&mut (dyn Future<Output = ()> + Send + '_)>);

    /// Terminates the calling thread.
    fn thread_exit(&self) -> !;
}

/// A user address space.
///
/// Dropping the box destroys the address space.
pub trait AddrSpace: Send + Sync {
    /// Copies every mapped region into a new address space.
    fn duplicate(&self) -> KResult<Box<dyn AddrSpace>>;

    /// Loads this address space into the MMU of the current CPU.
    fn activate(&self);

    /// Unloads this address space from the MMU of the current CPU.
    fn deactivate(&self);

    /// Whether this address space is the one the current CPU runs on.
    fn is_active(&self) -> bool;
}

/// A reference-counted VFS node.
pub trait Vnode: Send + Sync {
    /// Takes one more reference.
    fn incref(&self);
    /// Drops one reference.
    fn decref(&self);
}

/// Counted handle to a [`Vnode`].
///
/// Cloning takes a reference with [`Vnode::incref`], dropping gives it back
/// with [`Vnode::decref`].
pub struct VnodeRef(Arc<dyn Vnode>);

impl VnodeRef {
    /// Adopts a reference the caller already holds on `node`.
    pub fn adopt(node: Arc<dyn Vnode>) -> Self {
        Self(node)
    }

    /// Whether both handles point at the same node.
    pub fn same_node(&self, other: &VnodeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Clone for VnodeRef {
    fn clone(&self) -> Self {
        self.0.incref();
        Self(self.0.clone())
    }
}

impl Drop for VnodeRef {
    fn drop(&mut self) {
        self.0.decref();
    }
}

impl fmt::Debug for VnodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VnodeRef({:p})", Arc::as_ptr(&self.0))
    }
}

/// Saved user register state of an interrupted thread.
pub trait TrapFrame: Send + 'static {
    /// Copies the frame so it can outlive the trap that produced it.
    fn snapshot(&self) -> Box<dyn TrapFrame>;

    /// Returns to user mode in a forked child, with `fork` returning 0.
    ///
    /// In a running kernel this does not return.
    fn enter_forked(self: Box<Self>);
}

/// Program loader used by `execv`.
pub trait ProgramLoader {
    /// Creates an empty address space for the new image.
    fn create_aspace(&self) -> KResult<Box<dyn AddrSpace>>;

    /// Loads `path` into `aspace`, which is already active, and lays out
    /// `argv` on the user stack.
    fn load(&self, path: &str, argv: &[&str], aspace: &dyn AddrSpace) -> KResult<ExecImage>;
}
