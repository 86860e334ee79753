// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Process syscalls.
//!
//! This module implements the process lifecycle syscalls including:
//! - Process identity (getpid)
//! - Process creation and execution (fork, execv)
//! - Process termination and reaping (_exit, waitpid)
//!
//! The syscall dispatcher resolves the calling process and thread and
//! copies results to and from user memory.

use alloc::sync::Arc;
use core::pin::pin;

use kerrno::{KError, KResult};

use crate::{
    Pid, Process, ProcessTable,
    kernel::{ProgramLoader, TrapFrame},
    status::{ExitKind, WaitStatus},
    table::ExecImage,
    thread::ProcessThread,
};

/// Get the process ID of the calling process
pub fn sys_getpid(curproc: &Process) -> KResult<isize> {
    Ok(curproc.pid() as _)
}

/// Create a child process that resumes `tf` with a copy of the caller's
/// address space.
///
/// Returns the child's pid to the parent; the child sees 0.
pub fn sys_fork(table: &ProcessTable, curproc: &Arc<Process>, tf: &dyn TrapFrame) -> KResult<isize> {
    let child = table.fork(curproc, tf)?;
    Ok(child.pid() as _)
}

/// Wait for the child `pid` to exit and store its encoded status.
///
/// No options are supported, and `status` must point somewhere.
pub fn sys_waitpid(
    table: &ProcessTable,
    curproc: &Process,
    pid: i32,
    status: Option<&mut i32>,
    options: u32,
) -> KResult<isize> {
    debug!("sys_waitpid <= pid: {pid}, options: {options}");

    if options != 0 {
        return Err(KError::InvalidInput);
    }
    let Some(status) = status else {
        return Err(KError::InvalidInput);
    };
    if pid <= 0 {
        return Err(KError::NoSuchProcess);
    }
    let pid = pid as Pid;

    let mut result = Err(KError::NoChildProcess);
    table.scheduler().block_on(pin!(async {
        result = table.waitpid(curproc, pid).await;
    }));

    *status = result?.as_raw();
    Ok(pid as _)
}

/// Terminate the calling process.
pub fn sys_exit(
    table: &ProcessTable,
    curproc: &Arc<Process>,
    curthread: &dyn ProcessThread,
    exit_code: i32,
    kind: ExitKind,
) -> ! {
    debug!("sys_exit <= pid: {}, code: {exit_code}", curproc.pid());
    table.exit(curproc, curthread, WaitStatus::new(exit_code, kind));
    table.scheduler().thread_exit()
}

/// Replace the program of the calling process.
///
/// On error the caller keeps running its old program.
pub fn sys_execv(
    table: &ProcessTable,
    curproc: &Process,
    path: &str,
    argv: &[&str],
    loader: &dyn ProgramLoader,
) -> KResult<ExecImage> {
    debug!("sys_execv <= path: {path}, argc: {}", argv.len());
    table.exec(curproc, path, argv, loader)
}
