// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Process subsystem configuration.

use crate::Pid;

/// Size of the pid space. Valid pids are `0..PID_MAX`.
pub const PID_MAX: usize = 32767;

/// Pid of the kernel process, the first pid handed out at bootstrap.
pub const KERNEL_PID: Pid = 0;

/// Pid of the first user process.
pub const INIT_PID: Pid = 1;

/// Maximum number of arguments accepted by `execv`.
pub const MAX_EXEC_ARGS: usize = 64;

/// Name of the kernel process.
pub const KERNEL_PROC_NAME: &str = "[kernel]";

/// Tunables passed to [`ProcessTable::bootstrap`](crate::ProcessTable::bootstrap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Number of pids the allocator manages.
    pub pid_max: usize,
    /// Upper bound on `argv` length for `execv`.
    pub max_exec_args: usize,
}

impl ProcessConfig {
    /// Default configuration, usable in `const` context.
    pub const fn new() -> Self {
        Self {
            pid_max: PID_MAX,
            max_exec_args: MAX_EXEC_ARGS,
        }
    }

    /// Overrides the size of the pid space.
    pub const fn with_pid_max(mut self, pid_max: usize) -> Self {
        self.pid_max = pid_max;
        self
    }

    /// Overrides the `execv` argument limit.
    pub const fn with_max_exec_args(mut self, max_exec_args: usize) -> Self {
        self.max_exec_args = max_exec_args;
        self
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new()
    }
}
