// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Process Management
//!
//! Process records, pid allocation, thread binding and the exit/wait
//! rendezvous behind `fork`, `_exit`, `waitpid` and `getpid`.
//!
//! A process moves through three states:
//!
//! ```text
//! Active ──exit, parent still interested──▶ Zombie ──parent exits──▶ Destroyed
//!    └────exit, nobody interested (orphan or pid <= 1)──────────────▶ Destroyed
//! ```
//!
//! The scheduler, the address-space subsystem, the VFS and the trap frame
//! of the running architecture are reached through the traits in
//! [`kernel`]; this crate never decides when a thread runs.

#![no_std]
#![warn(missing_docs)]
#![allow(rustdoc::broken_intra_doc_links)]

extern crate alloc;
#[macro_use]
extern crate log;

pub mod config;
pub mod kernel;
mod pid;
mod process;
mod rendezvous;
mod status;
pub mod syscall;
mod table;
mod thread;
mod tree;

/// A process ID.
pub type Pid = u32;
/// An execution context (thread) ID, handed out by the scheduler.
pub type Tid = u32;

pub use config::ProcessConfig;
pub use pid::PidMap;
pub use process::{Process, ProcessState};
pub use status::{ExitKind, WaitStatus};
pub use table::{ExecImage, ProcessTable};
pub use thread::{ProcessThread, ThreadBinding, attach, detach};
