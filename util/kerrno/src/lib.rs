// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Kernel error codes.
//!
//! [`KError`] is what kernel subsystems return to the syscall layer. Each
//! variant maps one-to-one onto a Linux errno value so the syscall layer can
//! hand it back to user space unchanged.

#![no_std]

use core::fmt;

use linux_raw_sys::errno;
use strum::IntoStaticStr;

/// Error returned by kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum KError {
    /// Argument list too long (E2BIG).
    ArgumentListTooLong,
    /// Bad address (EFAULT).
    BadAddress,
    /// Invalid argument (EINVAL).
    InvalidInput,
    /// No child processes (ECHILD).
    NoChildProcess,
    /// Out of memory (ENOMEM).
    NoMemory,
    /// No such process (ESRCH).
    NoSuchProcess,
    /// No such file or directory (ENOENT).
    NotFound,
    /// Resource temporarily unavailable (EAGAIN).
    WouldBlock,
}

/// Result type used across the kernel.
pub type KResult<T = ()> = Result<T, KError>;

const ALL: [KError; 8] = [
    KError::ArgumentListTooLong,
    KError::BadAddress,
    KError::InvalidInput,
    KError::NoChildProcess,
    KError::NoMemory,
    KError::NoSuchProcess,
    KError::NotFound,
    KError::WouldBlock,
];

impl KError {
    /// The positive Linux errno value of this error.
    pub const fn code(self) -> i32 {
        let code = match self {
            KError::ArgumentListTooLong => errno::E2BIG,
            KError::BadAddress => errno::EFAULT,
            KError::InvalidInput => errno::EINVAL,
            KError::NoChildProcess => errno::ECHILD,
            KError::NoMemory => errno::ENOMEM,
            KError::NoSuchProcess => errno::ESRCH,
            KError::NotFound => errno::ENOENT,
            KError::WouldBlock => errno::EAGAIN,
        };
        code as i32
    }

    /// Looks up the error for a positive errno value.
    pub fn from_code(code: i32) -> Option<Self> {
        ALL.into_iter().find(|e| e.code() == code)
    }

    /// Human readable description, in the wording of `strerror(3)`.
    pub const fn as_str(self) -> &'static str {
        match self {
            KError::ArgumentListTooLong => "Argument list too long",
            KError::BadAddress => "Bad address",
            KError::InvalidInput => "Invalid argument",
            KError::NoChildProcess => "No child processes",
            KError::NoMemory => "Out of memory",
            KError::NoSuchProcess => "No such process",
            KError::NotFound => "No such file or directory",
            KError::WouldBlock => "Resource temporarily unavailable",
        }
    }

    /// The variant name, e.g. `"NoSuchProcess"`.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for KError {}

impl From<KError> for isize {
    /// Syscall return convention: negated errno.
    fn from(e: KError) -> Self {
        -(e.code() as isize)
    }
}
