// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Wait status encoding shared with user space.
//!
//! The low two bits hold the [`ExitKind`], the rest hold the exit code or
//! signal number. User programs decode the word with the matching
//! `WIFEXITED`/`WEXITSTATUS` style macros, so the layout is ABI.

use core::fmt;

use strum::{FromRepr, IntoStaticStr};

const KIND_MASK: i32 = 0b11;
const VALUE_SHIFT: u32 = 2;

/// How a process stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum ExitKind {
    /// Called `_exit`; the value is the exit code.
    Exited   = 0,
    /// Killed by a signal; the value is the signal number.
    Signaled = 1,
    /// Killed by a signal and dumped core.
    Cored    = 2,
    /// Stopped by a signal.
    Stopped  = 3,
}

/// An encoded wait status word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct WaitStatus(i32);

impl WaitStatus {
    /// Encodes `value` for the given kind.
    ///
    /// `value` must fit in 30 bits (`-2^29..2^29`) to survive decoding.
    pub const fn new(value: i32, kind: ExitKind) -> Self {
        Self((value << VALUE_SHIFT) | kind as i32)
    }

    /// Normal exit with `code`.
    pub const fn exited(code: i32) -> Self {
        Self::new(code, ExitKind::Exited)
    }

    /// Termination by signal `sig`.
    pub const fn signaled(sig: i32) -> Self {
        Self::new(sig, ExitKind::Signaled)
    }

    /// Termination by signal `sig` with a core dump.
    pub const fn cored(sig: i32) -> Self {
        Self::new(sig, ExitKind::Cored)
    }

    /// Stop by signal `sig`.
    pub const fn stopped(sig: i32) -> Self {
        Self::new(sig, ExitKind::Stopped)
    }

    /// Wraps a raw status word received from user space.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw status word.
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// The encoded kind.
    pub fn kind(self) -> ExitKind {
        // Every two-bit value is a variant.
        ExitKind::from_repr((self.0 & KIND_MASK) as u8).unwrap_or(ExitKind::Exited)
    }

    /// The exit code or signal number.
    pub const fn value(self) -> i32 {
        self.0 >> VALUE_SHIFT
    }

    /// Splits the word back into `(value, kind)`.
    pub fn decode(self) -> (i32, ExitKind) {
        (self.value(), self.kind())
    }

    /// `WIFEXITED`
    pub fn if_exited(self) -> bool {
        self.kind() == ExitKind::Exited
    }

    /// `WIFSIGNALED`; true for core dumps as well.
    pub fn if_signaled(self) -> bool {
        matches!(self.kind(), ExitKind::Signaled | ExitKind::Cored)
    }

    /// `WCOREDUMP`
    pub fn core_dumped(self) -> bool {
        self.kind() == ExitKind::Cored
    }

    /// `WIFSTOPPED`
    pub fn if_stopped(self) -> bool {
        self.kind() == ExitKind::Stopped
    }

    /// `WEXITSTATUS`
    pub fn exit_status(self) -> Option<i32> {
        self.if_exited().then_some(self.value())
    }

    /// `WTERMSIG`
    pub fn term_sig(self) -> Option<i32> {
        self.if_signaled().then_some(self.value())
    }

    /// `WSTOPSIG`
    pub fn stop_sig(self) -> Option<i32> {
        self.if_stopped().then_some(self.value())
    }
}

impl fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind: &'static str = self.kind().into();
        write!(f, "WaitStatus({kind}, {})", self.value())
    }
}

impl From<WaitStatus> for i32 {
    fn from(status: WaitStatus) -> Self {
        status.as_raw()
    }
}
