// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Parent-owned child lists.

use alloc::{sync::Arc, vec::Vec};

use kerrno::{KError, KResult};
use spin::Mutex;

use crate::{Pid, Process};

/// The children of one process, guarded by `children_lock`.
///
/// A process whose pid was ≤ 1 destroys itself on exit while its parent
/// still lists it, so destroyed entries are skipped on lookup and pruned
/// whenever the list grows.
pub(crate) struct ChildList {
    children: Mutex<Vec<Arc<Process>>>,
}

impl ChildList {
    pub(crate) const fn new() -> Self {
        Self {
            children: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, child: Arc<Process>) -> KResult {
        let mut children = self.children.lock();
        children.retain(|c| !c.is_destroyed());
        children.try_reserve(1).map_err(|_| KError::NoMemory)?;
        children.push(child);
        Ok(())
    }

    pub(crate) fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        let mut children = self.children.lock();
        let idx = children
            .iter()
            .position(|c| c.pid() == pid && !c.is_destroyed())?;
        Some(children.swap_remove(idx))
    }

    pub(crate) fn find(&self, pid: Pid) -> Option<Arc<Process>> {
        self.children
            .lock()
            .iter()
            .find(|c| c.pid() == pid && !c.is_destroyed())
            .cloned()
    }

    /// Keeps the children for which `f` returns true, with the list locked
    /// for the whole scan.
    pub(crate) fn retain(&self, f: impl FnMut(&Arc<Process>) -> bool) {
        self.children.lock().retain(f);
    }

    pub(crate) fn drain(&self) -> Vec<Arc<Process>> {
        core::mem::take(&mut *self.children.lock())
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Process>> {
        self.children
            .lock()
            .iter()
            .filter(|c| !c.is_destroyed())
            .cloned()
            .collect()
    }
}
