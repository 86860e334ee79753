// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Pid allocation.

use alloc::{vec, vec::Vec};

use kerrno::{KError, KResult};
use spin::Mutex;

use crate::Pid;

const WORD_BITS: usize = u64::BITS as usize;

struct Bitmap {
    words: Vec<u64>,
    nbits: usize,
    used: usize,
}

impl Bitmap {
    fn new(nbits: usize) -> Self {
        Self {
            words: vec![0; nbits.div_ceil(WORD_BITS)],
            nbits,
            used: 0,
        }
    }

    fn test(&self, bit: usize) -> bool {
        self.words[bit / WORD_BITS] & (1 << (bit % WORD_BITS)) != 0
    }

    /// Marks and returns the lowest clear bit.
    fn alloc(&mut self) -> Option<usize> {
        let (idx, word) = self
            .words
            .iter_mut()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)?;
        let bit = idx * WORD_BITS + word.trailing_ones() as usize;
        if bit >= self.nbits {
            return None;
        }
        *word |= 1 << (bit % WORD_BITS);
        self.used += 1;
        Some(bit)
    }

    fn unmark(&mut self, bit: usize) {
        assert!(self.test(bit), "pid {bit} released but not allocated");
        self.words[bit / WORD_BITS] &= !(1 << (bit % WORD_BITS));
        self.used -= 1;
    }
}

/// Fixed-capacity pid space.
///
/// The bitmap is the single source of truth for which pids are live. Its
/// lock is leaf-level: no other lock is ever taken while it is held.
pub struct PidMap {
    map: Mutex<Bitmap>,
}

impl PidMap {
    /// Creates a pid space holding `capacity` ids, `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= Pid::MAX as usize);
        Self {
            map: Mutex::new(Bitmap::new(capacity)),
        }
    }

    /// Number of ids in the space.
    pub fn capacity(&self) -> usize {
        self.map.lock().nbits
    }

    /// Hands out the lowest free pid.
    pub fn assign(&self) -> KResult<Pid> {
        let bit = self.map.lock().alloc();
        match bit {
            Some(bit) => {
                trace!("pid {bit} assigned");
                Ok(bit as Pid)
            }
            None => {
                warn!("pid space exhausted");
                Err(KError::WouldBlock)
            }
        }
    }

    /// Returns `pid` to the free pool.
    ///
    /// # Panics
    ///
    /// Panics if `pid` is 0, out of range or not currently allocated.
    pub fn release(&self, pid: Pid) {
        let bit = pid as usize;
        let mut map = self.map.lock();
        assert!(
            pid > 0 && bit < map.nbits,
            "releasing invalid pid {pid} (pid space is 0..{})",
            map.nbits
        );
        map.unmark(bit);
        drop(map);
        trace!("pid {pid} released");
    }

    /// Whether `pid` is currently held by some process record.
    pub fn is_in_use(&self, pid: Pid) -> bool {
        let map = self.map.lock();
        (pid as usize) < map.nbits && map.test(pid as usize)
    }

    /// Number of pids currently held.
    pub fn in_use(&self) -> usize {
        self.map.lock().used
    }
}
