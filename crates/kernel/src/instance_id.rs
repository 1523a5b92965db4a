//! Instance identifier allocation.
//!
//! A growable bit table over `[0, len)` tracks which ids are free. Id 0 is
//! never free. The cursor points at the lowest id known to be free at or
//! above the last allocation; `release` may pull it lower so freed ids are
//! reused before the table grows.
//!
//! Ids backing a live instance copy are additionally tracked as claimed, so
//! two copies can never share an id even when one was replayed from storage.
//!
//! The allocator is not synchronized; share it as [`SharedInstanceIds`].

use bit_vec::BitVec;
use parking_lot::Mutex;
use shardmap_common::InstanceId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Allocator shared between the registry and instanced maps.
pub type SharedInstanceIds = Arc<Mutex<InstanceIdAllocator>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceIdError {
    #[error("instance id space exhausted")]
    Exhausted,
    #[error("instance id {0} is outside the allocation table")]
    OutOfRange(InstanceId),
    #[error("instance id 0 is reserved")]
    Sentinel,
    #[error("instance id {0} already backs a live copy")]
    InUse(InstanceId),
}

#[derive(Debug, Clone)]
pub struct InstanceIdAllocator {
    free: BitVec,
    claimed: BTreeSet<u32>,
    next: u32,
    limit: u32,
}

impl Default for InstanceIdAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl InstanceIdAllocator {
    /// Size the table for ids up to `highest_used`, plus one slack slot.
    pub fn new(highest_used: u32) -> Self {
        let mut free = BitVec::from_elem(highest_used as usize + 2, true);
        free.set(0, false);
        Self {
            free,
            claimed: BTreeSet::new(),
            next: 1,
            limit: u32::MAX,
        }
    }

    /// Allocator whose cursor may never reach `limit`.
    #[cfg(test)]
    pub(crate) fn with_limit(highest_used: u32, limit: u32) -> Self {
        Self {
            limit,
            ..Self::new(highest_used)
        }
    }

    pub fn wrap(self) -> SharedInstanceIds {
        Arc::new(Mutex::new(self))
    }

    /// Current allocation cursor.
    pub fn next_candidate(&self) -> InstanceId {
        InstanceId(self.next)
    }

    /// Number of slots in the table.
    pub fn capacity(&self) -> usize {
        self.free.len()
    }

    pub fn is_free(&self, id: InstanceId) -> bool {
        self.free.get(id.0 as usize).unwrap_or(false)
    }

    /// Mark an id replayed from persistence as used.
    ///
    /// The cursor only steps past `id` when it sat exactly on it; a cursor
    /// left on another used slot is corrected by the next `allocate`.
    pub fn reserve(&mut self, id: InstanceId) -> Result<(), InstanceIdError> {
        if id.is_base() {
            return Err(InstanceIdError::Sentinel);
        }
        if id.0 as usize >= self.free.len() {
            return Err(InstanceIdError::OutOfRange(id));
        }
        self.free.set(id.0 as usize, false);
        if self.next == id.0 {
            self.next += 1;
        }
        Ok(())
    }

    /// Mark `id` as backing a live instance copy. The table grows to cover
    /// ids past its end, keeping one slack slot.
    pub fn claim(&mut self, id: InstanceId) -> Result<(), InstanceIdError> {
        if self.claimed.contains(&id.0) {
            return Err(InstanceIdError::InUse(id));
        }
        let needed = id.0 as usize + 2;
        if !id.is_base() && self.free.len() < needed {
            self.free.grow(needed - self.free.len(), true);
        }
        self.reserve(id)?;
        self.claimed.insert(id.0);
        Ok(())
    }

    pub fn is_claimed(&self, id: InstanceId) -> bool {
        self.claimed.contains(&id.0)
    }

    /// Hand out the lowest known free id.
    pub fn allocate(&mut self) -> Result<InstanceId, InstanceIdError> {
        if self.next == self.limit {
            tracing::error!(next = self.next, "instance id overflow, cannot continue");
            return Err(InstanceIdError::Exhausted);
        }
        if !self.is_free(InstanceId(self.next)) {
            // reserve() can leave the cursor on a used slot
            self.next = self.scan_from(self.next as usize);
        }

        let id = self.next;
        self.free.set(id as usize, false);
        self.next = self.scan_from(id as usize + 1);
        Ok(InstanceId(id))
    }

    /// Return an id to the pool.
    pub fn release(&mut self, id: InstanceId) -> Result<(), InstanceIdError> {
        if id.is_base() {
            return Err(InstanceIdError::Sentinel);
        }
        if id.0 as usize >= self.free.len() {
            return Err(InstanceIdError::OutOfRange(id));
        }
        self.next = self.next.min(id.0);
        self.free.set(id.0 as usize, true);
        self.claimed.remove(&id.0);
        Ok(())
    }

    /// First free index at or after `start`; grows the table by one free
    /// slot when none is left.
    fn scan_from(&mut self, start: usize) -> u32 {
        match (start..self.free.len()).find(|&i| self.free[i]) {
            Some(i) => i as u32,
            None => {
                let i = self.free.len();
                self.free.push(true);
                i as u32
            }
        }
    }
}
