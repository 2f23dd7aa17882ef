//! # Thinkers
//!
//! Level thinkers live in zero-filled level-special blocks, run in insertion
//! order once per tic, and are freed lazily: a removed thinker stays in the
//! list until the next pass reaches it.

use std::fmt;

use zone_core::{Zone, ZonePtr};

use crate::error::{EngineError, EngineResult};

/// Identifier of a thinker, unique for the lifetime of the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ThinkerId(u32);

impl ThinkerId {
    /// Raw identifier value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ThinkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a thinker wants after its turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Think {
    /// Keep running next tic.
    Continue,
    /// Remove the thinker; its block is freed on the next pass.
    Remove,
}

#[derive(Clone, Copy, Debug)]
struct Thinker {
    id: ThinkerId,
    ptr: ZonePtr,
    removed: bool,
}

/// The level's thinkers, in the order they were added.
#[derive(Debug, Default)]
pub struct ThinkerList {
    thinkers: Vec<Thinker>,
    next_id: u32,
}

impl ThinkerList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            thinkers: Vec::new(),
            next_id: 0,
        }
    }

    /// Number of thinkers, removed ones not yet freed included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.thinkers.len()
    }

    /// Whether the list is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thinkers.is_empty()
    }

    /// Number of thinkers waiting to be freed.
    #[must_use]
    pub fn pending_removal(&self) -> usize {
        self.thinkers.iter().filter(|thinker| thinker.removed).count()
    }

    /// Block holding a thinker's state.
    #[must_use]
    pub fn ptr(&self, id: ThinkerId) -> Option<ZonePtr> {
        self.find(id).map(|index| self.thinkers[index].ptr)
    }

    /// Allocates a zeroed thinker of `size` bytes at the end of the list.
    ///
    /// # Errors
    ///
    /// Zone errors from the allocation.
    pub fn add(&mut self, zone: &mut Zone, size: usize) -> EngineResult<ThinkerId> {
        let ptr = zone.calloc_level_special(size)?;
        let id = ThinkerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.thinkers.push(Thinker {
            id,
            ptr,
            removed: false,
        });
        Ok(id)
    }

    /// Marks a thinker for removal. Its block stays allocated until the next
    /// [`run`](Self::run) reaches it.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownThinker`] if `id` is not in the list.
    pub fn remove(&mut self, id: ThinkerId) -> EngineResult<()> {
        let index = self.find(id).ok_or(EngineError::UnknownThinker(id))?;
        self.thinkers[index].removed = true;
        Ok(())
    }

    /// Runs every live thinker once, freeing the ones marked removed.
    ///
    /// Returns the number of thinkers freed.
    ///
    /// # Errors
    ///
    /// Zone errors if a thinker's block is no longer valid.
    pub fn run<F>(&mut self, zone: &mut Zone, mut think: F) -> EngineResult<usize>
    where
        F: FnMut(ThinkerId, &mut [u8]) -> Think,
    {
        let mut freed = 0;
        let mut index = 0;

        while index < self.thinkers.len() {
            let thinker = self.thinkers[index];
            if thinker.removed {
                zone.free(Some(thinker.ptr))?;
                self.thinkers.remove(index);
                freed += 1;
                continue;
            }

            if think(thinker.id, zone.bytes_mut(thinker.ptr)?) == Think::Remove {
                self.thinkers[index].removed = true;
            }
            index += 1;
        }

        if freed > 0 {
            tracing::trace!(freed, live = self.thinkers.len(), "thinkers freed");
        }
        Ok(freed)
    }

    /// Forgets every thinker without freeing anything.
    ///
    /// Call after the level teardown has purged their blocks.
    pub fn reset(&mut self) {
        self.thinkers.clear();
    }

    fn find(&self, id: ThinkerId) -> Option<usize> {
        self.thinkers.iter().position(|thinker| thinker.id == id)
    }
}
