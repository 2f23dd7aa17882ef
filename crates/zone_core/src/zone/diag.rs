//! # Zone Diagnostics
//!
//! Heap checks, free space queries and block walks. None of this is on a hot
//! path.

use super::Zone;
use crate::block::ZONE_ID;
use crate::error::{Corruption, ZoneError, ZoneResult};
use crate::handle::{Handle, ZonePtr};
use crate::owner::OwnerSlot;
use crate::tag::Tag;

/// Snapshot of one block, as seen by a walk of the block list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Header paragraph.
    pub handle: Handle,
    /// Payload address.
    pub ptr: ZonePtr,
    /// Total size in bytes, header included.
    pub size: usize,
    /// Purge tag; `None` for free blocks.
    pub tag: Option<Tag>,
    /// Owner slot index, if the block has one.
    pub owner: Option<u16>,
}

impl BlockInfo {
    /// Whether the block is free.
    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.tag.is_none()
    }

    /// Whether the block reports to `slot`.
    #[inline]
    #[must_use]
    pub fn is_owned_by(&self, slot: OwnerSlot) -> bool {
        self.owner == Some(slot.index())
    }
}

/// Iterator over the blocks of a zone in arena order.
#[derive(Debug)]
pub struct Blocks<'a> {
    zone: &'a Zone,
    cursor: Handle,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == Handle::SENTINEL {
            return None;
        }
        let handle = self.cursor;
        let header = self.zone.arena.header(handle);
        self.cursor = header.next;

        let in_use = !header.is_free();
        Some(BlockInfo {
            handle,
            ptr: ZonePtr::payload_of(handle),
            size: header.size as usize,
            tag: if in_use { Tag::from_u8(header.tag) } else { None },
            owner: header.owner_index(),
        })
    }
}

/// Allocator usage summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneStats {
    /// Usable arena size.
    pub arena_bytes: usize,
    /// Bytes in in-use blocks, headers included.
    pub used_bytes: usize,
    /// Bytes in free blocks, headers included.
    pub free_bytes: usize,
    /// Size of the largest free block.
    pub largest_free: usize,
    /// Number of blocks, free or not.
    pub blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Bytes in use per tag, indexed in [`Tag::ALL`] order.
    pub bytes_by_tag: [usize; 4],
    /// Registered owner slots.
    pub owner_slots: usize,
}

impl ZoneStats {
    /// Bytes in use under `tag`.
    #[inline]
    #[must_use]
    pub const fn bytes_for(&self, tag: Tag) -> usize {
        self.bytes_by_tag[tag.as_u8() as usize - 1]
    }
}

impl Zone {
    /// Walks the block list in arena order.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            zone: self,
            cursor: self.arena.header(Handle::SENTINEL).next,
        }
    }

    /// Checks the block list and reports the first violation found.
    ///
    /// Every block must carry the zone id, end exactly where the next block
    /// starts (the last one at the arena end), be linked back to by its
    /// successor, and not be free if its successor is free.
    ///
    /// # Errors
    ///
    /// [`ZoneError::StructuralCorruption`] describing the violation.
    pub fn check_heap(&self) -> ZoneResult<()> {
        let corrupt = |kind| Err(ZoneError::StructuralCorruption(kind));
        let end = self.arena.end();

        let mut block = self.arena.header(Handle::SENTINEL).next;
        if !self.arena.contains(block) {
            return corrupt(Corruption::LinkOutOfRange { block: Handle::SENTINEL });
        }

        while block != Handle::SENTINEL {
            let header = *self.arena.header(block);

            if header.id != ZONE_ID {
                return corrupt(Corruption::BadId { block, found: header.id });
            }
            if !self.arena.contains(header.next) {
                return corrupt(Corruption::LinkOutOfRange { block });
            }

            let touches = if header.next == Handle::SENTINEL { end } else { header.next };
            if header.paragraphs() == 0 || block.forward(header.paragraphs()) != touches {
                return corrupt(Corruption::Gap { block });
            }

            let successor = self.arena.header(header.next);
            if successor.prev != block {
                return corrupt(Corruption::BackLink { block });
            }
            if header.next != Handle::SENTINEL && header.is_free() && successor.is_free() {
                return corrupt(Corruption::AdjacentFree { block });
            }

            block = header.next;
        }

        Ok(())
    }

    /// Size of the largest free block, header included.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.blocks()
            .filter(BlockInfo::is_free)
            .map(|block| block.size)
            .max()
            .unwrap_or(0)
    }

    /// Sum of all free blocks, headers included.
    #[must_use]
    pub fn total_free(&self) -> usize {
        self.blocks().filter(BlockInfo::is_free).map(|block| block.size).sum()
    }

    /// Usage summary from one walk of the block list.
    #[must_use]
    pub fn stats(&self) -> ZoneStats {
        let mut stats = ZoneStats {
            arena_bytes: self.arena_bytes(),
            used_bytes: self.used_bytes,
            owner_slots: self.owners.registered(),
            ..ZoneStats::default()
        };

        for block in self.blocks() {
            stats.blocks += 1;
            match block.tag {
                None => {
                    stats.free_blocks += 1;
                    stats.free_bytes += block.size;
                    stats.largest_free = stats.largest_free.max(block.size);
                }
                Some(tag) => stats.bytes_by_tag[tag.as_u8() as usize - 1] += block.size,
            }
        }

        stats
    }
}
