//! # Zone Allocator
//!
//! A tagged, purgeable block list over a single arena.
//!
//! ## Invariants
//!
//! - There is never any space between blocks.
//! - There are never two contiguous free blocks.
//! - The rover can be left pointing at a non-empty block.
//!
//! ## Allocation
//!
//! First fit, starting at the rover. Purgeable blocks met along the way are
//! thrown out and merged into the candidate; protected blocks are stepped
//! over. It is of no value to free a cachable block, because it will get
//! overwritten automatically if needed.
//!
//! ```text
//!   sentinel ─▶ [static] ─▶ [free] ─▶ [cache] ─▶ [level] ─▶ [free] ─┐
//!      ▲                       ▲ rover                               │
//!      └─────────────────────────────────────────────────────────────┘
//! ```

mod diag;

pub use diag::{BlockInfo, Blocks, ZoneStats};

use std::fmt;

use bytemuck::Pod;

use crate::arena::{Arena, ArenaProvider, SystemProvider};
use crate::block::{BlockHeader, USER_FREE, USER_UNOWNED, ZONE_ID};
use crate::config::ZoneConfig;
use crate::error::{ZoneError, ZoneResult};
use crate::handle::{Handle, ZonePtr, PARAGRAPH_SIZE};
use crate::owner::{OwnerSlot, OwnerTable};
use crate::tag::Tag;

/// Smallest tail worth splitting off into its own free block.
pub const MIN_FRAGMENT: usize = 64;

/// The zone: arena, block list, rover and owner table.
///
/// # Thread Safety
///
/// Not thread-safe; every operation takes `&mut self`. Wrap it in a
/// [`SharedZone`](crate::SharedZone) to share it between threads.
///
/// # Example
///
/// ```rust
/// use zone_core::{Zone, ZoneConfig};
///
/// let mut zone = Zone::init(&ZoneConfig::with_target_bytes(64 * 1024))?;
/// let lines = zone.calloc_level(100)?;
/// zone.free_level_scoped()?;
/// zone.check_heap()?;
/// # let _ = lines;
/// # Ok::<(), zone_core::ZoneError>(())
/// ```
pub struct Zone {
    arena: Arena,
    owners: OwnerTable,
    /// Where the next allocation scan starts.
    rover: Handle,
    /// Bytes in in-use blocks, headers included.
    used_bytes: usize,
    check_heap_on_purge: bool,
}

impl Zone {
    /// Creates a zone over the largest arena the process heap will grant.
    ///
    /// # Errors
    ///
    /// [`ZoneError::InvalidConfig`] if `config` fails validation,
    /// [`ZoneError::ArenaUnavailable`] if no arena could be obtained.
    pub fn init(config: &ZoneConfig) -> ZoneResult<Self> {
        Self::init_with(config, &mut SystemProvider)
    }

    /// Creates a zone over an arena obtained from `provider`.
    ///
    /// The whole arena becomes one free block linked to the sentinel.
    ///
    /// # Errors
    ///
    /// [`ZoneError::InvalidConfig`] if `config` fails validation,
    /// [`ZoneError::ArenaUnavailable`] if `provider` refuses every size.
    pub fn init_with<P: ArenaProvider + ?Sized>(config: &ZoneConfig, provider: &mut P) -> ZoneResult<Self> {
        config
            .validate()
            .map_err(|err| ZoneError::InvalidConfig(err.to_string()))?;
        let mut arena = Arena::acquire(config, provider)?;
        let heap_size = u32::try_from(arena.usable_bytes()).map_err(|_| ZoneError::ArenaUnavailable {
            target: config.target_bytes,
        })?;

        *arena.header_mut(Handle::SENTINEL) = BlockHeader {
            size: 0,
            next: Handle::FIRST,
            prev: Handle::FIRST,
            user: USER_UNOWNED,
            tag: Tag::Static.as_u8(),
            id: ZONE_ID,
        };
        *arena.header_mut(Handle::FIRST) = BlockHeader::free(heap_size, Handle::SENTINEL, Handle::SENTINEL);

        tracing::info!(bytes = heap_size, "bytes allocated for zone");

        Ok(Self {
            arena,
            owners: OwnerTable::new(config.owner_slots),
            rover: Handle::FIRST,
            used_bytes: 0,
            check_heap_on_purge: config.check_heap_on_purge,
        })
    }

    /// Usable arena size in bytes.
    #[inline]
    #[must_use]
    pub fn arena_bytes(&self) -> usize {
        self.arena.usable_bytes()
    }

    /// Bytes held by in-use blocks, headers included.
    #[inline]
    #[must_use]
    pub const fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Where the next allocation scan starts.
    #[inline]
    #[must_use]
    pub const fn rover(&self) -> Handle {
        self.rover
    }

    // =========================================================================
    // Owner slots
    // =========================================================================

    /// Registers a new, empty owner slot.
    ///
    /// # Errors
    ///
    /// [`ZoneError::OwnerTableFull`] when every slot is taken.
    pub fn register_owner(&mut self) -> ZoneResult<OwnerSlot> {
        self.owners.register()
    }

    /// Returns a slot to the table.
    ///
    /// # Errors
    ///
    /// [`ZoneError::OwnerBound`] while the slot still refers to a live block,
    /// [`ZoneError::UnknownOwner`] if it is not registered.
    pub fn release_owner(&mut self, slot: OwnerSlot) -> ZoneResult<()> {
        self.owners.release(slot)
    }

    /// Current value of an owner slot; `None` once its block is gone.
    ///
    /// # Errors
    ///
    /// [`ZoneError::UnknownOwner`] if the slot is not registered.
    pub fn owner(&self, slot: OwnerSlot) -> ZoneResult<Option<ZonePtr>> {
        self.owners.get(slot)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocates `size` bytes with `tag`.
    ///
    /// The size is rounded up to whole paragraphs. Purgeable blocks need an
    /// owner slot, which receives the returned address. The payload is not
    /// zeroed.
    ///
    /// # Errors
    ///
    /// - [`ZoneError::ContractViolation`] for a purgeable tag without an owner
    /// - [`ZoneError::OwnerBound`] / [`ZoneError::UnknownOwner`] for a bad slot
    /// - [`ZoneError::ArenaExhausted`] when no room is left after purging
    pub fn allocate(&mut self, size: usize, tag: Tag, owner: Option<OwnerSlot>) -> ZoneResult<ZonePtr> {
        match owner {
            Some(slot) => self.owners.ensure_unbound(slot)?,
            None if tag.is_purgeable() => {
                return Err(ZoneError::ContractViolation("an owner is required for purgable blocks"));
            }
            None => {}
        }

        let needed = block_size(size).ok_or_else(|| self.exhausted(size))?;

        // If there is a free block behind the rover, back up over it.
        let mut base = self.rover;
        let behind = self.arena.header(base).prev;
        if self.arena.header(behind).is_free() {
            base = behind;
        }

        let mut rover = base;
        let start = self.arena.header(base).prev;

        loop {
            let visited = rover;
            let current = *self.arena.header(rover);
            if current.is_free() {
                rover = current.next;
            } else if current.tag < Tag::PURGE_LEVEL.as_u8() {
                // Hit a block that can't be purged, so move base past it.
                base = current.next;
                rover = base;
            } else {
                // Free the rover block, adding its size to base. The rover
                // can be the base block.
                let before = self.arena.header(base).prev;
                tracing::debug!(block = %rover, size = current.size, "purging cache block");
                self.release(rover);
                base = self.arena.header(before).next;
                rover = self.arena.header(base).next;
            }

            let candidate = self.arena.header(base);
            if candidate.is_free() && candidate.size >= needed {
                break;
            }
            if visited == start {
                // Scanned all the way around the list, the block behind the
                // starting point included.
                return Err(self.exhausted(needed as usize));
            }
        }

        // Found a block big enough.
        let extra = self.arena.header(base).size - needed;
        if extra as usize > MIN_FRAGMENT {
            // There will be a free fragment after the allocated block.
            let fragment = base.forward(needed / PARAGRAPH_SIZE as u32);
            let next = self.arena.header(base).next;
            *self.arena.header_mut(fragment) = BlockHeader::free(extra, base, next);
            self.arena.header_mut(next).prev = fragment;

            let header = self.arena.header_mut(base);
            header.next = fragment;
            header.size = needed;
        }

        let ptr = ZonePtr::payload_of(base);
        let user = match owner {
            Some(slot) => {
                self.owners.bind(slot, ptr)?;
                slot.user_marker()
            }
            None => USER_UNOWNED,
        };

        let header = self.arena.header_mut(base);
        header.user = user;
        header.tag = tag.as_u8();
        header.id = ZONE_ID;
        let (allocated, next) = (header.size, header.next);

        // Next allocation will start looking here.
        self.rover = next;
        self.used_bytes += allocated as usize;

        tracing::trace!(%ptr, size = allocated, %tag, used = self.used_bytes, "alloc");

        Ok(ptr)
    }

    /// [`allocate`](Self::allocate) followed by zeroing the first `size`
    /// bytes of the payload. An unsplit tail past `size` keeps its contents.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    pub fn calloc(&mut self, size: usize, tag: Tag, owner: Option<OwnerSlot>) -> ZoneResult<ZonePtr> {
        let ptr = self.allocate(size, tag, owner)?;
        let payload = self.bytes_mut(ptr)?;
        let len = size.min(payload.len());
        payload[..len].fill(0);
        Ok(ptr)
    }

    /// Permanent allocation; no owner required.
    ///
    /// # Errors
    ///
    /// [`ZoneError::ArenaExhausted`].
    pub fn alloc_static(&mut self, size: usize) -> ZoneResult<ZonePtr> {
        self.allocate(size, Tag::Static, None)
    }

    /// Level-scoped allocation, released by [`free_level_scoped`](Self::free_level_scoped).
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    pub fn alloc_level(&mut self, size: usize, owner: Option<OwnerSlot>) -> ZoneResult<ZonePtr> {
        self.allocate(size, Tag::Level, owner)
    }

    /// Zero-filled level-scoped allocation.
    ///
    /// # Errors
    ///
    /// [`ZoneError::ArenaExhausted`].
    pub fn calloc_level(&mut self, size: usize) -> ZoneResult<ZonePtr> {
        self.calloc(size, Tag::Level, None)
    }

    /// Zero-filled level-special allocation, used for level thinkers.
    ///
    /// # Errors
    ///
    /// [`ZoneError::ArenaExhausted`].
    pub fn calloc_level_special(&mut self, size: usize) -> ZoneResult<ZonePtr> {
        self.calloc(size, Tag::LevelSpecial, None)
    }

    /// Purgeable allocation. `owner` is cleared if the block is ever evicted.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    pub fn alloc_cache(&mut self, size: usize, owner: OwnerSlot) -> ZoneResult<ZonePtr> {
        self.allocate(size, Tag::Cache, Some(owner))
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Frees a block. `None` is a no-op.
    ///
    /// The block's owner slot, if any, is cleared; the block is merged with
    /// free neighbours.
    ///
    /// # Errors
    ///
    /// - [`ZoneError::AlignmentFault`] if `ptr` is not paragraph aligned
    /// - [`ZoneError::InvalidPointer`] if `ptr` is not a payload of this zone
    /// - [`ZoneError::DoubleFree`] if the block is already free
    pub fn free(&mut self, ptr: Option<ZonePtr>) -> ZoneResult<()> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        let block = self.block_of(ptr)?;
        self.release(block);
        Ok(())
    }

    /// Frees every in-use block whose tag lies in `lo..=hi`.
    ///
    /// Returns the number of blocks released.
    ///
    /// # Errors
    ///
    /// [`ZoneError::StructuralCorruption`] if heap checks after purges are
    /// enabled and the check fails.
    pub fn free_tag_range(&mut self, lo: Tag, hi: Tag) -> ZoneResult<usize> {
        let range = lo.as_u8()..=hi.as_u8();
        let mut released = 0;
        let mut block = self.arena.header(Handle::SENTINEL).next;

        while block != Handle::SENTINEL {
            let header = *self.arena.header(block);
            if !header.is_free() && range.contains(&header.tag) {
                let merged = self.release(block);
                released += 1;
                // The merged block may have absorbed the old successor.
                block = self.arena.header(merged).next;
            } else {
                block = header.next;
            }
        }

        tracing::debug!(%lo, %hi, released, used = self.used_bytes, "tag purge");

        if self.check_heap_on_purge {
            self.check_heap()?;
        }
        Ok(released)
    }

    /// Frees everything tagged [`Tag::Level`] or [`Tag::LevelSpecial`].
    ///
    /// Called once per level transition. Static and cache blocks survive.
    ///
    /// # Errors
    ///
    /// See [`free_tag_range`](Self::free_tag_range).
    pub fn free_level_scoped(&mut self) -> ZoneResult<usize> {
        self.free_tag_range(Tag::Level, Tag::LevelSpecial)
    }

    // =========================================================================
    // Payload access
    // =========================================================================

    /// Payload of the block at `ptr`, including any unsplit tail.
    ///
    /// # Errors
    ///
    /// Same validation as [`free`](Self::free).
    pub fn bytes(&self, ptr: ZonePtr) -> ZoneResult<&[u8]> {
        let block = self.block_of(ptr)?;
        Ok(self.arena.payload(block))
    }

    /// Mutable payload of the block at `ptr`.
    ///
    /// # Errors
    ///
    /// Same validation as [`free`](Self::free).
    pub fn bytes_mut(&mut self, ptr: ZonePtr) -> ZoneResult<&mut [u8]> {
        let block = self.block_of(ptr)?;
        Ok(self.arena.payload_mut(block))
    }

    /// The payload viewed as elements of `T`; a trailing partial element is
    /// left out.
    ///
    /// # Errors
    ///
    /// Validation errors as for [`free`](Self::free), or
    /// [`ZoneError::PayloadCast`] if `T` is zero sized or needs more than
    /// paragraph alignment.
    pub fn slice<T: Pod>(&self, ptr: ZonePtr) -> ZoneResult<&[T]> {
        let bytes = self.bytes(ptr)?;
        let len = whole_elements::<T>(bytes.len());
        bytemuck::try_cast_slice(&bytes[..len]).map_err(|reason| ZoneError::PayloadCast {
            address: ptr.addr(),
            reason,
        })
    }

    /// Mutable typed view of the payload.
    ///
    /// # Errors
    ///
    /// See [`slice`](Self::slice).
    pub fn slice_mut<T: Pod>(&mut self, ptr: ZonePtr) -> ZoneResult<&mut [T]> {
        let bytes = self.bytes_mut(ptr)?;
        let len = whole_elements::<T>(bytes.len());
        bytemuck::try_cast_slice_mut(&mut bytes[..len]).map_err(|reason| ZoneError::PayloadCast {
            address: ptr.addr(),
            reason,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Header of the in-use block owning the payload at `ptr`.
    fn block_of(&self, ptr: ZonePtr) -> ZoneResult<Handle> {
        let payload = ptr.handle()?;
        let invalid = ZoneError::InvalidPointer { address: ptr.addr() };

        // A zero-sized payload may start exactly at the arena end.
        if payload.index() <= Handle::FIRST.index() || payload > self.arena.end() {
            return Err(invalid);
        }
        let block = Handle::new(payload.index() - 1);
        let header = self.arena.header(block);

        if header.id != ZONE_ID || !self.arena.contains(header.prev) {
            return Err(invalid);
        }
        if self.arena.header(header.prev).next != block {
            return Err(invalid);
        }
        if header.is_free() {
            return Err(ZoneError::DoubleFree { address: ptr.addr() });
        }
        Ok(block)
    }

    /// Marks `block` free, clears its owner and coalesces it with free
    /// neighbours. Returns the block that now covers it.
    fn release(&mut self, block: Handle) -> Handle {
        let header = *self.arena.header(block);

        if let Some(index) = header.owner_index() {
            // Clear the owner's mark.
            self.owners.clear(index);
        }

        {
            let header = self.arena.header_mut(block);
            header.user = USER_FREE;
            header.tag = 0;
        }
        self.used_bytes -= header.size as usize;
        tracing::trace!(block = %block, size = header.size, used = self.used_bytes, "free");

        let mut block = block;

        let other = header.prev;
        if self.arena.header(other).is_free() {
            // Merge with previous free block.
            let next = header.next;
            let absorbing = self.arena.header_mut(other);
            absorbing.size += header.size;
            absorbing.next = next;
            self.arena.header_mut(next).prev = other;

            if self.rover == block {
                self.rover = other;
            }
            block = other;
        }

        let other = self.arena.header(block).next;
        let following = *self.arena.header(other);
        if following.is_free() {
            // Merge the next free block onto the end.
            let absorbing = self.arena.header_mut(block);
            absorbing.size += following.size;
            absorbing.next = following.next;
            self.arena.header_mut(following.next).prev = block;

            if self.rover == other {
                self.rover = block;
            }
        }

        block
    }

    fn exhausted(&self, requested: usize) -> ZoneError {
        ZoneError::ArenaExhausted {
            requested,
            largest_free: self.largest_free_block(),
            total_free: self.total_free(),
        }
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("arena_bytes", &self.arena_bytes())
            .field("used_bytes", &self.used_bytes)
            .field("rover", &self.rover)
            .field("owner_slots", &self.owners.registered())
            .finish_non_exhaustive()
    }
}

/// Block size for a `size`-byte request: rounded payload plus one header.
fn block_size(size: usize) -> Option<u32> {
    let rounded = size.checked_add(PARAGRAPH_SIZE - 1)? & !(PARAGRAPH_SIZE - 1);
    u32::try_from(rounded.checked_add(PARAGRAPH_SIZE)?).ok()
}

/// Largest byte count holding only whole `T`s.
fn whole_elements<T>(bytes: usize) -> usize {
    match std::mem::size_of::<T>() {
        0 => 0,
        size => bytes / size * size,
    }
}
