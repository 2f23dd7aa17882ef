//! # Owner Slots
//!
//! An owner slot is the external reference a block reports its destruction
//! to. The allocator writes a block's address into the slot when allocating
//! and clears it when the block is freed or purged, so holders of a slot
//! observe evictions they did not ask for.
//!
//! Slots live in a fixed-capacity table inside the zone; block headers name
//! them by index.

use crate::block::USER_OWNER_BASE;
use crate::config::MAX_OWNER_SLOTS;
use crate::error::{ZoneError, ZoneResult};
use crate::handle::ZonePtr;

/// Handle to a registered owner slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerSlot {
    /// Index into the owner table.
    index: u16,
}

impl OwnerSlot {
    /// Raw table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.index
    }

    /// Header `user` value naming this slot.
    #[inline]
    pub(crate) const fn user_marker(self) -> u16 {
        self.index + USER_OWNER_BASE
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Cell {
    registered: bool,
    target: Option<ZonePtr>,
}

/// Fixed-capacity table of owner slots.
///
/// All storage is allocated when the zone is created.
#[derive(Debug)]
pub(crate) struct OwnerTable {
    cells: Box<[Cell]>,
    /// Indices of unregistered cells.
    free_list: Vec<u16>,
}

impl OwnerTable {
    /// `capacity` is clamped to [`MAX_OWNER_SLOTS`] so every index has a
    /// header marker.
    pub fn new(capacity: usize) -> Self {
        let capacity = u16::try_from(capacity.min(MAX_OWNER_SLOTS)).unwrap_or(u16::MAX - USER_OWNER_BASE + 1);
        Self {
            cells: vec![Cell::default(); usize::from(capacity)].into_boxed_slice(),
            free_list: (0..capacity).rev().collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn registered(&self) -> usize {
        self.cells.len() - self.free_list.len()
    }

    pub fn register(&mut self) -> ZoneResult<OwnerSlot> {
        let index = self.free_list.pop().ok_or(ZoneError::OwnerTableFull {
            capacity: self.capacity(),
        })?;
        self.cells[usize::from(index)] = Cell {
            registered: true,
            target: None,
        };
        Ok(OwnerSlot { index })
    }

    pub fn release(&mut self, slot: OwnerSlot) -> ZoneResult<()> {
        self.ensure_unbound(slot)?;
        self.cells[usize::from(slot.index)].registered = false;
        self.free_list.push(slot.index);
        Ok(())
    }

    pub fn get(&self, slot: OwnerSlot) -> ZoneResult<Option<ZonePtr>> {
        Ok(self.cell(slot)?.target)
    }

    /// Fails unless the slot is registered and empty.
    pub fn ensure_unbound(&self, slot: OwnerSlot) -> ZoneResult<()> {
        match self.cell(slot)?.target {
            Some(_) => Err(ZoneError::OwnerBound { slot: slot.index }),
            None => Ok(()),
        }
    }

    pub fn bind(&mut self, slot: OwnerSlot, ptr: ZonePtr) -> ZoneResult<()> {
        self.ensure_unbound(slot)?;
        self.cells[usize::from(slot.index)].target = Some(ptr);
        Ok(())
    }

    /// Clears the slot named by a block header. Unknown indices are ignored.
    pub fn clear(&mut self, index: u16) {
        if let Some(cell) = self.cells.get_mut(usize::from(index)) {
            cell.target = None;
        }
    }

    fn cell(&self, slot: OwnerSlot) -> ZoneResult<&Cell> {
        self.cells
            .get(usize::from(slot.index))
            .filter(|cell| cell.registered)
            .ok_or(ZoneError::UnknownOwner { slot: slot.index })
    }
}
