//! # Block Headers
//!
//! Every block, free or in use, starts with a one-paragraph header. The
//! payload follows immediately, so the header of the block owning a payload
//! address is always the paragraph just before it.

use bytemuck::{Pod, Zeroable};

use crate::handle::{Handle, PARAGRAPH_SIZE};

/// Identity stamp written into every header the zone creates.
pub const ZONE_ID: u8 = 0x1d;

/// `user` value of a free block.
pub(crate) const USER_FREE: u16 = 0;

/// `user` value of an in-use block without an owner slot.
pub(crate) const USER_UNOWNED: u16 = 1;

/// `user` values from here on name owner slot `user - USER_OWNER_BASE`.
pub(crate) const USER_OWNER_BASE: u16 = 2;

/// One 16-byte unit of arena storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, align(16))]
pub struct Paragraph([u8; PARAGRAPH_SIZE]);

/// Bookkeeping header at the start of each block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct BlockHeader {
    /// Including the header and possibly tiny fragments.
    pub size: u32,
    pub next: Handle,
    pub prev: Handle,
    /// Free, unowned, or an owner slot; see the `USER_*` constants.
    pub user: u16,
    /// Purge tag, 0 when free.
    pub tag: u8,
    /// Should be [`ZONE_ID`].
    pub id: u8,
}

const _: () = assert!(std::mem::size_of::<BlockHeader>() == PARAGRAPH_SIZE);
const _: () = assert!(std::mem::size_of::<Paragraph>() == PARAGRAPH_SIZE);

impl BlockHeader {
    /// A free block of `size` bytes between `prev` and `next`.
    #[inline]
    pub const fn free(size: u32, prev: Handle, next: Handle) -> Self {
        Self {
            size,
            next,
            prev,
            user: USER_FREE,
            tag: 0,
            id: ZONE_ID,
        }
    }

    #[inline]
    pub const fn is_free(&self) -> bool {
        self.user == USER_FREE
    }

    /// Size in paragraphs.
    #[inline]
    pub const fn paragraphs(&self) -> u32 {
        self.size / PARAGRAPH_SIZE as u32
    }

    /// Owner slot index, if the block has one.
    #[inline]
    pub const fn owner_index(&self) -> Option<u16> {
        if self.user >= USER_OWNER_BASE {
            Some(self.user - USER_OWNER_BASE)
        } else {
            None
        }
    }
}
