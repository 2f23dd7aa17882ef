//! # Paragraph Addressing
//!
//! Block links are stored as compact paragraph handles instead of pointers.
//! A handle names one 16-byte paragraph of the arena; an address is a byte
//! offset into the arena. Two conversions translate between them:
//!
//! - [`Handle::from_address`] fails on any address that is not paragraph aligned
//! - [`Handle::address`] is total
//!
//! Paragraph 0 holds the block list sentinel, so no payload ever starts at
//! address 0 and `Option<ZonePtr>` serves as the nullable pointer.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::error::{ZoneError, ZoneResult};

/// Alignment and granularity of every block boundary, in bytes.
pub const PARAGRAPH_SIZE: usize = 16;

/// Index of a paragraph within the arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    /// The block list sentinel, never allocatable.
    pub const SENTINEL: Self = Self(0);

    /// The first paragraph of the usable arena.
    pub const FIRST: Self = Self(1);

    /// Creates a handle from a raw paragraph index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw paragraph index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Converts an arena address to the paragraph it starts.
    ///
    /// # Errors
    ///
    /// [`ZoneError::AlignmentFault`] if `address` is not a multiple of
    /// [`PARAGRAPH_SIZE`], or lies beyond the addressable range.
    pub fn from_address(address: usize) -> ZoneResult<Self> {
        if address % PARAGRAPH_SIZE != 0 {
            return Err(ZoneError::AlignmentFault { address });
        }
        u32::try_from(address / PARAGRAPH_SIZE)
            .map(Self)
            .map_err(|_| ZoneError::AlignmentFault { address })
    }

    /// Address of the first byte of this paragraph.
    #[inline]
    #[must_use]
    pub const fn address(self) -> usize {
        self.0 as usize * PARAGRAPH_SIZE
    }

    /// The handle `paragraphs` paragraphs further along the arena.
    #[inline]
    #[must_use]
    pub const fn forward(self, paragraphs: u32) -> Self {
        Self(self.0 + paragraphs)
    }

    /// Index usable for slicing the paragraph array.
    #[inline]
    pub(crate) const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{:05x}", self.0)
    }
}

/// Address of a block payload, as handed out by the allocator.
///
/// The value is an arena-relative byte offset. It is never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ZonePtr(u32);

impl ZonePtr {
    /// Wraps a raw address. Returns `None` for the null address.
    #[inline]
    #[must_use]
    pub const fn from_raw(address: u32) -> Option<Self> {
        if address == 0 {
            None
        } else {
            Some(Self(address))
        }
    }

    /// Payload address of the block whose header sits at `header`.
    #[inline]
    pub(crate) const fn payload_of(header: Handle) -> Self {
        Self((header.0 + 1) * PARAGRAPH_SIZE as u32)
    }

    /// The raw address.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The address as a byte offset into the arena.
    #[inline]
    #[must_use]
    pub const fn addr(self) -> usize {
        self.0 as usize
    }

    /// Pointer arithmetic within a payload. `None` on overflow.
    #[inline]
    #[must_use]
    pub fn offset(self, bytes: u32) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }

    /// The paragraph this address starts.
    ///
    /// # Errors
    ///
    /// [`ZoneError::AlignmentFault`] if the address is not paragraph aligned.
    pub fn handle(self) -> ZoneResult<Handle> {
        Handle::from_address(self.addr())
    }
}

impl fmt::Display for ZonePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#07x}", self.0)
    }
}
