//! # Purge Tags
//!
//! Every in-use block carries a tag that decides when it may be reclaimed.
//! Tags below [`Tag::PURGE_LEVEL`] are never overwritten until freed.

use std::fmt;

/// Reclamation policy of a block, ordered by purge eligibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Static for the entire execution time.
    Static = 1,
    /// Static until the level is exited.
    Level = 2,
    /// A special thinker in a level; same teardown as [`Tag::Level`].
    LevelSpecial = 3,
    /// Reclaimable whenever the allocator needs the space.
    Cache = 4,
}

impl Tag {
    /// First tag the allocator may evict on its own during a scan.
    pub const PURGE_LEVEL: Self = Self::Cache;

    /// All tags in purge order.
    pub const ALL: [Self; 4] = [Self::Static, Self::Level, Self::LevelSpecial, Self::Cache];

    /// Raw value stored in a block header.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a header value. Free blocks store 0 and decode to `None`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Static),
            2 => Some(Self::Level),
            3 => Some(Self::LevelSpecial),
            4 => Some(Self::Cache),
            _ => None,
        }
    }

    /// Whether the allocator may evict a block with this tag during a scan.
    #[inline]
    #[must_use]
    pub const fn is_purgeable(self) -> bool {
        self.as_u8() >= Self::PURGE_LEVEL.as_u8()
    }

    /// Whether the block is released by the level teardown purge.
    #[inline]
    #[must_use]
    pub const fn is_level_scoped(self) -> bool {
        matches!(self, Self::Level | Self::LevelSpecial)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Static => "static",
            Self::Level => "level",
            Self::LevelSpecial => "level-special",
            Self::Cache => "cache",
        };
        f.pad(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cache_is_purgeable() {
        assert!(!Tag::Static.is_purgeable());
        assert!(!Tag::Level.is_purgeable());
        assert!(!Tag::LevelSpecial.is_purgeable());
        assert!(Tag::Cache.is_purgeable());
    }

    #[test]
    fn test_header_value_decoding() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_u8(tag.as_u8()), Some(tag));
        }
        assert_eq!(Tag::from_u8(0), None);
        assert_eq!(Tag::from_u8(9), None);
    }

    #[test]
    fn test_purge_order() {
        assert!(Tag::Static < Tag::Level);
        assert!(Tag::LevelSpecial < Tag::PURGE_LEVEL);
        assert!(Tag::Level.is_level_scoped() && Tag::LevelSpecial.is_level_scoped());
        assert!(!Tag::Cache.is_level_scoped());
    }
}
