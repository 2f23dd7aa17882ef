//! # Zone Error Types
//!
//! All errors that can occur in the zone allocator. On the target hardware
//! every one of them is fatal; the engine decides that, not this crate.

use thiserror::Error;

use crate::handle::Handle;

/// Errors that can occur in the zone allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// An address handed to the handle conversion is not paragraph aligned.
    #[error("pointer is not aligned: {address:#x}")]
    AlignmentFault {
        /// The offending address.
        address: usize,
    },

    /// The scan wrapped around without finding room, purgeable blocks included.
    #[error("failed to allocate {requested} B, max free block {largest_free} B, total free {total_free} B")]
    ArenaExhausted {
        /// Block size that was requested, header included.
        requested: usize,
        /// Largest free block at the time of failure.
        largest_free: usize,
        /// Sum of all free blocks at the time of failure.
        total_free: usize,
    },

    /// Caller-side programming error, detected before any scan work.
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// The heap check found an inconsistency.
    #[error("heap check failed: {0}")]
    StructuralCorruption(Corruption),

    /// The zone was created from a config that fails validation.
    #[error("invalid zone config: {0}")]
    InvalidConfig(String),

    /// No arena of any size below the target could be obtained.
    #[error("no arena could be obtained, target {target} B")]
    ArenaUnavailable {
        /// The requested arena size.
        target: usize,
    },

    /// The address does not start a payload handed out by this zone.
    #[error("freed a pointer without ZONE_ID: {address:#x}")]
    InvalidPointer {
        /// The offending address.
        address: usize,
    },

    /// The block behind the address is already free.
    #[error("block at {address:#x} freed twice")]
    DoubleFree {
        /// The offending address.
        address: usize,
    },

    /// Every owner slot is registered.
    #[error("owner table full: capacity {capacity}")]
    OwnerTableFull {
        /// Configured number of slots.
        capacity: usize,
    },

    /// The owner slot still refers to a live block.
    #[error("owner slot {slot} is bound to a live block")]
    OwnerBound {
        /// The slot index.
        slot: u16,
    },

    /// The owner slot was never registered or has been released.
    #[error("owner slot {slot} is not registered")]
    UnknownOwner {
        /// The slot index.
        slot: u16,
    },

    /// The payload cannot be viewed as the requested element type.
    #[error("payload at {address:#x} cannot be cast: {reason:?}")]
    PayloadCast {
        /// The payload address.
        address: usize,
        /// Why bytemuck refused the cast.
        reason: bytemuck::PodCastError,
    },
}

/// First structural violation found by the heap check.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// A header does not carry the zone identity stamp.
    #[error("block {block} has id {found:#x} instead of ZONE_ID")]
    BadId {
        /// The block.
        block: Handle,
        /// The stamp found.
        found: u8,
    },

    /// A link points outside the arena.
    #[error("block {block} links outside the arena")]
    LinkOutOfRange {
        /// The block.
        block: Handle,
    },

    /// The block does not end where the next one starts.
    #[error("block {block} size does not touch the next block")]
    Gap {
        /// The block.
        block: Handle,
    },

    /// The next block does not link back.
    #[error("block {block}: next block doesn't have proper back link")]
    BackLink {
        /// The block.
        block: Handle,
    },

    /// Two consecutive free blocks.
    #[error("block {block}: two consecutive free blocks")]
    AdjacentFree {
        /// The first of the two blocks.
        block: Handle,
    },
}

/// Result type for zone operations.
pub type ZoneResult<T> = Result<T, ZoneError>;

/// Errors raised while loading a [`ZoneConfig`](crate::ZoneConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
