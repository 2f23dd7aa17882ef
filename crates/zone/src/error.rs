//! # Engine Error Types
//!
//! Everything a driver can fail with. Zone errors pass through unchanged.

use thiserror::Error;
use zone_core::{ConfigError, ZoneError, ZonePtr};

use crate::thinker::ThinkerId;

/// Errors raised by the engine drivers.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The allocator refused or detected corruption.
    #[error(transparent)]
    Zone(#[from] ZoneError),

    /// A config file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A level description could not be parsed.
    #[error("bad level description: {0}")]
    LevelParse(#[from] toml::de::Error),

    /// A line names a sector the level does not have.
    #[error("line {line} references sector {sector}, but the level has {sectors} sectors")]
    SectorOutOfRange {
        /// Index of the offending line.
        line: usize,
        /// Sector it references.
        sector: u32,
        /// Number of sectors in the level.
        sectors: u32,
    },

    /// A record array would not fit in the address space.
    #[error("{what} array of {count} records is too large")]
    ArrayTooLarge {
        /// Which array.
        what: &'static str,
        /// Requested record count.
        count: usize,
    },

    /// The loaded level has no sector with this index.
    #[error("no sector {0} in the loaded level")]
    UnknownSector(usize),

    /// The block no longer holds the data a handle was taken for.
    #[error("block at {0} was freed or reused")]
    StaleBlock(ZonePtr),

    /// No level is loaded.
    #[error("no level loaded")]
    NoLevel,

    /// The lump source has no lump of that name.
    #[error("lump not found: {0}")]
    LumpNotFound(String),

    /// The thinker is not in the list.
    #[error("unknown thinker {0}")]
    UnknownThinker(ThinkerId),
}

/// Result alias for driver operations.
pub type EngineResult<T> = Result<T, EngineError>;
