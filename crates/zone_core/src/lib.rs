//! # ZONE Core
//!
//! The zone memory allocator of the engine. Every dynamic structure the
//! engine builds at runtime (level geometry, thinkers, cached lumps) lives in
//! one arena obtained at startup.
//!
//! ## Architecture Rules
//!
//! 1. **One arena** - acquired once, never resized
//! 2. **Paragraph addressing** - block links are 16-byte paragraph handles
//! 3. **Tag-driven reclamation** - level data goes at level teardown, cache
//!    data goes whenever the space is needed
//!
//! ## Example
//!
//! ```rust,ignore
//! use zone_core::{Zone, ZoneConfig};
//!
//! let mut zone = Zone::init(&ZoneConfig::default())?;
//! let sectors = zone.calloc_level(numsectors * SECTOR_SIZE)?;
//! // ... play the level ...
//! zone.free_level_scoped()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod handle;
pub mod owner;
pub mod shared;
pub mod tag;
pub mod zone;

pub use arena::{ArenaProvider, BudgetProvider, SystemProvider};
pub use block::{Paragraph, ZONE_ID};
pub use config::{ZoneConfig, MAX_ARENA_BYTES, MAX_OWNER_SLOTS};
pub use error::{ConfigError, ConfigResult, Corruption, ZoneError, ZoneResult};
pub use handle::{Handle, ZonePtr, PARAGRAPH_SIZE};
pub use owner::OwnerSlot;
pub use shared::SharedZone;
pub use tag::Tag;
pub use zone::{BlockInfo, Blocks, Zone, ZoneStats, MIN_FRAGMENT};
