//! # ZONE Engine Drivers
//!
//! The allocator's consumers, reduced to the zone calls they make.
//!
//! ## Level Lifecycle
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  stop sounds │──>│ free level   │──>│ load level   │──>│  run tics    │
//! │              │   │ scoped tags  │   │ CALLOC_LEVEL │   │ thinkers,    │
//! │              │   │              │   │ arrays       │   │ cache, sound │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!        ▲                                                        │
//!        └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `level`: level geometry in level-tagged blocks
//! - `thinker`: level-special thinkers with deferred removal
//! - `cache`: lumps in purgeable blocks behind owner slots
//! - `sound`: the channel bank
//! - `fatal`: the engine's fatal-error path
//! - `soak`: back-to-back level runs against one zone

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod error;
pub mod fatal;
pub mod level;
pub mod soak;
pub mod sound;
pub mod thinker;

pub use cache::{read_temporary, CacheStats, CachedLump, LumpCache, LumpSource, MemoryLumps};
pub use error::{EngineError, EngineResult};
pub use fatal::{fatal, OrFatal};
pub use level::{LevelDesc, LevelLoader, LineDesc, LoadedLevel};
pub use soak::{SoakConfig, SoakReport};
pub use sound::{Channel, Sfx, SoundChannels};
pub use thinker::{Think, ThinkerId, ThinkerList};
