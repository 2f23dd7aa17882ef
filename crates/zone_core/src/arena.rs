//! # Arena
//!
//! The single region every zone block is carved from. It is obtained once at
//! startup and never resized.
//!
//! ## Acquisition
//!
//! The platform is asked for the configured target size first. On refusal the
//! request shrinks by a fixed step until something is granted, so the zone
//! always gets the largest arena the platform will give.

use bytemuck::Zeroable;

use crate::block::{BlockHeader, Paragraph};
use crate::config::ZoneConfig;
use crate::error::{ZoneError, ZoneResult};
use crate::handle::{Handle, PARAGRAPH_SIZE};

/// Smallest usable arena: one header and one payload paragraph.
const MIN_ARENA_PARAGRAPHS: usize = 2;

/// Source of arena memory.
///
/// The zone asks once per size until a request is granted.
pub trait ArenaProvider {
    /// Returns zeroed storage of exactly `paragraphs` paragraphs, or `None`
    /// if the platform refuses.
    fn grant(&mut self, paragraphs: usize) -> Option<Box<[Paragraph]>>;
}

/// Takes the arena from the process heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProvider;

impl ArenaProvider for SystemProvider {
    fn grant(&mut self, paragraphs: usize) -> Option<Box<[Paragraph]>> {
        let mut storage = Vec::new();
        storage.try_reserve_exact(paragraphs).ok()?;
        storage.resize(paragraphs, Paragraph::zeroed());
        Some(storage.into_boxed_slice())
    }
}

/// A platform with a hard memory ceiling.
///
/// Refuses every request above the budget, like a real-mode machine refusing
/// a far allocation bigger than what is left below 640 KiB.
#[derive(Clone, Debug)]
pub struct BudgetProvider {
    budget_bytes: usize,
    refusals: usize,
}

impl BudgetProvider {
    /// Creates a provider that grants at most `budget_bytes`.
    #[must_use]
    pub const fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            refusals: 0,
        }
    }

    /// Number of requests refused so far.
    #[inline]
    #[must_use]
    pub const fn refusals(&self) -> usize {
        self.refusals
    }
}

impl ArenaProvider for BudgetProvider {
    fn grant(&mut self, paragraphs: usize) -> Option<Box<[Paragraph]>> {
        if paragraphs.saturating_mul(PARAGRAPH_SIZE) > self.budget_bytes {
            self.refusals += 1;
            return None;
        }
        SystemProvider.grant(paragraphs)
    }
}

/// The arena storage.
///
/// Paragraph 0 is reserved for the block list sentinel; the usable arena
/// starts at [`Handle::FIRST`].
pub(crate) struct Arena {
    paragraphs: Box<[Paragraph]>,
}

impl Arena {
    /// Obtains the largest arena `provider` will grant, up to the target.
    pub fn acquire<P: ArenaProvider + ?Sized>(config: &ZoneConfig, provider: &mut P) -> ZoneResult<Self> {
        let step = (config.backoff_bytes / PARAGRAPH_SIZE).max(1);
        let mut usable = config.target_bytes / PARAGRAPH_SIZE;

        while usable >= MIN_ARENA_PARAGRAPHS {
            // One extra paragraph for the sentinel.
            if let Some(paragraphs) = provider.grant(usable + 1) {
                if usable * PARAGRAPH_SIZE < config.target_bytes {
                    tracing::warn!(
                        target = config.target_bytes,
                        granted = usable * PARAGRAPH_SIZE,
                        "arena request backed off"
                    );
                }
                return Ok(Self { paragraphs });
            }
            tracing::debug!(paragraphs = usable, "arena request refused");
            usable = usable.saturating_sub(step);
        }

        Err(ZoneError::ArenaUnavailable {
            target: config.target_bytes,
        })
    }

    /// Bytes available to blocks, excluding the sentinel.
    #[inline]
    pub fn usable_bytes(&self) -> usize {
        (self.paragraphs.len() - 1) * PARAGRAPH_SIZE
    }

    /// One past the last paragraph.
    #[inline]
    pub fn end(&self) -> Handle {
        // Bounded by MAX_ARENA_BYTES at config validation.
        Handle::new(u32::try_from(self.paragraphs.len()).unwrap_or(u32::MAX))
    }

    /// Whether `handle` names a paragraph of the arena.
    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        handle.slot() < self.paragraphs.len()
    }

    #[inline]
    pub fn header(&self, handle: Handle) -> &BlockHeader {
        bytemuck::cast_ref(&self.paragraphs[handle.slot()])
    }

    #[inline]
    pub fn header_mut(&mut self, handle: Handle) -> &mut BlockHeader {
        bytemuck::cast_mut(&mut self.paragraphs[handle.slot()])
    }

    /// Payload bytes of the block at `header`.
    pub fn payload(&self, header: Handle) -> &[u8] {
        let start = header.slot() + 1;
        let end = header.slot() + self.header(header).paragraphs() as usize;
        bytemuck::cast_slice(&self.paragraphs[start..end])
    }

    /// Mutable payload bytes of the block at `header`.
    pub fn payload_mut(&mut self, header: Handle) -> &mut [u8] {
        let start = header.slot() + 1;
        let end = header.slot() + self.header(header).paragraphs() as usize;
        bytemuck::cast_slice_mut(&mut self.paragraphs[start..end])
    }
}
