//! # Lump Cache
//!
//! Lump data is kept in purgeable zone blocks. Each cached lump owns one
//! owner slot; when the allocator evicts the block it clears the slot, and
//! the next lookup loads the lump again.

use std::collections::HashMap;

use zone_core::{OwnerSlot, Zone, ZonePtr};

use crate::error::{EngineError, EngineResult};

/// Where lumps are read from.
pub trait LumpSource {
    /// The lump's bytes, or `None` if there is no such lump.
    fn lump(&self, name: &str) -> Option<&[u8]>;
}

/// Lumps held in memory, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct MemoryLumps {
    lumps: HashMap<String, Vec<u8>>,
}

impl MemoryLumps {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a lump.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.lumps.insert(name.into(), data);
    }
}

impl LumpSource for MemoryLumps {
    fn lump(&self, name: &str) -> Option<&[u8]> {
        self.lumps.get(name).map(Vec::as_slice)
    }
}

/// A lump resident in the zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedLump {
    /// Block holding the lump.
    pub ptr: ZonePtr,
    /// Lump length; the block may be longer.
    pub len: usize,
    /// Owner slot the block reports eviction to.
    pub slot: OwnerSlot,
}

impl CachedLump {
    /// The lump's bytes.
    ///
    /// Only valid until the next allocation, which may evict the block.
    ///
    /// # Errors
    ///
    /// [`EngineError::StaleBlock`] if the block was evicted or released,
    /// even when its address has since been handed out again.
    pub fn bytes<'z>(&self, zone: &'z Zone) -> EngineResult<&'z [u8]> {
        if zone.owner(self.slot)? != Some(self.ptr) {
            return Err(EngineError::StaleBlock(self.ptr));
        }
        zone.bytes(self.ptr)?
            .get(..self.len)
            .ok_or(EngineError::StaleBlock(self.ptr))
    }
}

/// Hit and miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a resident block.
    pub hits: u64,
    /// Lookups that had to load the lump.
    pub misses: u64,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    slot: OwnerSlot,
    len: usize,
}

/// Lumps cached in purgeable blocks.
#[derive(Debug, Default)]
pub struct LumpCache {
    entries: HashMap<String, Entry>,
    stats: CacheStats,
}

impl LumpCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit and miss counters so far.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Whether `name` is currently resident.
    ///
    /// # Errors
    ///
    /// Zone errors if the cache's owner slot is no longer registered.
    pub fn is_resident(&self, zone: &Zone, name: &str) -> EngineResult<bool> {
        match self.entries.get(name) {
            Some(entry) => Ok(zone.owner(entry.slot)?.is_some()),
            None => Ok(false),
        }
    }

    /// Returns the resident lump, loading it from `source` if it was never
    /// cached or has been evicted.
    ///
    /// # Errors
    ///
    /// [`EngineError::LumpNotFound`] if `source` lacks the lump, zone errors
    /// from the allocation.
    pub fn cache<S: LumpSource + ?Sized>(
        &mut self,
        zone: &mut Zone,
        source: &S,
        name: &str,
    ) -> EngineResult<CachedLump> {
        if let Some(entry) = self.entries.get(name).copied() {
            if let Some(ptr) = zone.owner(entry.slot)? {
                self.stats.hits += 1;
                return Ok(CachedLump {
                    ptr,
                    len: entry.len,
                    slot: entry.slot,
                });
            }
        }

        let data = source
            .lump(name)
            .ok_or_else(|| EngineError::LumpNotFound(name.to_owned()))?;

        let slot = match self.entries.get(name) {
            Some(entry) => entry.slot,
            None => zone.register_owner()?,
        };
        let ptr = match zone.alloc_cache(data.len(), slot) {
            Ok(ptr) => ptr,
            Err(err) => {
                if !self.entries.contains_key(name) {
                    zone.release_owner(slot)?;
                }
                return Err(err.into());
            }
        };
        zone.bytes_mut(ptr)?[..data.len()].copy_from_slice(data);

        self.stats.misses += 1;
        self.entries.insert(name.to_owned(), Entry { slot, len: data.len() });
        tracing::debug!(lump = name, len = data.len(), %ptr, "lump cached");

        Ok(CachedLump {
            ptr,
            len: data.len(),
            slot,
        })
    }

    /// Drops `name` from the cache, freeing its block if still resident.
    ///
    /// Returns whether the lump was known.
    ///
    /// # Errors
    ///
    /// Zone errors from the free or the slot release.
    pub fn release(&mut self, zone: &mut Zone, name: &str) -> EngineResult<bool> {
        let Some(entry) = self.entries.remove(name) else {
            return Ok(false);
        };
        let resident = zone.owner(entry.slot)?;
        zone.free(resident)?;
        zone.release_owner(entry.slot)?;
        Ok(true)
    }

    /// Drops every lump.
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release).
    pub fn clear(&mut self, zone: &mut Zone) -> EngineResult<()> {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            self.release(zone, &name)?;
        }
        Ok(())
    }
}

/// Loads a lump into a static block, passes its bytes to `f` and frees the
/// block again.
///
/// # Errors
///
/// [`EngineError::LumpNotFound`] if `source` lacks the lump, zone errors from
/// the allocation or the free.
pub fn read_temporary<S, R>(zone: &mut Zone, source: &S, name: &str, f: impl FnOnce(&[u8]) -> R) -> EngineResult<R>
where
    S: LumpSource + ?Sized,
{
    let data = source
        .lump(name)
        .ok_or_else(|| EngineError::LumpNotFound(name.to_owned()))?;

    let ptr = zone.alloc_static(data.len())?;
    zone.bytes_mut(ptr)?[..data.len()].copy_from_slice(data);
    let result = f(&zone.bytes(ptr)?[..data.len()]);
    zone.free(Some(ptr))?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::{Tag, ZoneConfig};

    fn lumps() -> MemoryLumps {
        let mut lumps = MemoryLumps::new();
        lumps.insert("PLAYPAL", vec![1; 768]);
        lumps.insert("STCFN033", vec![2; 90]);
        lumps.insert("FLOOR4_8", vec![3; 4096]);
        lumps
    }

    #[test]
    fn test_second_lookup_hits() {
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(32 * 1024)).unwrap();
        let source = lumps();
        let mut cache = LumpCache::new();

        let first = cache.cache(&mut zone, &source, "PLAYPAL").unwrap();
        let second = cache.cache(&mut zone, &source, "PLAYPAL").unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(first.bytes(&zone).unwrap(), &[1; 768][..]);

        let block = zone.blocks().find(|block| block.ptr == first.ptr).unwrap();
        assert_eq!(block.tag, Some(Tag::Cache));
    }

    #[test]
    fn test_evicted_lump_is_reloaded() {
        // 5120 bytes: the palette and the flat fit, a big static block does
        // not fit beside them.
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(5120)).unwrap();
        let source = lumps();
        let mut cache = LumpCache::new();
        cache.cache(&mut zone, &source, "PLAYPAL").unwrap();
        cache.cache(&mut zone, &source, "FLOOR4_8").unwrap();

        let status = zone.alloc_static(4000).unwrap();
        assert!(!cache.is_resident(&zone, "PLAYPAL").unwrap() || !cache.is_resident(&zone, "FLOOR4_8").unwrap());
        zone.free(Some(status)).unwrap();

        let palette = cache.cache(&mut zone, &source, "PLAYPAL").unwrap();
        let flat = cache.cache(&mut zone, &source, "FLOOR4_8").unwrap();

        assert_eq!(palette.bytes(&zone).unwrap(), &[1; 768][..]);
        assert_eq!(flat.bytes(&zone).unwrap(), &[3; 4096][..]);
        assert!(cache.stats().misses >= 3);
        zone.check_heap().unwrap();
    }

    #[test]
    fn test_stale_lump_reports_reuse() {
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(1024)).unwrap();
        let source = lumps();
        let mut cache = LumpCache::new();
        let palette = cache.cache(&mut zone, &source, "PLAYPAL").unwrap();

        // Only room for the static block once the palette is evicted; it
        // lands on the palette's address and is shorter than the lump.
        let status = zone.alloc_static(400).unwrap();
        assert_eq!(status, palette.ptr);
        assert!(matches!(palette.bytes(&zone), Err(EngineError::StaleBlock(ptr)) if ptr == palette.ptr));

        zone.free(Some(status)).unwrap();
        let small = zone.alloc_static(16).unwrap();
        assert_eq!(small, palette.ptr);
        assert!(matches!(palette.bytes(&zone), Err(EngineError::StaleBlock(_))));
        zone.check_heap().unwrap();
    }

    #[test]
    fn test_missing_lump() {
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(4096)).unwrap();
        let mut cache = LumpCache::new();

        let err = cache.cache(&mut zone, &lumps(), "E9M9").unwrap_err();

        assert!(matches!(err, EngineError::LumpNotFound(name) if name == "E9M9"));
        assert_eq!(zone.stats().owner_slots, 0);
    }

    #[test]
    fn test_release_frees_block_and_slot() {
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(8192)).unwrap();
        let source = lumps();
        let mut cache = LumpCache::new();
        cache.cache(&mut zone, &source, "PLAYPAL").unwrap();
        cache.cache(&mut zone, &source, "STCFN033").unwrap();

        assert!(cache.release(&mut zone, "PLAYPAL").unwrap());
        assert!(!cache.release(&mut zone, "PLAYPAL").unwrap());
        assert_eq!(zone.stats().owner_slots, 1);

        cache.clear(&mut zone).unwrap();
        assert_eq!(zone.used_bytes(), 0);
        assert_eq!(zone.stats().owner_slots, 0);
    }

    #[test]
    fn test_read_temporary_frees_after_use() {
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(8192)).unwrap();
        let source = lumps();

        let width = read_temporary(&mut zone, &source, "STCFN033", |bytes| {
            assert_eq!(bytes.len(), 90);
            bytes.iter().map(|&b| usize::from(b)).sum::<usize>()
        })
        .unwrap();

        assert_eq!(width, 180);
        assert_eq!(zone.used_bytes(), 0);
        assert!(read_temporary(&mut zone, &source, "NOPE", |_| ()).is_err());
    }
}
