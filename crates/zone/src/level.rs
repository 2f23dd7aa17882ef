//! # Level Loader
//!
//! Builds a level's geometry in level-tagged zone blocks and throws all of it
//! away in one purge at the next level transition.
//!
//! ## Load Order
//!
//! 1. Every lump array becomes one zero-filled level block
//! 2. Line defs are written into the line array
//! 3. Lines are grouped per sector into one shared line table
//!
//! Nothing here is ever freed individually.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use serde::Deserialize;
use zone_core::{Zone, ZonePtr};

use crate::error::{EngineError, EngineResult};

/// Back sector value of a one-sided line.
pub const NO_SECTOR: u32 = u32::MAX;

/// Bytes per subsector record.
pub const SUBSECTOR_BYTES: usize = 4;

/// Bytes per side def record.
pub const SIDE_BYTES: usize = 12;

/// Bytes per map thing record.
pub const THING_BYTES: usize = 40;

/// Bytes per blockmap cell link.
pub const BLOCKLINK_BYTES: usize = 4;

/// A sector as stored in the zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SectorRecord {
    /// Floor height.
    pub floor_height: i16,
    /// Ceiling height.
    pub ceiling_height: i16,
    /// Light level.
    pub light_level: i16,
    /// Special effect number.
    pub special: i16,
    /// First entry of this sector's lines in the line table.
    pub line_start: u32,
    /// Number of lines bounding this sector.
    pub line_count: u32,
}

/// A line def as stored in the zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct LineRecord {
    /// Sector on the right side.
    pub front: u32,
    /// Sector on the left side, or [`NO_SECTOR`].
    pub back: u32,
}

/// One line of a level description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineDesc {
    /// Front sector index.
    pub front: u32,
    /// Back sector index for two-sided lines.
    #[serde(default)]
    pub back: Option<u32>,
}

impl LineDesc {
    /// The back sector, if it differs from the front one.
    #[inline]
    #[must_use]
    pub fn distinct_back(&self) -> Option<u32> {
        self.back.filter(|&back| back != self.front)
    }
}

/// What a level contains, before it is loaded.
///
/// ```toml
/// name = "E1M1"
/// sectors = 2
/// subsectors = 4
/// sides = 3
/// things = 10
/// blockmap_width = 4
/// blockmap_height = 4
///
/// [[lines]]
/// front = 0
///
/// [[lines]]
/// front = 0
/// back = 1
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelDesc {
    /// Map name.
    pub name: String,
    /// Sector count.
    pub sectors: u32,
    /// Subsector count.
    pub subsectors: u32,
    /// Side def count.
    pub sides: u32,
    /// Map thing count.
    pub things: u32,
    /// Blockmap columns.
    pub blockmap_width: u32,
    /// Blockmap rows.
    pub blockmap_height: u32,
    /// Line defs.
    pub lines: Vec<LineDesc>,
}

impl LevelDesc {
    /// Parses a level description from TOML.
    ///
    /// # Errors
    ///
    /// [`EngineError::LevelParse`] on malformed input.
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Checks every line names existing sectors.
    ///
    /// # Errors
    ///
    /// [`EngineError::SectorOutOfRange`] for the first bad line,
    /// [`EngineError::ArrayTooLarge`] if the lines cannot be indexed.
    pub fn validate(&self) -> EngineResult<()> {
        if u32::try_from(self.lines.len()).is_err() {
            return Err(EngineError::ArrayTooLarge {
                what: "line",
                count: self.lines.len(),
            });
        }
        for (line, desc) in self.lines.iter().enumerate() {
            for sector in std::iter::once(desc.front).chain(desc.back) {
                if sector >= self.sectors {
                    return Err(EngineError::SectorOutOfRange {
                        line,
                        sector,
                        sectors: self.sectors,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Zone addresses of a loaded level's arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedLevel {
    /// Map name.
    pub name: String,
    /// [`SectorRecord`] array.
    pub sectors: ZonePtr,
    /// [`LineRecord`] array.
    pub lines: ZonePtr,
    /// Subsector array.
    pub subsectors: ZonePtr,
    /// Side def array.
    pub sides: ZonePtr,
    /// Map thing array.
    pub things: ZonePtr,
    /// Blockmap link heads.
    pub blocklinks: ZonePtr,
    /// Line indices of every sector, back to back.
    pub line_table: ZonePtr,
    sector_count: usize,
    line_count: usize,
}

impl LoadedLevel {
    /// Number of sectors.
    #[inline]
    #[must_use]
    pub const fn sector_count(&self) -> usize {
        self.sector_count
    }

    /// Number of lines.
    #[inline]
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.line_count
    }

    /// The sector records.
    ///
    /// # Errors
    ///
    /// Zone errors if the level has already been purged.
    pub fn sectors<'z>(&self, zone: &'z Zone) -> EngineResult<&'z [SectorRecord]> {
        zone.slice(self.sectors)?
            .get(..self.sector_count)
            .ok_or(EngineError::StaleBlock(self.sectors))
    }

    /// The line records.
    ///
    /// # Errors
    ///
    /// Zone errors if the level has already been purged.
    pub fn lines<'z>(&self, zone: &'z Zone) -> EngineResult<&'z [LineRecord]> {
        zone.slice(self.lines)?
            .get(..self.line_count)
            .ok_or(EngineError::StaleBlock(self.lines))
    }

    /// Indices of the lines bounding `sector`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSector`] if there is no such sector, zone errors
    /// if the level has already been purged.
    pub fn sector_lines<'z>(&self, zone: &'z Zone, sector: usize) -> EngineResult<&'z [u32]> {
        let record = self
            .sectors(zone)?
            .get(sector)
            .ok_or(EngineError::UnknownSector(sector))?;
        let start = record.line_start as usize;
        let end = start + record.line_count as usize;
        zone.slice(self.line_table)?
            .get(start..end)
            .ok_or(EngineError::StaleBlock(self.line_table))
    }
}

/// Loads levels into the zone and tears them down again.
#[derive(Debug, Default)]
pub struct LevelLoader {
    check_heap_on_unload: bool,
    current: Option<LoadedLevel>,
}

impl LevelLoader {
    /// Creates a loader; `check_heap_on_unload` runs the heap check after
    /// every teardown.
    #[must_use]
    pub const fn new(check_heap_on_unload: bool) -> Self {
        Self {
            check_heap_on_unload,
            current: None,
        }
    }

    /// The level currently loaded.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> Option<&LoadedLevel> {
        self.current.as_ref()
    }

    /// Loads `desc`, unloading the current level first.
    ///
    /// If an allocation fails part way, the arrays already allocated are
    /// purged with the rest of the level-scoped blocks.
    ///
    /// # Errors
    ///
    /// Validation errors before anything is allocated, or zone errors while
    /// allocating.
    pub fn load(&mut self, zone: &mut Zone, desc: &LevelDesc) -> EngineResult<&LoadedLevel> {
        desc.validate()?;
        if self.current.is_some() {
            self.unload(zone)?;
        }

        let level = match build_level(zone, desc) {
            Ok(level) => level,
            Err(err) => {
                let released = zone.free_level_scoped()?;
                tracing::warn!(level = %desc.name, released, error = %err, "level load failed");
                return Err(err);
            }
        };

        tracing::info!(
            level = %desc.name,
            sectors = level.sector_count,
            lines = level.line_count,
            used = zone.used_bytes(),
            "level loaded"
        );

        Ok(self.current.insert(level))
    }

    /// Frees every level-scoped block and forgets the current level.
    ///
    /// Returns the number of blocks released. Level thinkers go with it.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoLevel`] if nothing is loaded, zone errors from the
    /// purge or the heap check.
    pub fn unload(&mut self, zone: &mut Zone) -> EngineResult<usize> {
        let level = self.current.take().ok_or(EngineError::NoLevel)?;
        let released = zone.free_level_scoped()?;
        if self.check_heap_on_unload {
            zone.check_heap()?;
        }

        tracing::info!(level = %level.name, released, used = zone.used_bytes(), "level unloaded");
        Ok(released)
    }
}

/// Allocates and fills every array of `desc`.
fn build_level(zone: &mut Zone, desc: &LevelDesc) -> EngineResult<LoadedLevel> {
    let sector_count = desc.sectors as usize;
    let line_count = desc.lines.len();
    let cells = (desc.blockmap_width as usize)
        .checked_mul(desc.blockmap_height as usize)
        .ok_or(EngineError::ArrayTooLarge {
            what: "blockmap",
            count: usize::MAX,
        })?;

    let sectors = calloc_array(zone, "sector", sector_count, size_of::<SectorRecord>())?;
    let sides = calloc_array(zone, "side", desc.sides as usize, SIDE_BYTES)?;
    let lines = calloc_array(zone, "line", line_count, size_of::<LineRecord>())?;
    let blocklinks = calloc_array(zone, "blocklink", cells, BLOCKLINK_BYTES)?;
    let subsectors = calloc_array(zone, "subsector", desc.subsectors as usize, SUBSECTOR_BYTES)?;
    let things = calloc_array(zone, "thing", desc.things as usize, THING_BYTES)?;

    let records = zone.slice_mut::<LineRecord>(lines)?;
    for (record, line) in records.iter_mut().zip(&desc.lines) {
        *record = LineRecord {
            front: line.front,
            back: line.back.unwrap_or(NO_SECTOR),
        };
    }

    let grouped = group_lines(desc);
    let line_table = zone.alloc_level(grouped.table.len() * size_of::<u32>(), None)?;
    zone.slice_mut::<u32>(line_table)?[..grouped.table.len()].copy_from_slice(&grouped.table);

    let records = zone.slice_mut::<SectorRecord>(sectors)?;
    for (record, (start, count)) in records.iter_mut().zip(grouped.ranges) {
        record.line_start = start;
        record.line_count = count;
    }

    Ok(LoadedLevel {
        name: desc.name.clone(),
        sectors,
        lines,
        subsectors,
        sides,
        things,
        blocklinks,
        line_table,
        sector_count,
        line_count,
    })
}

/// Allocates a zeroed level array of `count` records.
fn calloc_array(zone: &mut Zone, what: &'static str, count: usize, record: usize) -> EngineResult<ZonePtr> {
    let bytes = count
        .checked_mul(record)
        .ok_or(EngineError::ArrayTooLarge { what, count })?;
    let ptr = zone.calloc_level(bytes)?;
    tracing::trace!(what, count, bytes, %ptr, "level array");
    Ok(ptr)
}

struct GroupedLines {
    table: Vec<u32>,
    /// `(start, count)` per sector.
    ranges: Vec<(u32, u32)>,
}

/// Collects each sector's lines. A two-sided line is listed under both of
/// its sectors unless they are the same sector.
fn group_lines(desc: &LevelDesc) -> GroupedLines {
    let mut counts = vec![0u32; desc.sectors as usize];
    for line in &desc.lines {
        counts[line.front as usize] += 1;
        if let Some(back) = line.distinct_back() {
            counts[back as usize] += 1;
        }
    }

    let mut starts = Vec::with_capacity(counts.len());
    let mut total = 0;
    for &count in &counts {
        starts.push(total);
        total += count;
    }

    let mut table = vec![0; total as usize];
    let mut filled = vec![0u32; counts.len()];
    for (index, line) in (0u32..).zip(&desc.lines) {
        for sector in std::iter::once(line.front).chain(line.distinct_back()) {
            let sector = sector as usize;
            table[(starts[sector] + filled[sector]) as usize] = index;
            filled[sector] += 1;
        }
    }

    GroupedLines {
        table,
        ranges: starts.into_iter().zip(counts).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::{ZoneConfig, ZoneError};

    fn zone() -> Zone {
        Zone::init(&ZoneConfig::with_target_bytes(64 * 1024)).unwrap()
    }

    fn line(front: u32, back: Option<u32>) -> LineDesc {
        LineDesc { front, back }
    }

    fn three_sectors() -> LevelDesc {
        LevelDesc {
            name: "E1M1".into(),
            sectors: 3,
            subsectors: 5,
            sides: 8,
            things: 12,
            blockmap_width: 4,
            blockmap_height: 3,
            lines: vec![
                line(0, None),
                line(0, Some(1)),
                line(1, Some(2)),
                line(2, Some(2)),
                line(1, None),
            ],
        }
    }

    #[test]
    fn test_lines_grouped_per_sector() {
        let mut zone = zone();
        let mut loader = LevelLoader::new(true);

        let level = loader.load(&mut zone, &three_sectors()).unwrap().clone();

        assert_eq!(level.sector_lines(&zone, 0).unwrap(), &[0, 1]);
        assert_eq!(level.sector_lines(&zone, 1).unwrap(), &[1, 2, 4]);
        assert_eq!(level.sector_lines(&zone, 2).unwrap(), &[2, 3]);
        assert!(matches!(
            level.sector_lines(&zone, 3),
            Err(EngineError::UnknownSector(3))
        ));

        let lines = level.lines(&zone).unwrap();
        assert_eq!(lines[0], LineRecord { front: 0, back: NO_SECTOR });
        assert_eq!(lines[3], LineRecord { front: 2, back: 2 });
        zone.check_heap().unwrap();
    }

    #[test]
    fn test_level_arrays_are_zeroed_level_blocks() {
        let mut zone = zone();
        // Dirty the arena first so zeroing is observable.
        let scratch = zone.alloc_static(4096).unwrap();
        zone.bytes_mut(scratch).unwrap().fill(0xAA);
        zone.free(Some(scratch)).unwrap();

        let mut loader = LevelLoader::default();
        let level = loader.load(&mut zone, &three_sectors()).unwrap().clone();

        assert!(zone.bytes(level.things).unwrap().iter().all(|&b| b == 0));
        assert!(zone.bytes(level.blocklinks).unwrap().iter().all(|&b| b == 0));
        assert_eq!(zone.bytes(level.blocklinks).unwrap().len(), 48);

        // Seven arrays, all level scoped.
        assert_eq!(zone.blocks().filter(|block| !block.is_free()).count(), 7);
        assert_eq!(loader.unload(&mut zone).unwrap(), 7);
        assert_eq!(zone.used_bytes(), 0);
    }

    #[test]
    fn test_load_replaces_current_level() {
        let mut zone = zone();
        let mut loader = LevelLoader::new(true);
        loader.load(&mut zone, &three_sectors()).unwrap();
        let used = zone.used_bytes();

        let mut next = three_sectors();
        next.name = "E1M2".into();
        loader.load(&mut zone, &next).unwrap();

        assert_eq!(loader.current().map(|level| level.name.as_str()), Some("E1M2"));
        assert_eq!(zone.used_bytes(), used);
    }

    #[test]
    fn test_bad_sector_rejected_before_allocation() {
        let mut zone = zone();
        let mut loader = LevelLoader::default();
        let mut desc = three_sectors();
        desc.lines.push(line(1, Some(7)));

        let err = loader.load(&mut zone, &desc).unwrap_err();

        assert!(matches!(
            err,
            EngineError::SectorOutOfRange { line: 5, sector: 7, sectors: 3 }
        ));
        assert_eq!(zone.used_bytes(), 0);
        assert!(loader.current().is_none());
    }

    #[test]
    fn test_failed_load_releases_partial_level() {
        let mut zone = Zone::init(&ZoneConfig::with_target_bytes(2048)).unwrap();
        let mut loader = LevelLoader::new(true);
        let mut crowded = three_sectors();
        crowded.things = 100;

        let err = loader.load(&mut zone, &crowded).unwrap_err();

        assert!(matches!(err, EngineError::Zone(ZoneError::ArenaExhausted { .. })));
        assert!(loader.current().is_none());
        assert_eq!(zone.used_bytes(), 0);
        zone.check_heap().unwrap();

        loader.load(&mut zone, &three_sectors()).unwrap();
        assert_eq!(loader.unload(&mut zone).unwrap(), 7);
    }

    #[test]
    fn test_purged_level_arrays_read_as_stale() {
        let mut zone = zone();
        let mut loader = LevelLoader::default();
        let level = loader.load(&mut zone, &three_sectors()).unwrap().clone();
        loader.unload(&mut zone).unwrap();

        // The whole arena is free again; the next block starts where the
        // sector array did and is too short to hold it.
        let small = zone.alloc_static(16).unwrap();
        assert_eq!(small, level.sectors);

        assert!(matches!(level.sectors(&zone), Err(EngineError::StaleBlock(ptr)) if ptr == level.sectors));
        assert!(matches!(level.sector_lines(&zone, 0), Err(EngineError::StaleBlock(_))));
    }

    #[test]
    fn test_unload_without_level() {
        let mut zone = zone();
        let mut loader = LevelLoader::default();

        assert!(matches!(loader.unload(&mut zone), Err(EngineError::NoLevel)));
    }

    #[test]
    fn test_static_data_survives_unload() {
        let mut zone = zone();
        let config = zone.alloc_static(256).unwrap();
        let mut loader = LevelLoader::new(true);
        loader.load(&mut zone, &three_sectors()).unwrap();

        loader.unload(&mut zone).unwrap();

        assert!(zone.bytes(config).is_ok());
        assert_eq!(zone.used_bytes(), 256 + 16);
    }

    #[test]
    fn test_desc_from_toml() {
        let desc = LevelDesc::from_toml_str(
            r#"
            name = "E1M3"
            sectors = 2
            things = 4

            [[lines]]
            front = 0

            [[lines]]
            front = 0
            back = 1
            "#,
        )
        .unwrap();

        assert_eq!(desc.name, "E1M3");
        assert_eq!(desc.sides, 0);
        assert_eq!(desc.lines, vec![line(0, None), line(0, Some(1))]);
        assert!(desc.validate().is_ok());
        assert!(LevelDesc::from_toml_str("sectors = -1").is_err());
    }
}
