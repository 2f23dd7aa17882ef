//! # Soak Runner
//!
//! Plays generated levels back to back against one zone the way the engine
//! does: load the level, spawn thinkers, run tics that think, make noise and
//! touch the lump cache, then tear the level down.
//!
//! ```toml
//! levels = 20
//! tics_per_level = 350
//! seed = 1
//!
//! [zone]
//! target_bytes = 655360
//! check_heap_on_purge = true
//! ```

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use zone_core::{ConfigError, Zone, ZoneConfig, ZoneStats};

use crate::cache::{read_temporary, CacheStats, LumpCache, MemoryLumps};
use crate::error::EngineResult;
use crate::level::{LevelDesc, LevelLoader, LineDesc};
use crate::sound::{Sfx, SoundChannels};
use crate::thinker::{Think, ThinkerList};

/// Soak run settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SoakConfig {
    /// Allocator settings.
    pub zone: ZoneConfig,
    /// Levels to play.
    pub levels: u32,
    /// Tics per level.
    pub tics_per_level: u32,
    /// Seed for level generation and the run itself.
    pub seed: u64,
    /// Sectors per generated level.
    pub sectors: u32,
    /// Thinkers spawned when a level starts.
    pub thinkers_per_level: u32,
    /// Distinct lumps the cache is asked for.
    pub lumps: u32,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            zone: ZoneConfig::default(),
            levels: 9,
            tics_per_level: 350,
            seed: 1,
            sectors: 200,
            thinkers_per_level: 64,
            lumps: 32,
        }
    }
}

impl SoakConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] wrapped in [`EngineError::Config`](crate::EngineError::Config).
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(source).map_err(ConfigError::from)?;
        config.zone.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// See [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let source = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_toml_str(&source)
    }
}

/// What a soak run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoakReport {
    /// Levels played.
    pub levels: u32,
    /// Tics run across all levels.
    pub tics: u64,
    /// Thinkers freed by deferred removal.
    pub thinkers_freed: usize,
    /// Blocks released by level teardowns.
    pub level_blocks_released: usize,
    /// Sounds that found a channel.
    pub sounds_started: usize,
    /// Lump cache counters.
    pub cache: CacheStats,
    /// Zone usage at the end of the run.
    pub stats: ZoneStats,
}

const SOUNDS: [Sfx; 4] = [
    Sfx { id: 1, priority: 64, ticks: 35 },
    Sfx { id: 2, priority: 78, ticks: 10 },
    Sfx { id: 3, priority: 32, ticks: 70 },
    Sfx { id: 4, priority: 100, ticks: 5 },
];

/// Plays `config.levels` generated levels against a fresh zone.
///
/// # Errors
///
/// The first config or zone error; the run does not continue past it.
pub fn run(config: &SoakConfig) -> EngineResult<SoakReport> {
    config.zone.validate()?;
    let mut zone = Zone::init(&config.zone)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let (lumps, names) = generate_lumps(&mut rng, config.lumps.max(1));
    let mut loader = LevelLoader::new(config.zone.check_heap_on_purge);
    let mut thinkers = ThinkerList::new();
    let mut sounds = SoundChannels::new();
    let mut cache = LumpCache::new();
    let mut report = SoakReport::default();
    let mut tic: i32 = 0;

    for map in 1..=config.levels {
        // Sounds stop before the level they play in goes away.
        sounds.stop_all();
        if loader.current().is_some() {
            report.level_blocks_released += loader.unload(&mut zone)?;
            thinkers.reset();
        }

        let desc = generate_level(&mut rng, map, config.sectors.max(1));
        loader.load(&mut zone, &desc)?;
        for _ in 0..config.thinkers_per_level {
            thinkers.add(&mut zone, rng.gen_range(40..160))?;
        }

        for _ in 0..config.tics_per_level {
            report.thinkers_freed += thinkers.run(&mut zone, |id, state| {
                state[0] = state[0].wrapping_add(1);
                if (id.raw() + u32::from(state[0])) % 97 == 0 {
                    Think::Remove
                } else {
                    Think::Continue
                }
            })?;

            if rng.gen_ratio(1, 8) {
                thinkers.add(&mut zone, rng.gen_range(40..160))?;
            }

            let name = &names[rng.gen_range(0..names.len())];
            cache.cache(&mut zone, &lumps, name)?;

            if rng.gen_ratio(1, 4) {
                let sfx = SOUNDS[rng.gen_range(0..SOUNDS.len())];
                if sounds.start_sound(sfx, Some(rng.gen_range(0..16)), tic).is_some() {
                    report.sounds_started += 1;
                }
            }
            sounds.update(tic);

            tic = tic.wrapping_add(1);
            report.tics += 1;
        }

        // Intermission text: load the font, draw, free it again.
        read_temporary(&mut zone, &lumps, &names[0], <[u8]>::len)?;

        report.levels += 1;
        tracing::debug!(
            map,
            thinkers = thinkers.len(),
            used = zone.used_bytes(),
            largest_free = zone.largest_free_block(),
            "level finished"
        );
    }

    sounds.stop_all();
    if loader.current().is_some() {
        report.level_blocks_released += loader.unload(&mut zone)?;
        thinkers.reset();
    }
    zone.check_heap()?;

    report.cache = cache.stats();
    report.stats = zone.stats();
    Ok(report)
}

fn generate_lumps(rng: &mut ChaCha8Rng, count: u32) -> (MemoryLumps, Vec<String>) {
    let mut lumps = MemoryLumps::new();
    let names: Vec<String> = (0..count).map(|index| format!("LUMP{index:04}")).collect();
    for (index, name) in names.iter().enumerate() {
        let len = rng.gen_range(256..8192);
        lumps.insert(name.clone(), vec![(index % 251) as u8; len]);
    }
    (lumps, names)
}

fn generate_level(rng: &mut ChaCha8Rng, map: u32, sectors: u32) -> LevelDesc {
    let lines = (0..sectors * 5 / 2)
        .map(|_| {
            let front = rng.gen_range(0..sectors);
            let back = rng.gen_bool(0.6).then(|| rng.gen_range(0..sectors));
            LineDesc { front, back }
        })
        .collect();

    LevelDesc {
        name: format!("E1M{map}"),
        sectors,
        subsectors: sectors * 2,
        sides: sectors * 5,
        things: sectors * 3 / 4,
        blockmap_width: 32,
        blockmap_height: 32,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::Tag;

    fn small() -> SoakConfig {
        SoakConfig {
            levels: 3,
            tics_per_level: 100,
            sectors: 40,
            thinkers_per_level: 16,
            lumps: 8,
            ..SoakConfig::default()
        }
    }

    #[test]
    fn test_run_leaves_only_cache_behind() {
        let report = run(&small()).unwrap();

        assert_eq!(report.levels, 3);
        assert_eq!(report.tics, 300);
        assert!(report.level_blocks_released > 0);
        assert_eq!(report.stats.bytes_for(Tag::Level), 0);
        assert_eq!(report.stats.bytes_for(Tag::LevelSpecial), 0);
        assert_eq!(report.stats.bytes_for(Tag::Static), 0);
        assert_eq!(report.stats.used_bytes, report.stats.bytes_for(Tag::Cache));
        assert_eq!(report.cache.hits + report.cache.misses, 300);
    }

    #[test]
    fn test_run_is_deterministic() {
        assert_eq!(run(&small()).unwrap(), run(&small()).unwrap());
    }

    #[test]
    fn test_cramped_zone_fails_cleanly() {
        let mut config = small();
        config.zone = ZoneConfig::with_target_bytes(4096);

        assert!(run(&config).is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config = SoakConfig::from_toml_str(
            r"
            levels = 2
            seed = 99

            [zone]
            target_bytes = 131072
            check_heap_on_purge = true
            ",
        )
        .unwrap();

        assert_eq!(config.levels, 2);
        assert_eq!(config.seed, 99);
        assert_eq!(config.tics_per_level, 350);
        assert_eq!(config.zone.target_bytes, 131_072);
        assert!(config.zone.check_heap_on_purge);

        assert!(SoakConfig::from_toml_str("[zone]\nbackoff_bytes = 0").is_err());
        assert!(SoakConfig::from_toml_str("level = 3").is_err());
    }
}
