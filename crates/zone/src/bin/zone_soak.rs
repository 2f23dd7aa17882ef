//! # ZONE Soak
//!
//! Plays generated levels back to back against one zone and reports how the
//! arena looks afterwards. Any zone error ends the run through the fatal
//! path.
//!
//! ```bash
//! # Default run: 640 KiB zone, 9 levels
//! ./zone_soak
//!
//! # Custom run, with every allocation traced
//! RUST_LOG=zone_core=trace ./zone_soak soak.toml
//! ```

use tracing_subscriber::EnvFilter;
use zone_core::Tag;
use zone::{soak, OrFatal, SoakConfig};

fn main() {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => SoakConfig::from_file(path).or_fatal(),
        None => SoakConfig::default(),
    };

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                         ZONE SOAK v0.1.0");
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Zone target:    {} bytes", config.zone.target_bytes);
    println!("  Levels:         {}", config.levels);
    println!("  Tics per level: {}", config.tics_per_level);
    println!("  Seed:           {}", config.seed);
    println!();

    let report = soak::run(&config).or_fatal();
    let stats = report.stats;

    println!("  Levels played:       {}", report.levels);
    println!("  Tics run:            {}", report.tics);
    println!("  Level blocks freed:  {}", report.level_blocks_released);
    println!("  Thinkers freed:      {}", report.thinkers_freed);
    println!("  Sounds started:      {}", report.sounds_started);
    println!("  Cache hits / misses: {} / {}", report.cache.hits, report.cache.misses);
    println!();
    println!("  Arena:        {} bytes", stats.arena_bytes);
    println!("  Used:         {} bytes in {} blocks", stats.used_bytes, stats.blocks - stats.free_blocks);
    println!("  Free:         {} bytes in {} blocks", stats.free_bytes, stats.free_blocks);
    println!("  Largest free: {} bytes", stats.largest_free);
    for tag in Tag::ALL {
        println!("  {tag:<13} {} bytes", stats.bytes_for(tag));
    }
    println!("═══════════════════════════════════════════════════════════════════");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
