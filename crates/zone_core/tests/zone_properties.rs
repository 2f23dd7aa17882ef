//! # Zone Property Tests
//!
//! Whole-allocator scenarios: eviction under pressure, level transitions and
//! a full round trip back to a single free block.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use zone_core::{BudgetProvider, Tag, Zone, ZoneConfig, ZoneError, ZonePtr};

fn zone(bytes: usize) -> Zone {
    Zone::init(&ZoneConfig::with_target_bytes(bytes)).unwrap()
}

/// Test: freeing every block in any order leaves one free block spanning the arena.
#[test]
fn test_free_everything_restores_single_block() {
    let mut zone = zone(256 * 1024);
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut ptrs: Vec<ZonePtr> = (0..200)
        .map(|i| {
            let tag = if i % 3 == 0 { Tag::Static } else { Tag::Level };
            zone.allocate(i * 7 % 900, tag, None).unwrap()
        })
        .collect();
    ptrs.shuffle(&mut rng);

    for ptr in ptrs {
        zone.free(Some(ptr)).unwrap();
        zone.check_heap().unwrap();
    }

    let blocks: Vec<_> = zone.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].is_free());
    assert_eq!(blocks[0].size, zone.arena_bytes());
    assert_eq!(zone.used_bytes(), 0);
}

/// Test: a full arena of cache blocks gives way to a static allocation.
#[test]
fn test_cache_evicted_under_pressure() {
    let mut zone = zone(64 * 1024);

    // 1000 bytes round to a 1024-byte block: 64 of them fill the arena.
    let slots: Vec<_> = (0..64)
        .map(|_| {
            let slot = zone.register_owner().unwrap();
            zone.alloc_cache(1000, slot).unwrap();
            slot
        })
        .collect();
    assert_eq!(zone.total_free(), 0);

    let first = zone.owner(slots[0]).unwrap();
    let ptr = zone.alloc_static(3000).unwrap();
    assert_eq!(Some(ptr), first);

    let evicted: Vec<_> = slots
        .iter()
        .filter(|&&slot| zone.owner(slot).unwrap().is_none())
        .collect();
    assert_eq!(evicted.len(), 3);

    for &slot in &slots {
        if let Some(target) = zone.owner(slot).unwrap() {
            let block = zone.blocks().find(|block| block.ptr == target).unwrap();
            assert!(block.is_owned_by(slot));
            assert_eq!(block.tag, Some(Tag::Cache));
        }
    }
    zone.check_heap().unwrap();
}

/// Test: protected blocks are never evicted, even when that means failing.
#[test]
fn test_protected_blocks_survive_exhaustion() {
    let mut zone = zone(16 * 1024);

    let mut kept = Vec::new();
    loop {
        match zone.alloc_level(500, None) {
            Ok(ptr) => kept.push(ptr),
            Err(ZoneError::ArenaExhausted { total_free, .. }) => {
                assert!(total_free < 528);
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    for ptr in &kept {
        assert!(zone.bytes(*ptr).is_ok());
    }
    zone.check_heap().unwrap();
}

/// Test: a level transition drops level data and keeps static and cache data.
#[test]
fn test_level_transition() {
    let mut zone = zone(64 * 1024);

    let config = zone.alloc_static(100).unwrap();
    let slot = zone.register_owner().unwrap();
    let patch = zone.alloc_cache(2048, slot).unwrap();

    for size in [400, 1200, 64] {
        zone.calloc_level(size).unwrap();
    }
    for _ in 0..2 {
        zone.calloc_level_special(88).unwrap();
    }

    assert_eq!(zone.free_level_scoped().unwrap(), 5);
    zone.check_heap().unwrap();

    let live: Vec<_> = zone.blocks().filter(|block| !block.is_free()).collect();
    assert_eq!(live.len(), 2);
    assert_eq!(live[0].ptr, config);
    assert_eq!(live[0].tag, Some(Tag::Static));
    assert_eq!(live[1].ptr, patch);
    assert_eq!(zone.owner(slot).unwrap(), Some(patch));

    let stats = zone.stats();
    assert_eq!(stats.bytes_for(Tag::Level), 0);
    assert_eq!(stats.bytes_for(Tag::LevelSpecial), 0);
    assert_eq!(stats.used_bytes, 128 + 2064);
}

/// Test: a platform with too little memory gets a smaller arena.
#[test]
fn test_init_backs_off_to_budget() {
    let config = ZoneConfig::from_toml_str(
        r"
        target_bytes = 65536
        backoff_bytes = 1024
        ",
    )
    .unwrap();
    let mut provider = BudgetProvider::new(40_000);

    let mut zone = Zone::init_with(&config, &mut provider).unwrap();

    assert_eq!(provider.refusals(), 25);
    assert_eq!(zone.arena_bytes(), 2496 * 16);
    assert!(zone.alloc_static(39_000).is_ok());
    zone.check_heap().unwrap();
}

/// Test: a platform that refuses everything is reported, not panicked on.
#[test]
fn test_init_fails_without_memory() {
    let mut provider = BudgetProvider::new(16);

    let err = Zone::init_with(&ZoneConfig::with_target_bytes(4096), &mut provider).unwrap_err();

    assert!(matches!(err, ZoneError::ArenaUnavailable { target: 4096 }));
}
