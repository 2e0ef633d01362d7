use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

use crate::cache::Cache;
use crate::config::{CachePolicy, HierarchyConfig};
use crate::hierarchy::CacheHierarchy;
use crate::memory::MemoryStore;
use crate::replacement_policies::ReplacementPolicy;
use crate::stats::{HierarchyReport, LevelReport, Statistics};
use crate::trace::{AccessKind, Operation, TraceEvent, TraceReader};

fn store() -> Rc<RefCell<MemoryStore>> {
    Rc::new(RefCell::new(MemoryStore::new()))
}

fn single_cache(policy: CachePolicy) -> (Cache, Rc<RefCell<MemoryStore>>) {
    let memory = store();
    let cache = Cache::new(policy, None, memory.clone()).unwrap();
    (cache, memory)
}

/// 128 B, 64-byte blocks, direct-mapped: two sets, so 0 and 128 conflict
fn tiny_policy() -> CachePolicy {
    CachePolicy::new(128, 64, 1, 1, 10)
}

/// 256 B, 64-byte blocks, 2-way: set 0 holds two of {0, 128, 256}
fn two_way_policy() -> CachePolicy {
    CachePolicy::new(256, 64, 2, 1, 10)
}

fn stats(
    num_read: u64,
    num_write: u64,
    num_hit: u64,
    num_miss: u64,
    total_cycles: u64,
) -> Statistics {
    Statistics {
        num_read,
        num_write,
        num_hit,
        num_miss,
        total_cycles,
    }
}

#[test]
fn policy_validation_rejects_bad_geometry() {
    assert!(CachePolicy::l1_default().validate().is_ok());

    let mut policy = CachePolicy::l1_default();
    policy.cache_size = 12288;
    assert!(policy.validate().is_err());

    let mut policy = CachePolicy::l1_default();
    policy.block_size = 48;
    assert!(policy.validate().is_err());

    let mut policy = CachePolicy::l1_default();
    policy.block_num += 1;
    assert!(policy.validate().is_err());

    let mut policy = CachePolicy::l1_default();
    policy.associativity = 3;
    assert!(policy.validate().is_err());

    let mut policy = CachePolicy::l1_default();
    policy.associativity = 0;
    assert!(policy.validate().is_err());

    let memory = store();
    let mut bad = CachePolicy::l1_default();
    bad.cache_size = 12288;
    assert!(Cache::new(bad, None, memory).is_err());
}

#[test]
fn address_decoding_round_trips() {
    let policies = [
        CachePolicy::l1_default(),
        CachePolicy::l2_default(),
        CachePolicy::l3_default(),
        CachePolicy::victim_default(),
    ];
    let addrs = [0, 1, 63, 64, 4095, 16384, 0x1234_5678, 0xffff_ffff];
    for policy in policies {
        let sets = policy.block_num / policy.associativity;
        for addr in addrs {
            assert_eq!(
                policy.addr_of(policy.tag_of(addr), policy.set_of(addr)),
                policy.block_base(addr)
            );
            assert_eq!(policy.offset_of(addr), addr % policy.block_size);
            assert!(policy.set_of(addr) < sets);
        }
    }
}

#[test]
fn pages_are_lazy_zero_filled_and_idempotent() {
    let mut memory = MemoryStore::new();
    assert!(!memory.has_page(0x1000));
    assert!(memory.ensure_page(0x1000));
    assert!(!memory.ensure_page(0x1000));
    assert!(memory.has_page(0x1234));
    assert!(!memory.has_page(0x2000));

    assert_eq!(memory.get_byte(0x1abc), 0);
    memory.set_byte(0x1abc, 0x5a);
    assert_eq!(memory.get_byte(0x1abc), 0x5a);
}

#[test]
#[should_panic(expected = "unmapped addr")]
fn unmapped_byte_access_panics() {
    let memory = MemoryStore::new();
    memory.get_byte(0x5000);
}

#[test]
fn cold_read_misses_at_every_level() {
    let mut hierarchy = CacheHierarchy::new(&HierarchyConfig::default()).unwrap();
    hierarchy.access(Operation::Read, 0);
    let report = hierarchy.report();
    assert_eq!(report.levels[0].statistics, stats(1, 0, 0, 1, 8));
    assert_eq!(report.levels[1].statistics, stats(1, 0, 0, 1, 20));
    assert_eq!(report.levels[2].statistics, stats(1, 0, 0, 1, 100));
}

#[test]
fn second_read_hits_in_l1() {
    let mut hierarchy = CacheHierarchy::new(&HierarchyConfig::default()).unwrap();
    hierarchy.access(Operation::Read, 0);
    hierarchy.access(Operation::Read, 0);
    let report = hierarchy.report();
    assert_eq!(report.levels[0].statistics, stats(2, 0, 1, 1, 9));
    // The lower levels saw only the first fill
    assert_eq!(report.levels[1].statistics, stats(1, 0, 0, 1, 20));
}

#[test]
fn write_allocates_then_read_hits() {
    let mut hierarchy = CacheHierarchy::new(&HierarchyConfig::default()).unwrap();
    hierarchy.access(Operation::Write, 0);
    hierarchy.access(Operation::Read, 0);
    let report = hierarchy.report();
    assert_eq!(report.levels[0].statistics, stats(1, 1, 1, 1, 9));
    // The fill for a write miss is accounted as a write below
    assert_eq!(report.levels[1].statistics, stats(0, 1, 0, 1, 20));
}

#[test]
fn written_data_survives_eviction_via_writeback() {
    let (mut cache, memory) = single_cache(tiny_policy());
    memory.borrow_mut().ensure_page(0);

    cache.write(0, 42);
    assert_eq!(memory.borrow().get_byte(0), 0);
    // Conflicting read forces the dirty block out
    cache.read(128);
    assert_eq!(memory.borrow().get_byte(0), 42);
    assert_eq!(cache.read(0), 42);
}

#[test]
fn writeback_disabled_drops_dirty_evictions() {
    let mut policy = tiny_policy();
    policy.writeback_enabled = false;
    let (mut cache, memory) = single_cache(policy);
    memory.borrow_mut().ensure_page(0);

    cache.write(0, 42);
    cache.read(128);
    assert_eq!(memory.borrow().get_byte(0), 0);
    assert_eq!(cache.read(0), 0);
}

#[test]
fn dirty_eviction_lands_in_lower_cache_not_memory() {
    let memory = store();
    let l2 = Rc::new(RefCell::new(
        Cache::new(CachePolicy::l2_default(), None, memory.clone()).unwrap(),
    ));
    let mut l1 = Cache::new(tiny_policy(), Some(l2), memory.clone()).unwrap();
    memory.borrow_mut().ensure_page(0);

    l1.write(0, 9);
    l1.read(128);
    // The block is parked dirty in L2; memory is still stale
    assert_eq!(memory.borrow().get_byte(0), 0);
    assert_eq!(l1.read(0), 9);
}

#[test]
fn direct_mapped_conflict_pair_always_misses() {
    let (mut cache, memory) = single_cache(CachePolicy::l1_default());
    memory.borrow_mut().ensure_page(0);
    memory.borrow_mut().ensure_page(16384);

    for addr in [0, 16384, 0, 16384] {
        cache.read(addr);
    }
    assert_eq!(cache.statistics(), stats(4, 0, 0, 4, 32));
}

#[test]
fn one_line_over_capacity_evicts_the_first_line() {
    let (mut cache, memory) = single_cache(CachePolicy::l1_default());
    for line in 0..=256u32 {
        let addr = line * 64;
        memory.borrow_mut().ensure_page(addr);
        cache.read(addr);
    }
    let statistics = cache.statistics();
    assert_eq!(statistics.num_miss, 257);
    assert_eq!(statistics.num_hit, 0);
    assert!(!cache.in_cache(0));
    assert!(cache.in_cache(64));
    assert!(cache.in_cache(16384));
}

#[test]
fn lru_keeps_the_rereferenced_line() {
    let (mut cache, memory) = single_cache(two_way_policy());
    memory.borrow_mut().ensure_page(0);
    for addr in [0, 128, 0, 256] {
        cache.read(addr);
    }
    assert!(cache.in_cache(0));
    assert!(!cache.in_cache(128));
    assert!(cache.in_cache(256));
}

#[test]
fn fifo_evicts_the_oldest_line_regardless_of_use() {
    let mut policy = two_way_policy();
    policy.replacement = ReplacementPolicy::FirstInFirstOut;
    let (mut cache, memory) = single_cache(policy);
    memory.borrow_mut().ensure_page(0);
    for addr in [0, 128, 0, 256] {
        cache.read(addr);
    }
    assert!(!cache.in_cache(0));
    assert!(cache.in_cache(128));
    assert!(cache.in_cache(256));
}

#[test]
fn lru_and_fifo_agree_on_touch_once_traces() {
    for replacement in [
        ReplacementPolicy::LeastRecentlyUsed,
        ReplacementPolicy::FirstInFirstOut,
    ] {
        let mut policy = two_way_policy();
        policy.replacement = replacement;
        let (mut cache, memory) = single_cache(policy);
        memory.borrow_mut().ensure_page(0);
        for addr in [0, 128, 256] {
            cache.read(addr);
        }
        assert!(!cache.in_cache(0), "{replacement:?}");
        assert!(cache.in_cache(128), "{replacement:?}");
        assert!(cache.in_cache(256), "{replacement:?}");
    }
}

#[test]
fn victim_cache_rescues_conflict_misses() {
    let config = HierarchyConfig {
        victim: true,
        ..HierarchyConfig::default()
    };
    let mut hierarchy = CacheHierarchy::new(&config).unwrap();
    for addr in [0, 16384, 0] {
        hierarchy.access(Operation::Read, addr);
    }
    let report = hierarchy.report();
    // Raw L1 missed all three times; the victim hit is folded into the view
    assert_eq!(report.levels[0].statistics, stats(3, 0, 1, 2, 24));
    // The rescued access never reached L2
    assert_eq!(report.levels[1].statistics.num_read, 2);
}

#[test]
fn statistics_view_is_a_pure_snapshot() {
    let config = HierarchyConfig {
        victim: true,
        ..HierarchyConfig::default()
    };
    let mut hierarchy = CacheHierarchy::new(&config).unwrap();
    for addr in [0, 16384, 0] {
        hierarchy.access(Operation::Read, addr);
    }
    assert_eq!(
        hierarchy.report().levels[0].statistics,
        hierarchy.report().levels[0].statistics
    );
}

#[test]
fn victim_cache_preserves_dirty_data() {
    let memory = store();
    let mut cache = Cache::new(CachePolicy::l1_default(), None, memory.clone()).unwrap();
    let victim = Cache::new(CachePolicy::victim_default(), None, memory.clone()).unwrap();
    cache.attach_victim(victim);
    memory.borrow_mut().ensure_page(0);
    memory.borrow_mut().ensure_page(16384);

    cache.write(0, 7);
    // Dirty block bounces into the victim cache and back, twice
    cache.read(16384);
    assert_eq!(cache.read(0), 7);
    cache.read(16384);
    assert_eq!(cache.read(0), 7);
    // The data only ever lived in the caches
    assert_eq!(memory.borrow().get_byte(0), 0);
}

#[test]
fn prefetcher_learns_an_ascending_stride() {
    let config = HierarchyConfig {
        prefetch: true,
        ..HierarchyConfig::default()
    };
    let mut hierarchy = CacheHierarchy::new(&config).unwrap();
    for i in 0..8u32 {
        hierarchy.access(Operation::Read, i * 64);
    }
    // Training takes the first accesses; the prefetcher arms after four
    // identical strides and fetches ahead of the last access
    let l1 = hierarchy.report().levels[0].statistics;
    assert_eq!(l1, stats(8, 0, 1, 7, 57));
}

#[test]
fn prefetcher_follows_a_descending_stride() {
    let config = HierarchyConfig {
        prefetch: true,
        ..HierarchyConfig::default()
    };
    let mut hierarchy = CacheHierarchy::new(&config).unwrap();
    for i in 0..8u32 {
        hierarchy.access(Operation::Read, 448 - i * 64);
    }
    let l1 = hierarchy.report().levels[0].statistics;
    assert_eq!(l1.num_hit, 1);
    assert_eq!(l1.num_miss, 7);
}

#[test]
fn fetch_counts_nothing_at_its_own_level() {
    let (mut cache, memory) = single_cache(CachePolicy::l1_default());
    memory.borrow_mut().ensure_page(0);
    cache.fetch(0);
    assert_eq!(cache.statistics(), Statistics::default());
    assert!(cache.in_cache(0));
    // A later read of the prefetched line is a plain hit
    cache.read(0);
    assert_eq!(cache.statistics(), stats(1, 0, 1, 0, 1));
}

#[test]
fn trace_reader_parses_both_line_forms() {
    let input = "r 1f\nw ff0\nr abc D\nw 10 I\n\nr ffffffff\n";
    let events: Vec<TraceEvent> = TraceReader::new(Cursor::new(input))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        events,
        vec![
            TraceEvent {
                op: Operation::Read,
                addr: 0x1f,
                kind: None
            },
            TraceEvent {
                op: Operation::Write,
                addr: 0xff0,
                kind: None
            },
            TraceEvent {
                op: Operation::Read,
                addr: 0xabc,
                kind: Some(AccessKind::Data)
            },
            TraceEvent {
                op: Operation::Write,
                addr: 0x10,
                kind: Some(AccessKind::Instruction)
            },
            TraceEvent {
                op: Operation::Read,
                addr: 0xffff_ffff,
                kind: None
            },
        ]
    );
}

#[test]
fn trace_reader_rejects_malformed_lines() {
    for input in ["x 10\n", "r zz\n", "r\n", "r 10 Q\n", "r 123456789\n", "r 10 D extra\n"] {
        let result: Result<Vec<TraceEvent>, _> =
            TraceReader::new(Cursor::new(input)).collect();
        assert!(result.is_err(), "accepted {input:?}");
    }
}

#[test]
fn miss_rate_handles_an_empty_run() {
    assert_eq!(Statistics::default().miss_rate(), 0.0);
}

#[test]
fn csv_report_formats_percentages_with_two_decimals() {
    let report = HierarchyReport {
        levels: vec![LevelReport {
            level: "L1".to_string(),
            statistics: stats(1, 0, 0, 1, 8),
        }],
    };
    assert_eq!(
        report.to_csv(),
        "Level,NumReads,NumWrites,NumHits,NumMisses,MissRate,TotalCycles\nL1,1,0,0,1,100.00,8\n"
    );
}

#[test]
fn hierarchy_config_deserialises_with_defaults() {
    let config: HierarchyConfig = serde_json::from_str(r#"{"victim": true}"#).unwrap();
    assert!(config.victim);
    assert!(!config.prefetch);
    assert_eq!(config.l1, CachePolicy::l1_default());
    assert_eq!(config.l3, CachePolicy::l3_default());

    let policy: CachePolicy = serde_json::from_str(
        r#"{
            "cache_size": 1024,
            "block_size": 64,
            "block_num": 16,
            "associativity": 2,
            "hit_latency": 1,
            "miss_latency": 8,
            "replacement": "fifo"
        }"#,
    )
    .unwrap();
    assert_eq!(policy.replacement, ReplacementPolicy::FirstInFirstOut);
    assert!(policy.writeback_enabled);
    assert!(policy.validate().is_ok());
}
