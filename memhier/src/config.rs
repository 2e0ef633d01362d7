use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::replacement_policies::ReplacementPolicy;

/// The parameters of a single cache level
///
/// Sizes are in bytes and must be powers of two; latencies are in cycles.
/// `writeback_enabled = false` turns dirty evictions into plain drops, which
/// is how an instruction-only cache behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub cache_size: u32,
    pub block_size: u32,
    pub block_num: u32,
    pub associativity: u32,
    pub hit_latency: u32,
    pub miss_latency: u32,
    #[serde(default = "default_writeback")]
    pub writeback_enabled: bool,
    #[serde(default)]
    pub replacement: ReplacementPolicy,
}

fn default_writeback() -> bool {
    true
}

impl CachePolicy {
    pub fn new(
        cache_size: u32,
        block_size: u32,
        associativity: u32,
        hit_latency: u32,
        miss_latency: u32,
    ) -> Self {
        Self {
            cache_size,
            block_size,
            block_num: cache_size / block_size,
            associativity,
            hit_latency,
            miss_latency,
            writeback_enabled: true,
            replacement: ReplacementPolicy::default(),
        }
    }

    /// 16 KiB, 64-byte blocks, direct-mapped
    pub fn l1_default() -> Self {
        Self::new(16 * 1024, 64, 1, 1, 8)
    }

    /// 128 KiB, 64-byte blocks, 8-way
    pub fn l2_default() -> Self {
        Self::new(128 * 1024, 64, 8, 8, 20)
    }

    /// 2 MiB, 64-byte blocks, 16-way
    pub fn l3_default() -> Self {
        Self::new(2048 * 1024, 64, 16, 20, 100)
    }

    /// 8 KiB, 64-byte blocks, fully associative (128 blocks, 128-way)
    pub fn victim_default() -> Self {
        Self::new(8 * 1024, 64, 128, 1, 8)
    }

    /// Geometry for one point of the single-level parameter sweep
    pub fn sweep(cache_size: u32, block_size: u32, associativity: u32) -> Self {
        Self::new(cache_size, block_size, associativity, 1, 100)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let checks = [
            (
                self.cache_size.is_power_of_two(),
                format!("invalid cache size {}", self.cache_size),
            ),
            (
                self.block_size.is_power_of_two(),
                format!("invalid block size {}", self.block_size),
            ),
            (
                self.cache_size % self.block_size == 0,
                "cache_size % block_size != 0".to_string(),
            ),
            (
                self.block_num * self.block_size == self.cache_size,
                "block_num * block_size != cache_size".to_string(),
            ),
            (
                self.associativity > 0 && self.block_num % self.associativity == 0,
                "block_num % associativity != 0".to_string(),
            ),
        ];
        for (condition, message) in checks {
            if !condition {
                return Err(SimError::InvalidPolicy(message));
            }
        }
        Ok(())
    }

    /// Low bits of the address selecting a byte within a block
    pub fn offset_bits(&self) -> u32 {
        self.block_size.trailing_zeros()
    }

    /// Middle bits of the address selecting a set
    pub fn set_bits(&self) -> u32 {
        (self.block_num / self.associativity).trailing_zeros()
    }

    pub fn offset_of(&self, addr: u32) -> u32 {
        addr & (self.block_size - 1)
    }

    pub fn set_of(&self, addr: u32) -> u32 {
        (addr >> self.offset_bits()) & ((self.block_num / self.associativity) - 1)
    }

    pub fn tag_of(&self, addr: u32) -> u32 {
        let low_bits = self.offset_bits() + self.set_bits();
        let mask = ((1u64 << (32 - low_bits)) - 1) as u32;
        (addr >> low_bits) & mask
    }

    /// The address aligned down to the start of its block
    pub fn block_base(&self, addr: u32) -> u32 {
        addr & !(self.block_size - 1)
    }

    /// Reverses `tag_of`/`set_of`: the base address of the block a
    /// (tag, set) pair describes
    pub fn addr_of(&self, tag: u32, set_id: u32) -> u32 {
        let offset_bits = self.offset_bits();
        (tag << (offset_bits + self.set_bits())) | (set_id << offset_bits)
    }
}

/// Full configuration for the three-level hierarchy, deserialisable from
/// JSON so a driver can override the built-in policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "CachePolicy::l1_default")]
    pub l1: CachePolicy,
    #[serde(default = "CachePolicy::l2_default")]
    pub l2: CachePolicy,
    #[serde(default = "CachePolicy::l3_default")]
    pub l3: CachePolicy,
    /// Enable the stride prefetcher
    #[serde(default)]
    pub prefetch: bool,
    /// Use FIFO replacement on L1/L2/L3 instead of LRU
    #[serde(default)]
    pub fifo: bool,
    /// Attach a victim cache to L1
    #[serde(default)]
    pub victim: bool,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            l1: CachePolicy::l1_default(),
            l2: CachePolicy::l2_default(),
            l3: CachePolicy::l3_default(),
            prefetch: false,
            fifo: false,
            victim: false,
        }
    }
}
