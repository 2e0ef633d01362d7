use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use crate::config::CachePolicy;
use crate::error::SimError;
use crate::memory::MemoryStore;
use crate::stats::Statistics;

/// One cache slot. `set_id` is fixed at construction (`slot / associativity`)
/// and re-checked on every lookup; `last_reference` drives LRU, `created_at`
/// drives FIFO
#[derive(Debug, Clone)]
pub struct Block {
    pub valid: bool,
    pub modified: bool,
    pub tag: u32,
    pub set_id: u32,
    pub size: u32,
    pub last_reference: u64,
    pub created_at: u64,
    pub data: Vec<u8>,
}

/// A single cache level: a set-associative array of blocks with
/// write-allocate + write-back handling of misses
///
/// The level below is either another cache (shared with an optional victim
/// cache, hence the `Rc<RefCell<_>>`) or, when absent, the backing
/// `MemoryStore`. A victim cache, when attached, intercepts evictions from
/// this cache and is consulted before the lower level on every fill
pub struct Cache {
    policy: CachePolicy,
    blocks: Vec<Block>,
    reference_counter: u64,
    statistics: Statistics,
    lower: Option<Rc<RefCell<Cache>>>,
    victim: Option<Box<Cache>>,
    memory: Rc<RefCell<MemoryStore>>,
}

impl Cache {
    pub fn new(
        policy: CachePolicy,
        lower: Option<Rc<RefCell<Cache>>>,
        memory: Rc<RefCell<MemoryStore>>,
    ) -> Result<Self, SimError> {
        policy.validate()?;
        let blocks = (0..policy.block_num)
            .map(|slot| Block {
                valid: false,
                modified: false,
                tag: 0,
                set_id: slot / policy.associativity,
                size: policy.block_size,
                last_reference: 0,
                created_at: 0,
                data: vec![0; policy.block_size as usize],
            })
            .collect();
        Ok(Self {
            policy,
            blocks,
            reference_counter: 0,
            statistics: Statistics::default(),
            lower,
            victim: None,
            memory,
        })
    }

    /// Attaches a victim cache. It must share this cache's lower level so
    /// its own dirty evictions drain to the same place
    pub fn attach_victim(&mut self, victim: Cache) {
        self.victim = Some(Box::new(victim));
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Counter snapshot. With a victim cache attached, lookups rescued by
    /// the victim are reported as hits of this level; the underlying
    /// counters are left untouched
    pub fn statistics(&self) -> Statistics {
        let mut statistics = self.statistics;
        if let Some(victim) = &self.victim {
            let rescued = victim.statistics.num_hit;
            statistics.num_hit += rescued;
            // Saturating: prefetch fills can hit the victim cache without a
            // counted miss at this level
            statistics.num_miss = statistics.num_miss.saturating_sub(rescued);
        }
        statistics
    }

    pub fn read(&mut self, addr: u32) -> u8 {
        let id = self.access(addr, true);
        let offset = self.policy.offset_of(addr) as usize;
        self.blocks[id].data[offset]
    }

    /// Write-allocate: a miss loads the block before the byte is stored
    pub fn write(&mut self, addr: u32, val: u8) {
        let id = self.access(addr, false);
        let offset = self.policy.offset_of(addr) as usize;
        self.blocks[id].modified = true;
        self.blocks[id].data[offset] = val;
    }

    /// Lookup without any statistics side effects
    pub fn in_cache(&self, addr: u32) -> bool {
        self.find_block(addr).is_some()
    }

    /// Prefetch entry point: makes `addr` resident without counting a hit
    /// or miss at this level
    pub fn fetch(&mut self, addr: u32) {
        if self.find_block(addr).is_none() {
            self.reference_counter += 1;
            self.load_block_from_lower_level(addr, true);
        }
    }

    /// One counted access: bumps the reference counter and the read/write,
    /// hit/miss and cycle counters exactly once, loading the block from
    /// below on a miss. Returns the slot holding the block
    fn access(&mut self, addr: u32, is_read: bool) -> usize {
        self.reference_counter += 1;
        if is_read {
            self.statistics.num_read += 1;
        } else {
            self.statistics.num_write += 1;
        }

        if let Some(id) = self.find_block(addr) {
            self.statistics.num_hit += 1;
            self.statistics.total_cycles += u64::from(self.policy.hit_latency);
            self.blocks[id].last_reference = self.reference_counter;
            return id;
        }

        self.statistics.num_miss += 1;
        self.statistics.total_cycles += u64::from(self.policy.miss_latency);
        self.load_block_from_lower_level(addr, is_read);

        // The block must be resident after the fill
        let id = self.expect_resident(addr);
        self.blocks[id].last_reference = self.reference_counter;
        id
    }

    /// Scans the slots of the address's set for a valid block with a
    /// matching tag, checking the set-id invariant on every slot it touches
    fn find_block(&self, addr: u32) -> Option<usize> {
        let tag = self.policy.tag_of(addr);
        let set = self.policy.set_of(addr) as usize;
        let associativity = self.policy.associativity as usize;
        for id in set * associativity..(set + 1) * associativity {
            assert_eq!(
                self.blocks[id].set_id as usize,
                id / associativity,
                "inconsistent set id in block {id}"
            );
            debug_assert!(
                !self.blocks[id].valid
                    || (self.blocks[id].size == self.policy.block_size
                        && self.blocks[id].data.len() == self.blocks[id].size as usize)
            );
            if self.blocks[id].valid && self.blocks[id].tag == tag {
                return Some(id);
            }
        }
        None
    }

    fn expect_resident(&self, addr: u32) -> usize {
        self.find_block(addr)
            .unwrap_or_else(|| panic!("block for addr {addr:#010x} missing after fill"))
    }

    /// Fills the block containing `addr` from the victim cache, the lower
    /// cache, or the memory store, then installs it in its set, evicting
    /// the replacement victim
    fn load_block_from_lower_level(&mut self, addr: u32, is_read: bool) {
        let base = self.policy.block_base(addr);
        let block_size = self.policy.block_size;
        let mut block = Block {
            valid: true,
            modified: false,
            tag: self.policy.tag_of(addr),
            set_id: self.policy.set_of(addr),
            size: block_size,
            last_reference: self.reference_counter,
            created_at: self.reference_counter,
            data: vec![0; block_size as usize],
        };

        let mut filled = false;
        if let Some(victim) = self.victim.as_mut() {
            if let Some(id) = victim.find_block(base) {
                victim.statistics.num_hit += 1;
                victim.statistics.total_cycles += u64::from(victim.policy.hit_latency);
                block.data.copy_from_slice(&victim.blocks[id].data);
                // Keep the dirty flag: a line parked in the victim cache may
                // still be the only copy of written data
                block.modified = victim.blocks[id].modified;
                victim.blocks[id].valid = false;
                filled = true;
            } else {
                victim.statistics.num_miss += 1;
                victim.statistics.total_cycles += u64::from(victim.policy.miss_latency);
            }
        }

        if !filled {
            if let Some(lower) = &self.lower {
                let mut lower = lower.borrow_mut();
                lower.access(base, is_read);
                for i in 0..block_size {
                    block.data[i as usize] = lower.get_byte(base + i);
                }
            } else {
                let memory = self.memory.borrow();
                for i in 0..block_size {
                    block.data[i as usize] = memory.get_byte(base + i);
                }
            }
        }

        self.place_block(block);
    }

    /// Installs a freshly built block, handing the displaced one to `evict`
    fn place_block(&mut self, block: Block) {
        let associativity = self.policy.associativity as usize;
        let begin = block.set_id as usize * associativity;
        let slot = begin
            + self
                .policy
                .replacement
                .select_victim(&self.blocks[begin..begin + associativity]);
        let old = mem::replace(&mut self.blocks[slot], block);
        if old.valid {
            self.evict(old);
        }
    }

    /// Dirty blocks are written back to the next level down (the victim
    /// cache when attached, else the lower cache, else memory) at a cost of
    /// one miss latency; clean blocks still enter the victim cache so it
    /// can rescue conflict misses
    fn evict(&mut self, old: Block) {
        let base = self.policy.addr_of(old.tag, old.set_id);
        if old.modified && self.policy.writeback_enabled {
            if let Some(victim) = self.victim.as_mut() {
                victim.insert_evicted(base, &old.data, true);
            } else if let Some(lower) = &self.lower {
                let mut lower = lower.borrow_mut();
                for (i, byte) in old.data.iter().enumerate() {
                    lower.set_byte(base + i as u32, *byte);
                }
            } else {
                let mut memory = self.memory.borrow_mut();
                for (i, byte) in old.data.iter().enumerate() {
                    memory.set_byte(base + i as u32, *byte);
                }
            }
            self.statistics.total_cycles += u64::from(self.policy.miss_latency);
        } else if !old.modified {
            if let Some(victim) = self.victim.as_mut() {
                victim.insert_evicted(base, &old.data, false);
            }
        }
    }

    /// Takes a block evicted by the parent cache. The block is re-described
    /// in this cache's own geometry and placed like any other fill
    fn insert_evicted(&mut self, base: u32, data: &[u8], modified: bool) {
        debug_assert_eq!(data.len(), self.policy.block_size as usize);
        self.reference_counter += 1;
        let block = Block {
            valid: true,
            modified,
            tag: self.policy.tag_of(base),
            set_id: self.policy.set_of(base),
            size: self.policy.block_size,
            last_reference: self.reference_counter,
            created_at: self.reference_counter,
            data: data.to_vec(),
        };
        self.place_block(block);
    }

    /// Uncounted byte read used when a level above copies a whole block.
    /// Loads the block first if it is not resident
    pub(crate) fn get_byte(&mut self, addr: u32) -> u8 {
        let id = match self.find_block(addr) {
            Some(id) => id,
            None => {
                self.reference_counter += 1;
                self.load_block_from_lower_level(addr, true);
                self.expect_resident(addr)
            }
        };
        let offset = self.policy.offset_of(addr) as usize;
        self.blocks[id].data[offset]
    }

    /// Uncounted write-allocate byte write used for write-backs from the
    /// level above
    pub(crate) fn set_byte(&mut self, addr: u32, val: u8) {
        let id = match self.find_block(addr) {
            Some(id) => id,
            None => {
                self.reference_counter += 1;
                self.load_block_from_lower_level(addr, false);
                self.expect_resident(addr)
            }
        };
        let offset = self.policy.offset_of(addr) as usize;
        self.blocks[id].modified = true;
        self.blocks[id].data[offset] = val;
    }

    pub fn print_info(&self, verbose: bool) {
        println!("---------- Cache Info -----------");
        println!("Cache Size: {} bytes", self.policy.cache_size);
        println!("Block Size: {} bytes", self.policy.block_size);
        println!("Block Num: {}", self.policy.block_num);
        println!("Associativity: {}", self.policy.associativity);
        println!("Hit Latency: {}", self.policy.hit_latency);
        println!("Miss Latency: {}", self.policy.miss_latency);

        if verbose {
            for (index, block) in self.blocks.iter().enumerate() {
                println!(
                    "Block {index}: tag {:#x} set {} {} {} (last ref {})",
                    block.tag,
                    block.set_id,
                    if block.valid { "valid" } else { "invalid" },
                    if block.modified { "modified" } else { "unmodified" },
                    block.last_reference
                );
            }
        }
    }

    pub fn print_statistics(&self) {
        self.print_counters();
        if let Some(victim) = &self.victim {
            println!("---------- VICTIM CACHE ----------");
            victim.print_counters();
        }
        if let Some(lower) = &self.lower {
            println!("---------- LOWER CACHE ----------");
            lower.borrow().print_statistics();
        }
    }

    fn print_counters(&self) {
        let statistics = self.statistics();
        println!("-------- STATISTICS ----------");
        println!("Num Read: {}", statistics.num_read);
        println!("Num Write: {}", statistics.num_write);
        println!("Num Hit: {}", statistics.num_hit);
        println!("Num Miss: {}", statistics.num_miss);
        println!("Miss Rate: {:.2}%", statistics.miss_rate());
        println!("Total Cycles: {}", statistics.total_cycles);
    }
}
