use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::cache::Cache;
use crate::config::{CachePolicy, HierarchyConfig};
use crate::error::SimError;
use crate::memory::MemoryStore;
use crate::replacement_policies::ReplacementPolicy;
use crate::stats::{HierarchyReport, LevelReport};
use crate::trace::Operation;

/// Stride detector state. `same`/`diff` count consecutive agreements and
/// disagreements of the observed stride; four in a row flips prefetching
/// on or off
#[derive(Debug, Default)]
struct PrefetcherState {
    is_prefetching: bool,
    stride: i32,
    same: u32,
    diff: u32,
    last_addr: u32,
}

/// The L1 -> L2 -> L3 -> MemoryStore chain, plus the optional stride
/// prefetcher, dispatching one trace event at a time
///
/// The store is shared by every level; the caches are linked bottom-up at
/// construction and never restructured afterwards
pub struct CacheHierarchy {
    memory: Rc<RefCell<MemoryStore>>,
    l1: Rc<RefCell<Cache>>,
    l2: Rc<RefCell<Cache>>,
    l3: Rc<RefCell<Cache>>,
    prefetch_enabled: bool,
    prefetcher: PrefetcherState,
}

impl CacheHierarchy {
    pub fn new(config: &HierarchyConfig) -> Result<Self, SimError> {
        let memory = Rc::new(RefCell::new(MemoryStore::new()));

        let mut l1_policy = config.l1;
        let mut l2_policy = config.l2;
        let mut l3_policy = config.l3;
        if config.fifo {
            l1_policy.replacement = ReplacementPolicy::FirstInFirstOut;
            l2_policy.replacement = ReplacementPolicy::FirstInFirstOut;
            l3_policy.replacement = ReplacementPolicy::FirstInFirstOut;
        }

        let l3 = Rc::new(RefCell::new(Cache::new(l3_policy, None, memory.clone())?));
        let l2 = Rc::new(RefCell::new(Cache::new(
            l2_policy,
            Some(l3.clone()),
            memory.clone(),
        )?));
        let mut l1 = Cache::new(l1_policy, Some(l2.clone()), memory.clone())?;
        if config.victim {
            // The victim cache drains to the same lower level as L1
            let victim = Cache::new(
                CachePolicy::victim_default(),
                Some(l2.clone()),
                memory.clone(),
            )?;
            l1.attach_victim(victim);
        }

        Ok(Self {
            memory,
            l1: Rc::new(RefCell::new(l1)),
            l2,
            l3,
            prefetch_enabled: config.prefetch,
            prefetcher: PrefetcherState::default(),
        })
    }

    /// Dispatches one trace event: materialise the page, run the prefetch
    /// heuristic, then issue the access to L1
    pub fn access(&mut self, op: Operation, addr: u32) {
        trace!("{} {addr:#x}", op.symbol());
        self.memory.borrow_mut().ensure_page(addr);
        if self.prefetch_enabled {
            self.run_prefetcher(addr);
        }
        match op {
            Operation::Read => {
                self.l1.borrow_mut().read(addr);
            }
            Operation::Write => {
                self.l1.borrow_mut().write(addr, 0);
            }
        }
    }

    /// Issues the prefetch for the current stride (when armed), then updates
    /// the detector with this access. The stride is the signed 32-bit delta
    /// between consecutive addresses, so descending patterns train too
    fn run_prefetcher(&mut self, addr: u32) {
        if self.prefetcher.is_prefetching {
            let prefetch_addr = addr.wrapping_add(self.prefetcher.stride as u32);
            self.memory.borrow_mut().ensure_page(prefetch_addr);
            self.l1.borrow_mut().fetch(prefetch_addr);
        }

        let p = &mut self.prefetcher;
        let current_stride = addr.wrapping_sub(p.last_addr) as i32;
        if current_stride == p.stride {
            p.same += 1;
            p.diff = 0;
        } else {
            p.stride = current_stride;
            p.diff += 1;
            p.same = 0;
        }
        if p.same > 3 {
            p.is_prefetching = true;
        }
        if p.diff > 3 {
            p.is_prefetching = false;
        }
        p.last_addr = addr;
    }

    pub fn report(&self) -> HierarchyReport {
        let levels = [("L1", &self.l1), ("L2", &self.l2), ("L3", &self.l3)]
            .into_iter()
            .map(|(level, cache)| LevelReport {
                level: level.to_string(),
                statistics: cache.borrow().statistics(),
            })
            .collect();
        HierarchyReport { levels }
    }

    pub fn print_statistics(&self) {
        self.l1.borrow().print_statistics();
    }
}
