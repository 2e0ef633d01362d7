use serde::{Deserialize, Serialize};

use crate::cache::Block;

/// Which block in a full set gets replaced on a miss
///
/// Both policies read timestamps the cache already keeps on every block, so
/// the selection itself is stateless: LRU compares the last-reference
/// counter, FIFO the counter value at the time the slot was last filled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicy {
    #[default]
    #[serde(alias = "lru")]
    LeastRecentlyUsed,
    #[serde(alias = "fifo")]
    FirstInFirstOut,
}

impl ReplacementPolicy {
    /// Picks the slot (relative to the set) to replace. Invalid slots win
    /// outright; among valid slots the policy timestamp decides, with ties
    /// going to the lowest index
    pub fn select_victim(self, set: &[Block]) -> usize {
        if let Some(free) = set.iter().position(|block| !block.valid) {
            return free;
        }
        match self {
            Self::LeastRecentlyUsed => min_index_by(set, |block| block.last_reference),
            Self::FirstInFirstOut => min_index_by(set, |block| block.created_at),
        }
    }
}

fn min_index_by(set: &[Block], key: impl Fn(&Block) -> u64) -> usize {
    let mut min_index = 0;
    let mut min_value = key(&set[0]);
    for (index, block) in set.iter().enumerate().skip(1) {
        let value = key(block);
        if value < min_value {
            min_value = value;
            min_index = index;
        }
    }
    min_index
}
