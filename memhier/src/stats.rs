use serde::{Deserialize, Serialize};

/// Per-cache counters. Reset only when the owning cache is created
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub num_read: u64,
    pub num_write: u64,
    pub num_hit: u64,
    pub num_miss: u64,
    pub total_cycles: u64,
}

impl Statistics {
    /// Miss rate as a percentage; zero when nothing was accessed
    pub fn miss_rate(&self) -> f64 {
        let total = self.num_hit + self.num_miss;
        if total == 0 {
            0.0
        } else {
            self.num_miss as f64 / total as f64 * 100.0
        }
    }
}

pub const CSV_HEADER: &str = "Level,NumReads,NumWrites,NumHits,NumMisses,MissRate,TotalCycles";

/// The counters of one cache level, labelled for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: String,
    #[serde(flatten)]
    pub statistics: Statistics,
}

impl LevelReport {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{:.2},{}",
            self.level,
            self.statistics.num_read,
            self.statistics.num_write,
            self.statistics.num_hit,
            self.statistics.num_miss,
            self.statistics.miss_rate(),
            self.statistics.total_cycles
        )
    }
}

/// The result of a whole simulation, one row per level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyReport {
    pub levels: Vec<LevelReport>,
}

impl HierarchyReport {
    pub fn to_csv(&self) -> String {
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for level in &self.levels {
            out.push_str(&level.csv_row());
            out.push('\n');
        }
        out
    }
}
