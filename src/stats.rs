//! Per-function timing statistics
//!
//! Folds reconstructed call intervals into a running summary keyed by
//! function identity. Entries only grow until the table is explicitly cleared.

use crate::event::FuncId;
use crate::reconstruct::CallInterval;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Statistics for a single function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionStats {
    /// Number of completed invocations
    pub count: u64,
    /// Shortest invocation (nanoseconds)
    pub min_ns: u64,
    /// Longest invocation (nanoseconds)
    pub max_ns: u64,
    /// Sum of all invocations (nanoseconds)
    pub total_ns: u64,
}

impl Default for FunctionStats {
    fn default() -> Self {
        Self {
            count: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            total_ns: 0,
        }
    }
}

impl FunctionStats {
    /// Fold one invocation into the summary
    pub fn record(&mut self, duration_ns: u64) {
        self.count += 1;
        self.min_ns = self.min_ns.min(duration_ns);
        self.max_ns = self.max_ns.max(duration_ns);
        self.total_ns = self.total_ns.saturating_add(duration_ns);
    }

    /// Mean duration over all recorded invocations (nanoseconds)
    pub fn average_ns(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ns as f64 / self.count as f64
        }
    }

    /// `min_ns`, or zero when nothing was recorded
    pub fn min_or_zero(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.min_ns
        }
    }
}

/// How report rows are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Total time, descending
    #[default]
    Total,
    /// Invocation count, descending
    Count,
    /// Identity, ascending
    Identity,
}

/// Mapping from function identity to its statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    entries: FnvHashMap<FuncId, FunctionStats>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation of `func`
    pub fn record(&mut self, func: FuncId, duration_ns: u64) {
        self.entries.entry(func).or_default().record(duration_ns);
    }

    /// Record a reconstructed call
    pub fn record_interval(&mut self, interval: &CallInterval) {
        self.record(interval.func, interval.duration_ns);
    }

    pub fn get(&self, func: FuncId) -> Option<&FunctionStats> {
        self.entries.get(&func)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &FunctionStats)> {
        self.entries.iter().map(|(func, stats)| (*func, stats))
    }

    /// Fold another table into this one
    pub fn merge(&mut self, other: &StatsTable) {
        for (func, theirs) in other.iter() {
            if theirs.count == 0 {
                continue;
            }
            let ours = self.entries.entry(func).or_default();
            ours.count += theirs.count;
            ours.min_ns = ours.min_ns.min(theirs.min_ns);
            ours.max_ns = ours.max_ns.max(theirs.max_ns);
            ours.total_ns = ours.total_ns.saturating_add(theirs.total_ns);
        }
    }

    /// Entries ordered for reporting; ties are always broken by identity
    pub fn sorted(&self, sort: SortBy) -> Vec<(FuncId, FunctionStats)> {
        let mut rows: Vec<_> = self.entries.iter().map(|(f, s)| (*f, *s)).collect();
        match sort {
            SortBy::Total => {
                rows.sort_by(|a, b| b.1.total_ns.cmp(&a.1.total_ns).then(a.0.cmp(&b.0)))
            }
            SortBy::Count => rows.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0))),
            SortBy::Identity => rows.sort_by_key(|row| row.0),
        }
        rows
    }
}

impl FromIterator<CallInterval> for StatsTable {
    fn from_iter<I: IntoIterator<Item = CallInterval>>(iter: I) -> Self {
        let mut table = StatsTable::new();
        for interval in iter {
            table.record_interval(&interval);
        }
        table
    }
}
