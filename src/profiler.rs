//! Per-thread profiling state
//!
//! A `ThreadProfiler` owns everything one thread records: the two frame
//! buffers, the stats table, the info table and the reconstruction scratch
//! stack. Nothing in it is shared, so none of it is locked. The free hook API
//! in [`crate::hooks`] keeps one per thread; it can also be driven directly.

use crate::clock::{self, Timestamp};
use crate::event::{FrameHistory, FuncId, TraceEvent};
use crate::reconstruct::{ReconstructSummary, Reconstructor};
use crate::report::{self, ReportOptions};
use crate::stats::{FunctionStats, StatsTable};
use crate::symbols::{FunctionDescriptor, SymbolCache};
use std::sync::Arc;
use tracing::debug;

/// Sizing of a thread's buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// Initial capacity of each of the two frame buffers (events)
    pub buffer_capacity: usize,
    /// Initial capacity of the reconstruction stack (nesting depth)
    pub stack_capacity: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            stack_capacity: 64,
        }
    }
}

impl ProfilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_capacity(mut self, events: usize) -> Self {
        self.buffer_capacity = events;
        self
    }

    pub fn with_stack_capacity(mut self, depth: usize) -> Self {
        self.stack_capacity = depth;
        self
    }
}

/// What an event callback is told about a hook call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookEvent {
    /// Entered function, or the function being exited; `None` for an Exit
    /// with no open call
    pub func: Option<FuncId>,
    /// Open calls around this one (0 for a top-level call)
    pub depth: usize,
    pub time: Timestamp,
}

/// Profiling state owned by one thread
#[derive(Debug, Default)]
pub struct ThreadProfiler {
    history: FrameHistory,
    stats: StatsTable,
    symbols: SymbolCache,
    reconstructor: Reconstructor,
    /// Calls currently open, as seen by the hooks
    live: Vec<FuncId>,
}

impl ThreadProfiler {
    pub fn new() -> Self {
        Self::with_config(&ProfilerConfig::default())
    }

    pub fn with_config(config: &ProfilerConfig) -> Self {
        Self {
            history: FrameHistory::with_capacity(config.buffer_capacity),
            stats: StatsTable::new(),
            symbols: SymbolCache::new(),
            reconstructor: Reconstructor::with_capacity(config.stack_capacity),
            live: Vec::with_capacity(config.stack_capacity),
        }
    }

    /// Use `symbols` as this thread's info table
    pub fn with_symbols(mut self, symbols: SymbolCache) -> Self {
        self.symbols = symbols;
        self
    }

    /// Record entry into `func`
    #[inline]
    pub fn enter(&mut self, func: FuncId) -> HookEvent {
        self.enter_at(func, clock::now())
    }

    pub fn enter_at(&mut self, func: FuncId, time: Timestamp) -> HookEvent {
        self.history.push(TraceEvent::enter(func, time));
        let depth = self.live.len();
        self.live.push(func);
        HookEvent {
            func: Some(func),
            depth,
            time,
        }
    }

    /// Record return from the innermost open call
    #[inline]
    pub fn exit(&mut self) -> HookEvent {
        self.exit_at(clock::now())
    }

    pub fn exit_at(&mut self, time: Timestamp) -> HookEvent {
        self.history.push(TraceEvent::exit(time));
        let func = self.live.pop();
        HookEvent {
            func,
            depth: self.live.len(),
            time,
        }
    }

    /// Begin a new recording window
    ///
    /// Calls left open by the previous frame are forgotten here, as
    /// reconstruction forgets them, so an Exit without a matching Enter in
    /// this frame reports no function.
    pub fn frame_start(&mut self) {
        self.history.start_frame();
        self.live.clear();
    }

    /// Close the recording window and fold it into the stats table
    pub fn frame_end(&mut self) -> ReconstructSummary {
        let events = self.history.end_frame();
        let stats = &mut self.stats;
        let summary = self
            .reconstructor
            .run(events, |interval| stats.record_interval(interval));

        if summary.stray_exits > 0 || summary.unclosed > 0 {
            debug!(
                "frame closed with {} stray exits discarded and {} open calls dropped",
                summary.stray_exits, summary.unclosed
            );
        }
        summary
    }

    /// Forget all statistics gathered so far
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Forget the open-call bookkeeping used for event callbacks
    pub fn reset_call_stack(&mut self) {
        self.live.clear();
    }

    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    pub fn func_stats(&self, func: FuncId) -> Option<&FunctionStats> {
        self.stats.get(func)
    }

    /// Events of the last completed frame
    pub fn frame_history(&self) -> &[TraceEvent] {
        self.history.last_completed()
    }

    /// Events recorded so far in the frame being written
    pub fn current_frame(&self) -> &[TraceEvent] {
        self.history.active()
    }

    /// Descriptor for `func`, resolved on first use
    pub fn func_info(&mut self, func: FuncId) -> Arc<FunctionDescriptor> {
        self.symbols.resolve(func)
    }

    pub fn info_table(&self) -> &SymbolCache {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolCache {
        &mut self.symbols
    }

    /// Number of calls currently open
    pub fn depth(&self) -> usize {
        self.live.len()
    }

    pub fn stats_report(&mut self, options: &ReportOptions) -> String {
        report::format_stats(&self.stats, &mut self.symbols, options)
    }

    pub fn stats_report_compact(&mut self, options: &ReportOptions) -> String {
        report::format_stats_compact(&self.stats, &mut self.symbols, options)
    }

    pub fn history_report(&mut self, options: &ReportOptions) -> String {
        report::format_history(self.history.last_completed(), &mut self.symbols, options)
    }

    pub fn history_report_compact(&mut self, options: &ReportOptions) -> String {
        report::format_history_compact(self.history.last_completed(), &mut self.symbols, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ns: u64) -> Timestamp {
        Timestamp::from_nanos(ns)
    }

    #[test]
    fn test_config_builder() {
        let config = ProfilerConfig::new()
            .with_buffer_capacity(16)
            .with_stack_capacity(4);
        assert_eq!(config.buffer_capacity, 16);
        assert_eq!(config.stack_capacity, 4);
    }

    #[test]
    fn test_nested_frame_aggregates() {
        let (a, b) = (FuncId::new(0xa), FuncId::new(0xb));
        let mut p = ThreadProfiler::new();

        p.frame_start();
        p.enter_at(a, ts(0));
        p.enter_at(b, ts(10));
        p.exit_at(ts(30));
        p.exit_at(ts(100));
        let summary = p.frame_end();

        assert_eq!(summary.matched, 2);
        assert_eq!(p.func_stats(a).unwrap().total_ns, 100);
        assert_eq!(p.func_stats(b).unwrap().total_ns, 20);
        assert_eq!(p.frame_history().len(), 4);
    }

    #[test]
    fn test_stats_accumulate_across_frames() {
        let a = FuncId::new(1);
        let mut p = ThreadProfiler::new();
        for (start, end) in [(0, 5), (10, 30)] {
            p.frame_start();
            p.enter_at(a, ts(start));
            p.exit_at(ts(end));
            p.frame_end();
        }
        let stats = p.func_stats(a).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min_ns, 5);
        assert_eq!(stats.max_ns, 20);
    }

    #[test]
    fn test_clear_stats_keeps_history() {
        let mut p = ThreadProfiler::new();
        p.frame_start();
        p.enter_at(FuncId::new(1), ts(0));
        p.exit_at(ts(1));
        p.frame_end();

        p.clear_stats();
        assert!(p.stats().is_empty());
        assert_eq!(p.frame_history().len(), 2);
    }

    #[test]
    fn test_hook_events_track_open_calls() {
        let (a, b) = (FuncId::new(1), FuncId::new(2));
        let mut p = ThreadProfiler::new();

        assert_eq!(p.enter_at(a, ts(0)).depth, 0);
        assert_eq!(p.enter_at(b, ts(1)).depth, 1);
        assert_eq!(p.depth(), 2);

        let exit_b = p.exit_at(ts(2));
        assert_eq!(exit_b.func, Some(b));
        assert_eq!(exit_b.depth, 1);
        assert_eq!(p.exit_at(ts(3)).func, Some(a));

        let stray = p.exit_at(ts(4));
        assert_eq!(stray.func, None);
        assert_eq!(stray.depth, 0);
    }

    #[test]
    fn test_frame_start_forgets_open_calls() {
        let a = FuncId::new(1);
        let mut p = ThreadProfiler::new();
        p.frame_start();
        p.enter_at(a, ts(0));
        p.frame_end();

        p.frame_start();
        assert_eq!(p.depth(), 0);
        let stray = p.exit_at(ts(5));
        assert_eq!(stray.func, None);
        assert_eq!(p.frame_end().stray_exits, 1);
    }

    #[test]
    fn test_frame_end_without_events() {
        let mut p = ThreadProfiler::with_config(&ProfilerConfig::new().with_buffer_capacity(0));
        p.frame_start();
        let summary = p.frame_end();
        assert_eq!(summary, ReconstructSummary::default());
        assert!(p.frame_history().is_empty());
        assert!(p.stats().is_empty());
    }

    #[test]
    fn test_current_frame_is_separate_from_history() {
        let mut p = ThreadProfiler::new();
        p.frame_start();
        p.enter_at(FuncId::new(1), ts(0));
        p.exit_at(ts(1));
        p.frame_end();

        p.frame_start();
        p.enter_at(FuncId::new(2), ts(2));
        assert_eq!(p.current_frame().len(), 1);
        assert_eq!(p.frame_history().len(), 2);
        p.reset_call_stack();
        assert_eq!(p.depth(), 0);
    }
}
