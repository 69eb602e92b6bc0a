//! Hookprof - instrumentation-based function-level profiler
//!
//! Instrumented code calls [`enter`] at every function prologue and [`exit`]
//! at every epilogue. Events land in a per-thread, double-buffered frame
//! history; at [`frame_end`] the frame is replayed through a LIFO stack into
//! nested call intervals and folded into a per-function stats table. Function
//! identities are turned into names and source lines lazily, through a
//! process-wide [`SymbolProvider`] and a per-thread cache.
//!
//! ```
//! use hookprof::{FuncId, ReportOptions};
//!
//! hookprof::enable();
//! hookprof::frame_start();
//! hookprof::enter(FuncId::new(0x1000));
//! hookprof::exit();
//! hookprof::frame_end();
//!
//! let stats = hookprof::get_func_stats(FuncId::new(0x1000)).unwrap();
//! assert_eq!(stats.count, 1);
//! # let _ = ReportOptions::default();
//! ```

pub mod cli;
pub mod clock;
pub mod error;
pub mod event;
pub mod flame;
pub mod hooks;
pub mod profiler;
pub mod reconstruct;
pub mod registry;
pub mod report;
pub mod stats;
pub mod symbols;

pub use clock::{TimeUnit, Timestamp};
pub use error::{ProfilerError, Result};
pub use event::{EventKind, FrameHistory, FuncId, TraceEvent};
pub use flame::{FlameGraph, FlameSpan};
pub use hooks::{
    clear_event_callbacks, clear_stats, disable, enable, enter, exit, frame_end, frame_start,
    get_frame_history, get_func_info, get_func_stats, get_info_table, get_stats_table,
    is_enabled, log_history, log_history_compact, log_stats, log_stats_compact, on_enter_event,
    on_error, on_exit_event, scope, set_default_config, with_frame_history, with_info_table,
    with_stats_table, ScopeGuard,
};
pub use profiler::{HookEvent, ProfilerConfig, ThreadProfiler};
pub use reconstruct::{reconstruct, CallInterval, ReconstructSummary, Reconstructor};
pub use report::ReportOptions;
pub use stats::{FunctionStats, SortBy, StatsTable};
pub use symbols::{FunctionDescriptor, SymbolCache, SymbolProvider};
