//! Hook and control API
//!
//! `enter`/`exit` are what the instrumentation calls at every function
//! prologue and epilogue. They record into the calling thread's own
//! [`ThreadProfiler`], so the hot path takes no lock.
//!
//! The enable flag is the only state shared between threads. It is a relaxed
//! atomic: another thread may keep seeing the previous value for a short
//! while after a toggle. Every hook and frame call is a no-op while disabled.

use crate::event::{FuncId, TraceEvent};
use crate::profiler::{HookEvent, ProfilerConfig, ThreadProfiler};
use crate::report::{self, ReportOptions};
use crate::stats::{FunctionStats, StatsTable};
use crate::symbols::{FunctionDescriptor, SymbolCache};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

pub use crate::symbols::on_error;

static ENABLED: AtomicBool = AtomicBool::new(false);
static DEFAULT_CONFIG: OnceLock<ProfilerConfig> = OnceLock::new();

type EventCallback = Box<dyn FnMut(&HookEvent)>;

#[derive(Default)]
struct EventCallbacks {
    on_enter: Option<EventCallback>,
    on_exit: Option<EventCallback>,
}

thread_local! {
    static PROFILER: RefCell<ThreadProfiler> = RefCell::new(ThreadProfiler::with_config(
        DEFAULT_CONFIG.get_or_init(ProfilerConfig::default),
    ));
    static CALLBACKS: RefCell<EventCallbacks> = RefCell::new(EventCallbacks::default());
}

/// Set the configuration used for every thread's profiler
///
/// Must happen before the first hook call on any thread; returns the config
/// back if one is already in effect.
pub fn set_default_config(config: ProfilerConfig) -> Result<(), ProfilerConfig> {
    DEFAULT_CONFIG.set(config)
}

/// Enable profiling process-wide, returning the previous state
pub fn enable() -> bool {
    ENABLED.swap(true, Ordering::Relaxed)
}

/// Disable profiling process-wide, returning the previous state
pub fn disable() -> bool {
    ENABLED.swap(false, Ordering::Relaxed)
}

#[inline]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Function entry hook
#[inline]
pub fn enter(func: FuncId) {
    if !is_enabled() {
        return;
    }
    // A busy profiler means we were re-entered from inside the profiler
    // itself; such events are dropped.
    if let Some(event) = try_with_profiler(|p| p.enter(func)) {
        dispatch(&event, |callbacks| callbacks.on_enter.as_mut());
    }
}

/// Function exit hook; the exited function is the innermost open call
#[inline]
pub fn exit() {
    if !is_enabled() {
        return;
    }
    if let Some(event) = try_with_profiler(|p| p.exit()) {
        dispatch(&event, |callbacks| callbacks.on_exit.as_mut());
    }
}

fn dispatch<F>(event: &HookEvent, select: F)
where
    F: FnOnce(&mut EventCallbacks) -> Option<&mut EventCallback>,
{
    // A callback that triggers hooks itself is not re-invoked for them
    let _ = CALLBACKS.try_with(|callbacks| {
        if let Ok(mut callbacks) = callbacks.try_borrow_mut() {
            if let Some(callback) = select(&mut *callbacks) {
                callback(event);
            }
        }
    });
}

/// Register a callback run after every recorded Enter on this thread
pub fn on_enter_event<F: FnMut(&HookEvent) + 'static>(callback: F) {
    CALLBACKS.with(|c| c.borrow_mut().on_enter = Some(Box::new(callback)));
}

/// Register a callback run after every recorded Exit on this thread
pub fn on_exit_event<F: FnMut(&HookEvent) + 'static>(callback: F) {
    CALLBACKS.with(|c| c.borrow_mut().on_exit = Some(Box::new(callback)));
}

/// Remove this thread's event callbacks
pub fn clear_event_callbacks() {
    CALLBACKS.with(|c| *c.borrow_mut() = EventCallbacks::default());
}

/// Run `f` on this thread's profiler
///
/// Returns `None` when the profiler is already borrowed further up the stack
/// (an error callback fired while resolving a name calls back in) or the
/// thread is being torn down.
fn try_with_profiler<R>(f: impl FnOnce(&mut ThreadProfiler) -> R) -> Option<R> {
    PROFILER
        .try_with(|p| p.try_borrow_mut().ok().map(|mut p| f(&mut p)))
        .ok()
        .flatten()
}

/// Borrow this thread's profiler for reading; `f` sees `None` while it is
/// being written further up the stack
fn view_profiler<R>(f: impl FnOnce(Option<&ThreadProfiler>) -> R) -> R {
    PROFILER.with(|p| match p.try_borrow() {
        Ok(p) => f(Some(&*p)),
        Err(_) => f(None),
    })
}

/// Start a new frame on this thread
pub fn frame_start() {
    if !is_enabled() {
        return;
    }
    try_with_profiler(|p| p.frame_start());
}

/// End the current frame on this thread and aggregate it
pub fn frame_end() {
    if !is_enabled() {
        return;
    }
    try_with_profiler(|p| {
        p.frame_end();
    });
}

/// Empty this thread's stats table
pub fn clear_stats() {
    try_with_profiler(|p| p.clear_stats());
}

/// Descriptor of `func`, resolved and cached in this thread's info table
///
/// Called while this thread is already resolving a name (from the error
/// callback), it returns a placeholder without consulting any provider.
pub fn get_func_info(func: FuncId) -> Arc<FunctionDescriptor> {
    if let Some(cached) = view_profiler(|p| p.and_then(|p| p.info_table().get(func).cloned())) {
        return cached;
    }
    try_with_profiler(|p| p.func_info(func)).unwrap_or_else(|| {
        Arc::new(FunctionDescriptor::unresolved(func, "info table busy"))
    })
}

/// Statistics of one function on this thread
pub fn get_func_stats(func: FuncId) -> Option<FunctionStats> {
    view_profiler(|p| p.and_then(|p| p.func_stats(func).copied()))
}

/// Borrow this thread's stats table
///
/// While the profiler is busy further up the stack, `f` sees an empty table.
pub fn with_stats_table<R>(f: impl FnOnce(&StatsTable) -> R) -> R {
    view_profiler(|p| match p {
        Some(p) => f(p.stats()),
        None => f(&StatsTable::new()),
    })
}

/// Copy of this thread's stats table
pub fn get_stats_table() -> StatsTable {
    with_stats_table(StatsTable::clone)
}

/// Borrow this thread's last completed frame
pub fn with_frame_history<R>(f: impl FnOnce(&[TraceEvent]) -> R) -> R {
    view_profiler(|p| f(p.map_or(&[][..], |p| p.frame_history())))
}

/// Copy of this thread's last completed frame
pub fn get_frame_history() -> Vec<TraceEvent> {
    with_frame_history(<[TraceEvent]>::to_vec)
}

/// Borrow this thread's info table
pub fn with_info_table<R>(f: impl FnOnce(&SymbolCache) -> R) -> R {
    view_profiler(|p| match p {
        Some(p) => f(p.info_table()),
        None => f(&SymbolCache::new()),
    })
}

/// Descriptors resolved so far on this thread, ordered by identity
pub fn get_info_table() -> Vec<Arc<FunctionDescriptor>> {
    with_info_table(|cache| {
        let mut all: Vec<_> = cache.iter().map(|(_, d)| Arc::clone(d)).collect();
        all.sort_by_key(|d| d.func);
        all
    })
}

/// Print this thread's full stats report to stdout
pub fn log_stats(options: &ReportOptions) {
    let text = try_with_profiler(|p| p.stats_report(options));
    print_report(text.as_deref());
}

/// Print this thread's compact stats report to stdout
pub fn log_stats_compact(options: &ReportOptions) {
    let text = try_with_profiler(|p| p.stats_report_compact(options));
    print_report(text.as_deref());
}

/// Print this thread's last completed frame as a call tree
pub fn log_history(options: &ReportOptions) {
    let text = try_with_profiler(|p| p.history_report(options));
    print_report(text.as_deref());
}

/// Print this thread's last completed frame, one line per call
pub fn log_history_compact(options: &ReportOptions) {
    let text = try_with_profiler(|p| p.history_report_compact(options));
    print_report(text.as_deref());
}

/// Print a call tree for any frame history, such as one handed over by
/// another thread, resolving names through this thread's info table
pub fn log_history_of(events: &[TraceEvent], options: &ReportOptions) {
    let text = try_with_profiler(|p| report::format_history(events, p.symbols_mut(), options));
    print_report(text.as_deref());
}

/// Compact form of [`log_history_of`]
pub fn log_history_compact_of(events: &[TraceEvent], options: &ReportOptions) {
    let text =
        try_with_profiler(|p| report::format_history_compact(events, p.symbols_mut(), options));
    print_report(text.as_deref());
}

/// Print any stats table, such as one collected from another thread
pub fn log_stats_of(table: &StatsTable, options: &ReportOptions) {
    let text = try_with_profiler(|p| report::format_stats(table, p.symbols_mut(), options));
    print_report(text.as_deref());
}

/// `None` means the report could not be produced because the profiler was
/// busy; nothing is printed then.
fn print_report(text: Option<&str>) {
    match text {
        Some("") => eprintln!("\nNo function profiling data collected."),
        Some(text) => print!("{}", text),
        None => {}
    }
}

/// Enter `func` now and exit it when the guard is dropped
///
/// Dropping covers early returns and unwinding, so each Enter gets exactly
/// one Exit. The guard must stay on the thread that created it.
#[must_use = "the scope exits as soon as the guard is dropped"]
pub struct ScopeGuard {
    _not_send: PhantomData<*const ()>,
}

pub fn scope(func: FuncId) -> ScopeGuard {
    enter(func);
    ScopeGuard {
        _not_send: PhantomData,
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        exit();
    }
}

/// Stable C entry points for instrumentation mechanisms
#[cfg(feature = "c-abi")]
pub mod c_abi {
    use super::{enter, exit};
    use crate::event::FuncId;
    use std::ffi::c_void;

    #[no_mangle]
    pub extern "C" fn hookprof_enter(func: u64) {
        enter(FuncId::new(func));
    }

    #[no_mangle]
    pub extern "C" fn hookprof_exit() {
        exit();
    }

    /// `-finstrument-functions` entry hook
    #[no_mangle]
    pub extern "C" fn __cyg_profile_func_enter(this_fn: *mut c_void, _call_site: *mut c_void) {
        enter(FuncId::from_addr(this_fn as usize));
    }

    /// `-finstrument-functions` exit hook
    #[no_mangle]
    pub extern "C" fn __cyg_profile_func_exit(_this_fn: *mut c_void, _call_site: *mut c_void) {
        exit();
    }
}
